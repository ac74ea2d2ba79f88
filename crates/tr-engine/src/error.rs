//! Engine-level error taxonomy (§7).
//!
//! Plain enum with a hand-written `Display`, matching `tr_formats::LoadError`
//! rather than reaching for a derive-macro error crate. `StopSong` is
//! deliberately absent: it is normal termination, modeled as `None` from
//! the scheduler's row iterator, not an error (§7).

use core::fmt;

/// Fatal conditions that can end playback before the scheduler itself
/// declares `StopSong`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayError {
    /// The order list contains only `NextPattern`/`InvalidPattern`
    /// sentinels, or repeats a `(order, row)` pair with `canLoop`
    /// disabled — no forward progress is possible.
    InfiniteLoopDetected,
    /// The song has no channels, no patterns, or an order list that is
    /// empty after sentinel resolution.
    InvalidSong(&'static str),
}

impl fmt::Display for PlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayError::InfiniteLoopDetected => {
                write!(f, "order list makes no forward progress")
            }
            PlayError::InvalidSong(reason) => write!(f, "invalid song: {reason}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PlayError {}
