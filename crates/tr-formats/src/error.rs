//! Format-level error taxonomy (§7): `LoadError`/`UnsupportedFormat`, the
//! two conditions a decoder can raise before the engine ever sees a `Song`.
//!
//! Plain enum with a hand-written `Display`, matching `tr_engine::PlayError`
//! rather than reaching for a derive-macro error crate (§7 "Implementation
//! idiom").

use core::fmt;

/// Fatal conditions raised while turning module bytes into a `Song`.
#[derive(Debug)]
pub enum LoadError {
    /// Invalid file header or magic bytes.
    InvalidHeader,
    /// File is shorter than the format's header requires.
    UnexpectedEof,
    /// Header fields recognized but describe a construct not supported.
    UnsupportedVersion,
    /// No decoder recognized the file (§7 `UnsupportedFormat`).
    UnsupportedFormat,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::InvalidHeader => write!(f, "invalid module header"),
            LoadError::UnexpectedEof => write!(f, "unexpected end of file"),
            LoadError::UnsupportedVersion => write!(f, "unsupported format variant"),
            LoadError::UnsupportedFormat => write!(f, "no decoder recognized this file"),
        }
    }
}

impl std::error::Error for LoadError {}
