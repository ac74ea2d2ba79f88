//! Core IR types for the tracker playback engine.
//!
//! This crate defines the intermediate representation used throughout
//! the tracker: decoders emit it, the playback engine consumes it. It is
//! pure data — no playback behavior lives here, only the shapes `Song`,
//! `Pattern`, `Instrument`, and `Sample` take.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod effects;
mod instrument;
mod pattern;
pub mod song;
mod sample;

pub use effects::{EffectCmd, VolumeCommand};
pub use instrument::{DuplicateCheck, Envelope, EnvelopePoint, Instrument, NewNoteAction};
pub use pattern::{Cell, Note, Pattern};
pub use sample::{AutoVibrato, LoopType, Sample, SampleData};
pub use song::{ChannelSettings, Features, OrderEntry, PeriodMode, Song};
