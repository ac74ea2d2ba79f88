//! Playback engine for the tracker.
//!
//! Resolves a song's order list and patterns into a row/tick stream,
//! runs the effect library against per-channel state, and mixes the
//! result into premix frames a sink can quantize and write out.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod channel;
mod effect;
mod error;
mod facade;
mod mixer;
mod oscillator;
mod period;
mod premix;
mod scheduler;
mod voice;
mod voice_pool;

pub use channel::{ChannelState, EffectMemory, PendingRow};
pub use effect::{disabled_features_from_song, waveform_from_nibble, EffectContext};
pub use error::PlayError;
pub use facade::{DisabledFeatures, PatternLoop, PendingJump, SongFacade};
pub use mixer::{Mixer, MixerSettings};
pub use oscillator::{Oscillator, Waveform};
pub use period::Period;
pub use premix::{FrameMetadata, PremixFrame};
pub use scheduler::Scheduler;
pub use voice::{Voice, VoiceState};
pub use voice_pool::{VoiceKey, VoicePool, MAX_VOICES};
