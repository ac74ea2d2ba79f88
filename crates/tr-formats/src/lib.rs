//! Module decoders: turn on-disk bytes into a `tr_ir::Song`.
//!
//! `mod_format` is the one decoder this repository carries end to end;
//! `wav_format` additionally lets a WAV file be imported as instrument
//! sample data. Writing WAV output is handled downstream, in the sink.

mod effect_parser;
mod error;
mod mod_format;
mod wav_format;

pub use error::LoadError;
pub use mod_format::load_mod;
pub use wav_format::load_wav;
