//! Headless controller (§9 "Headless controller"): the one place the
//! song façade, the MOD loader, and the WAV sink meet. Loads a song and
//! renders it either as a lazy `PremixFrame` iterator or straight to a
//! WAV file.
//!
//! Deliberately has no real-time audio-thread half: the sound-card device
//! backend is out of scope (§1 Non-goals), so there is no `play`/`stop`/
//! `position` transport here, only offline rendering.

mod streaming;
mod wav;

use std::fmt;
use std::io;
use std::path::Path;

use tr_engine::{MixerSettings, PlayError, PremixFrame, Scheduler};
use tr_formats::LoadError;
use tr_ir::Song;

pub use streaming::StreamingRender;
pub use wav::WavWriter;

/// Render-time options (§6 Configuration). Constructed by the caller and
/// passed by value into a render call; no config-file crate is involved,
/// matching the teacher's dependency graph.
#[derive(Clone, Copy, Debug)]
pub struct RenderConfig {
    /// Output sample rate.
    pub samples_per_second: u32,
    /// Output channel count: 1 (mono) or 2 (stereo).
    pub channels: u8,
    /// PCM width used by `render_to_wav`: 8, 16, 24, or 32.
    pub bits_per_sample: u8,
    /// Starting order index; `None` means "use the song's own start".
    pub starting_order: Option<usize>,
    /// Starting row within `starting_order`'s pattern.
    pub starting_row: Option<usize>,
    /// Whether `SBx` pattern-loop effects are honored. Defaults to `false`,
    /// since a file-kind sink needs a render that terminates; set this true
    /// explicitly for a caller that wants the order list to loop forever.
    pub can_loop: bool,
    /// Whether the mixer's 9-tap sinc anti-imaging filter runs.
    pub use_sinc_filter: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            samples_per_second: 44100,
            channels: 2,
            bits_per_sample: 16,
            starting_order: None,
            starting_row: None,
            can_loop: false,
            use_sinc_filter: true,
        }
    }
}

impl RenderConfig {
    fn mixer_settings(&self) -> MixerSettings {
        MixerSettings {
            out_channels: self.channels,
            use_sinc_filter: self.use_sinc_filter,
            extra_channel: false,
        }
    }
}

/// Errors a `Controller` call can surface: a failed decode, a failed
/// render, a failed file write, or rendering before a song is loaded.
#[derive(Debug)]
pub enum ControllerError {
    NoSongLoaded,
    Load(LoadError),
    Play(PlayError),
    Io(io::Error),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::NoSongLoaded => write!(f, "no song loaded"),
            ControllerError::Load(e) => write!(f, "{e}"),
            ControllerError::Play(e) => write!(f, "{e}"),
            ControllerError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<LoadError> for ControllerError {
    fn from(e: LoadError) -> Self {
        ControllerError::Load(e)
    }
}

impl From<PlayError> for ControllerError {
    fn from(e: PlayError) -> Self {
        ControllerError::Play(e)
    }
}

impl From<io::Error> for ControllerError {
    fn from(e: io::Error) -> Self {
        ControllerError::Io(e)
    }
}

/// Headless tracker controller: owns a loaded song and renders it.
#[derive(Default)]
pub struct Controller {
    song: Option<Song>,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently loaded song, if any.
    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    /// Decode a ProTracker MOD file and make it the controller's song.
    pub fn load_mod(&mut self, data: &[u8]) -> Result<(), ControllerError> {
        let song = tr_formats::load_mod(data)?;
        tracing::info!(
            title = %song.title,
            channels = song.num_channels(),
            patterns = song.patterns.len(),
            instruments = song.instruments.len(),
            "loaded module"
        );
        self.song = Some(song);
        Ok(())
    }

    /// Render the loaded song to a lazy sequence of premix frames. Each
    /// call re-applies `config.can_loop` to the loaded song's feature
    /// toggle before scheduling.
    pub fn render(
        &mut self,
        config: RenderConfig,
    ) -> Result<impl Iterator<Item = PremixFrame> + '_, ControllerError> {
        let song = self.song.as_mut().ok_or(ControllerError::NoSongLoaded)?;
        song.features.pattern_loop = config.can_loop;

        let scheduler = Scheduler::new(
            song,
            config.samples_per_second,
            config.mixer_settings(),
            config.starting_order.unwrap_or(0),
            config.starting_row.unwrap_or(0),
        )?;
        Ok(scheduler)
    }

    /// Render the loaded song on a background thread, returning an iterator
    /// that drains premix frames through the bounded producer/consumer FIFO
    /// (§5 "Concurrency & Resource Model" — the only concurrent interface
    /// this crate exposes). Clones the loaded song, since the scheduler
    /// thread needs to own it independently of `self`.
    pub fn render_streaming(
        &self,
        config: RenderConfig,
    ) -> Result<StreamingRender, ControllerError> {
        let mut song = self.song.clone().ok_or(ControllerError::NoSongLoaded)?;
        song.features.pattern_loop = config.can_loop;

        let render = StreamingRender::spawn(
            song,
            config.samples_per_second,
            config.mixer_settings(),
            config.starting_order.unwrap_or(0),
            config.starting_row.unwrap_or(0),
        )?;
        Ok(render)
    }

    /// Render the loaded song straight to a WAV file (§4.10, §8 property 8).
    pub fn render_to_wav<P: AsRef<Path>>(
        &mut self,
        config: RenderConfig,
        path: P,
    ) -> Result<(), ControllerError> {
        let mut writer = WavWriter::create(
            path,
            config.samples_per_second,
            config.channels as u16,
            config.bits_per_sample,
        )?;
        for frame in self.render(config)? {
            writer.write_frame(&frame)?;
        }
        writer.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal 4-channel MOD: one empty pattern, order list of length 1.
    fn one_pattern_mod() -> Vec<u8> {
        let mut buf = vec![0u8; 1084];
        buf[950] = 1; // song length
        buf[952] = 0; // order[0] = pattern 0
        buf[1080..1084].copy_from_slice(b"M.K.");
        buf.resize(1084 + 64 * 4 * 4, 0);
        buf
    }

    #[test]
    fn rendering_without_a_loaded_song_is_an_error() {
        let mut controller = Controller::new();
        let err = controller.render(RenderConfig::default()).unwrap_err();
        assert!(matches!(err, ControllerError::NoSongLoaded));
    }

    #[test]
    fn load_then_render_produces_frames() {
        let mut controller = Controller::new();
        controller.load_mod(&one_pattern_mod()).unwrap();
        let frames: Vec<_> = controller.render(RenderConfig::default()).unwrap().collect();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn render_streaming_matches_direct_render_frame_count() {
        let mut controller = Controller::new();
        controller.load_mod(&one_pattern_mod()).unwrap();
        let direct = controller.render(RenderConfig::default()).unwrap().count();

        let controller = {
            let mut c = Controller::new();
            c.load_mod(&one_pattern_mod()).unwrap();
            c
        };
        let streamed = controller.render_streaming(RenderConfig::default()).unwrap().count();
        assert_eq!(streamed, direct);
    }

    #[test]
    fn render_to_wav_writes_a_backfilled_header() {
        let mut controller = Controller::new();
        controller.load_mod(&one_pattern_mod()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render.wav");
        controller.render_to_wav(RenderConfig::default(), &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        let chunk_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(chunk_size as usize, bytes.len() - 8);
    }
}
