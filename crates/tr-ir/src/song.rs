//! Song structure and sequencing types.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::instrument::Instrument;
use crate::pattern::Pattern;

/// Which period arithmetic regime a song uses (see §4.2 of the design).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeriodMode {
    /// Amiga/ProTracker clock-rate periods: `period = baseClockRate / frequency`.
    Amiga,
    /// S3M-style linear-frequency periods: a scaled Hz value directly.
    Linear,
}

/// Feature toggles a sink/decoder may disable to guarantee termination or
/// match format quirks (§4.8 `DisableFeatures`).
#[derive(Clone, Copy, Debug)]
pub struct Features {
    /// Whether `SBx` pattern-loop effects are honored. Some sinks disable
    /// this to guarantee the premix pipeline terminates.
    pub pattern_loop: bool,
    /// MOD-vs-S3M vibrato/tremolo depth multiplier quirk: MOD trackers
    /// multiply the oscillator output by 4, S3M-style by 1.
    pub vibrato_multiplier_4x: bool,
    /// Whether volume-slide-style effects also apply on tick 0 (MOD) or
    /// only on tick>0 (S3M).
    pub vol_slide_every_frame: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            pattern_loop: true,
            vibrato_multiplier_4x: true,
            vol_slide_every_frame: true,
        }
    }
}

/// An entry in the song's order list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderEntry {
    /// Play pattern with this index.
    Pattern(u8),
    /// Skip marker (`+++`): advance to the next order entry without playing
    /// anything.
    NextPattern,
    /// End-of-song / invalid marker (`---`): treated as a song break —
    /// the scheduler advances order as if a pattern had just ended.
    InvalidPattern,
}

/// Per-channel settings fixed at song load.
#[derive(Clone, Copy, Debug)]
pub struct ChannelSettings {
    /// Initial panning (-64 to +64, 0 = center).
    pub initial_pan: i8,
    /// Initial volume (0-64).
    pub initial_vol: u8,
    /// Is the channel enabled (present in the channel-enable bitmap)?
    pub enabled: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            initial_pan: 0,
            initial_vol: 64,
            enabled: true,
        }
    }
}

/// An immutable song loaded from a module: the order list, pattern bank,
/// instrument bank, and per-channel/global playback defaults.
#[derive(Clone, Debug)]
pub struct Song {
    /// Song title.
    pub title: ArrayString<32>,
    /// Initial tempo in BPM (32-255 typical).
    pub initial_tempo: u16,
    /// Initial speed (ticks per row, 1-31).
    pub initial_speed: u8,
    /// Global volume (0-64).
    pub global_volume: u8,
    /// The order in which patterns are played.
    pub order_list: Vec<OrderEntry>,
    /// The pattern bank, indexed by `OrderEntry::Pattern`.
    pub patterns: Vec<Pattern>,
    /// The instrument bank.
    pub instruments: Vec<Instrument>,
    /// Per-channel settings; `channels.len()` is the channel count.
    pub channels: Vec<ChannelSettings>,
    /// Amiga PAL/NTSC base clock rate (only meaningful under
    /// `PeriodMode::Amiga`); classic ProTracker uses 7159090.5 Hz (PAL),
    /// represented here as an integer Hz value times 2 to avoid a
    /// fractional field (`clock_rate_x2`).
    pub base_clock_rate: u32,
    /// Which period regime this song's periods use.
    pub period_mode: PeriodMode,
    /// Feature toggles.
    pub features: Features,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            title: ArrayString::new(),
            initial_tempo: 125,
            initial_speed: 6,
            global_volume: 64,
            order_list: Vec::new(),
            patterns: Vec::new(),
            instruments: Vec::new(),
            channels: Vec::new(),
            base_clock_rate: 7_159_090,
            period_mode: PeriodMode::Amiga,
            features: Features::default(),
        }
    }
}

impl Song {
    /// Create a new empty song.
    pub fn new(title: &str) -> Self {
        let mut song = Self::default();
        let _ = song.title.try_push_str(title);
        song
    }

    /// Create a song with a given number of channels, classic Amiga L-R-R-L
    /// panning defaults (ignored by S3M-style formats, which set their own).
    pub fn with_channels(title: &str, num_channels: u8) -> Self {
        let mut song = Self::new(title);
        for i in 0..num_channels {
            song.channels.push(ChannelSettings {
                initial_pan: if i % 4 == 0 || i % 4 == 3 { -64 } else { 64 },
                initial_vol: 64,
                enabled: true,
            });
        }
        song
    }

    /// Number of channels in this song.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;

    #[test]
    fn with_channels_sets_amiga_pan_pattern() {
        let song = Song::with_channels("test", 4);
        assert_eq!(song.channels[0].initial_pan, -64);
        assert_eq!(song.channels[1].initial_pan, 64);
        assert_eq!(song.channels[2].initial_pan, 64);
        assert_eq!(song.channels[3].initial_pan, -64);
    }

    #[test]
    fn default_song_has_mod_defaults() {
        let song = Song::new("empty");
        assert_eq!(song.initial_tempo, 125);
        assert_eq!(song.initial_speed, 6);
        assert_eq!(song.period_mode, PeriodMode::Amiga);
    }

    #[test]
    fn order_list_sentinels_are_distinct() {
        let a = OrderEntry::Pattern(3);
        let b = OrderEntry::NextPattern;
        let c = OrderEntry::InvalidPattern;
        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn num_channels_matches_channel_vec() {
        let mut song = Song::with_channels("test", 2);
        song.patterns.push(Pattern::new(4, 2));
        assert_eq!(song.num_channels(), 2);
    }
}
