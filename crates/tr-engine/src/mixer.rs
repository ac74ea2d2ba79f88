//! Mixer (§4.6): pan-law matrix, channel accumulation, optional 9-tap
//! sinc anti-imaging filter, and final clamp before quantization.
//!
//! Quantization to PCM bytes itself lives on `PremixFrame::to_pcm_bytes`
//! (§4.6 "Quantization") since the sink picks the bit width, not the
//! mixer.

use alloc::vec::Vec;
use core::f32::consts::FRAC_PI_2;

/// 9-tap symmetric sinc FIR (§4.6 "Anti-imaging").
const SINC_TAPS: [f32; 9] = [
    -0.00546, 0.01588, -0.04222, 0.06992, 0.92376, 0.06992, -0.04222, 0.01588, -0.00546,
];

/// Maximum simultaneously mixed output channels (mono or stereo, §6
/// Configuration).
const MAX_OUT_CHANNELS: usize = 2;

/// Per-output-channel sliding window for the sinc filter.
struct SincFilter {
    history: [[f32; 9]; MAX_OUT_CHANNELS],
}

impl SincFilter {
    fn new() -> Self {
        Self {
            history: [[0.0; 9]; MAX_OUT_CHANNELS],
        }
    }

    fn process(&mut self, out_channel: usize, sample: f32) -> f32 {
        let buf = &mut self.history[out_channel];
        buf.rotate_left(1);
        buf[8] = sample;
        SINC_TAPS.iter().zip(buf.iter()).map(|(c, s)| c * s).sum()
    }
}

/// Mixer configuration: fixed for the lifetime of a render (§6
/// Configuration `channels`, plus the §4.6 `extra_channel` OPL2
/// headroom flag and an opt-out for the sinc filter).
#[derive(Clone, Copy, Debug)]
pub struct MixerSettings {
    /// Output channel count: 1 (mono) or 2 (stereo).
    pub out_channels: u8,
    pub use_sinc_filter: bool,
    /// Reserve one virtual channel of headroom for a hypothetical OPL2
    /// sub-mixer (§9 Open Questions: no OPL2 synthesis is implemented,
    /// only the headroom arithmetic it implies).
    pub extra_channel: bool,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            out_channels: 2,
            use_sinc_filter: true,
            extra_channel: false,
        }
    }
}

pub struct Mixer {
    settings: MixerSettings,
    filter: SincFilter,
}

impl Mixer {
    pub fn new(settings: MixerSettings) -> Self {
        Self {
            settings,
            filter: SincFilter::new(),
        }
    }

    /// Equal-power sine/cosine pan law for stereo output; a straight
    /// center (no-op) matrix for mono (§4.6).
    pub fn pan_matrix(&self, pan: i8) -> (f32, f32) {
        if self.settings.out_channels < 2 {
            return (1.0, 1.0);
        }
        let p = (pan.clamp(-64, 64) as f32 + 64.0) / 128.0;
        let theta = p * FRAC_PI_2;
        (libm::cosf(theta), libm::sinf(theta))
    }

    /// Headroom scalar for `n_channels` simultaneous voices (§4.6
    /// "Mixer headroom").
    pub fn headroom(&self, n_channels: usize) -> f32 {
        let mv = 1.0 / (n_channels.max(1) as f32);
        if self.settings.extra_channel {
            mv / (mv + 1.0)
        } else {
            mv
        }
    }

    /// Mix one row's per-channel mono PCM (each `tickSamples`-long, all
    /// channels the same length) into one interleaved output buffer.
    pub fn mix_row(&mut self, per_channel: &[Vec<f32>], pans: &[i8]) -> Vec<f32> {
        let n_frames = per_channel.first().map(|c| c.len()).unwrap_or(0);
        let out_channels = self.settings.out_channels as usize;
        let headroom = self.headroom(per_channel.len());
        let mut out = Vec::with_capacity(n_frames * out_channels);

        for i in 0..n_frames {
            let mut acc = [0f32; MAX_OUT_CHANNELS];
            for (channel, pan) in per_channel.iter().zip(pans.iter()) {
                let value = channel[i];
                let (left, right) = self.pan_matrix(*pan);
                acc[0] += value * left;
                if out_channels > 1 {
                    acc[1] += value * right;
                }
            }
            for (c, slot) in acc.iter().enumerate().take(out_channels) {
                let mixed = slot * headroom;
                let filtered = if self.settings.use_sinc_filter {
                    self.filter.process(c, mixed)
                } else {
                    mixed
                };
                out.push(filtered.clamp(-1.0, 1.0));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pan_law_is_equal_power_at_center() {
        let mixer = Mixer::new(MixerSettings::default());
        let (l, r) = mixer.pan_matrix(0);
        assert!((l * l + r * r - 1.0).abs() < 1e-5);
        assert!((l - r).abs() < 1e-5);
    }

    #[test]
    fn pan_law_is_all_left_at_hard_left() {
        let mixer = Mixer::new(MixerSettings::default());
        let (l, r) = mixer.pan_matrix(-64);
        assert!((l - 1.0).abs() < 1e-5);
        assert!(r.abs() < 1e-5);
    }

    #[test]
    fn mono_output_pan_is_a_no_op() {
        let settings = MixerSettings {
            out_channels: 1,
            ..Default::default()
        };
        let mixer = Mixer::new(settings);
        assert_eq!(mixer.pan_matrix(64), (1.0, 1.0));
        assert_eq!(mixer.pan_matrix(-64), (1.0, 1.0));
    }

    #[test]
    fn headroom_is_one_over_n_channels() {
        let mixer = Mixer::new(MixerSettings::default());
        assert!((mixer.headroom(4) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn headroom_reserves_extra_channel_for_opl2() {
        let settings = MixerSettings {
            extra_channel: true,
            ..Default::default()
        };
        let mixer = Mixer::new(settings);
        // mv = 1/4, extra slot -> mv/(mv+1) = 0.25/1.25 = 0.2
        assert!((mixer.headroom(4) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn mix_row_sums_channels_at_center_pan() {
        let mut mixer = Mixer::new(MixerSettings {
            use_sinc_filter: false,
            ..Default::default()
        });
        let ch0 = alloc::vec![1.0, 1.0];
        let ch1 = alloc::vec![1.0, 1.0];
        let out = mixer.mix_row(&[ch0, ch1], &[0, 0]);
        // 2 channels, headroom = 0.5, each at center contributes
        // value * cos(pi/4) ~= 0.707, so mixed = 2 * 0.707 * 0.5 = 0.707
        assert_eq!(out.len(), 4); // 2 frames * 2 output channels
        assert!((out[0] - 0.70710678).abs() < 1e-4);
    }

    #[test]
    fn mix_row_with_no_channels_is_silence() {
        let mut mixer = Mixer::new(MixerSettings::default());
        let out = mixer.mix_row(&[], &[]);
        assert!(out.is_empty());
    }
}
