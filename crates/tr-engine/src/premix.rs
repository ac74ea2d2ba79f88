//! Premix frame (§3 "Premix frame", §4.7): one row's worth of mixed PCM,
//! handed from the scheduler to a sink.

use alloc::vec::Vec;
use arrayvec::ArrayString;

/// Position metadata a sink may display; not consulted by playback.
#[derive(Clone, Debug, Default)]
pub struct FrameMetadata {
    pub order: usize,
    pub row: usize,
    pub row_text: ArrayString<64>,
}

/// One row's worth of interleaved float PCM in `[-1, 1]`, already passed
/// through the pan-law matrix and (optionally) the sinc filter, but not
/// yet quantized.
#[derive(Clone, Debug)]
pub struct PremixFrame {
    /// Interleaved samples, `frames() * channels` long.
    pub samples: Vec<f32>,
    pub channels: u8,
    /// Mixer headroom scalar actually applied (§4.6), exposed for sinks
    /// that want to report clipping margin.
    pub mixer_volume: f32,
    pub metadata: FrameMetadata,
}

impl PremixFrame {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Quantize to interleaved signed little-endian PCM (§4.6
    /// "Quantization"). 8-bit WAV is conventionally unsigned; the other
    /// widths are signed.
    pub fn to_pcm_bytes(&self, bits_per_sample: u8) -> Vec<u8> {
        let bytes_per_sample = (bits_per_sample as usize).div_ceil(8);
        let mut out = Vec::with_capacity(self.samples.len() * bytes_per_sample);
        for &s in &self.samples {
            let clamped = s.clamp(-1.0, 1.0);
            match bits_per_sample {
                8 => {
                    let v = (clamped * 127.0).floor() as i16 + 128;
                    out.push(v.clamp(0, 255) as u8);
                }
                16 => {
                    let v = (clamped * 32767.0).floor() as i16;
                    out.extend_from_slice(&v.to_le_bytes());
                }
                24 => {
                    let v = (clamped * 8_388_607.0).floor() as i32;
                    out.extend_from_slice(&v.to_le_bytes()[..3]);
                }
                32 => {
                    let v = (clamped * 2_147_483_647.0).floor() as i32;
                    out.extend_from_slice(&v.to_le_bytes());
                }
                _ => {}
            }
        }
        out
    }
}
