//! Voice: audio generation unit for one active note on one channel (§4.3).

use tr_ir::{LoopType, Sample};

/// Voice lifecycle state, consulted by the voice pool's steal priority
/// (Fading > Released > Background > Active, §9 Design Notes).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceState {
    #[default]
    Active,
    /// Note-off received; envelope releasing.
    Released,
    /// Fading out (NNA Fade).
    Fading,
    /// Background voice (NNA Continue/Off): still sounding, no longer
    /// the channel's primary voice.
    Background,
}

/// A single voice reading PCM from one instrument's sample.
#[derive(Clone, Debug)]
pub struct Voice {
    /// Index into the owning `Song::instruments`.
    pub instrument_index: usize,
    /// Fractional sample position, 16.16 fixed point.
    pub pos: u32,
    /// Sampler increment, 16.16 fixed point (`Period::get_sampler_add`
    /// scaled by 65536, see `scheduler`).
    pub increment: u32,
    pub playing: bool,
    /// Whether the key is currently held (governs sustain-loop use).
    pub key_on: bool,
    /// No PCM should be produced; set when the voice runs off the end
    /// of a non-looping sample (§4.3 "No loop").
    pub frozen: bool,
    pub volume: u8,
    pub panning: i8,
    pub state: VoiceState,
    pub owning_channel: u8,
    /// Ping-pong loop direction; true = moving forward.
    pub loop_forward: bool,
    /// Fade volume, 0-1024, driven down for NNA Fade voices.
    pub fade_volume: u16,
}

impl Voice {
    pub fn new(instrument_index: usize, channel: u8, volume: u8, panning: i8) -> Self {
        Self {
            instrument_index,
            pos: 0,
            increment: 0,
            playing: true,
            key_on: true,
            frozen: false,
            volume,
            panning,
            state: VoiceState::Active,
            owning_channel: channel,
            loop_forward: true,
            fade_volume: 1024,
        }
    }

    /// Render one mono sample frame from `sample`, scaled by this voice's
    /// volume and fade envelope (panning is applied later, by the mixer,
    /// since background NNA voices pan independently of their channel).
    /// Advances position and applies loop/end-of-sample policy. Returns
    /// `None` when the voice produced no audio this call.
    pub fn render_one(&mut self, sample: &Sample) -> Option<f32> {
        if !self.playing || self.frozen {
            return None;
        }

        let raw = interpolated_mono(sample, self.pos);
        let scaled = raw * (self.volume as f32 / 64.0) * (self.fade_volume as f32 / 1024.0);
        self.advance(sample);
        Some(scaled)
    }

    fn advance(&mut self, sample: &Sample) {
        if self.loop_forward {
            self.pos = self.pos.wrapping_add(self.increment);
        } else {
            self.pos = self.pos.saturating_sub(self.increment);
        }
        self.apply_loop_policy(sample);
    }

    fn apply_loop_policy(&mut self, sample: &Sample) {
        let len = sample.len() as u32;

        if self.key_on {
            if let Some((start, end)) = sample.sustain_loop {
                self.wrap_forward_loop(start, end);
                return;
            }
        }

        match sample.loop_type {
            LoopType::None => {
                let pos_samples = self.pos >> 16;
                if len == 0 || pos_samples >= len {
                    self.playing = false;
                    self.frozen = true;
                }
            }
            LoopType::Forward => {
                self.wrap_forward_loop(sample.loop_start, sample.loop_end);
            }
            LoopType::PingPong => {
                self.wrap_ping_pong_loop(sample.loop_start, sample.loop_end);
            }
        }
    }

    fn wrap_forward_loop(&mut self, loop_start: u32, loop_end: u32) {
        if loop_end <= loop_start {
            return;
        }
        let pos_samples = self.pos >> 16;
        if pos_samples >= loop_end {
            let loop_len = loop_end - loop_start;
            let over = pos_samples - loop_end;
            let new_pos_samples = loop_start + (over % loop_len);
            self.pos = (new_pos_samples << 16) | (self.pos & 0xFFFF);
        }
    }

    fn wrap_ping_pong_loop(&mut self, loop_start: u32, loop_end: u32) {
        if loop_end <= loop_start {
            return;
        }
        let pos_samples = self.pos >> 16;
        if self.loop_forward && pos_samples >= loop_end {
            self.loop_forward = false;
            let over = pos_samples - loop_end;
            let reflected = loop_end.saturating_sub(over).max(loop_start);
            self.pos = (reflected << 16) | (self.pos & 0xFFFF);
        } else if !self.loop_forward && pos_samples <= loop_start {
            self.loop_forward = true;
            let under = loop_start.saturating_sub(pos_samples);
            let reflected = (loop_start + under).min(loop_end);
            self.pos = (reflected << 16) | (self.pos & 0xFFFF);
        }
    }
}

/// Linear interpolation between the two PCM samples bracketing a
/// 16.16 fixed-point position (§4.9 ambient interpolation note).
fn interpolated_mono(sample: &Sample, pos: u32) -> f32 {
    let index = (pos >> 16) as usize;
    let frac = (pos & 0xFFFF) as f32 / 65536.0;
    let a = sample.data.get_mono(index) as f32 / 32768.0;
    let b = sample.data.get_mono(index + 1) as f32 / 32768.0;
    a + (b - a) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use tr_ir::SampleData;

    fn test_sample(data: Vec<i8>) -> Sample {
        let mut s = Sample::new("test");
        s.data = SampleData::Mono8(data);
        s.c2spd = 8363;
        s
    }

    fn looping_sample(data: Vec<i8>, start: u32, end: u32) -> Sample {
        let mut s = test_sample(data);
        s.loop_start = start;
        s.loop_end = end;
        s.loop_type = LoopType::Forward;
        s
    }

    #[test]
    fn render_advances_position() {
        let sample = test_sample(vec![64; 100]);
        let mut voice = Voice::new(0, 0, 64, 0);
        voice.increment = 1 << 16;
        let before = voice.pos;
        voice.render_one(&sample);
        assert_eq!(voice.pos, before + (1 << 16));
    }

    #[test]
    fn stops_and_freezes_at_sample_end_without_loop() {
        let sample = test_sample(vec![64; 2]);
        let mut voice = Voice::new(0, 0, 64, 0);
        voice.increment = 1 << 16;
        for _ in 0..10 {
            voice.render_one(&sample);
        }
        assert!(!voice.playing);
        assert!(voice.frozen);
    }

    #[test]
    fn forward_loop_wraps_within_bounds() {
        let sample = looping_sample(vec![10, 20, 30, 40], 1, 3);
        let mut voice = Voice::new(0, 0, 64, 0);
        voice.increment = 1 << 16;
        for _ in 0..20 {
            voice.render_one(&sample);
        }
        assert!(voice.playing);
        let pos_samples = voice.pos >> 16;
        assert!(pos_samples >= 1 && pos_samples < 3);
    }

    #[test]
    fn ping_pong_loop_reverses_direction() {
        let mut sample = looping_sample(vec![10, 20, 30, 40, 50], 0, 4);
        sample.loop_type = LoopType::PingPong;
        let mut voice = Voice::new(0, 0, 64, 0);
        voice.increment = 1 << 16;
        for _ in 0..10 {
            voice.render_one(&sample);
        }
        assert!(voice.playing);
        // Should have flipped direction at least once by now.
        assert!(!voice.loop_forward || voice.pos >> 16 <= 4);
    }

    #[test]
    fn sustain_loop_used_while_key_on() {
        let mut sample = test_sample(vec![10, 20, 30, 40, 50, 60]);
        sample.sustain_loop = Some((1, 3));
        sample.loop_type = LoopType::None;
        let mut voice = Voice::new(0, 0, 64, 0);
        voice.increment = 1 << 16;
        voice.key_on = true;
        for _ in 0..20 {
            voice.render_one(&sample);
        }
        assert!(voice.playing);
        let pos_samples = voice.pos >> 16;
        assert!(pos_samples >= 1 && pos_samples < 3);
    }

    #[test]
    fn no_loop_after_release_even_with_sustain() {
        let mut sample = test_sample(vec![10, 20, 30, 40]);
        sample.sustain_loop = Some((0, 2));
        sample.loop_type = LoopType::None;
        let mut voice = Voice::new(0, 0, 64, 0);
        voice.increment = 1 << 16;
        voice.key_on = false;
        for _ in 0..10 {
            voice.render_one(&sample);
        }
        assert!(!voice.playing);
    }
}
