//! VoicePool: a generational-index arena of voices (§9 Design Notes
//! "Channel state <-> voice").
//!
//! Slotmap keys stay valid across steal/reuse cycles without dangling:
//! a stale `VoiceKey` from a retriggered channel simply misses instead
//! of aliasing a newer voice in the same slot.

use alloc::vec::Vec;

use slotmap::{new_key_type, SlotMap};
use tr_ir::Instrument;

use crate::voice::{Voice, VoiceState};

new_key_type! {
    /// Generational handle to a voice slot.
    pub struct VoiceKey;
}

/// Maximum number of simultaneous voices before stealing kicks in.
pub const MAX_VOICES: usize = 128;

/// Owns all live voices. Does not own sample data; callers pass the
/// instrument bank (`&[Instrument]`) to the render methods.
pub struct VoicePool {
    voices: SlotMap<VoiceKey, Voice>,
}

impl VoicePool {
    pub fn new() -> Self {
        Self {
            voices: SlotMap::with_key(),
        }
    }

    /// Insert a new voice, stealing the lowest-priority existing voice
    /// first if the pool is at capacity (Fading > Released > Background
    /// > Active).
    pub fn allocate(&mut self, voice: Voice) -> VoiceKey {
        if self.voices.len() >= MAX_VOICES {
            if let Some(victim) = self.find_steal_candidate() {
                self.voices.remove(victim);
            }
        }
        self.voices.insert(voice)
    }

    fn find_steal_candidate(&self) -> Option<VoiceKey> {
        let priority = |state: VoiceState| match state {
            VoiceState::Fading => 0,
            VoiceState::Released => 1,
            VoiceState::Background => 2,
            VoiceState::Active => 3,
        };
        self.voices
            .iter()
            .min_by_key(|(_, v)| priority(v.state))
            .map(|(k, _)| k)
    }

    pub fn get(&self, key: VoiceKey) -> Option<&Voice> {
        self.voices.get(key)
    }

    pub fn get_mut(&mut self, key: VoiceKey) -> Option<&mut Voice> {
        self.voices.get_mut(key)
    }

    pub fn kill(&mut self, key: VoiceKey) {
        self.voices.remove(key);
    }

    pub fn release(&mut self, key: VoiceKey) {
        if let Some(v) = self.voices.get_mut(key) {
            v.state = VoiceState::Released;
            v.key_on = false;
        }
    }

    pub fn fade(&mut self, key: VoiceKey) {
        if let Some(v) = self.voices.get_mut(key) {
            v.state = VoiceState::Fading;
        }
    }

    pub fn background(&mut self, key: VoiceKey) {
        if let Some(v) = self.voices.get_mut(key) {
            v.state = VoiceState::Background;
        }
    }

    /// Drop voices that have stopped producing audio.
    pub fn reap_finished(&mut self) {
        self.voices.retain(|_, v| v.playing);
    }

    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Drive the fadeout envelope for every `Released`/`Fading` voice:
    /// subtract the owning instrument's `fadeout` rate from `fade_volume`
    /// each tick, silencing the voice once it bottoms out. Voices still
    /// `Active`/`Background` are untouched (§3 "Voices instantiated per
    /// note-on; released voices may linger through envelope release").
    pub fn tick_fadeout(&mut self, instruments: &[Instrument]) {
        for (_, voice) in self.voices.iter_mut() {
            if !matches!(voice.state, VoiceState::Released | VoiceState::Fading) {
                continue;
            }
            let fadeout = instruments.get(voice.instrument_index).map(|i| i.fadeout).unwrap_or(0);
            if fadeout == 0 {
                continue;
            }
            voice.fade_volume = voice.fade_volume.saturating_sub(fadeout);
            if voice.fade_volume == 0 {
                voice.playing = false;
            }
        }
    }

    /// Render `n_samples` of mono PCM for every live voice not in
    /// `exclude`, paired with that voice's current pan. Each
    /// `Vec<f32>, i8` pair feeds directly into `Mixer::mix_row` as one of
    /// its sources: a voice, not a tracker channel, is the unit the
    /// mixer pans, so background NNA voices keep panning independently
    /// of the channel that spawned them. Voices whose instrument has
    /// vanished are killed instead of rendered.
    pub fn render_voices(
        &mut self,
        exclude: &[VoiceKey],
        instruments: &[Instrument],
        n_samples: usize,
    ) -> (Vec<Vec<f32>>, Vec<i8>) {
        let mut buffers = Vec::with_capacity(self.voices.len());
        let mut pans = Vec::with_capacity(self.voices.len());
        for (key, voice) in self.voices.iter_mut() {
            if exclude.contains(&key) {
                continue;
            }
            let Some(instrument) = instruments.get(voice.instrument_index) else {
                voice.playing = false;
                continue;
            };
            let mut buf = Vec::with_capacity(n_samples);
            for _ in 0..n_samples {
                buf.push(voice.render_one(&instrument.sample).unwrap_or(0.0));
            }
            buffers.push(buf);
            pans.push(voice.panning);
        }
        (buffers, pans)
    }
}

impl Default for VoicePool {
    fn default() -> Self {
        Self::new()
    }
}
