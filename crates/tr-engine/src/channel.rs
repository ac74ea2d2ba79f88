//! Channel state (§3 "Channel state", §4.9 Design Notes).
//!
//! One `ChannelState` exists per song channel, created at load and
//! mutated by the scheduler, the effect library, and the voice renderer
//! for the song's entire lifetime.

use crate::oscillator::Oscillator;
use crate::period::Period;

/// Sticky effect-parameter memory (§3 "Effect memory", §4.4, invariant 6).
///
/// Each field is the last non-zero parameter byte seen for that effect
/// key on this channel. `GetEffectSharedMemory` is how effects read
/// through the sticky rule instead of touching the raw cell byte.
#[derive(Clone, Copy, Debug, Default)]
pub struct EffectMemory {
    pub volume_slide: u8,
    pub porta_down: u8,
    pub porta_up: u8,
    pub porta_to_note: u8,
    pub vibrato: u8,
    pub tremolo: u8,
    pub panbrello: u8,
    pub tremor: u8,
    pub retrigger: u8,
    pub sample_offset: u8,
    pub global_vol_slide: u8,
    pub tempo_slide: u8,
    pub arpeggio: u8,
}

impl EffectMemory {
    /// Sticky lookup for a single memory slot: `0x00` means "reuse the
    /// last non-zero value"; any other byte updates and is returned.
    pub fn sticky(slot: &mut u8, param: u8) -> u8 {
        if param != 0 {
            *slot = param;
        }
        *slot
    }
}

/// Per-row pending targets, snapshotted at row-ingest and committed to
/// the live playback fields at `currentTick == notePlayTick` (§3
/// invariant 4).
#[derive(Clone, Copy, Debug, Default)]
pub struct PendingRow {
    pub target_period: Option<Period>,
    pub target_instrument: Option<usize>,
    pub target_volume: Option<u8>,
    pub porta_target_period: Option<Period>,
    /// Sample-offset target (`9xx`), in frames; applied instead of 0
    /// when the note commits.
    pub target_pos: Option<u32>,
    /// Tick at which the note is (re)armed; default 0.
    pub note_play_tick: u8,
    pub do_retrigger_note: bool,
    /// Tick at which the voice should be cut (`SCx`), if any.
    pub note_cut_tick: Option<u8>,
}

/// Display-only snapshot of the last row ingested, for consumers that
/// want to show what's currently playing (not used by playback logic).
#[derive(Clone, Copy, Debug, Default)]
pub struct DisplaySnapshot {
    pub note: u8,
    pub instrument: u8,
    pub volume: u8,
}

/// The full mutable state of one tracker channel.
#[derive(Clone, Debug)]
pub struct ChannelState {
    pub index: u8,

    // Live playback fields (§3 "Playback").
    pub period: Option<Period>,
    /// Fractional sample position, 16.16 fixed point.
    pub pos: u32,
    pub instrument: Option<usize>,
    pub prev_note_semitone: u8,
    pub key_on: bool,
    pub frozen: bool,

    // Pending-row fields, reset every row-ingest.
    pub pending: PendingRow,

    // Effect memory, persists across rows.
    pub memory: EffectMemory,

    // Oscillators.
    pub vibrato_osc: Oscillator,
    pub tremolo_osc: Oscillator,
    pub panbrello_osc: Oscillator,

    // Counters reset every row.
    pub retrigger_count: u8,
    pub tremor_time: u8,
    pub tremor_on: bool,
    /// Set by the retrigger effect (`Qxx`) on a tick where it actually
    /// reset `pos`; the scheduler consults and clears this every tick to
    /// know whether to write `pos` through into the live voice, since
    /// `pos` otherwise only moves at commit time.
    pub retrigger_fired: bool,
    /// Period offset applied at render time (vibrato/arpeggio), not
    /// committed back into `period`.
    pub vibrato_delta: i32,

    // Current volume/pan, set by volume column and Vxx/D effects.
    pub volume: u8,
    pub panning: i8,

    /// Glissando control (`S1x`): when set, tone-porta snaps to the
    /// nearest semitone instead of sliding continuously.
    pub glissando: bool,
    /// Finetune override (`S2x`/instrument finetune), applied on top of
    /// the sample's own `c2spd` when computing a note's period.
    pub finetune_override: Option<i8>,

    pub display: DisplaySnapshot,

    /// Active voice slot for this channel, if any (see `voice_pool`).
    pub active_voice: Option<crate::voice_pool::VoiceKey>,

    /// Ticks elapsed since the active voice's note-on; the cursor into
    /// its instrument's volume/panning/pitch envelopes (§3 "Channel
    /// state", `envelope cursor`). Reset at `commit_pending`.
    pub envelope_tick: u16,
}

impl ChannelState {
    pub fn new(index: u8, initial_pan: i8, initial_volume: u8) -> Self {
        let seed = index as u32 * 2654435761 + 1;
        Self {
            index,
            period: None,
            pos: 0,
            instrument: None,
            prev_note_semitone: 0,
            key_on: false,
            frozen: false,
            pending: PendingRow::default(),
            memory: EffectMemory::default(),
            vibrato_osc: Oscillator::new(seed),
            tremolo_osc: Oscillator::new(seed ^ 0x9E3779B9),
            panbrello_osc: Oscillator::new(seed ^ 0x85EBCA6B),
            retrigger_count: 0,
            tremor_time: 0,
            tremor_on: true,
            retrigger_fired: false,
            vibrato_delta: 0,
            volume: initial_volume,
            panning: initial_pan,
            glissando: false,
            finetune_override: None,
            display: DisplaySnapshot::default(),
            active_voice: None,
            envelope_tick: 0,
        }
    }

    /// Reset per-row counters and pending-row fields (§4.5 step 3).
    pub fn begin_row(&mut self) {
        self.pending = PendingRow::default();
        self.retrigger_count = 0;
        self.tremor_time = 0;
        self.vibrato_delta = 0;
    }

    /// Commit the pending-row target fields into the live playback
    /// fields; called at `currentTick == notePlayTick` (§3 invariant 4).
    pub fn commit_pending(&mut self) {
        if let Some(period) = self.pending.target_period {
            self.period = Some(period);
        }
        if let Some(instrument) = self.pending.target_instrument {
            self.instrument = Some(instrument);
        }
        if let Some(volume) = self.pending.target_volume {
            self.volume = volume;
        }
        self.pos = self.pending.target_pos.unwrap_or(0);
        self.key_on = true;
        self.frozen = false;
        self.envelope_tick = 0;
    }

    /// Advance the envelope cursor by one tick; called once per tick for
    /// every channel with a live voice.
    pub fn advance_envelope_tick(&mut self) {
        self.envelope_tick = self.envelope_tick.saturating_add(1);
    }

    /// The period actually used for rendering this tick: live period
    /// plus any vibrato/arpeggio offset (§4.5 step 5).
    pub fn effective_period(&self) -> Option<Period> {
        self.period.map(|p| p.add_integer(self.vibrato_delta))
    }

    pub fn note_off(&mut self) {
        self.key_on = false;
    }

    pub fn is_silent(&self) -> bool {
        // Invariant 3: period==0 (no live period) iff no PCM contribution.
        self.period.is_none() || self.frozen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticky_memory_reuses_last_nonzero() {
        let mut slot = 0u8;
        assert_eq!(EffectMemory::sticky(&mut slot, 0x37), 0x37);
        assert_eq!(EffectMemory::sticky(&mut slot, 0x00), 0x37);
        assert_eq!(EffectMemory::sticky(&mut slot, 0x12), 0x12);
        assert_eq!(EffectMemory::sticky(&mut slot, 0x00), 0x12);
    }

    #[test]
    fn begin_row_resets_counters_not_memory() {
        let mut ch = ChannelState::new(0, 0, 64);
        ch.memory.vibrato = 0x45;
        ch.retrigger_count = 3;
        ch.vibrato_delta = 10;
        ch.begin_row();
        assert_eq!(ch.retrigger_count, 0);
        assert_eq!(ch.vibrato_delta, 0);
        assert_eq!(ch.memory.vibrato, 0x45);
    }

    #[test]
    fn commit_pending_applies_targets_and_resets_position() {
        use tr_ir::song::PeriodMode;
        let mut ch = ChannelState::new(0, 0, 64);
        ch.pos = 12345;
        ch.pending.target_period = Some(Period::from_raw(PeriodMode::Amiga, 428, 8363));
        ch.pending.target_instrument = Some(2);
        ch.pending.target_volume = Some(40);
        ch.commit_pending();
        assert_eq!(ch.period.unwrap().value(), 428);
        assert_eq!(ch.instrument, Some(2));
        assert_eq!(ch.volume, 40);
        assert_eq!(ch.pos, 0);
        assert!(ch.key_on);
    }

    #[test]
    fn is_silent_when_no_period() {
        let ch = ChannelState::new(0, 0, 64);
        assert!(ch.is_silent());
    }

    #[test]
    fn envelope_tick_advances_and_resets_on_commit() {
        let mut ch = ChannelState::new(0, 0, 64);
        ch.advance_envelope_tick();
        ch.advance_envelope_tick();
        assert_eq!(ch.envelope_tick, 2);
        ch.commit_pending();
        assert_eq!(ch.envelope_tick, 0);
    }

    #[test]
    fn effective_period_applies_vibrato_delta() {
        use tr_ir::song::PeriodMode;
        let mut ch = ChannelState::new(0, 0, 64);
        ch.period = Some(Period::from_raw(PeriodMode::Amiga, 428, 8363));
        ch.vibrato_delta = -20;
        assert_eq!(ch.effective_period().unwrap().value(), 408);
    }
}
