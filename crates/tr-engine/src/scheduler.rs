//! Row/tick scheduler (§4.5): the engine's main render loop. Ties
//! together `ChannelState`, the effect library, `SongFacade`, `VoicePool`
//! and `Mixer` into a lazy sequence of `PremixFrame`s, one per row
//! (§4.7 "Premix pipeline").
//!
//! `Scheduler` implements `Iterator`; a sink drives it by calling `next()`
//! (or `for frame in scheduler`) until it returns `None`, at which point
//! playback has ended — either the song ran its course, or, with
//! pattern-loop disabled, the order list wrapped back to its start.

use alloc::vec;
use alloc::vec::Vec;
use arrayvec::ArrayString;

use tr_ir::song::OrderEntry;
use tr_ir::{Cell, NewNoteAction, Note, Song, VolumeCommand};

use crate::channel::ChannelState;
use crate::effect::{self, disabled_features_from_song, EffectContext};
use crate::error::PlayError;
use crate::facade::SongFacade;
use crate::mixer::{Mixer, MixerSettings};
use crate::period::Period;
use crate::premix::{FrameMetadata, PremixFrame};
use crate::voice::Voice;
use crate::voice_pool::VoicePool;

/// A generous bound on total rows a single render may process before
/// giving up on forward progress (§7 `InfiniteLoopDetected`). Sized for
/// a song that loops its full order list a few dozen times over, which
/// covers every legitimate pattern-loop/position-jump combination while
/// still catching a genuine order-list cycle.
fn row_budget(song: &Song) -> u64 {
    let rows_per_pattern: u64 = song.patterns.iter().map(|p| p.rows as u64).sum();
    rows_per_pattern.max(64) * 64 + 4096
}

/// Drives one song from a starting order/row to completion, producing one
/// `PremixFrame` per row.
pub struct Scheduler<'a> {
    song: &'a Song,
    sample_rate: u32,
    channels: Vec<ChannelState>,
    voices: VoicePool,
    facade: SongFacade,
    mixer: Mixer,
    out_channels: u8,
    order_idx: usize,
    row: usize,
    wrapped_once: bool,
    stopped: bool,
    rows_rendered: u64,
    row_budget: u64,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        song: &'a Song,
        sample_rate: u32,
        mixer_settings: MixerSettings,
        starting_order: usize,
        starting_row: usize,
    ) -> Result<Self, PlayError> {
        if song.num_channels() == 0 {
            return Err(PlayError::InvalidSong("song has no channels"));
        }
        if song.patterns.is_empty() {
            return Err(PlayError::InvalidSong("song has no patterns"));
        }
        if song.order_list.is_empty() {
            return Err(PlayError::InvalidSong("song has an empty order list"));
        }

        let channels = song
            .channels
            .iter()
            .enumerate()
            .map(|(i, cfg)| ChannelState::new(i as u8, cfg.initial_pan, cfg.initial_vol))
            .collect();

        let mut facade = SongFacade::new(song.initial_tempo, song.initial_speed);
        facade.disable_features(disabled_features_from_song(song.features));

        Ok(Self {
            song,
            sample_rate,
            channels,
            voices: VoicePool::new(),
            facade,
            mixer: Mixer::new(mixer_settings),
            out_channels: mixer_settings.out_channels,
            order_idx: starting_order,
            row: starting_row,
            wrapped_once: false,
            stopped: false,
            rows_rendered: 0,
            row_budget: row_budget(song),
        })
    }

    /// Resolve `order_idx`/`row` to a concrete pattern, skipping sentinel
    /// order entries and handling end-of-order-list looping (§4.5 step 1).
    /// Returns `None` when the song is over.
    fn resolve_pattern(&mut self) -> Option<usize> {
        loop {
            if self.rows_rendered >= self.row_budget {
                tracing::warn!("order list makes no forward progress, stopping render");
                return None;
            }

            match self.song.order_list.get(self.order_idx) {
                None => {
                    if self.facade.can_pattern_loop() && !self.wrapped_once {
                        self.order_idx = 0;
                        self.row = 0;
                        self.wrapped_once = true;
                        continue;
                    }
                    return None;
                }
                Some(OrderEntry::NextPattern) => {
                    self.order_idx += 1;
                    continue;
                }
                Some(OrderEntry::InvalidPattern) => {
                    self.order_idx += 1;
                    self.row = 0;
                    continue;
                }
                Some(OrderEntry::Pattern(idx)) => {
                    let Some(pattern) = self.song.patterns.get(*idx as usize) else {
                        return None;
                    };
                    if self.row >= pattern.rows as usize {
                        self.order_idx += 1;
                        self.row = 0;
                        continue;
                    }
                    return Some(*idx as usize);
                }
            }
        }
    }

    /// Ingest one row's cells into every channel's pending/effect state
    /// (§4.5 steps 2-4), then run the tick loop and mix the result.
    fn render_row(&mut self, pattern_idx: usize) -> PremixFrame {
        let song = self.song;
        let pattern = &song.patterns[pattern_idx];
        let row = self.row as u16;
        let num_channels = song.num_channels();

        self.facade.current_row = self.row;
        self.facade.begin_row();
        for ch in self.channels.iter_mut() {
            ch.begin_row();
        }

        for ch_idx in 0..pattern.channels as usize {
            if ch_idx >= num_channels {
                break;
            }
            let cell = *pattern.cell(row, ch_idx as u8);
            ingest_cell(song, &mut self.channels[ch_idx], &mut self.facade, cell);
            match cell.note {
                Note::Off => {
                    if let Some(key) = self.channels[ch_idx].active_voice {
                        self.voices.release(key);
                    }
                }
                Note::Fade => {
                    if let Some(key) = self.channels[ch_idx].active_voice {
                        self.voices.fade(key);
                    }
                }
                _ => {}
            }
        }

        let pattern_delay = self.facade.pattern_delay.unwrap_or(0) as u32;
        let ticks_this_row =
            (self.facade.ticks_per_row as u32) * (1 + pattern_delay) + self.facade.extra_row_ticks as u32;
        let ticks_this_row = ticks_this_row.max(1);
        let tick_samples =
            ((2500.0 * self.sample_rate as f64) / (1000.0 * self.facade.tempo.max(1) as f64)).round() as usize;
        let last_tick = (ticks_this_row - 1) as u8;

        let mut row_samples: Vec<f32> = Vec::with_capacity(ticks_this_row as usize * tick_samples * 2);

        for t in 0..ticks_this_row as u8 {
            self.run_tick(pattern, row, t, last_tick);
            self.commit_due_notes(t);
            self.apply_note_cuts(t);
            self.advance_envelope_ticks();
            self.voices.tick_fadeout(&self.song.instruments);
            let mixed = self.render_tick_audio(num_channels, tick_samples);
            row_samples.extend(mixed);
        }

        self.voices.reap_finished();

        let mut row_text = ArrayString::<64>::new();
        let _ = core::fmt::Write::write_fmt(&mut row_text, format_args!("{:03}/{:02}", self.order_idx, self.row));

        let headroom = self.mixer.headroom(num_channels);
        PremixFrame {
            samples: row_samples,
            channels: self.out_channels,
            mixer_volume: headroom * (self.facade.global_volume() as f32 / 64.0),
            metadata: FrameMetadata {
                order: self.order_idx,
                row: self.row,
                row_text,
            },
        }
    }

    fn run_tick(&mut self, pattern: &tr_ir::Pattern, row: u16, t: u8, last_tick: u8) {
        for ch_idx in 0..pattern.channels as usize {
            if ch_idx >= self.channels.len() {
                break;
            }
            let cell = *pattern.cell(row, ch_idx as u8);
            if cell.effect.is_none() {
                continue;
            }
            self.channels[ch_idx].retrigger_fired = false;
            let mut ctx = EffectContext {
                channel: &mut self.channels[ch_idx],
                facade: &mut self.facade,
                features: self.song.features,
            };
            if t == 0 {
                effect::start(cell.effect, &mut ctx);
            }
            effect::tick(cell.effect, &mut ctx, t);
            if t == last_tick {
                effect::stop(cell.effect, &mut ctx, t);
            }

            if self.channels[ch_idx].retrigger_fired {
                if let Some(key) = self.channels[ch_idx].active_voice {
                    if let Some(voice) = self.voices.get_mut(key) {
                        voice.pos = self.channels[ch_idx].pos;
                    }
                }
            }
        }
    }

    /// Commit pending-row targets into the live channel/voice at
    /// `notePlayTick` (§4.5 step 5, §3 invariant 4). The outgoing voice
    /// (if any) is handed off per its instrument's `NewNoteAction` rather
    /// than killed outright (§9 "Channel state ↔ voice").
    fn commit_due_notes(&mut self, t: u8) {
        for ch_idx in 0..self.channels.len() {
            let due = self.channels[ch_idx].pending.note_play_tick == t
                && self.channels[ch_idx].pending.target_instrument.is_some();
            if !due {
                continue;
            }
            let inst_idx = self.channels[ch_idx].pending.target_instrument.unwrap();
            if let Some(old) = self.channels[ch_idx].active_voice.take() {
                let song = self.song;
                let nna = self
                    .voices
                    .get(old)
                    .and_then(|v| song.instruments.get(v.instrument_index))
                    .map(|inst| inst.new_note_action)
                    .unwrap_or_default();
                match nna {
                    NewNoteAction::Cut => self.voices.kill(old),
                    NewNoteAction::Off => self.voices.release(old),
                    NewNoteAction::Fade => self.voices.fade(old),
                    NewNoteAction::Continue => self.voices.background(old),
                }
            }
            let volume = self.channels[ch_idx]
                .pending
                .target_volume
                .unwrap_or(self.channels[ch_idx].volume);
            let pan = self.channels[ch_idx].panning;
            let voice = Voice::new(inst_idx, ch_idx as u8, volume, pan);
            let key = self.voices.allocate(voice);
            self.channels[ch_idx].active_voice = Some(key);
            self.channels[ch_idx].commit_pending();
            self.channels[ch_idx].vibrato_osc.note_trigger();
            self.channels[ch_idx].tremolo_osc.note_trigger();
        }
    }

    fn apply_note_cuts(&mut self, t: u8) {
        for ch in self.channels.iter_mut() {
            if ch.pending.note_cut_tick == Some(t) {
                ch.volume = 0;
            }
        }
    }

    /// Advance the envelope cursor of every channel with a live voice
    /// (§3 "Channel state", `envelope cursor`).
    fn advance_envelope_ticks(&mut self) {
        for ch in self.channels.iter_mut() {
            if ch.active_voice.is_some() {
                ch.advance_envelope_tick();
            }
        }
    }

    /// Render `tick_samples` of mixed PCM for this tick (§4.5 step 5,
    /// §4.6), syncing each channel's live volume/pan/period into its
    /// voice immediately before rendering, then mixing in any
    /// background/fading NNA voices that have outlived their channel.
    fn render_tick_audio(&mut self, num_channels: usize, tick_samples: usize) -> Vec<f32> {
        let mut per_channel: Vec<Vec<f32>> = Vec::with_capacity(num_channels);
        let mut pans: Vec<i8> = Vec::with_capacity(num_channels);

        for ch_idx in 0..num_channels {
            let mut buf = vec![0.0f32; tick_samples];
            let mut pan = self.channels[ch_idx].panning;

            if let Some(key) = self.channels[ch_idx].active_voice {
                let effective_period = self.channels[ch_idx].effective_period();
                let effective_volume = if self.channels[ch_idx].tremor_on {
                    self.channels[ch_idx].volume
                } else {
                    0
                };
                let key_on = self.channels[ch_idx].key_on;
                let env_tick = self.channels[ch_idx].envelope_tick;

                if let Some(period) = effective_period {
                    if let Some(voice) = self.voices.get_mut(key) {
                        let inst_idx = voice.instrument_index;
                        if let Some(inst) = self.song.instruments.get(inst_idx) {
                            let vol_env = active_envelope_value(&inst.volume_envelope, env_tick)
                                .map(|v| v.max(0) as f32 / 64.0)
                                .unwrap_or(1.0);
                            if let Some(pan_env) = active_envelope_value(&inst.panning_envelope, env_tick) {
                                pan = (pan as i32 + pan_env as i32).clamp(-64, 64) as i8;
                            }

                            voice.increment = (period.get_sampler_add(self.sample_rate) * 65536.0) as u32;
                            voice.volume = effective_volume;
                            voice.panning = pan;
                            voice.key_on = key_on;
                            for s in buf.iter_mut() {
                                *s = voice.render_one(&inst.sample).unwrap_or(0.0) * vol_env;
                            }
                        }
                    }
                }
            }

            per_channel.push(buf);
            pans.push(pan);
        }

        let owned: Vec<crate::voice_pool::VoiceKey> =
            self.channels.iter().filter_map(|c| c.active_voice).collect();
        let (bg_buffers, bg_pans) = self.voices.render_voices(&owned, &self.song.instruments, tick_samples);
        per_channel.extend(bg_buffers);
        pans.extend(bg_pans);

        let mixed = self.mixer.mix_row(&per_channel, &pans);
        let scale = self.facade.global_volume() as f32 / 64.0;
        mixed.into_iter().map(|s| (s * scale).clamp(-1.0, 1.0)).collect()
    }

    /// Advance `order_idx`/`row` for the next row (§4.5 step 6): honor a
    /// Stop-stage jump first, then an active pattern loop, else a normal
    /// row increment with order carry at the pattern's end.
    fn advance(&mut self, pattern_rows: u16) {
        let pj = self.facade.pending_jump;
        if pj.order.is_some() || pj.row.is_some() {
            match (pj.order, pj.row) {
                (Some(o), Some(r)) => {
                    self.order_idx = o;
                    self.row = r;
                }
                (Some(o), None) => {
                    self.order_idx = o;
                    self.row = 0;
                }
                (None, Some(r)) => {
                    self.order_idx += 1;
                    self.row = r;
                }
                (None, None) => unreachable!(),
            }
            return;
        }

        let pl = self.facade.pattern_loop;
        if pl.enabled {
            if let Some(end) = pl.end_row {
                if self.row == end {
                    if pl.count < pl.total {
                        self.facade.pattern_loop.count += 1;
                        self.row = pl.start_row;
                        return;
                    } else {
                        self.facade.pattern_loop.enabled = false;
                        self.facade.pattern_loop.count = 0;
                        self.row += 1;
                    }
                } else {
                    self.row += 1;
                }
            } else {
                self.row += 1;
            }
        } else {
            self.row += 1;
        }

        if self.row >= pattern_rows as usize {
            self.order_idx += 1;
            self.row = 0;
        }
    }

    /// Number of live voices, exposed for diagnostics/tests.
    pub fn active_voice_count(&self) -> usize {
        self.voices.active_count()
    }
}

/// Read an instrument envelope at the given tick, if present and
/// enabled (§4.3 "envelopes"); `None` means "no envelope contribution".
fn active_envelope_value(envelope: &Option<tr_ir::Envelope>, tick: u16) -> Option<i8> {
    envelope.as_ref().filter(|e| e.enabled).map(|e| e.value_at(tick))
}

impl<'a> Iterator for Scheduler<'a> {
    type Item = PremixFrame;

    fn next(&mut self) -> Option<PremixFrame> {
        if self.stopped {
            return None;
        }
        let Some(pattern_idx) = self.resolve_pattern() else {
            self.stopped = true;
            return None;
        };
        let pattern_rows = self.song.patterns[pattern_idx].rows;
        let frame = self.render_row(pattern_idx);
        self.rows_rendered += 1;
        self.advance(pattern_rows);
        Some(frame)
    }
}

/// Ingest one cell into a channel's pending-row state and fire its
/// `PreStart` effect stage (§4.5 steps 2-4).
fn ingest_cell(song: &Song, channel: &mut ChannelState, facade: &mut SongFacade, cell: Cell) {
    let is_tone_porta = matches!(cell.effect.letter, b'G' | b'L');

    match cell.note {
        Note::On(n) => {
            let inst_idx = if cell.instrument != 0 {
                Some(cell.instrument as usize - 1)
            } else {
                channel.instrument
            };
            if let Some(idx) = inst_idx {
                if let Some(inst) = song.instruments.get(idx) {
                    let c2spd = match channel.finetune_override {
                        Some(ft) => apply_finetune(inst.sample.c2spd, ft),
                        None => apply_finetune(inst.sample.c2spd, inst.finetune),
                    };
                    let period = Period::calc_semitone_period(n, c2spd, song.period_mode);
                    if is_tone_porta {
                        channel.pending.porta_target_period = Some(period);
                    } else {
                        channel.pending.target_period = Some(period);
                        channel.pending.target_instrument = Some(idx);
                        if channel.pending.target_volume.is_none() {
                            channel.pending.target_volume = Some(inst.sample.default_volume);
                        }
                    }
                    channel.prev_note_semitone = n;
                }
            }
        }
        Note::Off => {
            channel.note_off();
        }
        Note::Fade => {
            channel.note_off();
        }
        Note::None => {
            if cell.instrument != 0 {
                let idx = cell.instrument as usize - 1;
                if let Some(inst) = song.instruments.get(idx) {
                    channel.instrument = Some(idx);
                    channel.volume = inst.sample.default_volume;
                }
            }
        }
    }

    match cell.volume {
        VolumeCommand::Volume(v) => channel.pending.target_volume = Some(v.min(64)),
        VolumeCommand::Panning(p) => {
            channel.panning = ((p.min(64) as i16 * 128) / 64 - 64).clamp(-64, 64) as i8;
        }
        _ => {}
    }

    if !cell.effect.is_none() {
        let mut ctx = EffectContext {
            channel,
            facade,
            features: song.features,
        };
        effect::pre_start(cell.effect, &mut ctx);
    }
}

/// Apply a finetune offset (1/8-semitone steps) to a sample's c2spd.
fn apply_finetune(c2spd: u32, finetune: i8) -> u32 {
    if finetune == 0 {
        return c2spd;
    }
    let ratio = libm::pow(2.0, finetune as f64 / (12.0 * 8.0));
    ((c2spd as f64) * ratio).round().max(1.0) as u32
}
