//! Effect library (§4.4): ~40 per-tick operators sharing one lifecycle.
//!
//! Effects are not per-instance objects — "no per-effect allocation"
//! (§9 Design Notes) — they're free functions dispatched on the raw
//! `(letter, param)` byte pair, reading/writing sticky memory on the
//! channel through `EffectMemory::sticky`. `EffectContext` bundles the
//! channel + song façade references each call needs.

use tr_ir::song::Features;
use tr_ir::EffectCmd;

use crate::channel::ChannelState;
use crate::facade::{DisabledFeatures, SongFacade};
use crate::oscillator::Waveform;

/// Bundles the per-call references an effect needs (§9 Design Notes
/// "Effect <-> song coupling").
pub struct EffectContext<'a> {
    pub channel: &'a mut ChannelState,
    pub facade: &'a mut SongFacade,
    pub features: Features,
}

fn nibbles(param: u8) -> (u8, u8) {
    (param >> 4, param & 0x0F)
}

/// Whether a per-tick slide effect applies on tick 0 (MOD quirk) or only
/// on tick > 0 (S3M quirk), per the format's `vol_slide_every_frame` flag.
fn applies_this_tick(tick: u8, features: Features) -> bool {
    tick > 0 || features.vol_slide_every_frame
}

/// `PreStart`: fires the moment the cell is parsed, before any tick for
/// the row runs. Only sequencing effects (order/row jump, pattern loop
/// marks) act here; everything else is a no-op.
pub fn pre_start(cmd: EffectCmd, ctx: &mut EffectContext) {
    match cmd.letter {
        b'B' => {
            ctx.facade.set_current_order(cmd.param as usize);
        }
        b'O' => {
            let param = EffectMemoryKey::SampleOffset.sticky(ctx.channel, cmd.param);
            ctx.channel.pending.target_pos = Some((param as u32 * 256) << 16);
        }
        b'S' => {
            let (sub, y) = nibbles(cmd.param);
            match sub {
                0x1 => {
                    ctx.channel.glissando = y != 0;
                }
                0x2 => {
                    let signed = if y > 7 { y as i8 - 16 } else { y as i8 };
                    ctx.channel.finetune_override = Some(signed);
                }
                0x3 => {
                    ctx.channel.vibrato_osc.set_waveform(waveform_from_nibble(y));
                    ctx.channel.vibrato_osc.set_retrigger_on_note(y & 0x4 == 0);
                }
                0x4 => {
                    ctx.channel.tremolo_osc.set_waveform(waveform_from_nibble(y));
                    ctx.channel.tremolo_osc.set_retrigger_on_note(y & 0x4 == 0);
                }
                0x8 => {
                    ctx.channel.panning = ((y as i16 * 128) / 15 - 64).clamp(-64, 64) as i8;
                }
                0xB => {
                    if y == 0 {
                        let row = ctx.facade.current_row;
                        ctx.facade.set_pattern_loop_start(row);
                    }
                }
                0xC => {
                    ctx.channel.pending.note_cut_tick = Some(y);
                }
                0xD => {
                    ctx.channel.pending.note_play_tick = y;
                }
                0xE => {
                    ctx.facade.set_pattern_delay(y);
                }
                _ => {}
            }
        }
        _ => {}
    }
}

/// `Start`: fires on tick 0, before `Tick(0)`.
pub fn start(cmd: EffectCmd, ctx: &mut EffectContext) {
    match cmd.letter {
        b'A' => {
            if cmd.param <= 0x1F {
                ctx.facade.set_ticks(cmd.param);
            } else {
                ctx.facade.set_tempo(cmd.param as u16);
            }
        }
        b'D' => {
            let (x, y) = nibbles(cmd.param);
            if x == 0x0F && y != 0 {
                apply_volume_delta(ctx.channel, y as i16);
            } else if y == 0x0F && x != 0 {
                apply_volume_delta(ctx.channel, -(x as i16));
            }
        }
        b'E' => {
            let (sub, x) = nibbles(cmd.param);
            if sub == 0xF {
                slide_period(ctx.channel, x as i32 * 4);
            } else if sub == 0xE {
                slide_period(ctx.channel, x as i32);
            }
        }
        b'F' => {
            let (sub, x) = nibbles(cmd.param);
            if sub == 0xF {
                slide_period(ctx.channel, -(x as i32 * 4));
            } else if sub == 0xE {
                slide_period(ctx.channel, -(x as i32));
            }
        }
        b'I' => {
            ctx.channel.tremor_time = 0;
            ctx.channel.tremor_on = true;
        }
        b'Q' => {
            ctx.channel.retrigger_count = 0;
        }
        b'V' => {
            ctx.facade.set_global_volume(cmd.param.min(64));
        }
        b'X' => {
            ctx.channel.panning = (cmd.param as i16 - 64).clamp(-64, 64) as i8;
        }
        _ => {}
    }
}

/// `Tick(i)`: fires for every tick in the row.
pub fn tick(cmd: EffectCmd, ctx: &mut EffectContext, t: u8) {
    match cmd.letter {
        b'C' => {}
        b'S' => {
            let (sub, y) = nibbles(cmd.param);
            if sub == 0xC && t == y {
                ctx.channel.volume = 0;
            }
        }
        b'D' => tick_volume_slide(cmd.param, ctx, t),
        b'E' => tick_porta_down(cmd.param, ctx, t),
        b'F' => tick_porta_up(cmd.param, ctx, t),
        b'G' => tick_porta_to_note(cmd.param, ctx, t),
        b'H' => tick_vibrato(cmd.param, ctx, t),
        b'I' => tick_tremor(cmd.param, ctx, t),
        b'J' => tick_arpeggio(cmd.param, ctx, t),
        b'K' => {
            tick_vibrato(0, ctx, t); // reuse sticky vibrato memory, depth already set by a prior H
            tick_volume_slide(cmd.param, ctx, t);
        }
        b'L' => {
            tick_porta_to_note(0, ctx, t);
            tick_volume_slide(cmd.param, ctx, t);
        }
        b'Q' => tick_retrigger(cmd.param, ctx, t),
        b'R' => tick_tremolo(cmd.param, ctx, t),
        b'T' => tick_tempo_slide(cmd.param, ctx, t),
        b'U' => tick_fine_vibrato(cmd.param, ctx, t),
        b'W' => tick_global_vol_slide(cmd.param, ctx, t),
        b'Y' => tick_panbrello(cmd.param, ctx, t),
        _ => {}
    }
}

/// `Stop`: fires after `Tick(lastTick)`.
pub fn stop(cmd: EffectCmd, ctx: &mut EffectContext, _last_tick: u8) {
    if cmd.letter == b'C' {
        let (x, y) = nibbles(cmd.param);
        let row = x as usize * 10 + y as usize;
        ctx.facade.set_next_row(row);
    }
    if cmd.letter == b'S' {
        let (sub, y) = nibbles(cmd.param);
        if sub == 0xB && y > 0 {
            ctx.facade
                .set_pattern_loop_end(ctx.facade.pattern_loop.start_row, y as u32);
        }
    }
}

fn apply_volume_delta(channel: &mut ChannelState, delta: i16) {
    channel.volume = (channel.volume as i16 + delta).clamp(0, 64) as u8;
}

fn slide_period(channel: &mut ChannelState, delta: i32) {
    if let Some(period) = channel.period {
        channel.period = Some(period.add_integer(delta));
    }
}

fn tick_volume_slide(param: u8, ctx: &mut EffectContext, t: u8) {
    let param = EffectMemoryKey::VolumeSlide.sticky(ctx.channel, param);
    let (x, y) = nibbles(param);
    if !applies_this_tick(t, ctx.features) {
        return;
    }
    if x == 0x0F || y == 0x0F {
        return; // fine slides are tick-0-only, handled in `start`
    }
    if y == 0 && x > 0 {
        apply_volume_delta(ctx.channel, x as i16);
    } else if x == 0 && y > 0 {
        apply_volume_delta(ctx.channel, -(y as i16));
    }
}

fn tick_porta_down(param: u8, ctx: &mut EffectContext, t: u8) {
    let param = EffectMemoryKey::PortaDown.sticky(ctx.channel, param);
    let (sub, _) = nibbles(param);
    if sub == 0xE || sub == 0xF {
        return; // fine variants apply once on tick 0 in `start`
    }
    if applies_this_tick(t, ctx.features) {
        slide_period(ctx.channel, param as i32 * 4);
    }
}

fn tick_porta_up(param: u8, ctx: &mut EffectContext, t: u8) {
    let param = EffectMemoryKey::PortaUp.sticky(ctx.channel, param);
    let (sub, _) = nibbles(param);
    if sub == 0xE || sub == 0xF {
        return;
    }
    if applies_this_tick(t, ctx.features) {
        slide_period(ctx.channel, -(param as i32 * 4));
    }
}

fn tick_porta_to_note(param: u8, ctx: &mut EffectContext, t: u8) {
    let param = EffectMemoryKey::PortaToNote.sticky(ctx.channel, param);
    if t == 0 {
        return;
    }
    if let (Some(period), Some(target)) = (ctx.channel.period, ctx.channel.pending.porta_target_period) {
        ctx.channel.period = Some(period.porta_toward(target, param as u32 * 4));
    }
}

fn tick_vibrato(param: u8, ctx: &mut EffectContext, t: u8) {
    let param = EffectMemoryKey::Vibrato.sticky(ctx.channel, param);
    if t == 0 {
        return;
    }
    let (speed, depth) = nibbles(param);
    let raw = ctx.channel.vibrato_osc.get_wave();
    let multiplier = if ctx.features.vibrato_multiplier_4x { 4 } else { 1 };
    ctx.channel.vibrato_delta = (raw as i32 * depth as i32 * multiplier) / 255;
    ctx.channel.vibrato_osc.advance(speed * 4);
}

fn tick_fine_vibrato(param: u8, ctx: &mut EffectContext, t: u8) {
    let param = EffectMemoryKey::Vibrato.sticky(ctx.channel, param);
    if t == 0 {
        return;
    }
    let (speed, depth) = nibbles(param);
    let raw = ctx.channel.vibrato_osc.get_wave();
    ctx.channel.vibrato_delta = (raw as i32 * depth as i32) / 255;
    ctx.channel.vibrato_osc.advance(speed * 4);
}

fn tick_tremolo(param: u8, ctx: &mut EffectContext, t: u8) {
    let param = EffectMemoryKey::Tremolo.sticky(ctx.channel, param);
    if t == 0 {
        return;
    }
    let (speed, depth) = nibbles(param);
    let raw = ctx.channel.tremolo_osc.get_wave();
    let multiplier = if ctx.features.vibrato_multiplier_4x { 4 } else { 1 };
    let delta = (raw as i32 * depth as i32 * multiplier) / 255;
    ctx.channel.volume = (ctx.channel.volume as i32 + delta).clamp(0, 64) as u8;
    ctx.channel.tremolo_osc.advance(speed * 4);
}

fn tick_panbrello(param: u8, ctx: &mut EffectContext, t: u8) {
    let param = EffectMemoryKey::Panbrello.sticky(ctx.channel, param);
    if t == 0 {
        return;
    }
    let (speed, depth) = nibbles(param);
    let raw = ctx.channel.panbrello_osc.get_wave();
    let delta = (raw as i32 * depth as i32) / 255;
    ctx.channel.panning = (ctx.channel.panning as i32 + delta).clamp(-64, 64) as i8;
    ctx.channel.panbrello_osc.advance(speed);
}

fn tick_tremor(param: u8, ctx: &mut EffectContext, t: u8) {
    let param = EffectMemoryKey::Tremor.sticky(ctx.channel, param);
    if t == 0 {
        return;
    }
    let (x, y) = nibbles(param);
    // Open question resolution: on/off counts are (x+1, y+1) uniformly.
    let on_len = x as u8 + 1;
    let off_len = y as u8 + 1;
    let cycle = on_len + off_len;
    let phase = ctx.channel.tremor_time % cycle;
    ctx.channel.tremor_on = phase < on_len;
    ctx.channel.tremor_time = ctx.channel.tremor_time.wrapping_add(1);
}

fn tick_arpeggio(param: u8, ctx: &mut EffectContext, t: u8) {
    let param = EffectMemoryKey::Arpeggio.sticky(ctx.channel, param);
    let (x, y) = nibbles(param);
    let semitone_offset = match t % 3 {
        0 => 0,
        1 => x as i32,
        _ => y as i32,
    };
    ctx.channel.vibrato_delta = semitone_offset_to_period_delta(ctx.channel, semitone_offset);
}

fn semitone_offset_to_period_delta(channel: &ChannelState, semitones: i32) -> i32 {
    if semitones == 0 {
        return 0;
    }
    let Some(period) = channel.period else { return 0 };
    let shifted = period.transposed(semitones);
    shifted.value() as i32 - period.value() as i32
}

fn tick_retrigger(param: u8, ctx: &mut EffectContext, t: u8) {
    let param = EffectMemoryKey::Retrigger.sticky(ctx.channel, param);
    let (vol_op, every) = nibbles(param);
    if every == 0 {
        return;
    }
    ctx.channel.retrigger_count = ctx.channel.retrigger_count.wrapping_add(1);
    if t > 0 && ctx.channel.retrigger_count % every == 0 {
        ctx.channel.pos = 0;
        ctx.channel.retrigger_fired = true;
        apply_retrigger_volume(ctx.channel, vol_op);
    }
}

fn apply_retrigger_volume(channel: &mut ChannelState, op: u8) {
    let delta: i16 = match op {
        0x1 => -1,
        0x2 => -2,
        0x3 => -4,
        0x4 => -8,
        0x5 => -16,
        0x6 => 0, // *2/3, handled multiplicatively below
        0x7 => 0, // *1/2
        0x9 => 1,
        0xA => 2,
        0xB => 4,
        0xC => 8,
        0xD => 16,
        0xE => 0, // *3/2
        0xF => 0, // *2
        _ => 0,
    };
    match op {
        0x6 => channel.volume = (channel.volume as u32 * 2 / 3) as u8,
        0x7 => channel.volume /= 2,
        0xE => channel.volume = (channel.volume as u32 * 3 / 2).min(64) as u8,
        0xF => channel.volume = (channel.volume as u32 * 2).min(64) as u8,
        _ => apply_volume_delta(channel, delta),
    }
}

fn tick_tempo_slide(param: u8, ctx: &mut EffectContext, t: u8) {
    let param = EffectMemoryKey::TempoSlide.sticky(ctx.channel, param);
    if t == 0 {
        return;
    }
    let (sub, y) = nibbles(param);
    if sub == 0x1 {
        ctx.facade.increase_tempo(y as u16);
    } else if sub == 0x2 {
        ctx.facade.decrease_tempo(y as u16);
    }
}

fn tick_global_vol_slide(param: u8, ctx: &mut EffectContext, t: u8) {
    let param = EffectMemoryKey::GlobalVolSlide.sticky(ctx.channel, param);
    if !applies_this_tick(t, ctx.features) {
        return;
    }
    let (x, y) = nibbles(param);
    if x == 0x0F || y == 0x0F {
        return;
    }
    let current = ctx.facade.global_volume() as i16;
    if y == 0 && x > 0 {
        ctx.facade.set_global_volume((current + x as i16).clamp(0, 64) as u8);
    } else if x == 0 && y > 0 {
        ctx.facade.set_global_volume((current - y as i16).clamp(0, 64) as u8);
    }
}

/// Which sticky-memory slot an effect letter owns, used to route
/// `GetEffectSharedMemory` reads through `ChannelState::memory`.
enum EffectMemoryKey {
    VolumeSlide,
    PortaDown,
    PortaUp,
    PortaToNote,
    Vibrato,
    Tremolo,
    Panbrello,
    Tremor,
    Retrigger,
    Arpeggio,
    TempoSlide,
    GlobalVolSlide,
    SampleOffset,
}

impl EffectMemoryKey {
    fn sticky(self, channel: &mut ChannelState, param: u8) -> u8 {
        let slot = match self {
            EffectMemoryKey::VolumeSlide => &mut channel.memory.volume_slide,
            EffectMemoryKey::PortaDown => &mut channel.memory.porta_down,
            EffectMemoryKey::PortaUp => &mut channel.memory.porta_up,
            EffectMemoryKey::PortaToNote => &mut channel.memory.porta_to_note,
            EffectMemoryKey::Vibrato => &mut channel.memory.vibrato,
            EffectMemoryKey::Tremolo => &mut channel.memory.tremolo,
            EffectMemoryKey::Panbrello => &mut channel.memory.panbrello,
            EffectMemoryKey::Tremor => &mut channel.memory.tremor,
            EffectMemoryKey::Retrigger => &mut channel.memory.retrigger,
            EffectMemoryKey::Arpeggio => &mut channel.memory.arpeggio,
            EffectMemoryKey::TempoSlide => &mut channel.memory.tempo_slide,
            EffectMemoryKey::GlobalVolSlide => &mut channel.memory.global_vol_slide,
            EffectMemoryKey::SampleOffset => &mut channel.memory.sample_offset,
        };
        crate::channel::EffectMemory::sticky(slot, param)
    }
}

/// Map an `S` sub-effect's oscillator-select nibble to a `Waveform`, used
/// by the scheduler when decoding `S3x`/`S4x` (vibrato/tremolo waveform).
pub fn waveform_from_nibble(n: u8) -> Waveform {
    match n & 0x3 {
        0 => Waveform::Sine,
        1 => Waveform::RampDown,
        2 => Waveform::Square,
        _ => Waveform::Random,
    }
}

pub fn disabled_features_from_song(features: Features) -> DisabledFeatures {
    DisabledFeatures {
        pattern_loop: !features.pattern_loop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tr_ir::song::PeriodMode;
    use crate::period::Period;

    fn ctx<'a>(channel: &'a mut ChannelState, facade: &'a mut SongFacade) -> EffectContext<'a> {
        EffectContext {
            channel,
            facade,
            features: Features::default(),
        }
    }

    #[test]
    fn porta_up_decreases_period_over_ticks_s3m_mode() {
        let mut channel = ChannelState::new(0, 0, 64);
        channel.period = Some(Period::from_raw(PeriodMode::Amiga, 428, 8363));
        let mut facade = SongFacade::new(125, 6);
        let mut features = Features::default();
        features.vol_slide_every_frame = false; // S3M: skip tick 0
        let mut c = EffectContext {
            channel: &mut channel,
            facade: &mut facade,
            features,
        };
        let cmd = EffectCmd::new(b'F', 0x08);
        for t in 0..6u8 {
            tick(cmd, &mut c, t);
        }
        // Testable property 2 / scenario S-C: decreases by xx*4*N where N
        // is the number of ticks it actually applied on (5, since tick 0
        // is skipped in S3M mode).
        assert_eq!(channel.period.unwrap().value(), 428 - 8 * 4 * 5);
    }

    #[test]
    fn sticky_memory_persists_across_calls() {
        let mut channel = ChannelState::new(0, 0, 64);
        channel.period = Some(Period::from_raw(PeriodMode::Amiga, 800, 8363));
        let mut facade = SongFacade::new(125, 6);
        let mut c = ctx(&mut channel, &mut facade);
        tick(EffectCmd::new(b'F', 0x37), &mut c, 1);
        let after_first = c.channel.period.unwrap().value();
        tick(EffectCmd::new(b'F', 0x00), &mut c, 1);
        let after_second = c.channel.period.unwrap().value();
        assert_eq!(after_first - after_second, 0x37 * 4);
    }

    #[test]
    fn arpeggio_offset_matches_exact_semitone_table() {
        let mut channel = ChannelState::new(0, 0, 64);
        let base = Period::from_raw(PeriodMode::Amiga, 428, 8363);
        channel.period = Some(base);
        let mut facade = SongFacade::new(125, 6);
        let mut c = ctx(&mut channel, &mut facade);
        let cmd = EffectCmd::new(b'J', 0x37); // +3 semitones, then +7
        tick(cmd, &mut c, 1);
        let expected = base.transposed(3).value() as i32 - base.value() as i32;
        assert_eq!(c.channel.vibrato_delta, expected);

        tick(cmd, &mut c, 2);
        let expected = base.transposed(7).value() as i32 - base.value() as i32;
        assert_eq!(c.channel.vibrato_delta, expected);
    }

    #[test]
    fn tremor_on_off_counts_are_x_plus_1_y_plus_1() {
        let mut channel = ChannelState::new(0, 0, 64);
        let mut facade = SongFacade::new(125, 6);
        let mut c = ctx(&mut channel, &mut facade);
        let cmd = EffectCmd::new(b'I', 0x20); // x=2 (on=3), y=0 (off=1)
        let mut on_states = Vec::new();
        for t in 0..8u8 {
            tick(cmd, &mut c, t);
            on_states.push(c.channel.tremor_on);
        }
        assert_eq!(on_states[1..5], [true, true, true, false]);
    }

    #[test]
    fn pattern_break_sets_next_row_from_bcd() {
        let mut channel = ChannelState::new(0, 0, 64);
        let mut facade = SongFacade::new(125, 6);
        let mut c = ctx(&mut channel, &mut facade);
        stop(EffectCmd::new(b'C', 0x23), &mut c, 5);
        assert_eq!(facade.pending_jump.row, Some(23));
    }

    #[test]
    fn fine_volume_slide_up_applies_once_on_tick_zero() {
        let mut channel = ChannelState::new(0, 0, 40);
        let mut facade = SongFacade::new(125, 6);
        let mut c = ctx(&mut channel, &mut facade);
        start(EffectCmd::new(b'D', 0x3F), &mut c); // Fine vol slide down by 3 on tick 0... 0x3F is xF -> fine down
        assert_eq!(channel.volume, 37);
        tick(EffectCmd::new(b'D', 0x3F), &mut EffectContext { channel: &mut channel, facade: &mut facade, features: Features::default() }, 1);
        assert_eq!(channel.volume, 37); // fine slides don't repeat on later ticks
    }

    #[test]
    fn note_cut_zeroes_volume_at_its_tick() {
        let mut channel = ChannelState::new(0, 0, 64);
        let mut facade = SongFacade::new(125, 6);
        let mut c = ctx(&mut channel, &mut facade);
        let cmd = EffectCmd::new(b'S', 0xC3);
        pre_start(cmd, &mut c);
        assert_eq!(c.channel.pending.note_cut_tick, Some(3));
        for t in 0..3u8 {
            tick(cmd, &mut c, t);
            assert_eq!(c.channel.volume, 64);
        }
        tick(cmd, &mut c, 3);
        assert_eq!(c.channel.volume, 0);
    }

    #[test]
    fn sample_offset_is_sticky_and_sets_target_pos() {
        let mut channel = ChannelState::new(0, 0, 64);
        let mut facade = SongFacade::new(125, 6);
        let mut c = ctx(&mut channel, &mut facade);
        pre_start(EffectCmd::new(b'O', 0x10), &mut c);
        assert_eq!(c.channel.pending.target_pos, Some((0x10u32 * 256) << 16));
        pre_start(EffectCmd::new(b'O', 0x00), &mut c);
        assert_eq!(c.channel.pending.target_pos, Some((0x10u32 * 256) << 16));
    }

    #[test]
    fn vibrato_waveform_sub_effect_sets_oscillator() {
        let mut channel = ChannelState::new(0, 0, 64);
        let mut facade = SongFacade::new(125, 6);
        let mut c = ctx(&mut channel, &mut facade);
        pre_start(EffectCmd::new(b'S', 0x32), &mut c);
        assert_eq!(c.channel.vibrato_osc.waveform(), Waveform::Square);
    }
}
