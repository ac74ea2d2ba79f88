//! ProTracker MOD loader (§4.9): the one concrete decoder kept in-tree to
//! exercise the engine's Input contract (§6) end to end. Deliberately
//! thin — it is not a format-coverage goal, just a real module to drive
//! the scheduler with.

use tr_ir::{
    Cell, Instrument, LoopType, Note, OrderEntry, Pattern, PeriodMode, Sample, SampleData, Song,
    VolumeCommand,
};

use crate::effect_parser::decode_effect;
use crate::error::LoadError;

const HEADER_LEN: usize = 1084;
const SAMPLE_HEADER_LEN: usize = 30;
const NUM_SAMPLE_SLOTS: usize = 31;
const ROWS_PER_PATTERN: u16 = 64;
const CELL_LEN: usize = 4;

/// Load a 4/6/8-channel ProTracker MOD file from bytes.
pub fn load_mod(data: &[u8]) -> Result<Song, LoadError> {
    if data.len() < HEADER_LEN {
        return Err(LoadError::UnexpectedEof);
    }

    let num_channels = detect_channel_count(&data[1080..1084])?;

    let title = read_padded_string(&data[0..20]);
    let mut song = Song::with_channels(&title, num_channels);
    song.period_mode = PeriodMode::Amiga;
    song.base_clock_rate = 7_159_090;
    song.initial_tempo = 125;
    song.initial_speed = 6;

    let mut samples = Vec::with_capacity(NUM_SAMPLE_SLOTS);
    for i in 0..NUM_SAMPLE_SLOTS {
        let offset = 20 + i * SAMPLE_HEADER_LEN;
        samples.push(read_sample_header(&data[offset..offset + SAMPLE_HEADER_LEN])?);
    }

    let song_length = data[950] as usize;
    if song_length > 128 {
        return Err(LoadError::InvalidHeader);
    }

    let order_bytes = &data[952..952 + 128];
    song.order_list = order_bytes[..song_length]
        .iter()
        .map(|&idx| OrderEntry::Pattern(idx))
        .collect();

    let highest_pattern = order_bytes.iter().take(song_length).max().copied().unwrap_or(0) as usize;

    let pattern_size = ROWS_PER_PATTERN as usize * num_channels as usize * CELL_LEN;
    let mut patterns = Vec::with_capacity(highest_pattern + 1);
    let mut cursor = HEADER_LEN;
    for _ in 0..=highest_pattern {
        if cursor + pattern_size > data.len() {
            return Err(LoadError::UnexpectedEof);
        }
        patterns.push(read_pattern(&data[cursor..cursor + pattern_size], num_channels));
        cursor += pattern_size;
    }
    song.patterns = patterns;

    let mut instruments = Vec::with_capacity(NUM_SAMPLE_SLOTS);
    for (i, mut sample) in samples.into_iter().enumerate() {
        let len = sample.len();
        if len > 0 {
            if cursor + len > data.len() {
                return Err(LoadError::UnexpectedEof);
            }
            let raw: Vec<i8> = data[cursor..cursor + len].iter().map(|&b| b as i8).collect();
            sample.data = SampleData::Mono8(raw);
            cursor += len;
            if sample.loop_end > len as u32 {
                sample.loop_end = len as u32;
            }
        }
        let mut inst = Instrument::new(&format!("Sample {}", i + 1));
        inst.sample = sample;
        instruments.push(inst);
    }
    song.instruments = instruments;

    Ok(song)
}

fn detect_channel_count(sig: &[u8]) -> Result<u8, LoadError> {
    match sig {
        b"M.K." | b"M!K!" | b"FLT4" => Ok(4),
        b"6CHN" => Ok(6),
        b"8CHN" | b"OCTA" => Ok(8),
        _ => Ok(4), // 15-sample-era MODs carry no signature; assume 4ch.
    }
}

fn read_padded_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).trim().to_string()
}

fn read_sample_header(data: &[u8]) -> Result<Sample, LoadError> {
    if data.len() < SAMPLE_HEADER_LEN {
        return Err(LoadError::UnexpectedEof);
    }

    let name = read_padded_string(&data[0..22]);
    let length_words = u16::from_be_bytes([data[22], data[23]]) as u32;
    let raw_finetune = (data[24] & 0x0F) as i8;
    let finetune = if raw_finetune > 7 { raw_finetune - 16 } else { raw_finetune };
    let volume = data[25].min(64);
    let loop_start_words = u16::from_be_bytes([data[26], data[27]]) as u32;
    let loop_len_words = u16::from_be_bytes([data[28], data[29]]) as u32;

    let mut sample = Sample::new(&name);
    sample.default_volume = volume;
    // §4.2: finetune multiplies c2spd by 2^(ft/(12*8)), one 1/8-semitone step.
    sample.c2spd = (8363.0 * 2f32.powf(finetune as f32 / 96.0)) as u32;

    let loop_start = loop_start_words * 2;
    let loop_len = loop_len_words * 2;
    if loop_len > 2 {
        sample.loop_start = loop_start;
        sample.loop_end = loop_start + loop_len;
        sample.loop_type = LoopType::Forward;
    }

    // Placeholder length; filled with real data once patterns are parsed
    // and the sample-data cursor reaches this slot.
    sample.data = SampleData::Mono8(vec![0i8; (length_words * 2) as usize]);
    Ok(sample)
}

fn read_pattern(data: &[u8], num_channels: u8) -> Pattern {
    let mut pattern = Pattern::new(ROWS_PER_PATTERN, num_channels);
    for row in 0..ROWS_PER_PATTERN {
        for ch in 0..num_channels {
            let offset = (row as usize * num_channels as usize + ch as usize) * CELL_LEN;
            *pattern.cell_mut(row, ch) = decode_cell(&data[offset..offset + CELL_LEN]);
        }
    }
    pattern
}

/// Decode a 4-byte MOD cell:
/// `[sampleHi:4|periodHi:4][periodLo:8][sampleLo:4|cmd:4][param:8]`.
fn decode_cell(data: &[u8]) -> Cell {
    let sample_hi = data[0] & 0xF0;
    let period = (((data[0] & 0x0F) as u16) << 8) | data[1] as u16;
    let sample_lo = (data[2] & 0xF0) >> 4;
    let instrument = sample_hi | sample_lo;
    let cmd = data[2] & 0x0F;
    let param = data[3];

    let note = period_to_note(period);

    if cmd == 0xC {
        Cell {
            note,
            instrument,
            volume: VolumeCommand::Volume(param.min(64)),
            effect: tr_ir::EffectCmd::NONE,
        }
    } else {
        Cell {
            note,
            instrument,
            volume: VolumeCommand::None,
            effect: decode_effect(cmd, param),
        }
    }
}

/// Amiga period table for PT octaves 1-3 (notes 36-71 in this repository's
/// note numbering, where 48 is the period-table's reference row — see
/// `tr_engine::period::REFERENCE_NOTE`).
const PERIOD_TABLE: [u16; 36] = [
    856, 808, 762, 720, 678, 640, 604, 570, 538, 508, 480, 453, // octave 1
    428, 404, 381, 360, 339, 320, 302, 285, 269, 254, 240, 226, // octave 2
    214, 202, 190, 180, 170, 160, 151, 143, 135, 127, 120, 113, // octave 3
];

fn period_to_note(period: u16) -> Note {
    if period == 0 {
        return Note::None;
    }
    let mut best = 0usize;
    let mut best_diff = u16::MAX;
    for (i, &p) in PERIOD_TABLE.iter().enumerate() {
        let diff = (period as i32 - p as i32).unsigned_abs() as u16;
        if diff < best_diff {
            best_diff = diff;
            best = i;
        }
    }
    Note::On((best + 36) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal single-pattern, single-sample 4-channel MOD file.
    fn make_mod(order: &[u8], pattern_cells: &[(u8, u8, u8, u8)]) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN];
        buf[0..8].copy_from_slice(b"test mod");
        buf[950] = order.len() as u8;
        for (i, &p) in order.iter().enumerate() {
            buf[952 + i] = p;
        }
        buf[1080..1084].copy_from_slice(b"M.K.");

        // sample 0: length 4 words (8 bytes), volume 64, no loop.
        let sample_off = 20;
        buf[sample_off + 22] = 0;
        buf[sample_off + 23] = 4;
        buf[sample_off + 25] = 64;

        let num_patterns = *order.iter().max().unwrap_or(&0) as usize + 1;
        let pattern_size = 64 * 4 * 4;
        buf.resize(HEADER_LEN + num_patterns * pattern_size, 0);
        for &(row, ch, cmd_hi, param) in pattern_cells {
            let offset = HEADER_LEN + (row as usize * 4 + ch as usize) * 4;
            buf[offset] = 0;
            buf[offset + 1] = 0;
            buf[offset + 2] = cmd_hi;
            buf[offset + 3] = param;
        }

        buf.extend_from_slice(&[1i8 as u8; 8]); // sample 0 data
        buf
    }

    #[test]
    fn rejects_too_short_files() {
        assert!(load_mod(&[0; 10]).is_err());
    }

    #[test]
    fn detects_four_channel_signature() {
        let data = make_mod(&[0], &[]);
        let song = load_mod(&data).unwrap();
        assert_eq!(song.num_channels(), 4);
        assert_eq!(song.title.as_str(), "test mod");
    }

    #[test]
    fn order_list_and_pattern_count_match_song_length() {
        let data = make_mod(&[0, 0, 1], &[]);
        let song = load_mod(&data).unwrap();
        assert_eq!(song.order_list.len(), 3);
        assert_eq!(song.patterns.len(), 2);
        assert_eq!(song.order_list[2], OrderEntry::Pattern(1));
    }

    #[test]
    fn decodes_effect_command_into_raw_letter_param() {
        let data = make_mod(&[0], &[(0, 0, 0x1, 0x08)]);
        let song = load_mod(&data).unwrap();
        let cell = song.patterns[0].cell(0, 0);
        assert_eq!(cell.effect, tr_ir::EffectCmd::new(b'F', 0x08));
    }

    #[test]
    fn set_volume_command_becomes_volume_column() {
        let data = make_mod(&[0], &[(0, 0, 0xC, 40)]);
        let song = load_mod(&data).unwrap();
        let cell = song.patterns[0].cell(0, 0);
        assert_eq!(cell.volume, VolumeCommand::Volume(40));
        assert!(cell.effect.is_none());
    }

    #[test]
    fn sample_data_follows_pattern_data() {
        let data = make_mod(&[0], &[]);
        let song = load_mod(&data).unwrap();
        assert_eq!(song.instruments[0].sample.len(), 8);
        assert!(!song.instruments[0].sample.is_empty());
    }

    #[test]
    fn period_to_note_maps_reference_period() {
        assert_eq!(period_to_note(428), Note::On(48));
        assert_eq!(period_to_note(0), Note::None);
    }
}
