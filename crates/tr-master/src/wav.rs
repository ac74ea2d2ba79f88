//! Streaming WAV sink (§4.10): writes the `data` subchunk incrementally as
//! premix frames arrive and back-fills the two size fields on close,
//! rather than buffering the whole render before writing a header.
//!
//! A generic `impl Write` can't do this — back-filling needs `Seek` — so
//! this type owns a concrete `File`.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use tr_engine::PremixFrame;

const FILE_CHUNK_SIZE_POS: u64 = 4;
const FILE_SUBCHUNK2_SIZE_POS: u64 = 40;

/// Opens a WAV file and streams PCM frames into its `data` subchunk.
/// `ChunkSize`/`Subchunk2Size` are written as zero up front and
/// back-filled by [`WavWriter::close`].
pub struct WavWriter {
    file: File,
    bits_per_sample: u8,
    data_bytes: u32,
}

impl WavWriter {
    pub fn create<P: AsRef<Path>>(
        path: P,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u8,
    ) -> io::Result<Self> {
        let mut file = File::create(path)?;
        let block_align = channels * (bits_per_sample as u16).div_ceil(8);

        file.write_all(b"RIFF")?;
        file.write_all(&0u32.to_le_bytes())?; // ChunkSize, backfilled on close
        file.write_all(b"WAVE")?;

        file.write_all(b"fmt ")?;
        file.write_all(&16u32.to_le_bytes())?;
        file.write_all(&1u16.to_le_bytes())?; // AudioFormat = PCM
        file.write_all(&channels.to_le_bytes())?;
        file.write_all(&sample_rate.to_le_bytes())?;
        file.write_all(&(sample_rate * block_align as u32).to_le_bytes())?;
        file.write_all(&block_align.to_le_bytes())?;
        file.write_all(&(bits_per_sample as u16).to_le_bytes())?;

        file.write_all(b"data")?;
        file.write_all(&0u32.to_le_bytes())?; // Subchunk2Size, backfilled on close

        Ok(Self { file, bits_per_sample, data_bytes: 0 })
    }

    /// Quantize and append one premix frame to the `data` subchunk.
    pub fn write_frame(&mut self, frame: &PremixFrame) -> io::Result<()> {
        let bytes = frame.to_pcm_bytes(self.bits_per_sample);
        self.file.write_all(&bytes)?;
        self.data_bytes = self.data_bytes.saturating_add(bytes.len() as u32);
        Ok(())
    }

    /// Back-fill `ChunkSize` and `Subchunk2Size` and flush to disk.
    pub fn close(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.seek(SeekFrom::Start(FILE_CHUNK_SIZE_POS))?;
        self.file.write_all(&(36 + self.data_bytes).to_le_bytes())?;
        self.file.seek(SeekFrom::Start(FILE_SUBCHUNK2_SIZE_POS))?;
        self.file.write_all(&self.data_bytes.to_le_bytes())?;
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tr_engine::FrameMetadata;

    fn frame(samples: Vec<f32>, channels: u8) -> PremixFrame {
        PremixFrame { samples, channels, mixer_volume: 1.0, metadata: FrameMetadata::default() }
    }

    fn read_u32_le(data: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn header_sizes_are_backfilled_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        let mut writer = WavWriter::create(&path, 44100, 2, 16).unwrap();
        writer.write_frame(&frame(vec![0.5, -0.5, 0.25, -0.25], 2)).unwrap();
        writer.write_frame(&frame(vec![0.1, -0.1], 2)).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let data_size = 6 * 2; // 6 samples, 16-bit each
        assert_eq!(read_u32_le(&bytes, 4), 36 + data_size);
        assert_eq!(read_u32_le(&bytes, 40), data_size);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(read_u32_le(&bytes, 16), 16);
        assert_eq!(&bytes[36..40], b"data");
    }

    #[test]
    fn empty_render_still_produces_a_valid_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");

        let writer = WavWriter::create(&path, 22050, 1, 8).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(read_u32_le(&bytes, 4), 36);
        assert_eq!(read_u32_le(&bytes, 40), 0);
    }
}
