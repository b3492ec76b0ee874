use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use num_complex::Complex32;

const HEADER_LEN: u64 = 44;
const CHANNELS: u16 = 2;
const BITS_PER_SAMPLE: u16 = 16;

/// 16-bit stereo PCM writer, I on the left channel and Q on the right.
/// Sizes in the header are patched by `finish`.
pub struct WavWriter {
    writer: BufWriter<File>,
    frames: u64,
}

impl WavWriter {
    pub fn create(path: &Path, sample_rate: u32) -> io::Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
        let byte_rate = sample_rate * block_align as u32;

        writer.write_all(b"RIFF")?;
        writer.write_all(&0u32.to_le_bytes())?;
        writer.write_all(b"WAVE")?;
        writer.write_all(b"fmt ")?;
        writer.write_all(&16u32.to_le_bytes())?;
        writer.write_all(&1u16.to_le_bytes())?; // PCM
        writer.write_all(&CHANNELS.to_le_bytes())?;
        writer.write_all(&sample_rate.to_le_bytes())?;
        writer.write_all(&byte_rate.to_le_bytes())?;
        writer.write_all(&block_align.to_le_bytes())?;
        writer.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;
        writer.write_all(b"data")?;
        writer.write_all(&0u32.to_le_bytes())?;

        Ok(Self { writer, frames: 0 })
    }

    pub fn write(&mut self, samples: &[Complex32]) -> io::Result<()> {
        for s in samples {
            self.writer.write_all(&to_pcm(s.re).to_le_bytes())?;
            self.writer.write_all(&to_pcm(s.im).to_le_bytes())?;
        }
        self.frames += samples.len() as u64;
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn finish(mut self) -> io::Result<()> {
        let data_len = self.frames * (CHANNELS * BITS_PER_SAMPLE / 8) as u64;
        let riff_len = HEADER_LEN - 8 + data_len;
        self.writer.seek(SeekFrom::Start(4))?;
        self.writer.write_all(&(riff_len as u32).to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(HEADER_LEN - 4))?;
        self.writer.write_all(&(data_len as u32).to_le_bytes())?;
        self.writer.flush()
    }
}

fn to_pcm(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
