//! WAV output for rendered blocks: 32-bit float, stereo.

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use m4a_ir::Frame;

use crate::FormatError;

fn spec(sample_rate: u32) -> WavSpec {
    WavSpec { channels: 2, sample_rate, bits_per_sample: 32, sample_format: SampleFormat::Float }
}

/// Streaming WAV writer. Frames are appended block by block.
pub struct WavSink<W: Write + Seek> {
    writer: WavWriter<W>,
    frames: u64,
}

impl WavSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self, FormatError> {
        let writer = WavWriter::create(path, spec(sample_rate))?;
        Ok(Self { writer, frames: 0 })
    }
}

impl<W: Write + Seek> WavSink<W> {
    pub fn new(inner: W, sample_rate: u32) -> Result<Self, FormatError> {
        let writer = WavWriter::new(inner, spec(sample_rate))?;
        Ok(Self { writer, frames: 0 })
    }

    pub fn write_frames(&mut self, frames: &[Frame]) -> Result<(), FormatError> {
        for f in frames {
            self.writer.write_sample(f.left)?;
            self.writer.write_sample(f.right)?;
        }
        self.frames += frames.len() as u64;
        Ok(())
    }

    pub fn write_silence(&mut self, frames: u64) -> Result<(), FormatError> {
        for _ in 0..frames {
            self.writer.write_sample(0.0f32)?;
            self.writer.write_sample(0.0f32)?;
        }
        self.frames += frames;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Patch the header sizes and flush. Returns the frame count.
    pub fn finalize(self) -> Result<u64, FormatError> {
        self.writer.finalize()?;
        Ok(self.frames)
    }
}

/// Encode `frames` into an in-memory WAV file.
pub fn frames_to_wav(frames: &[Frame], sample_rate: u32) -> Result<Vec<u8>, FormatError> {
    let mut buf = Cursor::new(Vec::new());
    let mut sink = WavSink::new(&mut buf, sample_rate)?;
    sink.write_frames(frames)?;
    sink.finalize()?;
    Ok(buf.into_inner())
}
