//! Source readers behind a channel's fetch closure.
//!
//! A channel never reads ROM directly while rendering; its resampler pulls
//! samples through one of these cursors. Every read is bounds-checked and a
//! failed read yields silence.

use m4a_ir::{ByteSource, SampleInfo};

/// Bytes in one DPCM block.
pub const DPCM_BLOCK_BYTES: usize = 33;
/// Samples decoded from one DPCM block.
pub const DPCM_BLOCK_SAMPLES: u32 = 64;

const DPCM_DELTAS: [i8; 16] = [0, 1, 4, 9, 16, 25, 36, 49, -64, -49, -36, -25, -16, -9, -4, -1];

/// Steps in one cycle of a synthesized waveform.
pub const SYNTH_STEPS: u32 = 64;

/// Storage format of a DirectSound sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleEncoding {
    /// Signed 8-bit PCM.
    Pcm8,
    /// 4-bit delta blocks.
    Dpcm,
}

/// Read position inside a ROM sample, honouring the loop.
#[derive(Clone, Debug)]
pub struct SampleCursor {
    info: SampleInfo,
    encoding: SampleEncoding,
    pos: u32,
    finished: bool,
    block: Option<u32>,
    decoded: [f32; DPCM_BLOCK_SAMPLES as usize],
}

impl SampleCursor {
    pub fn new(info: SampleInfo, encoding: SampleEncoding) -> Self {
        Self {
            info,
            encoding,
            pos: 0,
            finished: false,
            block: None,
            decoded: [0.0; DPCM_BLOCK_SAMPLES as usize],
        }
    }

    pub fn info(&self) -> &SampleInfo {
        &self.info
    }

    /// Current position in samples.
    pub fn position(&self) -> u32 {
        self.pos
    }

    /// Append `count` samples to `buf`. Returns `false` once a non-looping
    /// sample has run out.
    pub fn fetch(&mut self, rom: &dyn ByteSource, buf: &mut Vec<f32>, count: usize) -> bool {
        buf.reserve(count);
        for _ in 0..count {
            if !self.finished && self.pos >= self.info.end_pos {
                if self.info.loop_enabled {
                    self.pos = self.info.loop_pos;
                } else {
                    self.finished = true;
                }
            }
            if self.finished {
                buf.push(0.0);
                continue;
            }
            let value = match self.encoding {
                SampleEncoding::Pcm8 => rom
                    .read_i8(self.info.sample_pos + self.pos as usize)
                    .map_or(0.0, |s| s as f32 / 128.0),
                SampleEncoding::Dpcm => self.dpcm_sample(rom),
            };
            buf.push(value);
            self.pos += 1;
        }
        !self.finished
    }

    fn dpcm_sample(&mut self, rom: &dyn ByteSource) -> f32 {
        let block = self.pos / DPCM_BLOCK_SAMPLES;
        if self.block != Some(block) {
            let block_pos = self.info.sample_pos + block as usize * DPCM_BLOCK_BYTES;
            decode_dpcm_block(rom, block_pos, &mut self.decoded);
            self.block = Some(block);
        }
        self.decoded[(self.pos % DPCM_BLOCK_SAMPLES) as usize]
    }
}

/// Decode one DPCM block at `pos`.
///
/// The first byte is the absolute first sample; the 63 following deltas are
/// packed two per byte, low nibble first. A truncated block decodes to
/// silence.
pub fn decode_dpcm_block(rom: &dyn ByteSource, pos: usize, out: &mut [f32; DPCM_BLOCK_SAMPLES as usize]) {
    let Some(bytes) = rom.read_bytes(pos, DPCM_BLOCK_BYTES) else {
        out.fill(0.0);
        return;
    };
    let mut level = bytes[0] as i8;
    out[0] = level as f32 / 128.0;
    for (k, slot) in out.iter_mut().enumerate().skip(1) {
        let nibble_idx = k - 1;
        let byte = bytes[1 + nibble_idx / 2];
        let nibble = if nibble_idx % 2 == 0 { byte & 0x0F } else { byte >> 4 };
        level = level.wrapping_add(DPCM_DELTAS[nibble as usize]);
        *slot = level as f32 / 128.0;
    }
}

/// Shape of a synthesized voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthShape {
    Pulse,
    Saw,
    Triangle,
}

/// Step counter over one virtual waveform cycle.
#[derive(Clone, Debug, Default)]
pub struct SynthCursor {
    step: u32,
}

impl SynthCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `count` steps of `shape`. `duty` is the high fraction of a
    /// pulse cycle. Synthesized sources never run out.
    pub fn fetch(&mut self, shape: SynthShape, duty: f32, buf: &mut Vec<f32>, count: usize) -> bool {
        buf.reserve(count);
        let half = (SYNTH_STEPS / 2) as f32;
        for _ in 0..count {
            let s = self.step as f32;
            let value = match shape {
                SynthShape::Pulse => {
                    if s < duty * SYNTH_STEPS as f32 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                SynthShape::Saw => s / half - 1.0,
                SynthShape::Triangle => {
                    if s < half {
                        s / (half / 2.0) - 1.0
                    } else {
                        3.0 - s / (half / 2.0)
                    }
                }
            };
            buf.push(value);
            self.step = (self.step + 1) % SYNTH_STEPS;
        }
        true
    }
}
