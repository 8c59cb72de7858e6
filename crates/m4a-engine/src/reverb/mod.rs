//! Reverb algorithms applied to the mixed master block.
//!
//! Every algorithm keeps its own circular delay line, sized once from the
//! driver's DMA buffer length, and persists it across blocks until reset.

mod golden_sun;
mod mgat;
mod normal;
mod passthrough;
mod test_reverb;

use m4a_ir::{Frame, Mp2kSoundMode, ReverbType, SAMPLES_PER_BUFFER};

/// In-place post-processor for the master block.
pub trait Reverb: Send {
    /// Process one block in place.
    fn process(&mut self, frames: &mut [Frame]);

    /// Clear the delay line.
    fn reset(&mut self);
}

/// Create a reverb by type. `intensity` is 0-127; 0 still builds the line.
pub fn create_reverb(kind: ReverbType, intensity: u8, delay_len: usize) -> Box<dyn Reverb> {
    let gain = intensity.min(127) as f32 / 128.0;
    match kind {
        ReverbType::Normal => Box::new(normal::NormalReverb::new(gain, delay_len)),
        ReverbType::Gs1 => Box::new(golden_sun::GoldenSunReverb::new(gain, delay_len, false)),
        ReverbType::Gs2 => Box::new(golden_sun::GoldenSunReverb::new(gain, delay_len, true)),
        ReverbType::Mgat => Box::new(mgat::MgatReverb::new(gain, delay_len)),
        ReverbType::Test => Box::new(test_reverb::TestReverb::new(gain, delay_len)),
        ReverbType::None => Box::new(passthrough::PassthroughReverb),
    }
}

/// Delay line length in output frames for a driver configuration.
///
/// The driver's DMA buffer holds a whole number of engine frames; each of
/// them corresponds to one output block.
pub fn delay_len(mode: &Mp2kSoundMode, dma_buffer_len: u32) -> usize {
    let per_frame = mode.samples_per_frame().max(1);
    SAMPLES_PER_BUFFER * (dma_buffer_len / per_frame).max(1) as usize
}

/// Circular stereo delay line.
#[derive(Clone, Debug)]
pub(crate) struct DelayLine {
    buf: Vec<Frame>,
    pos: usize,
}

impl DelayLine {
    pub(crate) fn new(len: usize) -> Self {
        Self { buf: vec![Frame::silence(); len.max(1)], pos: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    /// Frame written `len - offset` frames ago.
    pub(crate) fn tap(&self, offset: usize) -> Frame {
        self.buf[(self.pos + offset) % self.buf.len()]
    }

    /// Store at the current position and move on.
    pub(crate) fn push(&mut self, frame: Frame) {
        self.buf[self.pos] = frame;
        self.pos = (self.pos + 1) % self.buf.len();
    }

    pub(crate) fn clear(&mut self) {
        self.buf.fill(Frame::silence());
        self.pos = 0;
    }
}
