//! Stereo f32 frames and fixed-size audio blocks.

use alloc::vec;
use alloc::vec::Vec;

/// Output stream rate in Hz.
pub const STREAM_SAMPLE_RATE: u32 = 48_000;

/// Sound driver frames (blocks) per second.
pub const AGB_FPS: u32 = 60;

/// Frames in one rendered block.
pub const SAMPLES_PER_BUFFER: usize = (STREAM_SAMPLE_RATE / AGB_FPS) as usize;

/// A stereo audio frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub right: f32,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0.0, right: 0.0 }
    }

    /// Create a frame from a left/right pair.
    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// Mix another frame into this one.
    pub fn mix(&mut self, other: Frame) {
        self.left += other.left;
        self.right += other.right;
    }

    /// True if both sides are exactly zero.
    pub fn is_silent(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

/// One block of interleaved stereo frames.
///
/// The buffer is allocated once at construction and overwritten every tick;
/// its length never changes afterwards.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    data: Vec<Frame>,
}

impl AudioBuffer {
    /// Create a new silent buffer with `frames` frames.
    pub fn new(frames: usize) -> Self {
        Self { data: vec![Frame::silence(); frames] }
    }

    /// Fill all frames with zero.
    pub fn silence(&mut self) {
        self.data.fill(Frame::silence());
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read-only access to the frames.
    pub fn frames(&self) -> &[Frame] {
        &self.data
    }

    /// Mutable access to the frames.
    pub fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.data
    }

    /// Sum overlapping frames from `source` into this buffer.
    pub fn mix_from(&mut self, source: &[Frame]) {
        for (dst, src) in self.data.iter_mut().zip(source) {
            dst.mix(*src);
        }
    }

    /// True if every frame is exactly zero.
    pub fn is_silent(&self) -> bool {
        self.data.iter().all(Frame::is_silent)
    }

    /// Iterate the buffer as interleaved `left, right` samples.
    pub fn interleaved(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.iter().flat_map(|f| [f.left, f.right])
    }
}
