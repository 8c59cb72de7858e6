//! In-memory output with a fixed capacity, used headless and in tests.

use m4a_ir::{Frame, STREAM_SAMPLE_RATE};

use crate::traits::{AudioError, AudioOutput};

/// Collects written frames. `drain` plays the role of the device callback.
#[derive(Debug)]
pub struct MemoryOutput {
    capacity: usize,
    frames: Vec<Frame>,
    running: bool,
}

impl MemoryOutput {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, frames: Vec::with_capacity(capacity), running: false }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Consume up to `count` queued frames.
    pub fn drain(&mut self, count: usize) -> Vec<Frame> {
        let n = count.min(self.frames.len());
        self.frames.drain(..n).collect()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl AudioOutput for MemoryOutput {
    fn sample_rate(&self) -> u32 {
        STREAM_SAMPLE_RATE
    }

    fn free_frames(&self) -> usize {
        self.capacity - self.frames.len()
    }

    fn write(&mut self, frames: &[Frame]) -> usize {
        let n = frames.len().min(self.free_frames());
        self.frames.extend_from_slice(&frames[..n]);
        n
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_never_exceeds_capacity() {
        let mut out = MemoryOutput::new(4);
        assert_eq!(out.write(&[Frame::new(1.0, 1.0); 3]), 3);
        assert_eq!(out.free_frames(), 1);
        assert_eq!(out.write(&[Frame::new(2.0, 2.0); 3]), 1);
        assert_eq!(out.free_frames(), 0);
        assert_eq!(out.write(&[Frame::silence()]), 0);
    }

    #[test]
    fn drain_frees_space_in_order() {
        let mut out = MemoryOutput::new(4);
        out.write(&[Frame::new(1.0, 0.0), Frame::new(2.0, 0.0), Frame::new(3.0, 0.0)]);
        let played = out.drain(2);
        assert_eq!(played, vec![Frame::new(1.0, 0.0), Frame::new(2.0, 0.0)]);
        assert_eq!(out.frames(), &[Frame::new(3.0, 0.0)]);
        assert_eq!(out.free_frames(), 3);
    }

    #[test]
    fn start_stop_toggle_running() {
        let mut out = MemoryOutput::new(1);
        out.start().unwrap();
        assert!(out.is_running());
        out.stop().unwrap();
        assert!(!out.is_running());
    }
}
