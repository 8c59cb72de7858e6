//! Plain per-side feedback delay, for comparing against the driver variants.

use m4a_ir::Frame;

use super::{DelayLine, Reverb};

pub struct TestReverb {
    line: DelayLine,
    gain: f32,
}

impl TestReverb {
    pub fn new(gain: f32, len: usize) -> Self {
        Self { line: DelayLine::new(len), gain: gain * 0.5 }
    }
}

impl Reverb for TestReverb {
    fn process(&mut self, frames: &mut [Frame]) {
        for frame in frames {
            let t = self.line.tap(0);
            frame.left += t.left * self.gain;
            frame.right += t.right * self.gain;
            self.line.push(*frame);
        }
    }

    fn reset(&mut self) {
        self.line.clear();
    }
}
