//! Short single-tap reverb used by one game's custom driver.

use m4a_ir::Frame;

use super::{DelayLine, Reverb};

pub struct MgatReverb {
    line: DelayLine,
    gain: f32,
}

impl MgatReverb {
    pub fn new(gain: f32, len: usize) -> Self {
        Self { line: DelayLine::new(len / 2), gain }
    }
}

impl Reverb for MgatReverb {
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
