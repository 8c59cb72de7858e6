//! Default MP2K reverb: two taps one block apart, mono-summed feedback.

use m4a_ir::{Frame, SAMPLES_PER_BUFFER};

use super::{DelayLine, Reverb};

pub struct NormalReverb {
    line: DelayLine,
    gain: f32,
}

impl NormalReverb {
    pub fn new(gain: f32, len: usize) -> Self {
        Self { line: DelayLine::new(len), gain }
    }
}

impl Reverb for NormalReverb {
    fn process(&mut self, frames: &mut [Frame]) {
        let g = self.gain * 0.25;
        for frame in frames {
            let a = self.line.tap(0);
            let b = self.line.tap(SAMPLES_PER_BUFFER);
            let fb = (a.left + a.right + b.left + b.right) * g;
            frame.left += fb;
            frame.right += fb;
            self.line.push(*frame);
        }
    }

    fn reset(&mut self) {
        self.line.clear();
    }
}
