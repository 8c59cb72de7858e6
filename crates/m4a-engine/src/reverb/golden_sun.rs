//! Cross-fed stereo reverb, optionally with a low-pass in the feedback path.

use m4a_ir::{Frame, SAMPLES_PER_BUFFER};

use super::{DelayLine, Reverb};

/// Feedback low-pass coefficient.
const LP_ALPHA: f32 = 0.5;

pub struct GoldenSunReverb {
    line: DelayLine,
    gain: f32,
    low_pass: bool,
    lp_left: f32,
    lp_right: f32,
}

impl GoldenSunReverb {
    pub fn new(gain: f32, len: usize, low_pass: bool) -> Self {
        Self { line: DelayLine::new(len), gain, low_pass, lp_left: 0.0, lp_right: 0.0 }
    }
}

impl Reverb for GoldenSunReverb {
    fn process(&mut self, frames: &mut [Frame]) {
        let g = self.gain * 0.5;
        for frame in frames {
            let a = self.line.tap(0);
            let b = self.line.tap(SAMPLES_PER_BUFFER);
            // left hears the right history and vice versa
            let mut fb_left = (a.right + b.right) * g;
            let mut fb_right = (a.left + b.left) * g;
            if self.low_pass {
                self.lp_left += LP_ALPHA * (fb_left - self.lp_left);
                self.lp_right += LP_ALPHA * (fb_right - self.lp_right);
                fb_left = self.lp_left;
                fb_right = self.lp_right;
            }
            frame.left += fb_left;
            frame.right += fb_right;
            self.line.push(*frame);
        }
    }

    fn reset(&mut self) {
        self.line.clear();
        self.lp_left = 0.0;
        self.lp_right = 0.0;
    }
}
