//! Band-limited linear interpolation.
//!
//! Linear interpolation corrected with a polyBLAMP residual at every slope
//! change of the input polyline.

use super::{step, transition_width, FetchFn, FetchWindow, Resampler};

const HISTORY: usize = 10;
const REACH: isize = 9;

#[derive(Clone, Debug)]
pub struct BlampResampler {
    window: FetchWindow,
}

impl BlampResampler {
    pub fn new() -> Self {
        Self { window: FetchWindow::new(HISTORY) }
    }
}

impl Default for BlampResampler {
    fn default() -> Self {
        Self::new()
    }
}

/// PolyBLAMP residual of a unit slope change at distance `t`.
pub(crate) fn poly_blamp(t: f32) -> f32 {
    if t > -1.0 && t < 0.0 {
        let u = 1.0 + t;
        u * u * u / 6.0
    } else if (0.0..1.0).contains(&t) {
        let u = 1.0 - t;
        u * u * u / 6.0
    } else {
        0.0
    }
}

impl Resampler for BlampResampler {
    fn process(&mut self, out: &mut [f32], phase_inc: f32, fetch: &mut FetchFn<'_>) -> bool {
        if out.is_empty() {
            return true;
        }
        let ok = self.window.prefetch(out.len(), phase_inc, REACH as usize + 3, fetch);
        let width = transition_width(phase_inc);
        let (mut pos, mut phase) = self.window.start();
        for o in out.iter_mut() {
            let base = pos as isize;
            let t = base as f32 + phase;
            let a = self.window.get(base);
            let b = self.window.get(base + 1);
            let mut acc = a + phase * (b - a);
            for j in (base - REACH + 1)..=(base + REACH) {
                let bend = self.window.get(j + 1) - 2.0 * self.window.get(j) + self.window.get(j - 1);
                if bend != 0.0 {
                    acc += bend * width * poly_blamp((t - j as f32) / width);
                }
            }
            *o = acc;
            step(&mut pos, &mut phase, phase_inc);
        }
        self.window.finish(pos, phase);
        ok
    }

    fn reset(&mut self) {
        self.window.reset();
    }
}
