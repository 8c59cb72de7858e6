//! Band-limited zero-order hold.
//!
//! The held input is corrected with a polyBLEP residual around every input
//! step, which removes most of the aliasing a plain sample-and-hold produces
//! on square and saw edges.

use super::{step, transition_width, FetchFn, FetchWindow, Resampler};

const HISTORY: usize = 10;
/// Steps farther than this from the read position never contribute.
const REACH: isize = 9;

#[derive(Clone, Debug)]
pub struct BlepResampler {
    window: FetchWindow,
}

impl BlepResampler {
    pub fn new() -> Self {
        Self { window: FetchWindow::new(HISTORY) }
    }
}

impl Default for BlepResampler {
    fn default() -> Self {
        Self::new()
    }
}

/// PolyBLEP residual of a unit step at distance `t` (in transition widths).
pub(crate) fn poly_blep(t: f32) -> f32 {
    if t > -1.0 && t < 0.0 {
        let u = 1.0 + t;
        u * u * 0.5
    } else if (0.0..1.0).contains(&t) {
        let u = 1.0 - t;
        -u * u * 0.5
    } else {
        0.0
    }
}

impl Resampler for BlepResampler {
    fn process(&mut self, out: &mut [f32], phase_inc: f32, fetch: &mut FetchFn<'_>) -> bool {
        if out.is_empty() {
            return true;
        }
        let ok = self.window.prefetch(out.len(), phase_inc, REACH as usize + 2, fetch);
        let width = transition_width(phase_inc);
        let (mut pos, mut phase) = self.window.start();
        for o in out.iter_mut() {
            let base = pos as isize;
            let t = base as f32 + phase;
            let mut acc = self.window.get(base);
            for j in (base - REACH + 1)..=(base + REACH) {
                let delta = self.window.get(j) - self.window.get(j - 1);
                if delta != 0.0 {
                    acc += delta * poly_blep((t - j as f32) / width);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resampler::test_util::slice_fetch;

    #[test]
    fn residual_is_continuous_across_the_step() {
        // held value jumps by one at t = 0; corrected signal must not
        assert!((poly_blep(-1e-4) - (1.0 + poly_blep(1e-4))).abs() < 1e-3);
        assert_eq!(poly_blep(-1.0), 0.0);
        assert_eq!(poly_blep(1.0), 0.0);
    }

    #[test]
    fn step_edge_is_smoothed() {
        let mut data = vec![0.0f32; 40];
        data[20..].fill(1.0);
        let mut r = BlepResampler::new();
        let mut out = vec![0.0f32; 160];
        r.process(&mut out, 0.25, &mut slice_fetch(&data));
        // output index 4*k sits on input k; the edge spans 19..21
        assert!(out[72] < 0.01);
        assert!(out[76] > 0.0 && out[76] < 0.5);
        assert!(out[80] > 0.5 && out[80] < 1.0);
        assert!(out[88] > 0.99);
        for pair in out[70..90].windows(2) {
            assert!(pair[1] >= pair[0] - 1e-6, "edge should rise monotonically");
        }
    }
}
