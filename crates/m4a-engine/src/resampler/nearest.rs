//! Nearest-neighbour resampling.

use super::{step, FetchFn, FetchWindow, Resampler};

/// Picks the closest source sample; no interpolation.
#[derive(Clone, Debug)]
pub struct NearestResampler {
    window: FetchWindow,
}

impl NearestResampler {
    pub fn new() -> Self {
        Self { window: FetchWindow::new(0) }
    }
}

impl Default for NearestResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resampler for NearestResampler {
    fn process(&mut self, out: &mut [f32], phase_inc: f32, fetch: &mut FetchFn<'_>) -> bool {
        if out.is_empty() {
            return true;
        }
        let ok = self.window.prefetch(out.len(), phase_inc, 2, fetch);
        let (mut pos, mut phase) = self.window.start();
        for o in out.iter_mut() {
            let idx = if phase >= 0.5 { pos + 1 } else { pos };
            *o = self.window.get(idx as isize);
            step(&mut pos, &mut phase, phase_inc);
        }
        self.window.finish(pos, phase);
        ok
    }

    fn reset(&mut self) {
        self.window.reset();
    }
}
