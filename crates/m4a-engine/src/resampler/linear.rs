//! Two-tap linear interpolation.

use super::{step, FetchFn, FetchWindow, Resampler};

#[derive(Clone, Debug)]
pub struct LinearResampler {
    window: FetchWindow,
}

impl LinearResampler {
    pub fn new() -> Self {
        Self { window: FetchWindow::new(0) }
    }
}

impl Default for LinearResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resampler for LinearResampler {
    fn process(&mut self, out: &mut [f32], phase_inc: f32, fetch: &mut FetchFn<'_>) -> bool {
        if out.is_empty() {
            return true;
        }
        let ok = self.window.prefetch(out.len(), phase_inc, 2, fetch);
        let (mut pos, mut phase) = self.window.start();
        for o in out.iter_mut() {
            let a = self.window.get(pos as isize);
            let b = self.window.get(pos as isize + 1);
            *o = a + phase * (b - a);
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
    fn interpolates_between_neighbours() {
        let data = [0.0, 1.0, 0.0, -1.0, 0.0];
        let mut r = LinearResampler::new();
        let mut out = [0.0f32; 6];
        r.process(&mut out, 0.5, &mut slice_fetch(&data));
        assert_eq!(out, [0.0, 0.5, 1.0, 0.5, 0.0, -0.5]);
    }
}
