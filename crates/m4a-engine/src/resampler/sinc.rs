//! Blackman-windowed sinc interpolation.
//!
//! The cut-off follows the decimation ratio so downsampling stays
//! band-limited; upsampling uses the full source bandwidth.

use core::f32::consts::PI;

use super::{step, FetchFn, FetchWindow, Resampler};

/// Half the kernel width in source samples.
const SINC_HALF: usize = 8;
const SINC_TAPS: usize = SINC_HALF * 2;

#[derive(Clone, Debug)]
pub struct SincResampler {
    window: FetchWindow,
}

impl SincResampler {
    pub fn new() -> Self {
        Self { window: FetchWindow::new(SINC_HALF - 1) }
    }
}

impl Default for SincResampler {
    fn default() -> Self {
        Self::new()
    }
}

fn sinc(x: f32) -> f32 {
    if x.abs() < 1e-6 {
        1.0
    } else {
        libm::sinf(PI * x) / (PI * x)
    }
}

fn blackman(x: f32) -> f32 {
    let u = ((x + SINC_HALF as f32) / SINC_TAPS as f32).clamp(0.0, 1.0);
    0.42 - 0.5 * libm::cosf(2.0 * PI * u) + 0.08 * libm::cosf(4.0 * PI * u)
}

impl Resampler for SincResampler {
    fn process(&mut self, out: &mut [f32], phase_inc: f32, fetch: &mut FetchFn<'_>) -> bool {
        if out.is_empty() {
            return true;
        }
        let ok = self.window.prefetch(out.len(), phase_inc, SINC_HALF + 2, fetch);
        let cutoff = if phase_inc > 1.0 { 1.0 / phase_inc } else { 1.0 };
        let (mut pos, mut phase) = self.window.start();
        for o in out.iter_mut() {
            let first = pos as isize - (SINC_HALF as isize - 1);
            let mut acc = 0.0f32;
            let mut norm = 0.0f32;
            for k in 0..SINC_TAPS {
                let x = k as f32 - (SINC_HALF - 1) as f32 - phase;
                let w = sinc(x * cutoff) * blackman(x);
                acc += self.window.get(first + k as isize) * w;
                norm += w;
            }
            *o = if norm.abs() > 1e-9 { acc / norm } else { 0.0 };
            step(&mut pos, &mut phase, phase_inc);
        }
        self.window.finish(pos, phase);
        ok
    }

    fn reset(&mut self) {
        self.window.reset();
    }
}
