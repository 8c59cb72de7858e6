//! Sample-rate conversion from a voice's source rate to the output rate.
//!
//! Every channel owns one boxed [`Resampler`]. Source samples are pulled on
//! demand through a fetch closure, which appends the requested number of
//! samples to the window and reports whether the source still had data.

mod blamp;
mod blep;
mod linear;
mod nearest;
mod sinc;

use m4a_ir::ResamplerType;

pub use blamp::BlampResampler;
pub use blep::BlepResampler;
pub use linear::LinearResampler;
pub use nearest::NearestResampler;
pub use sinc::SincResampler;

/// Source sample supplier: append `count` samples to the buffer.
///
/// Returns `false` once the source is exhausted; the samples appended past
/// the end must be zero.
pub type FetchFn<'a> = dyn FnMut(&mut Vec<f32>, usize) -> bool + 'a;

/// Converts a source stream into output samples at a variable ratio.
pub trait Resampler: Send {
    /// Fill `out` with resampled data.
    ///
    /// `phase_inc` is the number of source samples consumed per output
    /// sample. Returns `false` if the fetch closure reported exhaustion.
    fn process(&mut self, out: &mut [f32], phase_inc: f32, fetch: &mut FetchFn<'_>) -> bool;

    /// Drop buffered input and restart at phase zero.
    fn reset(&mut self);
}

/// Create a resampler of the given kind.
pub fn create_resampler(kind: ResamplerType) -> Box<dyn Resampler> {
    match kind {
        ResamplerType::Nearest => Box::new(NearestResampler::new()),
        ResamplerType::Linear => Box::new(LinearResampler::new()),
        ResamplerType::Sinc => Box::new(SincResampler::new()),
        ResamplerType::Blep => Box::new(BlepResampler::new()),
        ResamplerType::Blamp => Box::new(BlampResampler::new()),
    }
}

/// Input window shared by all resamplers.
///
/// `history` samples of already-played input stay in front of the read
/// position so wide kernels can look backwards.
#[derive(Clone, Debug)]
pub(crate) struct FetchWindow {
    buf: Vec<f32>,
    phase: f32,
    history: usize,
}

impl FetchWindow {
    pub(crate) fn new(history: usize) -> Self {
        Self { buf: vec![0.0; history], phase: 0.0, history }
    }

    pub(crate) fn reset(&mut self) {
        self.buf.clear();
        self.buf.resize(self.history, 0.0);
        self.phase = 0.0;
    }

    /// Ensure enough input for `n` outputs plus `lookahead` samples.
    pub(crate) fn prefetch(
        &mut self,
        n: usize,
        phase_inc: f32,
        lookahead: usize,
        fetch: &mut FetchFn<'_>,
    ) -> bool {
        let span = (self.phase + phase_inc * n as f32) as usize;
        let required = self.history + span + lookahead;
        if self.buf.len() >= required {
            return true;
        }
        let missing = required - self.buf.len();
        let ok = fetch(&mut self.buf, missing);
        if self.buf.len() < required {
            self.buf.resize(required, 0.0);
        }
        ok
    }

    /// Read position of the first output in this block.
    pub(crate) fn start(&self) -> (usize, f32) {
        (self.history, self.phase)
    }

    /// Sample at `idx`, zero outside the window.
    #[inline]
    pub(crate) fn get(&self, idx: isize) -> f32 {
        if idx < 0 {
            return 0.0;
        }
        self.buf.get(idx as usize).copied().unwrap_or(0.0)
    }

    /// Store the end position of a block, dropping fully consumed input.
    pub(crate) fn finish(&mut self, pos: usize, phase: f32) {
        let consumed = pos.saturating_sub(self.history).min(self.buf.len().saturating_sub(self.history));
        self.buf.drain(..consumed);
        self.phase = phase;
    }
}

/// Advance a read position by one output step.
#[inline]
pub(crate) fn step(pos: &mut usize, phase: &mut f32, phase_inc: f32) {
    *phase += phase_inc;
    let whole = *phase as usize;
    *phase -= whole as f32;
    *pos += whole;
}

/// Transition width in source samples for band-limited corrections.
#[inline]
pub(crate) fn transition_width(phase_inc: f32) -> f32 {
    phase_inc.clamp(1.0, 8.0)
}


#[cfg(test)]
mod tests {
    use super::test_util::slice_fetch;
    use super::*;

    const ALL: [ResamplerType; 5] = [
        ResamplerType::Nearest,
        ResamplerType::Linear,
        ResamplerType::Sinc,
        ResamplerType::Blep,
        ResamplerType::Blamp,
    ];

    #[test]
    fn every_kind_passes_dc_at_unity_ratio() {
        let data = vec![0.5f32; 4000];
        for kind in ALL {
            let mut r = create_resampler(kind);
            let mut fetch = slice_fetch(&data);
            let mut out = vec![0.0f32; 800];
            // warm up past the leading edge
            r.process(&mut out, 1.0, &mut fetch);
            r.process(&mut out, 1.0, &mut fetch);
            for (i, &v) in out.iter().enumerate() {
                assert!((v - 0.5).abs() < 0.02, "{kind}: sample {i} = {v}");
            }
        }
    }

    #[test]
    fn exhausted_source_reports_false_and_yields_silence() {
        let data = vec![1.0f32; 10];
        for kind in ALL {
            let mut r = create_resampler(kind);
            let mut fetch = slice_fetch(&data);
            let mut out = vec![0.0f32; 100];
            assert!(!r.process(&mut out, 1.0, &mut fetch), "{kind} should report exhaustion");
            r.process(&mut out, 1.0, &mut fetch);
            assert!(out.iter().all(|&v| v.abs() < 1e-6), "{kind} should be silent after the end");
        }
    }

    #[test]
    fn consumption_tracks_phase_increment() {
        let data: Vec<f32> = (0..10_000).map(|i| i as f32).collect();
        let mut r = LinearResampler::new();
        let mut fetch = slice_fetch(&data);
        let mut out = vec![0.0f32; 100];
        r.process(&mut out, 2.5, &mut fetch);
        assert!((out[0] - 0.0).abs() < 1e-4);
        assert!((out[1] - 2.5).abs() < 1e-4);
        assert!((out[99] - 247.5).abs() < 1e-2);
        r.process(&mut out, 2.5, &mut fetch);
        assert!((out[0] - 250.0).abs() < 1e-2);
    }

    #[test]
    fn reset_restarts_window() {
        let data: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let mut r = NearestResampler::new();
        let mut out = vec![0.0f32; 10];
        r.process(&mut out, 1.0, &mut slice_fetch(&data));
        r.reset();
        r.process(&mut out, 1.0, &mut slice_fetch(&data));
        assert_eq!(out[0], 0.0);
        assert_eq!(out[9], 9.0);
    }
}
