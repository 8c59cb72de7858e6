//! Audio output trait and error types.

use m4a_ir::Frame;
use thiserror::Error;

/// Error type for audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("device init error: {0}")]
    DeviceInit(#[from] cpal::DefaultStreamConfigError),
    #[error("stream create error: {0}")]
    StreamCreate(#[from] cpal::BuildStreamError),
    #[error("playback error: {0}")]
    Playback(#[from] cpal::PlayStreamError),
    #[error("pause error: {0}")]
    Pause(#[from] cpal::PauseStreamError),
}

/// Trait for audio output backends.
///
/// Writers never block: callers query [`free_frames`](Self::free_frames)
/// and render only what fits.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    /// Frames that can be written right now without dropping any.
    fn free_frames(&self) -> usize;

    /// Queue frames for playback. Returns how many were accepted.
    fn write(&mut self, frames: &[Frame]) -> usize;

    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;
}
