//! Engine error type.

use thiserror::Error;

/// Errors raised while setting up playback.
///
/// Corruption found while rendering is never reported through this type; it
/// ends the affected track and is logged instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("song header at {pos:#x} lies outside the ROM")]
    SongHeaderOutOfRange { pos: usize },

    #[error("song header at {pos:#x} has an invalid voice group pointer")]
    InvalidVoiceGroup { pos: usize },
}
