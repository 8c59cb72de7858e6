//! Headless host for the m4a player.
//!
//! Ties the engine to the outside world: batch export of song lists to WAV
//! files, live playback through an audio device, and the TOML player
//! configuration both are built from. The CLI is a thin layer over this
//! crate.

mod config;
mod exporter;
mod live;

pub use config::{ConfigError, Mp2kConfig, PlayerConfig};
pub use exporter::{
    CancelHandle, ExportError, ExportOptions, ExportSummary, SongReport, SoundExporter, WorkQueue, DEFAULT_MAX_BLOCKS,
};
pub use live::{LivePlayer, PlayerError};

// Re-export common types so callers don't need the lower crates directly.
pub use m4a_audio::{AudioOutput, CpalOutput, MemoryOutput};
pub use m4a_engine::{PlaybackContext, SharedRom, TempoScale, VisualizerState};
pub use m4a_formats::{FormatError, Rom, SongTable, DEFAULT_MIN_ENTRIES};
pub use m4a_ir::{EngineSoundMode, Mp2kSoundMode, PlaylistEntry};
