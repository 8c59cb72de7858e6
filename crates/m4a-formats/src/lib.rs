//! Containers around the raw MP2K data: ROM images, song tables and WAV
//! output.
//!
//! The engine only consumes the `ByteSource` read interface; everything
//! that deals with files, cartridge headers and table discovery lives here.

mod rom;
mod rom_builder;
mod song_table;
mod wav_format;

pub use rom::{CartridgeHeader, Rom, CARTRIDGE_HEADER_POS};
pub use rom_builder::{RomBuilder, Voice};
pub use song_table::{SongHeader, SongTable, SongTableEntry, DEFAULT_MIN_ENTRIES};
pub use wav_format::{frames_to_wav, WavSink};

use thiserror::Error;

/// Error type for container parsing and file output.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("malformed binary data: {0}")]
    Binary(#[from] binrw::Error),
    #[error("ROM image is empty")]
    EmptyRom,
    #[error("no song table with at least {min_entries} entries found")]
    SongTableNotFound { min_entries: usize },
    #[error("no valid song table at position {pos:#x}")]
    InvalidSongTable { pos: usize },
}
