//! Song descriptors and playlist entries.

use alloc::string::String;

/// Upper bound on tracks per song.
pub const MAX_TRACKS: usize = 16;

/// Program number of a track that has not received a VOICE command yet.
pub const PROG_UNDEFINED: u16 = 0xFFFF;

/// Immutable descriptor of the song a playback context is playing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SongInfo {
    /// ROM position of the song header.
    pub header_pos: usize,
    /// ROM position of the voice group (instrument table).
    pub voice_table_pos: usize,
    /// Effective reverb intensity (0-127).
    pub reverb: u8,
    pub priority: u8,
    /// Tracks actually initialized (after clamping).
    pub num_tracks: u8,
    /// Music player index from the song table entry.
    pub player: u8,
}

/// Song table location and size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SongTableInfo {
    /// ROM position of the first entry.
    pub pos: usize,
    /// Number of consecutive valid entries.
    pub count: usize,
}

/// One song in a playlist.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlaylistEntry {
    /// Display name (also used for export file names).
    pub name: String,
    /// Song table index.
    pub id: u16,
}

impl PlaylistEntry {
    pub fn new(name: impl Into<String>, id: u16) -> Self {
        Self { name: name.into(), id }
    }

    /// Name with path separators replaced, safe to use as a file name.
    pub fn file_safe_name(&self) -> String {
        self.name.replace(['/', '\\'], "_")
    }
}
