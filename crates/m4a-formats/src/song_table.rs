//! Song table discovery and lookup.

use std::io::Cursor;

use binrw::BinRead;
use m4a_ir::{agb_ptr_to_pos, ByteSource, PlaylistEntry, SongTableInfo, MAX_TRACKS};
use tracing::debug;

use crate::FormatError;

/// Run length `SongTable::locate` asks for when the caller has no better guess.
pub const DEFAULT_MIN_ENTRIES: usize = 4;

const ENTRY_SIZE: usize = 8;

/// Music players a driver instance can have.
const MAX_PLAYERS: u16 = 32;

/// One 8-byte song table entry.
#[derive(BinRead, Clone, Copy, Debug, PartialEq, Eq)]
#[br(little)]
pub struct SongTableEntry {
    pub header_ptr: u32,
    /// Music player the song is bound to.
    pub player: u16,
    pub unused: u16,
}

/// Song header: fixed part plus one pointer per track.
#[derive(BinRead, Clone, Debug, PartialEq, Eq)]
#[br(little)]
pub struct SongHeader {
    pub num_tracks: u8,
    pub num_blocks: u8,
    pub priority: u8,
    pub reverb: u8,
    pub voice_group_ptr: u32,
    #[br(count = num_tracks as usize)]
    pub track_ptrs: Vec<u32>,
}

impl SongHeader {
    /// Decode the header at `pos`, rejecting anything a player could not start.
    pub fn read_at(rom: &dyn ByteSource, pos: usize) -> Option<Self> {
        let num_tracks = rom.read_u8(pos)? as usize;
        if num_tracks > MAX_TRACKS {
            return None;
        }
        let raw = rom.read_bytes(pos, 8 + num_tracks * 4)?;
        let header = SongHeader::read(&mut Cursor::new(raw)).ok()?;
        let in_rom = |ptr: u32| agb_ptr_to_pos(ptr).is_some_and(|p| p < rom.len());
        if !in_rom(header.voice_group_ptr) {
            return None;
        }
        if !header.track_ptrs.iter().all(|&p| in_rom(p)) {
            return None;
        }
        Some(header)
    }
}

/// A run of consecutive valid song table entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SongTable {
    pos: usize,
    entries: Vec<SongTableEntry>,
}

impl SongTable {
    /// Read the table starting at `pos`, counting entries until the first
    /// invalid one.
    pub fn at(rom: &dyn ByteSource, pos: usize) -> Result<Self, FormatError> {
        let entries = read_entries(rom, pos, usize::MAX);
        if entries.is_empty() {
            return Err(FormatError::InvalidSongTable { pos });
        }
        debug!(pos, count = entries.len(), "song table read");
        Ok(Self { pos, entries })
    }

    /// Scan 4-aligned positions for the first run of at least `min_entries`
    /// valid entries.
    pub fn locate(rom: &dyn ByteSource, min_entries: usize) -> Result<Self, FormatError> {
        let min_entries = min_entries.max(1);
        let last = rom.len().saturating_sub(min_entries * ENTRY_SIZE);
        for pos in (0..=last).step_by(4) {
            if read_entries(rom, pos, min_entries).len() == min_entries {
                return Self::at(rom, pos);
            }
        }
        Err(FormatError::SongTableNotFound { min_entries })
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SongTableEntry] {
        &self.entries
    }

    pub fn info(&self) -> SongTableInfo {
        SongTableInfo { pos: self.pos, count: self.entries.len() }
    }

    /// ROM position of song `uid`'s header.
    pub fn pos_of_song(&self, uid: u16) -> Option<usize> {
        self.entries.get(uid as usize).and_then(|e| agb_ptr_to_pos(e.header_ptr))
    }

    /// Music player the song is assigned to.
    pub fn player_of_song(&self, uid: u16) -> Option<u8> {
        self.entries.get(uid as usize).map(|e| e.player as u8)
    }

    /// Playlist covering every song, named by index.
    pub fn playlist(&self) -> Vec<PlaylistEntry> {
        (0..self.entries.len())
            .map(|i| PlaylistEntry::new(format!("Song {i:04}"), i as u16))
            .collect()
    }
}

fn read_entries(rom: &dyn ByteSource, pos: usize, limit: usize) -> Vec<SongTableEntry> {
    let mut entries = Vec::new();
    let mut cur = pos;
    while entries.len() < limit {
        let Some(raw) = rom.read_bytes(cur, ENTRY_SIZE) else {
            break;
        };
        let Ok(entry) = SongTableEntry::read(&mut Cursor::new(raw)) else {
            break;
        };
        let valid = entry.player < MAX_PLAYERS
            && agb_ptr_to_pos(entry.header_ptr).is_some_and(|p| SongHeader::read_at(rom, p).is_some());
        if !valid {
            break;
        }
        entries.push(entry);
        cur += ENTRY_SIZE;
    }
    entries
}
