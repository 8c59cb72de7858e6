//! Note events and the per-voice parameters handed to a channel at note-on.

/// Note length marking a tied note (waits for an explicit note-off).
pub const NOTE_TIE: u8 = 0;

/// A note-on event produced by the sequencer.
///
/// Created once per note-on and never mutated afterwards; the channel
/// keeps its own countdown of the remaining length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Note {
    /// Length in sequencer ticks ([`NOTE_TIE`] = until note-off).
    pub length: u8,
    /// Key as written in the track (used to match note-off events).
    pub midi_key_track_data: u8,
    /// Key used for pitch (differs for drum kits and fixed keys).
    pub midi_key_pitch: u8,
    pub velocity: u8,
    /// Allocation priority (song priority plus track priority, saturated).
    pub priority: u8,
    /// Drum-kit pan override, -64..=63 (0 when unset).
    pub rhythm_pan: i8,
    pub pseudo_echo_vol: u8,
    pub pseudo_echo_len: u8,
    /// Owning track index.
    pub track_idx: u8,
    /// Owning music player index from the song table.
    pub player_idx: u8,
}

impl Note {
    /// Returns true if this note is held until an explicit note-off.
    pub fn is_tie(&self) -> bool {
        self.length == NOTE_TIE
    }

    /// Returns true if a pseudo echo tail is configured.
    pub fn has_pseudo_echo(&self) -> bool {
        self.pseudo_echo_vol > 0 && self.pseudo_echo_len > 0
    }
}

/// Attack/decay/sustain/release bytes as stored in a voice group entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Adsr {
    pub att: u8,
    pub dec: u8,
    pub sus: u8,
    pub rel: u8,
}

impl Default for Adsr {
    fn default() -> Self {
        Self { att: 0xFF, dec: 0x00, sus: 0xFF, rel: 0x00 }
    }
}

impl Adsr {
    pub const fn new(att: u8, dec: u8, sus: u8, rel: u8) -> Self {
        Self { att, dec, sus, rel }
    }

    /// Decode from the packed little-endian `att, dec, sus, rel` word.
    pub fn from_u32(raw: u32) -> Self {
        let [att, dec, sus, rel] = raw.to_le_bytes();
        Self { att, dec, sus, rel }
    }
}

/// Location and playback bounds of a PCM sample in ROM.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SampleInfo {
    /// ROM position of the first sample byte (after the header).
    pub sample_pos: usize,
    /// Playback rate in Hz when played at middle C.
    pub mid_c_freq: f32,
    /// Loop start, in samples.
    pub loop_pos: u32,
    /// Sample length, in samples.
    pub end_pos: u32,
    pub loop_enabled: bool,
}
