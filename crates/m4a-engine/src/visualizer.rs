//! Read-only playback snapshots for track and keyboard displays.

use crate::track::Track;

/// Display state of one track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackVisualizerState {
    pub pos: usize,
    pub delay: u8,
    pub program: u16,
    pub vol: u8,
    pub pan: i8,
    pub modulation: u8,
    /// Pitch offset in 1/64 semitones.
    pub pitch: i32,
    /// Held keys (bit = MIDI key).
    pub active_notes: u128,
    pub enabled: bool,
    pub muted: bool,
    pub solo: bool,
    pub harmony: bool,
}

impl TrackVisualizerState {
    pub fn from_track(track: &Track) -> Self {
        Self {
            pos: track.pos(),
            delay: track.delay(),
            program: track.program(),
            vol: track.volume(),
            pan: track.pan(),
            modulation: track.modulation(),
            pitch: track.pitch(),
            active_notes: track.active_notes,
            enabled: track.is_enabled(),
            muted: track.muted,
            solo: track.solo,
            harmony: track.harmony,
        }
    }
}

/// Display state of a playback context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisualizerState {
    /// Tempo in BPM.
    pub tempo: u16,
    pub active_channels: usize,
    pub paused: bool,
    pub tracks: Vec<TrackVisualizerState>,
}
