//! Core data model for the m4a sound driver emulator.
//!
//! This crate defines the plain types shared by the sequencer, the mixer,
//! the exporter and the front-ends: audio frames and blocks, notes and
//! instrument parameters, song descriptors, the sound-mode configuration
//! snapshots and the narrow `ByteSource` read interface over ROM bytes.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod audio_buffer;
mod byte_source;
mod config;
mod note;
mod song;

pub use audio_buffer::{AudioBuffer, Frame, AGB_FPS, SAMPLES_PER_BUFFER, STREAM_SAMPLE_RATE};
pub use byte_source::{agb_pos_to_ptr, agb_ptr_to_pos, is_valid_agb_ptr, ByteSource, AGB_MAP_ROM, AGB_ROM_MAX};
pub use config::{
    CgbPolyphony, EngineSoundMode, MixingArgs, Mp2kSoundMode, ParseEnumError, ResamplerType,
    ReverbType, ENGINE_RATES,
};
pub use note::{Adsr, Note, SampleInfo, NOTE_TIE};
pub use song::{PlaylistEntry, SongInfo, SongTableInfo, MAX_TRACKS, PROG_UNDEFINED};
