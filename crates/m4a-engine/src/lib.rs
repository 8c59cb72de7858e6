//! MP2K sound driver emulation.
//!
//! Interprets the song data of a ROM image and renders it block by block:
//! sequencer tracks drive voice channels, the mixer sums them into a stereo
//! block and a reverb stage post-processes it. [`PlaybackContext`] ties the
//! pieces together.

mod cgb_channel;
mod channel;
mod context;
mod envelope_state;
mod error;
mod frequency;
mod instrument;
mod mixer;
pub mod resampler;
pub mod reverb;
mod sample_source;
mod sound_channel;
mod track;
mod visualizer;
mod voice_pool;

pub use cgb_channel::CgbChannel;
pub use channel::Channel;
pub use context::{PlaybackContext, SharedRom, TempoScale, INITIAL_TEMPO};
pub use envelope_state::{EnvState, Envelope};
pub use error::EngineError;
pub use frequency::{noise_rate, note_frequency, sample_rate_for_key};
pub use instrument::{resolve as resolve_instrument, CgbVoice, Instrument, SynthParams, VoiceKind};
pub use mixer::Mixer;
pub use sample_source::{SampleEncoding, SynthShape};
pub use sound_channel::{SoundChannel, Waveform};
pub use track::{ModType, Track, TrackEvent, LEN_TABLE, MAX_CALL_DEPTH};
pub use visualizer::{TrackVisualizerState, VisualizerState};
pub use voice_pool::{CgbChannelId, SoundChannelId, VoicePool};
