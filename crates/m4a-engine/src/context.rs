//! PlaybackContext: one song, advanced one block at a time.
//!
//! Per block the order is fixed: sequencer ticks (which may start and
//! release channels), channel volume/pitch updates, mixing, reverb, and
//! finally reaping of finished channels.

use std::sync::Arc;

use arrayvec::ArrayVec;
use m4a_ir::{
    AudioBuffer, ByteSource, EngineSoundMode, MixingArgs, Mp2kSoundMode, Note, SongInfo, MAX_TRACKS,
    PROG_UNDEFINED, SAMPLES_PER_BUFFER,
};
use tracing::{debug, warn};

use crate::cgb_channel::CgbChannel;
use crate::channel::Channel;
use crate::error::EngineError;
use crate::instrument::{self, VoiceKind};
use crate::mixer::Mixer;
use crate::reverb::{create_reverb, delay_len, Reverb};
use crate::sound_channel::{SoundChannel, Waveform};
use crate::track::{Track, TrackEvent};
use crate::visualizer::{TrackVisualizerState, VisualizerState};
use crate::voice_pool::VoicePool;

/// ROM image shared between a host and its playback contexts.
pub type SharedRom = Arc<dyn ByteSource + Send + Sync>;

/// Tempo at song start, in BPM.
pub const INITIAL_TEMPO: u16 = 150;

/// Accumulated tempo units per sequencer tick (150 BPM at normal speed).
const TICK_THRESHOLD: u32 = INITIAL_TEMPO as u32 * 2;

/// Size of the fixed part of a song header.
const SONG_HEADER_SIZE: usize = 8;

/// Playback speed multiplier. Only the sequencer rate changes, never pitch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TempoScale {
    Half,
    #[default]
    Normal,
    Double,
}

impl TempoScale {
    /// Tempo units added per BPM per block.
    fn units(self) -> u32 {
        match self {
            TempoScale::Half => 1,
            TempoScale::Normal => 2,
            TempoScale::Double => 4,
        }
    }
}

/// State of one playing song.
pub struct PlaybackContext {
    rom: SharedRom,
    mp2k_mode: Mp2kSoundMode,
    engine_mode: EngineSoundMode,
    args: MixingArgs,
    song: SongInfo,
    tracks: ArrayVec<Track, MAX_TRACKS>,
    pool: VoicePool,
    mixer: Mixer,
    reverb: Box<dyn Reverb>,
    master: AudioBuffer,
    tempo: u16,
    tempo_counter: u32,
    tempo_scale: TempoScale,
    events: Vec<TrackEvent>,
    paused: bool,
}

impl PlaybackContext {
    /// Create an idle context. Nothing plays until [`init_song`](Self::init_song).
    pub fn new(rom: SharedRom, mp2k_mode: Mp2kSoundMode, engine_mode: EngineSoundMode) -> Self {
        let delay = delay_len(&mp2k_mode, engine_mode.dma_buffer_len);
        Self {
            rom,
            mp2k_mode,
            engine_mode,
            args: MixingArgs::new(&mp2k_mode),
            song: SongInfo::default(),
            tracks: ArrayVec::new(),
            pool: VoicePool::new(mp2k_mode.max_channels, engine_mode.cgb_polyphony),
            mixer: Mixer::new(0),
            reverb: create_reverb(engine_mode.reverb, 0, delay),
            master: AudioBuffer::new(SAMPLES_PER_BUFFER),
            tempo: INITIAL_TEMPO,
            tempo_counter: 0,
            tempo_scale: TempoScale::Normal,
            events: Vec::new(),
            paused: false,
        }
    }

    /// Reset everything and start the song whose header is at `pos`.
    pub fn init_song(&mut self, pos: usize) -> Result<(), EngineError> {
        self.init_song_for_player(pos, 0)
    }

    /// Like [`init_song`](Self::init_song), tagging every note with the
    /// music player named by the song table entry.
    pub fn init_song_for_player(&mut self, pos: usize, player: u8) -> Result<(), EngineError> {
        let rom = Arc::clone(&self.rom);
        let header = rom
            .read_bytes(pos, SONG_HEADER_SIZE)
            .ok_or(EngineError::SongHeaderOutOfRange { pos })?;
        let (declared, priority, header_reverb) = (header[0], header[2], header[3]);
        let voice_table_pos = rom.read_agb_ptr(pos + 4).ok_or(EngineError::InvalidVoiceGroup { pos })?;

        let limit = (self.engine_mode.track_limit as usize).min(MAX_TRACKS);
        let num_tracks = (declared as usize).min(limit);
        self.tracks.clear();
        for i in 0..num_tracks {
            let ptr_pos = pos + SONG_HEADER_SIZE + i * 4;
            match rom.read_agb_ptr(ptr_pos) {
                Some(track_pos) => self.tracks.push(Track::new(track_pos)),
                None => {
                    warn!(song = pos, track = i, "invalid track pointer, track disabled");
                    let mut track = Track::new(0);
                    track.disable();
                    self.tracks.push(track);
                }
            }
        }

        let reverb = if header_reverb & 0x80 != 0 {
            header_reverb & 0x7F
        } else if self.mp2k_mode.rev & 0x80 != 0 {
            self.mp2k_mode.rev & 0x7F
        } else {
            0
        };

        self.song = SongInfo { header_pos: pos, voice_table_pos, reverb, priority, num_tracks: num_tracks as u8, player };
        self.pool.clear();
        self.mixer.reset(num_tracks);
        let delay = delay_len(&self.mp2k_mode, self.engine_mode.dma_buffer_len);
        self.reverb = create_reverb(self.engine_mode.reverb, reverb, delay);
        self.master.silence();
        self.tempo = INITIAL_TEMPO;
        self.tempo_counter = 0;
        self.paused = false;
        debug!(pos, player, tracks = num_tracks, reverb, priority, "song initialized");
        Ok(())
    }

    /// Render one block into the master buffer.
    pub fn sound_main(&mut self) {
        if self.paused {
            self.master.silence();
            return;
        }
        self.tempo_counter += self.tempo as u32 * self.tempo_scale.units();
        while self.tempo_counter >= TICK_THRESHOLD {
            self.tempo_counter -= TICK_THRESHOLD;
            self.sequencer_tick();
        }
        self.update_channels();
        self.mixer.mix(&*self.rom, &mut self.pool, &self.tracks, &self.args, &mut self.master);
        self.reverb.process(self.master.frames_mut());
        self.pool.reap();
    }

    fn sequencer_tick(&mut self) {
        self.pool.tick_notes();
        let mut events = std::mem::take(&mut self.events);
        for idx in 0..self.tracks.len() {
            events.clear();
            self.tracks[idx].tick(&*self.rom, self.engine_mode.max_loops, &mut events);
            for &event in &events {
                self.apply_event(idx, event);
            }
        }
        self.events = events;
    }

    fn apply_event(&mut self, idx: usize, event: TrackEvent) {
        match event {
            TrackEvent::NoteOn { key, velocity, length } => self.note_on(idx, key, velocity, length),
            TrackEvent::NoteOff { key } => self.pool.release_key(idx, key),
            TrackEvent::ReleaseTies => self.pool.release_ties(idx),
            TrackEvent::Tempo(bpm) => self.tempo = bpm,
        }
    }

    fn note_on(&mut self, idx: usize, key: u8, velocity: u8, length: u8) {
        let track = &self.tracks[idx];
        let program = track.program();
        if program == PROG_UNDEFINED {
            return;
        }
        let shifted = (key as i32 + track.key_shift() as i32).clamp(0, 127) as u8;
        let Some(inst) = instrument::resolve(&*self.rom, self.song.voice_table_pos, program as u8, shifted) else {
            debug!(track = idx, program, key, "unresolvable instrument, note skipped");
            return;
        };
        let (echo_vol, echo_len) = track.echo();
        let note = Note {
            length,
            midi_key_track_data: key,
            midi_key_pitch: inst.pitch_key,
            velocity,
            priority: self.song.priority.saturating_add(track.priority()),
            rhythm_pan: inst.rhythm_pan,
            pseudo_echo_vol: echo_vol,
            pseudo_echo_len: echo_len,
            track_idx: idx as u8,
            player_idx: self.song.player,
        };
        let (vol, pan, pitch) = (track.volume(), track.pan(), track.pitch());

        let order = self.pool.next_start_order();
        let mode = &self.engine_mode;
        match inst.kind {
            VoiceKind::Sample { info, encoding, fixed } => {
                let resampler = if fixed { mode.resampler_fixed } else { mode.resampler_normal };
                let waveform = Waveform::pcm(info, encoding, fixed);
                let mut ch = SoundChannel::new(note, inst.adsr, waveform, resampler, order);
                ch.set_vol(vol, pan);
                ch.set_pitch(pitch);
                self.pool.add_sound(ch);
            }
            VoiceKind::Synth(params) => {
                let mut ch = SoundChannel::new(note, inst.adsr, Waveform::synth(params), mode.resampler_normal, order);
                ch.set_vol(vol, pan);
                ch.set_pitch(pitch);
                self.pool.add_sound(ch);
            }
            VoiceKind::Cgb(voice) => {
                let mut ch = CgbChannel::new(&*self.rom, note, inst.adsr, voice, mode, mode.resampler_normal, order);
                ch.set_vol(vol, pan);
                ch.set_pitch(pitch);
                self.pool.add_cgb(ch);
            }
        }
    }

    fn update_channels(&mut self) {
        for (idx, track) in self.tracks.iter_mut().enumerate() {
            if track.take_vol_update() {
                self.pool.set_track_vol(idx, track.volume(), track.pan());
            }
            if track.take_pitch_update() {
                self.pool.set_track_pitch(idx, track.pitch());
            }
            track.active_notes = self.pool.active_keys(idx);
        }
    }

    /// True once every track has stopped and no channel can sound.
    pub fn has_ended(&self) -> bool {
        self.tracks.iter().all(|t| !t.is_enabled()) && self.pool.all_dead()
    }

    /// Freeze playback. Envelopes and cursors keep their state.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Hard stop: tracks disabled, channels dropped, reverb cleared.
    pub fn stop(&mut self) {
        for track in &mut self.tracks {
            track.disable();
            track.active_notes = 0;
        }
        self.pool.clear();
        self.reverb.reset();
        self.mixer.reset(self.tracks.len());
        self.master.silence();
        self.paused = false;
    }

    pub fn set_tempo_scale(&mut self, scale: TempoScale) {
        self.tempo_scale = scale;
    }

    pub fn tempo_scale(&self) -> TempoScale {
        self.tempo_scale
    }

    pub fn set_mute(&mut self, track: usize, muted: bool) {
        if let Some(t) = self.tracks.get_mut(track) {
            t.muted = muted;
        }
    }

    pub fn set_solo(&mut self, track: usize, solo: bool) {
        if let Some(t) = self.tracks.get_mut(track) {
            t.solo = solo;
        }
    }

    pub fn set_harmony(&mut self, track: usize, harmony: bool) {
        if let Some(t) = self.tracks.get_mut(track) {
            t.harmony = harmony;
        }
    }

    /// Last rendered block.
    pub fn master(&self) -> &AudioBuffer {
        &self.master
    }

    /// Dry per-track output of the last rendered block.
    pub fn track_buffers(&self) -> &[AudioBuffer] {
        self.mixer.track_buffers()
    }

    pub fn song(&self) -> &SongInfo {
        &self.song
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Current tempo in BPM.
    pub fn tempo(&self) -> u16 {
        self.tempo
    }

    pub fn mixing_args(&self) -> &MixingArgs {
        &self.args
    }

    pub fn engine_mode(&self) -> &EngineSoundMode {
        &self.engine_mode
    }

    /// Channels currently allocated.
    pub fn active_channels(&self) -> usize {
        self.pool.len()
    }

    /// Snapshot for track and keyboard displays.
    pub fn visualizer_state(&self) -> VisualizerState {
        VisualizerState {
            tempo: self.tempo,
            active_channels: self.pool.len(),
            paused: self.paused,
            tracks: self.tracks.iter().map(TrackVisualizerState::from_track).collect(),
        }
    }
}
