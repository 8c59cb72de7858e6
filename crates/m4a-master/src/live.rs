//! Live playback: one context feeding an audio output.

use m4a_audio::{AudioError, AudioOutput, CpalOutput};
use m4a_engine::{EngineError, PlaybackContext, SharedRom, TempoScale, VisualizerState};
use m4a_formats::SongTable;
use m4a_ir::{EngineSoundMode, Mp2kSoundMode, SAMPLES_PER_BUFFER};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("song {0} is not in the song table")]
    UnknownSong(u16),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Drives a playback context from a periodic tick.
///
/// `tick` never blocks: it renders only as many blocks as the output can
/// take right now.
pub struct LivePlayer<O: AudioOutput> {
    ctx: PlaybackContext,
    table: SongTable,
    output: O,
    current: Option<u16>,
}

impl LivePlayer<CpalOutput> {
    /// Player on the default audio device.
    pub fn with_default_device(
        rom: SharedRom,
        table: SongTable,
        mp2k_mode: Mp2kSoundMode,
        engine_mode: EngineSoundMode,
    ) -> Result<Self, PlayerError> {
        let (mut output, consumer) = CpalOutput::new()?;
        output.build_stream(consumer)?;
        Ok(Self::new(rom, table, mp2k_mode, engine_mode, output))
    }
}

impl<O: AudioOutput> LivePlayer<O> {
    pub fn new(rom: SharedRom, table: SongTable, mp2k_mode: Mp2kSoundMode, engine_mode: EngineSoundMode, output: O) -> Self {
        Self { ctx: PlaybackContext::new(rom, mp2k_mode, engine_mode), table, output, current: None }
    }

    pub fn play_song(&mut self, uid: u16) -> Result<(), PlayerError> {
        let pos = self.table.pos_of_song(uid).ok_or(PlayerError::UnknownSong(uid))?;
        let player = self.table.player_of_song(uid).unwrap_or(0);
        self.ctx.init_song_for_player(pos, player)?;
        self.output.start()?;
        self.current = Some(uid);
        info!(song = uid, pos, "playing");
        Ok(())
    }

    /// Render as many whole blocks as fit into the output. Returns the
    /// number rendered.
    pub fn tick(&mut self) -> usize {
        if self.current.is_none() {
            return 0;
        }
        let mut rendered = 0;
        while self.output.free_frames() >= SAMPLES_PER_BUFFER {
            if self.ctx.has_ended() {
                debug!(song = ?self.current, "song ended");
                self.current = None;
                break;
            }
            self.ctx.sound_main();
            let frames = self.ctx.master().frames();
            let written = self.output.write(frames);
            debug_assert_eq!(written, frames.len(), "short write despite free space");
            rendered += 1;
        }
        rendered
    }

    pub fn pause(&mut self) {
        self.ctx.pause();
    }

    pub fn resume(&mut self) {
        self.ctx.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.ctx.is_paused()
    }

    pub fn stop(&mut self) {
        self.ctx.stop();
        self.current = None;
    }

    pub fn set_tempo_scale(&mut self, scale: TempoScale) {
        self.ctx.set_tempo_scale(scale);
    }

    pub fn toggle_mute(&mut self, track: usize) {
        if let Some(t) = self.ctx.tracks().get(track) {
            let muted = !t.muted;
            self.ctx.set_mute(track, muted);
        }
    }

    pub fn toggle_solo(&mut self, track: usize) {
        if let Some(t) = self.ctx.tracks().get(track) {
            let solo = !t.solo;
            self.ctx.set_solo(track, solo);
        }
    }

    pub fn toggle_harmony(&mut self, track: usize) {
        if let Some(t) = self.ctx.tracks().get(track) {
            let harmony = !t.harmony;
            self.ctx.set_harmony(track, harmony);
        }
    }

    /// Song currently playing, `None` once it ended or was stopped.
    pub fn current_song(&self) -> Option<u16> {
        self.current
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    pub fn visualizer_state(&self) -> VisualizerState {
        self.ctx.visualizer_state()
    }

    pub fn song_table(&self) -> &SongTable {
        &self.table
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}
