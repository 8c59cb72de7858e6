//! Sequencer track: one cursor into an MP2K command stream.
//!
//! A track only interprets bytes. Everything that needs other state (voice
//! allocation, tempo) is reported back as a [`TrackEvent`] for the playback
//! context to apply.

use m4a_ir::{agb_ptr_to_pos, ByteSource, PROG_UNDEFINED};
use thiserror::Error;
use tracing::warn;

/// Tick lengths addressed by WAIT (0x80 + i) and note (0xCF + i) commands.
pub const LEN_TABLE: [u8; 49] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 28, 30, 32, 36, 40,
    42, 44, 48, 52, 54, 56, 60, 64, 66, 68, 72, 76, 78, 80, 84, 88, 90, 92, 96,
];

/// Nesting limit of PATT calls.
pub const MAX_CALL_DEPTH: usize = 3;

/// Commands allowed in a single tick before the stream counts as runaway.
const MAX_COMMANDS_PER_TICK: usize = 1024;

const FINE: u8 = 0xB1;
const GOTO: u8 = 0xB2;
const PATT: u8 = 0xB3;
const PEND: u8 = 0xB4;
const REPT: u8 = 0xB5;
const MEMACC: u8 = 0xB9;
const PRIO: u8 = 0xBA;
const TEMPO: u8 = 0xBB;
const KEYSH: u8 = 0xBC;
const VOICE: u8 = 0xBD;
const VOL: u8 = 0xBE;
const PAN: u8 = 0xBF;
const BEND: u8 = 0xC0;
const BENDR: u8 = 0xC1;
const LFOS: u8 = 0xC2;
const LFODL: u8 = 0xC3;
const MOD: u8 = 0xC4;
const MODT: u8 = 0xC5;
const TUNE: u8 = 0xC8;
const XCMD: u8 = 0xCD;
const EOT: u8 = 0xCE;
const TIE: u8 = 0xCF;

const XCMD_ECHO_VOL: u8 = 0x08;
const XCMD_ECHO_LEN: u8 = 0x09;

/// Something the playback context has to act on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackEvent {
    /// Start a note with the track's current program. `length` 0 is a tie.
    NoteOn { key: u8, velocity: u8, length: u8 },
    /// Release notes started with `key`.
    NoteOff { key: u8 },
    /// Release every tied note of the track.
    ReleaseTies,
    /// New tempo in BPM.
    Tempo(u16),
}

/// Target of the track LFO.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModType {
    #[default]
    Pitch,
    Volume,
    Pan,
}

impl ModType {
    fn from_byte(b: u8) -> Self {
        match b {
            1 => ModType::Volume,
            2 => ModType::Pan,
            _ => ModType::Pitch,
        }
    }
}

/// Corrupt stream conditions that end a track.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
enum StreamError {
    #[error("read past end of ROM at {0:#x}")]
    OutOfRange(usize),
    #[error("invalid jump target {0:#010x}")]
    BadPointer(u32),
    #[error("call stack overflow at {0:#x}")]
    CallOverflow(usize),
    #[error("more than {MAX_COMMANDS_PER_TICK} commands in one tick")]
    Runaway,
}

/// State of one sequencer track.
#[derive(Clone, Debug)]
pub struct Track {
    pos: usize,
    return_stack: heapless::Vec<usize, MAX_CALL_DEPTH>,
    rept_count: u8,
    delay: u8,
    prog: u16,
    vol: u8,
    pan: i8,
    bend: i8,
    bend_range: u8,
    tune: i8,
    key_shift: i8,
    modulation: u8,
    mod_type: ModType,
    lfo_speed: u8,
    lfo_delay: u8,
    lfo_delay_count: u8,
    lfo_phase: u8,
    lfo_value: i32,
    priority: u8,
    echo_vol: u8,
    echo_len: u8,
    last_cmd: u8,
    last_key: u8,
    last_velocity: u8,
    loops: u32,
    enabled: bool,
    update_vol: bool,
    update_pitch: bool,
    /// Keys with a sounding channel (bit = MIDI key).
    pub active_notes: u128,
    pub muted: bool,
    pub solo: bool,
    pub harmony: bool,
}

impl Track {
    /// A track starting at byte position `pos`.
    pub fn new(pos: usize) -> Self {
        Self {
            pos,
            return_stack: heapless::Vec::new(),
            rept_count: 0,
            delay: 0,
            prog: PROG_UNDEFINED,
            vol: 100,
            pan: 0,
            bend: 0,
            bend_range: 2,
            tune: 0,
            key_shift: 0,
            modulation: 0,
            mod_type: ModType::Pitch,
            lfo_speed: 22,
            lfo_delay: 0,
            lfo_delay_count: 0,
            lfo_phase: 0,
            lfo_value: 0,
            priority: 0,
            echo_vol: 0,
            echo_len: 0,
            last_cmd: 0,
            last_key: 60,
            last_velocity: 127,
            loops: 0,
            enabled: true,
            update_vol: true,
            update_pitch: true,
            active_notes: 0,
            muted: false,
            solo: false,
            harmony: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stop interpreting the stream.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn delay(&self) -> u8 {
        self.delay
    }

    pub fn program(&self) -> u16 {
        self.prog
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn key_shift(&self) -> i8 {
        self.key_shift
    }

    pub fn modulation(&self) -> u8 {
        self.modulation
    }

    /// Pseudo echo volume and length for new notes.
    pub fn echo(&self) -> (u8, u8) {
        (self.echo_vol, self.echo_len)
    }

    /// Loop jumps taken so far.
    pub fn loops(&self) -> u32 {
        self.loops
    }

    pub fn call_depth(&self) -> usize {
        self.return_stack.len()
    }

    /// Volume after LFO modulation (0-127).
    pub fn volume(&self) -> u8 {
        let lfo = if self.mod_type == ModType::Volume { self.lfo_value } else { 0 };
        (self.vol as i32 * (128 + lfo) / 128).clamp(0, 127) as u8
    }

    /// Pan after LFO modulation (-64..=63).
    pub fn pan(&self) -> i8 {
        let lfo = if self.mod_type == ModType::Pan { self.lfo_value } else { 0 };
        (self.pan as i32 + lfo).clamp(-64, 63) as i8
    }

    /// Pitch offset in 1/64 semitones: bend, tune and LFO.
    pub fn pitch(&self) -> i32 {
        let lfo = if self.mod_type == ModType::Pitch { self.lfo_value } else { 0 };
        self.bend as i32 * self.bend_range as i32 + self.tune as i32 + lfo
    }

    /// Take the volume-changed flag.
    pub fn take_vol_update(&mut self) -> bool {
        core::mem::take(&mut self.update_vol)
    }

    /// Take the pitch-changed flag.
    pub fn take_pitch_update(&mut self) -> bool {
        core::mem::take(&mut self.update_pitch)
    }

    /// Advance one sequencer tick, appending events to `events`.
    ///
    /// Corrupt data ends the track with a warning instead of failing.
    pub fn tick(&mut self, rom: &dyn ByteSource, max_loops: i8, events: &mut Vec<TrackEvent>) {
        if !self.enabled {
            return;
        }
        if self.delay > 0 {
            self.delay -= 1;
        }
        let mut executed = 0;
        while self.enabled && self.delay == 0 {
            let result = if executed >= MAX_COMMANDS_PER_TICK {
                Err(StreamError::Runaway)
            } else {
                self.execute(rom, max_loops, events)
            };
            if let Err(e) = result {
                warn!(pos = self.pos, error = %e, "corrupt track data, ending track");
                events.push(TrackEvent::ReleaseTies);
                self.enabled = false;
            }
            executed += 1;
        }
        self.update_lfo();
    }

    fn read(&mut self, rom: &dyn ByteSource) -> Result<u8, StreamError> {
        let b = rom.read_u8(self.pos).ok_or(StreamError::OutOfRange(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_ptr(&mut self, rom: &dyn ByteSource) -> Result<usize, StreamError> {
        let ptr = rom.read_u32(self.pos).ok_or(StreamError::OutOfRange(self.pos))?;
        self.pos += 4;
        match agb_ptr_to_pos(ptr) {
            Some(pos) if pos < rom.len() => Ok(pos),
            _ => Err(StreamError::BadPointer(ptr)),
        }
    }

    /// Consume the next byte if it is an argument (< 0x80).
    fn optional_arg(&mut self, rom: &dyn ByteSource) -> Option<u8> {
        let b = rom.read_u8(self.pos).filter(|&b| b < 0x80)?;
        self.pos += 1;
        Some(b)
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn execute(&mut self, rom: &dyn ByteSource, max_loops: i8, events: &mut Vec<TrackEvent>) -> Result<(), StreamError> {
        let mut cmd = self.read(rom)?;
        if cmd < 0x80 {
            if self.last_cmd < VOICE {
                // no running status to repeat
                return Ok(());
            }
            self.pos -= 1;
            cmd = self.last_cmd;
        } else if cmd >= VOICE {
            self.last_cmd = cmd;
        }

        match cmd {
            0x80..=0xB0 => self.delay = LEN_TABLE[(cmd - 0x80) as usize],
            FINE => {
                events.push(TrackEvent::ReleaseTies);
                self.enabled = false;
            }
            GOTO => {
                let target = self.read_ptr(rom)?;
                self.loop_jump(target, max_loops, events);
            }
            PATT => {
                let target = self.read_ptr(rom)?;
                self.return_stack.push(self.pos).map_err(|_| StreamError::CallOverflow(self.pos))?;
                self.pos = target;
            }
            PEND => {
                if let Some(ret) = self.return_stack.pop() {
                    self.pos = ret;
                }
            }
            REPT => {
                let count = self.read(rom)?;
                let target = self.read_ptr(rom)?;
                if count == 0 {
                    self.loop_jump(target, max_loops, events);
                } else {
                    self.rept_count += 1;
                    if self.rept_count < count {
                        self.pos = target;
                    } else {
                        self.rept_count = 0;
                    }
                }
            }
            0xB6..=0xB8 => {}
            MEMACC => self.skip(3),
            PRIO => self.priority = self.read(rom)?,
            TEMPO => events.push(TrackEvent::Tempo(self.read(rom)? as u16 * 2)),
            KEYSH => {
                self.key_shift = self.read(rom)? as i8;
                self.update_pitch = true;
            }
            VOICE => self.prog = self.read(rom)? as u16,
            VOL => {
                self.vol = self.read(rom)? & 0x7F;
                self.update_vol = true;
            }
            PAN => {
                self.pan = (self.read(rom)? as i32 - 0x40) as i8;
                self.update_vol = true;
            }
            BEND => {
                self.bend = (self.read(rom)? as i32 - 0x40) as i8;
                self.update_pitch = true;
            }
            BENDR => {
                self.bend_range = self.read(rom)?;
                self.update_pitch = true;
            }
            LFOS => self.lfo_speed = self.read(rom)?,
            LFODL => self.lfo_delay = self.read(rom)?,
            MOD => {
                self.modulation = self.read(rom)?;
                if self.modulation == 0 {
                    self.reset_lfo();
                }
            }
            MODT => {
                self.mod_type = ModType::from_byte(self.read(rom)?);
                self.update_vol = true;
                self.update_pitch = true;
            }
            TUNE => {
                self.tune = (self.read(rom)? as i32 - 0x40) as i8;
                self.update_pitch = true;
            }
            XCMD => match self.read(rom)? {
                XCMD_ECHO_VOL => self.echo_vol = self.read(rom)?,
                XCMD_ECHO_LEN => self.echo_len = self.read(rom)?,
                _ => self.skip(1),
            },
            EOT => {
                let key = self.optional_arg(rom).unwrap_or(self.last_key);
                events.push(TrackEvent::NoteOff { key });
            }
            TIE..=0xFF => self.note_on(cmd, rom, events),
            _ => self.skip(1),
        }
        Ok(())
    }

    fn note_on(&mut self, cmd: u8, rom: &dyn ByteSource, events: &mut Vec<TrackEvent>) {
        let mut length = LEN_TABLE[(cmd - TIE) as usize];
        if let Some(key) = self.optional_arg(rom) {
            self.last_key = key;
            if let Some(velocity) = self.optional_arg(rom) {
                self.last_velocity = velocity;
                if cmd != TIE {
                    if let Some(gate) = self.optional_arg(rom) {
                        length = length.saturating_add(gate);
                    }
                }
            }
        }
        if self.lfo_delay > 0 {
            self.lfo_delay_count = 0;
            self.lfo_phase = 0;
        }
        events.push(TrackEvent::NoteOn { key: self.last_key, velocity: self.last_velocity, length });
    }

    fn loop_jump(&mut self, target: usize, max_loops: i8, events: &mut Vec<TrackEvent>) {
        self.loops += 1;
        if max_loops >= 0 && self.loops > max_loops as u32 {
            events.push(TrackEvent::ReleaseTies);
            self.enabled = false;
        } else {
            self.pos = target;
        }
    }

    fn reset_lfo(&mut self) {
        self.lfo_phase = 0;
        self.lfo_delay_count = 0;
        if self.lfo_value != 0 {
            self.lfo_value = 0;
            self.update_vol = true;
            self.update_pitch = true;
        }
    }

    fn update_lfo(&mut self) {
        if self.modulation == 0 || self.lfo_speed == 0 {
            return;
        }
        if self.lfo_delay_count < self.lfo_delay {
            self.lfo_delay_count += 1;
            return;
        }
        self.lfo_phase = self.lfo_phase.wrapping_add(self.lfo_speed);
        let value = triangle(self.lfo_phase) * self.modulation as i32 / 64;
        if value != self.lfo_value {
            self.lfo_value = value;
            match self.mod_type {
                ModType::Pitch => self.update_pitch = true,
                ModType::Volume | ModType::Pan => self.update_vol = true,
            }
        }
    }
}

/// Triangle over one byte of phase, -64..=64.
fn triangle(phase: u8) -> i32 {
    let p = phase as i32;
    match p {
        0..=63 => p,
        64..=191 => 128 - p,
        _ => p - 256,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m4a_ir::AGB_MAP_ROM;

    fn ptr(pos: usize) -> [u8; 4] {
        (AGB_MAP_ROM + pos as u32).to_le_bytes()
    }

    fn run(track: &mut Track, rom: &Vec<u8>, ticks: usize, max_loops: i8) -> Vec<(usize, TrackEvent)> {
        let mut out = Vec::new();
        for t in 0..ticks {
            let mut events = Vec::new();
            track.tick(rom, max_loops, &mut events);
            out.extend(events.into_iter().map(|e| (t, e)));
        }
        out
    }

    #[test]
    fn len_table_endpoints() {
        assert_eq!(LEN_TABLE[0], 0);
        assert_eq!(LEN_TABLE[24], 24);
        assert_eq!(LEN_TABLE[48], 96);
    }

    #[test]
    fn note_then_wait_then_fine() {
        // N04 key 60 vel 100, W04, FINE
        let rom = vec![0xD3, 60, 100, 0x84, FINE];
        let mut track = Track::new(0);
        let events = run(&mut track, &rom, 6, 1);
        assert_eq!(
            events,
            [(0, TrackEvent::NoteOn { key: 60, velocity: 100, length: 4 }), (4, TrackEvent::ReleaseTies)]
        );
        assert!(!track.is_enabled());
    }

    #[test]
    fn running_status_repeats_note_command() {
        // N02 62 90, W01, then bare key 64 reuses N02 and velocity
        let rom = vec![0xD1, 62, 90, 0x81, 64, 0x81, FINE];
        let mut track = Track::new(0);
        let events = run(&mut track, &rom, 3, 1);
        assert_eq!(events[0].1, TrackEvent::NoteOn { key: 62, velocity: 90, length: 2 });
        assert_eq!(events[1], (1, TrackEvent::NoteOn { key: 64, velocity: 90, length: 2 }));
    }

    #[test]
    fn gate_extension_adds_to_length() {
        let rom = vec![0xD2, 60, 127, 2, FINE];
        let mut track = Track::new(0);
        let events = run(&mut track, &rom, 1, 1);
        assert_eq!(events[0].1, TrackEvent::NoteOn { key: 60, velocity: 127, length: 5 });
    }

    #[test]
    fn tie_and_eot_default_key() {
        let rom = vec![TIE, 70, 80, 0x82, EOT, FINE];
        let mut track = Track::new(0);
        let events = run(&mut track, &rom, 3, 1);
        assert_eq!(events[0].1, TrackEvent::NoteOn { key: 70, velocity: 80, length: 0 });
        assert_eq!(events[1], (2, TrackEvent::NoteOff { key: 70 }));
    }

    #[test]
    fn controllers_update_state_and_flags() {
        let rom = vec![VOL, 90, PAN, 0x50, BEND, 0x48, BENDR, 4, TUNE, 0x41, KEYSH, 0xFE, VOICE, 7, PRIO, 3, 0x81];
        let mut track = Track::new(0);
        track.take_vol_update();
        track.take_pitch_update();
        run(&mut track, &rom, 1, 1);
        assert_eq!(track.volume(), 90);
        assert_eq!(track.pan(), 16);
        assert_eq!(track.pitch(), 8 * 4 + 1);
        assert_eq!(track.key_shift(), -2);
        assert_eq!(track.program(), 7);
        assert_eq!(track.priority(), 3);
        assert!(track.take_vol_update());
        assert!(track.take_pitch_update());
        assert!(!track.take_vol_update());
    }

    #[test]
    fn tempo_argument_is_half_bpm() {
        let rom = vec![TEMPO, 60, FINE];
        let mut track = Track::new(0);
        let events = run(&mut track, &rom, 1, 1);
        assert_eq!(events[0].1, TrackEvent::Tempo(120));
    }

    #[test]
    fn goto_loops_until_max_loops() {
        // W01, GOTO 0
        let mut rom = vec![0x81, GOTO];
        rom.extend(ptr(0));
        let mut track = Track::new(0);
        run(&mut track, &rom, 10, 2);
        assert!(!track.is_enabled());
        assert_eq!(track.loops(), 3);
    }

    #[test]
    fn negative_max_loops_plays_forever() {
        let mut rom = vec![0x81, GOTO];
        rom.extend(ptr(0));
        let mut track = Track::new(0);
        run(&mut track, &rom, 50, -1);
        assert!(track.is_enabled());
    }

    #[test]
    fn patt_and_pend() {
        // 0: PATT 8, 5: N01 61, 7: FINE, 8: N01 60, 10: W01, 11: PEND
        let mut rom = vec![PATT];
        rom.extend(ptr(8));
        rom.extend([0xD0, 61, FINE, 0xD0, 60, 0x81, PEND]);
        let mut track = Track::new(0);
        let keys: Vec<u8> = run(&mut track, &rom, 3, 1)
            .into_iter()
            .filter_map(|(_, e)| match e {
                TrackEvent::NoteOn { key, .. } => Some(key),
                _ => None,
            })
            .collect();
        assert_eq!(keys, [60, 61]);
        assert_eq!(track.call_depth(), 0);
    }

    #[test]
    fn pend_with_empty_stack_is_ignored() {
        let rom = vec![PEND, 0x81, FINE];
        let mut track = Track::new(0);
        run(&mut track, &rom, 3, 1);
        assert_eq!(track.pos(), 3);
    }

    #[test]
    fn recursive_patt_overflows_and_ends_track() {
        let mut rom = vec![PATT];
        rom.extend(ptr(0));
        let mut track = Track::new(0);
        let events = run(&mut track, &rom, 1, 1);
        assert!(!track.is_enabled());
        assert_eq!(events, [(0, TrackEvent::ReleaseTies)]);
    }

    #[test]
    fn rept_repeats_count_times() {
        // 0: N01 60, 2: W01, 3: REPT 3 -> 0, 9: FINE
        let mut rom = vec![0xD0, 60, 0x81, REPT, 3];
        rom.extend(ptr(0));
        rom.push(FINE);
        let mut track = Track::new(0);
        let notes = run(&mut track, &rom, 10, 1)
            .into_iter()
            .filter(|(_, e)| matches!(e, TrackEvent::NoteOn { .. }))
            .count();
        assert_eq!(notes, 3);
        assert!(!track.is_enabled());
    }

    #[test]
    fn reading_past_rom_ends_track() {
        let rom = vec![0xD0];
        let mut track = Track::new(0);
        run(&mut track, &rom, 2, 1);
        assert!(!track.is_enabled());
    }

    #[test]
    fn runaway_loop_is_cut_off() {
        // GOTO to itself without a wait
        let mut rom = vec![GOTO];
        rom.extend(ptr(0));
        let mut track = Track::new(0);
        run(&mut track, &rom, 1, -1);
        assert!(!track.is_enabled());
    }

    #[test]
    fn xcmd_sets_pseudo_echo() {
        let rom = vec![XCMD, 0x08, 40, XCMD, 0x09, 12, XCMD, 0x03, 0, 0x81];
        let mut track = Track::new(0);
        run(&mut track, &rom, 1, 1);
        assert_eq!(track.echo(), (40, 12));
        assert_eq!(track.pos(), rom.len());
    }

    #[test]
    fn lfo_modulates_pitch_after_delay() {
        let mut rom = vec![LFOS, 16, LFODL, 2, MOD, 64, 0x81, GOTO];
        rom.extend(ptr(6));
        let mut track = Track::new(0);
        run(&mut track, &rom, 2, -1);
        assert_eq!(track.pitch(), 0);
        run(&mut track, &rom, 1, -1);
        assert_eq!(track.pitch(), 16);
    }

    #[test]
    fn triangle_shape() {
        assert_eq!(triangle(0), 0);
        assert_eq!(triangle(64), 64);
        assert_eq!(triangle(128), 0);
        assert_eq!(triangle(192), -64);
        assert_eq!(triangle(255), -1);
    }
}
