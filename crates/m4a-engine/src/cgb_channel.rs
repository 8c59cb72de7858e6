//! PSG (CGB) channels: two squares, the wave channel and noise.
//!
//! The PSG envelope works in 16 discrete levels with step periods counted in
//! blocks, and panning is limited to hard left, centre or hard right.

use m4a_ir::{Adsr, ByteSource, EngineSoundMode, Frame, MixingArgs, Note, ResamplerType};

use crate::channel::Channel;
use crate::envelope_state::EnvState;
use crate::frequency::{noise_rate, note_frequency};
use crate::instrument::CgbVoice;
use crate::resampler::{create_resampler, Resampler};

/// Duty patterns (12.5%, 25%, 50%, 75%).
const DUTY_PATTERNS: [[f32; 8]; 4] = [
    [-1.0, -1.0, -1.0, -1.0, 1.0, -1.0, -1.0, -1.0],
    [-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0],
    [-1.0, -1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0],
    [1.0, 1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0],
];

const WAVE_SAMPLES: usize = 32;

/// Output level of a PSG channel at envelope level 15.
const CGB_GAIN: f32 = 0.5;

/// Pan threshold for switching to a hard-panned output.
const PAN_THRESHOLD: i8 = 21;

/// Square 1 sweep clock in Hz.
const SWEEP_CLOCK: f32 = 128.0;
const BLOCKS_PER_SECOND: f32 = m4a_ir::AGB_FPS as f32;
const CGB_FREQ_BASE: f32 = 131_072.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum CgbPan {
    Left,
    #[default]
    Center,
    Right,
}

impl CgbPan {
    fn from_pan(pan: i8) -> Self {
        if pan < -PAN_THRESHOLD {
            CgbPan::Left
        } else if pan > PAN_THRESHOLD {
            CgbPan::Right
        } else {
            CgbPan::Center
        }
    }

    fn factors(self) -> (f32, f32) {
        match self {
            CgbPan::Left => (1.0, 0.0),
            CgbPan::Center => (1.0, 1.0),
            CgbPan::Right => (0.0, 1.0),
        }
    }
}

/// Sample generator for one PSG channel.
#[derive(Clone, Debug)]
enum CgbSource {
    Square { duty: usize, step: usize },
    Wave { samples: [f32; WAVE_SAMPLES], step: usize },
    Noise { lfsr: u16, rough: bool },
}

impl CgbSource {
    fn new(rom: &dyn ByteSource, voice: CgbVoice, accurate_quantization: bool) -> Self {
        match voice {
            CgbVoice::Square1 { duty, .. } | CgbVoice::Square2 { duty } => {
                CgbSource::Square { duty: (duty & 3) as usize, step: 0 }
            }
            CgbVoice::Wave { pos } => {
                let mut samples = [0.0; WAVE_SAMPLES];
                if let Some(bytes) = rom.read_bytes(pos, WAVE_SAMPLES / 2) {
                    for (i, &b) in bytes.iter().enumerate() {
                        samples[i * 2] = wave_level(b >> 4, accurate_quantization);
                        samples[i * 2 + 1] = wave_level(b & 0x0F, accurate_quantization);
                    }
                }
                CgbSource::Wave { samples, step: 0 }
            }
            CgbVoice::Noise { rough } => CgbSource::Noise { lfsr: 0x7FFF, rough },
        }
    }

    /// Steps per waveform cycle (1 for noise, whose rate is the shift clock).
    fn steps_per_cycle(&self) -> f32 {
        match self {
            CgbSource::Square { .. } => 8.0,
            CgbSource::Wave { .. } => WAVE_SAMPLES as f32,
            CgbSource::Noise { .. } => 1.0,
        }
    }

    fn restart(&mut self) {
        match self {
            CgbSource::Square { step, .. } | CgbSource::Wave { step, .. } => *step = 0,
            CgbSource::Noise { lfsr, .. } => *lfsr = 0x7FFF,
        }
    }

    fn fetch(&mut self, buf: &mut Vec<f32>, count: usize) -> bool {
        buf.reserve(count);
        for _ in 0..count {
            let value = match self {
                CgbSource::Square { duty, step } => {
                    let v = DUTY_PATTERNS[*duty][*step];
                    *step = (*step + 1) % 8;
                    v
                }
                CgbSource::Wave { samples, step } => {
                    let v = samples[*step];
                    *step = (*step + 1) % WAVE_SAMPLES;
                    v
                }
                CgbSource::Noise { lfsr, rough } => {
                    let bit = (*lfsr ^ (*lfsr >> 1)) & 1;
                    *lfsr = (*lfsr >> 1) | (bit << 14);
                    if *rough {
                        *lfsr = (*lfsr & !0x40) | (bit << 6);
                    }
                    if *lfsr & 1 == 0 {
                        1.0
                    } else {
                        -1.0
                    }
                }
            };
            buf.push(value);
        }
        true
    }
}

/// Convert a 4-bit wave RAM sample to a float.
fn wave_level(nibble: u8, accurate: bool) -> f32 {
    if accurate {
        (nibble as f32 - 8.0) / 8.0
    } else {
        (nibble as f32 - 7.5) / 7.5
    }
}

/// Wave channel output volume restricted to the hardware steps.
fn quantize_wave_volume(level: u8) -> f32 {
    match level {
        0..=1 => 0.0,
        2..=5 => 0.25,
        6..=9 => 0.5,
        10..=13 => 0.75,
        _ => 1.0,
    }
}

/// Square 1 frequency sweep, operating on the 11-bit frequency register.
#[derive(Clone, Copy, Debug)]
struct Sweep {
    period: u8,
    negate: bool,
    shift: u8,
    /// Current register value once the sweep has started.
    reg: Option<u16>,
    acc: f32,
}

impl Sweep {
    fn new(raw: u8) -> Option<Self> {
        let period = (raw >> 4) & 7;
        let shift = raw & 7;
        (period != 0 && shift != 0).then_some(Self { period, negate: raw & 0x08 != 0, shift, reg: None, acc: 0.0 })
    }

    /// Advance one block. Returns `None` if the frequency overflowed.
    fn step(&mut self, freq: f32) -> Option<f32> {
        let mut reg = *self.reg.get_or_insert_with(|| freq_to_reg(freq));
        self.acc += SWEEP_CLOCK / BLOCKS_PER_SECOND;
        while self.acc >= self.period as f32 {
            self.acc -= self.period as f32;
            let delta = reg >> self.shift;
            reg = if self.negate { reg.saturating_sub(delta) } else { reg + delta };
            if reg > 2047 {
                return None;
            }
        }
        self.reg = Some(reg);
        Some(reg_to_freq(reg))
    }
}

fn freq_to_reg(freq: f32) -> u16 {
    if freq <= 0.0 {
        return 0;
    }
    (2048.0 - CGB_FREQ_BASE / freq).clamp(0.0, 2047.0) as u16
}

fn reg_to_freq(reg: u16) -> f32 {
    CGB_FREQ_BASE / (2048 - reg.min(2047)) as f32
}

/// A sounding PSG voice.
pub struct CgbChannel {
    note: Note,
    voice: CgbVoice,
    adsr: Adsr,
    state: EnvState,
    level: u8,
    prev_level: u8,
    peak: u8,
    sus_level: u8,
    env_counter: u8,
    echo_level: u8,
    echo_left: u8,
    pan: CgbPan,
    prev_pan: CgbPan,
    /// Fundamental (or shift clock for noise) in Hz.
    freq: f32,
    sweep: Option<Sweep>,
    source: CgbSource,
    resampler: Box<dyn Resampler>,
    remaining: u8,
    start_order: u64,
    accurate_volume: bool,
    sustain_bug: bool,
    mono: Vec<f32>,
}

impl CgbChannel {
    pub fn new(
        rom: &dyn ByteSource,
        note: Note,
        adsr: Adsr,
        voice: CgbVoice,
        mode: &EngineSoundMode,
        resampler: ResamplerType,
        start_order: u64,
    ) -> Self {
        let sweep = match voice {
            CgbVoice::Square1 { sweep, .. } => Sweep::new(sweep),
            _ => None,
        };
        Self {
            note,
            voice,
            adsr: Adsr::new(adsr.att & 7, adsr.dec & 7, adsr.sus & 15, adsr.rel & 7),
            state: EnvState::Init,
            level: 0,
            prev_level: 0,
            peak: 0,
            sus_level: 0,
            env_counter: 0,
            echo_level: 0,
            echo_left: 0,
            pan: CgbPan::Center,
            prev_pan: CgbPan::Center,
            freq: 0.0,
            sweep,
            source: CgbSource::new(rom, voice, mode.accurate_ch3_quantization),
            resampler: create_resampler(resampler),
            remaining: note.length,
            start_order,
            accurate_volume: mode.accurate_ch3_volume,
            sustain_bug: mode.emulate_cgb_sustain_bug,
            mono: Vec::new(),
        }
    }

    pub fn voice(&self) -> CgbVoice {
        self.voice
    }

    /// Hardware channel (0-3) this voice occupies.
    pub fn hw_channel(&self) -> usize {
        self.voice.hw_channel()
    }

    /// Current envelope level (0-15).
    pub fn level(&self) -> u8 {
        self.level
    }

    fn enter_sustain(&mut self) {
        self.state = EnvState::Sus;
        if self.sustain_bug {
            self.source.restart();
        }
    }

    /// True when a step of `period` blocks has elapsed (0 = every block).
    fn env_tick(&mut self, period: u8) -> bool {
        if period == 0 {
            return true;
        }
        self.env_counter += 1;
        if self.env_counter >= period {
            self.env_counter = 0;
            true
        } else {
            false
        }
    }

    fn step_envelope(&mut self) {
        self.prev_level = self.level;
        match self.state {
            EnvState::Init => {
                self.level = 0;
                self.env_counter = 0;
                self.state = EnvState::Atk;
            }
            EnvState::Atk => {
                if self.adsr.att == 0 {
                    self.level = self.peak;
                } else if self.env_tick(self.adsr.att) {
                    self.level = (self.level + 1).min(self.peak);
                }
                if self.level >= self.peak {
                    self.env_counter = 0;
                    self.state = EnvState::Dec;
                }
            }
            EnvState::Dec => {
                if self.adsr.dec == 0 {
                    self.level = self.sus_level;
                } else if self.level > self.sus_level && self.env_tick(self.adsr.dec) {
                    self.level -= 1;
                }
                if self.level <= self.sus_level {
                    self.level = self.sus_level;
                    self.enter_sustain();
                }
            }
            EnvState::Sus => {}
            EnvState::Rel => {
                if self.adsr.rel == 0 {
                    self.level = 0;
                } else if self.level > 0 && self.env_tick(self.adsr.rel) {
                    self.level -= 1;
                }
                if self.level == 0 {
                    if self.echo_level > 0 && self.note.pseudo_echo_len > 0 {
                        self.level = self.echo_level;
                        self.echo_left = self.note.pseudo_echo_len;
                        self.state = EnvState::PseudoEcho;
                    } else {
                        self.state = EnvState::Die;
                    }
                }
            }
            EnvState::PseudoEcho => {
                // fades out over the echo length, rounding up so the tail stays audible
                self.echo_left = self.echo_left.saturating_sub(1);
                let len = self.note.pseudo_echo_len.max(1) as u32;
                self.level = ((self.echo_level as u32 * self.echo_left as u32 + len - 1) / len) as u8;
                if self.echo_left == 0 {
                    self.state = EnvState::Die;
                }
            }
            EnvState::Die => {
                self.level = 0;
                self.state = EnvState::Dead;
            }
            EnvState::Dead => self.level = 0,
        }
    }

    fn gain(&self, level: u8) -> f32 {
        let scaled = match self.voice {
            CgbVoice::Wave { .. } if self.accurate_volume => quantize_wave_volume(level),
            _ => level as f32 / 15.0,
        };
        scaled * CGB_GAIN
    }
}

impl Channel for CgbChannel {
    fn note(&self) -> &Note {
        &self.note
    }

    fn state(&self) -> EnvState {
        self.state
    }

    fn start_order(&self) -> u64 {
        self.start_order
    }

    fn set_vol(&mut self, vol: u8, pan: i8) {
        let pan = if self.note.rhythm_pan != 0 { self.note.rhythm_pan } else { pan };
        self.pan = CgbPan::from_pan(pan);
        self.peak = ((self.note.velocity.min(127) as u32 * vol.min(127) as u32) >> 10).min(15) as u8;
        self.sus_level = ((self.peak as u32 * self.adsr.sus as u32 + 15) >> 4) as u8;
        self.echo_level = ((self.peak as u32 * self.note.pseudo_echo_vol as u32 + 0xFF) >> 8) as u8;
        if self.state == EnvState::Sus {
            self.level = self.sus_level;
        }
    }

    fn set_pitch(&mut self, pitch: i32) {
        let key = self.note.midi_key_pitch as i32;
        self.freq = match self.voice {
            CgbVoice::Noise { .. } => noise_rate(key, pitch),
            _ => note_frequency(key, pitch),
        };
        if let Some(sweep) = &mut self.sweep {
            if let Some(reg) = sweep.reg {
                // the sweep owns the frequency once it has started
                self.freq = reg_to_freq(reg);
            }
        }
    }

    fn release(&mut self) {
        if !self.state.is_releasing() {
            self.env_counter = 0;
            self.state = EnvState::Rel;
        }
    }

    fn kill(&mut self) {
        if self.state < EnvState::Die {
            self.state = EnvState::Die;
        }
    }

    fn tick_note(&mut self) -> bool {
        if self.is_releasing() {
            return false;
        }
        if self.note.is_tie() {
            return true;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.release();
            return false;
        }
        true
    }

    fn process(&mut self, _rom: &dyn ByteSource, out: &mut [Frame], args: &MixingArgs) {
        if self.is_dead() {
            return;
        }
        let was_init = self.state == EnvState::Init;
        self.step_envelope();
        if was_init {
            self.prev_pan = self.pan;
            return;
        }

        if let Some(sweep) = &mut self.sweep {
            match sweep.step(self.freq) {
                Some(freq) => self.freq = freq,
                None => self.kill(),
            }
        }

        let phase_inc = self.freq * self.source.steps_per_cycle() * args.sample_rate_inv;
        self.mono.clear();
        self.mono.resize(out.len(), 0.0);
        let source = &mut self.source;
        let mut fetch = |buf: &mut Vec<f32>, n: usize| source.fetch(buf, n);
        self.resampler.process(&mut self.mono, phase_inc, &mut fetch);

        let (pl, pr) = self.prev_pan.factors();
        let (cl, cr) = self.pan.factors();
        let from = self.gain(self.prev_level);
        let to = self.gain(self.level);
        let step_inv = 1.0 / out.len().max(1) as f32;
        let (mut gl, mut gr) = (from * pl, from * pr);
        let step_l = (to * cl - gl) * step_inv;
        let step_r = (to * cr - gr) * step_inv;
        for (frame, &s) in out.iter_mut().zip(self.mono.iter()) {
            frame.left += s * gl;
            frame.right += s * gr;
            gl += step_l;
            gr += step_r;
        }
        self.prev_pan = self.pan;
    }
}
