//! DirectSound channel: sampled PCM and procedural synth voices.
//!
//! One channel per sounding note. The waveform generator is a tagged
//! variant; every variant shares the envelope, the volume ramps and the
//! resampler. Envelope and volume are updated once per block and ramped
//! linearly across it.

use m4a_ir::{Adsr, ByteSource, Frame, MixingArgs, Note, ResamplerType, SampleInfo};

use crate::channel::Channel;
use crate::envelope_state::{EnvState, Envelope};
use crate::frequency::{note_frequency, sample_rate_for_key};
use crate::instrument::SynthParams;
use crate::resampler::{create_resampler, Resampler};
use crate::sample_source::{SampleCursor, SampleEncoding, SynthCursor, SynthShape, SYNTH_STEPS};

/// Waveform source of a channel.
#[derive(Clone, Debug)]
pub enum Waveform {
    /// Sample data in ROM.
    Pcm { cursor: SampleCursor, fixed: bool },
    /// Pulse whose duty cycle sweeps up and down over `period` blocks.
    Pulse { cursor: SynthCursor, base_duty: u8, depth: u8, period: u8, block: u32 },
    Saw { cursor: SynthCursor },
    Triangle { cursor: SynthCursor },
}

impl Waveform {
    /// Sampled waveform.
    pub fn pcm(info: SampleInfo, encoding: SampleEncoding, fixed: bool) -> Self {
        Waveform::Pcm { cursor: SampleCursor::new(info, encoding), fixed }
    }

    /// Procedural waveform.
    pub fn synth(params: SynthParams) -> Self {
        let cursor = SynthCursor::new();
        match params.shape {
            SynthShape::Pulse => Waveform::Pulse {
                cursor,
                base_duty: params.base_duty,
                depth: params.duty_depth,
                period: params.duty_period,
                block: 0,
            },
            SynthShape::Saw => Waveform::Saw { cursor },
            SynthShape::Triangle => Waveform::Triangle { cursor },
        }
    }

    fn is_fixed(&self) -> bool {
        matches!(self, Waveform::Pcm { fixed: true, .. })
    }
}

/// Pulse duty for the given block of a sweep, as a fraction of a cycle.
fn pulse_duty(base: u8, depth: u8, period: u8, block: u32) -> f32 {
    let sweep = if period == 0 || depth == 0 {
        0.0
    } else {
        let t = (block % period as u32) as f32 / period as f32;
        let tri = if t < 0.5 { t * 2.0 } else { 2.0 - t * 2.0 };
        tri * depth as f32
    };
    ((base as f32 + sweep) / 256.0).clamp(1.0 / 256.0, 255.0 / 256.0)
}

/// A sounding DirectSound voice.
pub struct SoundChannel {
    note: Note,
    envelope: Envelope,
    waveform: Waveform,
    resampler: Box<dyn Resampler>,
    /// Remaining note length in ticks (ignored for tied notes).
    remaining: u8,
    /// Source samples per second for the current pitch (non-fixed voices).
    source_rate: f32,
    left_vol: u8,
    right_vol: u8,
    prev_left_vol: u8,
    prev_right_vol: u8,
    /// Allocation sequence number, lower is older.
    start_order: u64,
    mono: Vec<f32>,
}

impl SoundChannel {
    pub fn new(note: Note, adsr: Adsr, waveform: Waveform, resampler: ResamplerType, start_order: u64) -> Self {
        Self {
            note,
            envelope: Envelope::new(adsr, &note),
            waveform,
            resampler: create_resampler(resampler),
            remaining: note.length,
            source_rate: 0.0,
            left_vol: 0,
            right_vol: 0,
            prev_left_vol: 0,
            prev_right_vol: 0,
            start_order,
            mono: Vec::new(),
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.waveform.is_fixed()
    }

    /// Current left/right volume pair.
    pub fn volume(&self) -> (u8, u8) {
        (self.left_vol, self.right_vol)
    }
}

impl Channel for SoundChannel {
    fn note(&self) -> &Note {
        &self.note
    }

    fn state(&self) -> EnvState {
        self.envelope.state()
    }

    fn start_order(&self) -> u64 {
        self.start_order
    }

    /// A drum-kit pan override takes precedence over the track pan.
    fn set_vol(&mut self, vol: u8, pan: i8) {
        let pan = if self.note.rhythm_pan != 0 { self.note.rhythm_pan } else { pan };
        let pan = (pan as i32).clamp(-64, 64);
        let base = self.note.velocity.min(127) as u32 * vol.min(127) as u32;
        self.left_vol = ((base * (64 - pan) as u32) >> 13).min(255) as u8;
        self.right_vol = ((base * (64 + pan) as u32) >> 13).min(255) as u8;
    }

    fn set_pitch(&mut self, pitch: i32) {
        let key = self.note.midi_key_pitch as i32;
        self.source_rate = match &self.waveform {
            Waveform::Pcm { fixed: true, .. } => 0.0,
            Waveform::Pcm { cursor, .. } => sample_rate_for_key(cursor.info().mid_c_freq, key, pitch),
            _ => note_frequency(key, pitch) * SYNTH_STEPS as f32,
        };
    }

    fn release(&mut self) {
        self.envelope.release();
    }

    fn kill(&mut self) {
        self.envelope.kill();
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

    fn process(&mut self, rom: &dyn ByteSource, out: &mut [Frame], args: &MixingArgs) {
        if self.is_dead() {
            return;
        }
        let was_init = self.envelope.state() == EnvState::Init;
        self.envelope.step();
        if was_init {
            self.prev_left_vol = self.left_vol;
            self.prev_right_vol = self.right_vol;
            return;
        }

        let rate = if self.waveform.is_fixed() { args.fixed_mode_rate as f32 } else { self.source_rate };
        let phase_inc = rate * args.sample_rate_inv;

        self.mono.clear();
        self.mono.resize(out.len(), 0.0);
        let resampler = &mut self.resampler;
        let mono = &mut self.mono;
        let ok = match &mut self.waveform {
            Waveform::Pcm { cursor, .. } => {
                let mut fetch = |buf: &mut Vec<f32>, n: usize| cursor.fetch(rom, buf, n);
                resampler.process(mono, phase_inc, &mut fetch)
            }
            Waveform::Pulse { cursor, base_duty, depth, period, block } => {
                let duty = pulse_duty(*base_duty, *depth, *period, *block);
                *block = block.wrapping_add(1);
                let mut fetch = |buf: &mut Vec<f32>, n: usize| cursor.fetch(SynthShape::Pulse, duty, buf, n);
                resampler.process(mono, phase_inc, &mut fetch)
            }
            Waveform::Saw { cursor } => {
                let mut fetch = |buf: &mut Vec<f32>, n: usize| cursor.fetch(SynthShape::Saw, 0.5, buf, n);
                resampler.process(mono, phase_inc, &mut fetch)
            }
            Waveform::Triangle { cursor } => {
                let mut fetch = |buf: &mut Vec<f32>, n: usize| cursor.fetch(SynthShape::Triangle, 0.5, buf, n);
                resampler.process(mono, phase_inc, &mut fetch)
            }
        };

        let norm = args.vol / (256.0 * 256.0);
        let env_from = self.envelope.prev_level() as f32;
        let env_to = self.envelope.level() as f32;
        let from_l = self.prev_left_vol as f32 * env_from * norm;
        let from_r = self.prev_right_vol as f32 * env_from * norm;
        let to_l = self.left_vol as f32 * env_to * norm;
        let to_r = self.right_vol as f32 * env_to * norm;
        let step_inv = 1.0 / out.len().max(1) as f32;
        let step_l = (to_l - from_l) * step_inv;
        let step_r = (to_r - from_r) * step_inv;

        let (mut gain_l, mut gain_r) = (from_l, from_r);
        for (frame, &s) in out.iter_mut().zip(self.mono.iter()) {
            frame.left += s * gain_l;
            frame.right += s * gain_r;
            gain_l += step_l;
            gain_r += step_r;
        }

        self.prev_left_vol = self.left_vol;
        self.prev_right_vol = self.right_vol;

        if !ok {
            self.kill();
        }
    }
}
