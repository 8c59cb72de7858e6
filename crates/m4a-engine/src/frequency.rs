//! Key and pitch to frequency conversion.
//!
//! Pitch offsets are in 1/64 semitone units, so one octave is 768 units.

/// MIDI key a sample's mid-C rate refers to.
const MID_C_KEY: i32 = 60;

/// Reference key and frequency for synthesized voices (A4).
const A4_KEY: i32 = 69;
const A4_FREQ: f32 = 440.0;

/// Pitch units per octave.
const PITCH_PER_OCTAVE: f32 = 768.0;

/// Game Boy noise channel master clock (Hz).
const CGB_NOISE_CLOCK: f32 = 524_288.0;

fn octaves(key: i32, reference: i32, pitch: i32) -> f32 {
    (key - reference) as f32 / 12.0 + pitch as f32 / PITCH_PER_OCTAVE
}

/// Playback rate of a PCM sample for `key` with `pitch` offset.
pub fn sample_rate_for_key(mid_c_freq: f32, key: i32, pitch: i32) -> f32 {
    mid_c_freq * libm::exp2f(octaves(key, MID_C_KEY, pitch))
}

/// Fundamental frequency in Hz for `key` with `pitch` offset (A4 = 440 Hz).
pub fn note_frequency(key: i32, pitch: i32) -> f32 {
    A4_FREQ * libm::exp2f(octaves(key, A4_KEY, pitch))
}

/// Noise channel shift rate for `key`.
///
/// The LFSR clock doubles every octave and saturates at the hardware limits.
pub fn noise_rate(key: i32, pitch: i32) -> f32 {
    let octave = octaves(key, MID_C_KEY, pitch);
    (libm::exp2f(octave) * CGB_NOISE_CLOCK / 64.0).clamp(4.0, CGB_NOISE_CLOCK)
}
