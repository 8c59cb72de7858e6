//! Sound-mode configuration snapshots.
//!
//! Two immutable structs describe a playback context: the emulated driver's
//! own parameters ([`Mp2kSoundMode`]) and the host-side rendering policy
//! ([`EngineSoundMode`]). Both are set once at construction and never mutate.

use core::fmt;
use core::str::FromStr;

use crate::audio_buffer::{SAMPLES_PER_BUFFER, STREAM_SAMPLE_RATE};

/// Driver mixing rates selectable through the `freq` field (1-based).
pub const ENGINE_RATES: [u32; 12] = [
    5734, 7884, 10512, 13379, 15768, 18157, 21024, 26758, 31536, 36314, 40137, 42048,
];

/// Error returned when parsing an unknown enum string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: alloc::string::String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.into() }
    }
}

/// Interpolation algorithm used when source rate differs from output rate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ResamplerType {
    Nearest,
    #[default]
    Linear,
    Sinc,
    Blep,
    Blamp,
}

/// Reverb algorithm applied to the mixed block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ReverbType {
    #[default]
    Normal,
    Gs1,
    Gs2,
    Mgat,
    Test,
    None,
}

/// Polyphony policy for the PSG (CGB) channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum CgbPolyphony {
    #[default]
    MonoStrict,
    MonoSmooth,
    Poly,
}

macro_rules! string_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Canonical configuration string.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(ParseEnumError::new($kind, s)),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(ResamplerType, "resampler", {
    Nearest => "nearest",
    Linear => "linear",
    Sinc => "sinc",
    Blep => "blep",
    Blamp => "blamp",
});

string_enum!(ReverbType, "reverb", {
    Normal => "normal",
    Gs1 => "gs1",
    Gs2 => "gs2",
    Mgat => "mgat",
    Test => "test",
    None => "none",
});

string_enum!(CgbPolyphony, "polyphony", {
    MonoStrict => "mono-strict",
    MonoSmooth => "mono-smooth",
    Poly => "poly",
});

/// Parameters of the emulated sound driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mp2kSoundMode {
    /// DirectSound master volume (0-15).
    pub vol: u8,
    /// Default reverb; bit 7 enables it with the low 7 bits as intensity.
    pub rev: u8,
    /// Mixing rate index into [`ENGINE_RATES`] (1-based).
    pub freq: u8,
    /// Maximum simultaneous DirectSound channels (0 = unlimited).
    pub max_channels: u8,
}

impl Default for Mp2kSoundMode {
    fn default() -> Self {
        Self { vol: 15, rev: 0, freq: 4, max_channels: 12 }
    }
}

impl Mp2kSoundMode {
    /// Mixing rate of the emulated driver in Hz.
    pub fn engine_rate(&self) -> u32 {
        let idx = (self.freq.clamp(1, ENGINE_RATES.len() as u8) - 1) as usize;
        ENGINE_RATES[idx]
    }

    /// Driver samples per frame at the engine rate.
    pub fn samples_per_frame(&self) -> u32 {
        self.engine_rate() / crate::audio_buffer::AGB_FPS
    }

    /// Master volume as a linear gain.
    pub fn master_volume(&self) -> f32 {
        (self.vol.min(15) as f32 + 1.0) / 16.0
    }
}

/// Host-side rendering policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineSoundMode {
    /// Resampler for pitched channels.
    pub resampler_normal: ResamplerType,
    /// Resampler for fixed-frequency channels.
    pub resampler_fixed: ResamplerType,
    pub reverb: ReverbType,
    pub cgb_polyphony: CgbPolyphony,
    /// Driver DMA buffer length in engine-rate samples; sizes the reverb line.
    pub dma_buffer_len: u32,
    /// Maximum tracks initialized per song.
    pub track_limit: u8,
    /// Loop repetitions before a song ends (negative = forever).
    pub max_loops: i8,
    pub pad_start_secs: f64,
    pub pad_end_secs: f64,
    pub accurate_ch3_quantization: bool,
    pub accurate_ch3_volume: bool,
    pub emulate_cgb_sustain_bug: bool,
}

impl Default for EngineSoundMode {
    fn default() -> Self {
        Self {
            resampler_normal: ResamplerType::Linear,
            resampler_fixed: ResamplerType::Linear,
            reverb: ReverbType::Normal,
            cgb_polyphony: CgbPolyphony::MonoStrict,
            dma_buffer_len: 0x630,
            track_limit: 16,
            max_loops: 1,
            pad_start_secs: 0.0,
            pad_end_secs: 0.0,
            accurate_ch3_quantization: true,
            accurate_ch3_volume: true,
            emulate_cgb_sustain_bug: false,
        }
    }
}

/// Per-tick mixing constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixingArgs {
    /// Master volume.
    pub vol: f32,
    /// Playback rate of fixed-frequency samples.
    pub fixed_mode_rate: u32,
    pub sample_rate_inv: f32,
    pub samples_per_buffer_inv: f32,
}

impl MixingArgs {
    /// Derive the mixing constants from a driver sound mode.
    pub fn new(mode: &Mp2kSoundMode) -> Self {
        Self {
            vol: mode.master_volume(),
            fixed_mode_rate: mode.engine_rate(),
            sample_rate_inv: 1.0 / STREAM_SAMPLE_RATE as f32,
            samples_per_buffer_inv: 1.0 / SAMPLES_PER_BUFFER as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn enum_strings_round_trip() {
        for s in ["nearest", "linear", "sinc", "blep", "blamp"] {
            assert_eq!(s.parse::<ResamplerType>().unwrap().to_string(), s);
        }
        for s in ["normal", "gs1", "gs2", "mgat", "test", "none"] {
            assert_eq!(s.parse::<ReverbType>().unwrap().to_string(), s);
        }
        for s in ["mono-strict", "mono-smooth", "poly"] {
            assert_eq!(s.parse::<CgbPolyphony>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn unknown_strings_are_rejected() {
        let err = "cubic".parse::<ResamplerType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown resampler value: cubic");
        assert!("GS1".parse::<ReverbType>().is_err());
        assert!("mono".parse::<CgbPolyphony>().is_err());
    }

    #[test]
    fn engine_rate_clamps_index() {
        let mut mode = Mp2kSoundMode::default();
        assert_eq!(mode.engine_rate(), 13379);
        mode.freq = 0;
        assert_eq!(mode.engine_rate(), 5734);
        mode.freq = 200;
        assert_eq!(mode.engine_rate(), 42048);
    }

    #[test]
    fn mixing_args_from_mode() {
        let args = MixingArgs::new(&Mp2kSoundMode::default());
        assert_eq!(args.vol, 1.0);
        assert_eq!(args.fixed_mode_rate, 13379);
        assert!((args.samples_per_buffer_inv - 1.0 / 800.0).abs() < 1e-9);
    }
}
