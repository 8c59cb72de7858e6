//! Player configuration loaded from TOML.

use std::path::{Path, PathBuf};

use m4a_ir::{CgbPolyphony, EngineSoundMode, Mp2kSoundMode, PlaylistEntry, ResamplerType, ReverbType, ENGINE_RATES};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
}

/// Driver parameters (`[mp2k]` table).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Mp2kConfig {
    pub vol: u8,
    pub rev: u8,
    pub freq: u8,
    pub max_channels: u8,
}

impl Default for Mp2kConfig {
    fn default() -> Self {
        let mode = Mp2kSoundMode::default();
        Self { vol: mode.vol, rev: mode.rev, freq: mode.freq, max_channels: mode.max_channels }
    }
}

/// Read-only settings snapshot handed to the exporter and the live player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerConfig {
    pub wav_output_dir: PathBuf,
    pub resampler_normal: ResamplerType,
    pub resampler_fixed: ResamplerType,
    pub reverb: ReverbType,
    pub cgb_polyphony: CgbPolyphony,
    pub dma_buffer_len: u32,
    pub track_limit: u8,
    pub max_loops: i8,
    pub pad_start_secs: f64,
    pub pad_end_secs: f64,
    pub accurate_ch3_quantization: bool,
    pub accurate_ch3_volume: bool,
    pub emulate_cgb_sustain_bug: bool,
    /// Export length cap per song, in minutes.
    pub max_minutes: u32,
    pub mp2k: Mp2kConfig,
    /// Songs to export; empty means the whole song table.
    pub playlist: Vec<PlaylistEntry>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let e = EngineSoundMode::default();
        Self {
            wav_output_dir: PathBuf::from("wav"),
            resampler_normal: e.resampler_normal,
            resampler_fixed: e.resampler_fixed,
            reverb: e.reverb,
            cgb_polyphony: e.cgb_polyphony,
            dma_buffer_len: e.dma_buffer_len,
            track_limit: e.track_limit,
            max_loops: e.max_loops,
            pad_start_secs: e.pad_start_secs,
            pad_end_secs: e.pad_end_secs,
            accurate_ch3_quantization: e.accurate_ch3_quantization,
            accurate_ch3_volume: e.accurate_ch3_volume,
            emulate_cgb_sustain_bug: e.emulate_cgb_sustain_bug,
            max_minutes: 60,
            mp2k: Mp2kConfig::default(),
            playlist: Vec::new(),
        }
    }
}

impl PlayerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: PlayerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, i64, bool); 5] = [
            ("mp2k.vol", self.mp2k.vol as i64, self.mp2k.vol <= 15),
            ("mp2k.freq", self.mp2k.freq as i64, (1..=ENGINE_RATES.len() as u8).contains(&self.mp2k.freq)),
            ("track_limit", self.track_limit as i64, (1..=16).contains(&self.track_limit)),
            ("pad_start_secs", self.pad_start_secs as i64, self.pad_start_secs >= 0.0),
            ("pad_end_secs", self.pad_end_secs as i64, self.pad_end_secs >= 0.0),
        ];
        match checks.into_iter().find(|&(_, _, ok)| !ok) {
            Some((field, value, _)) => Err(ConfigError::OutOfRange { field, value }),
            None => Ok(()),
        }
    }

    pub fn mp2k_mode(&self) -> Mp2kSoundMode {
        Mp2kSoundMode {
            vol: self.mp2k.vol,
            rev: self.mp2k.rev,
            freq: self.mp2k.freq,
            max_channels: self.mp2k.max_channels,
        }
    }

    pub fn engine_mode(&self) -> EngineSoundMode {
        EngineSoundMode {
            resampler_normal: self.resampler_normal,
            resampler_fixed: self.resampler_fixed,
            reverb: self.reverb,
            cgb_polyphony: self.cgb_polyphony,
            dma_buffer_len: self.dma_buffer_len,
            track_limit: self.track_limit,
            max_loops: self.max_loops,
            pad_start_secs: self.pad_start_secs,
            pad_end_secs: self.pad_end_secs,
            accurate_ch3_quantization: self.accurate_ch3_quantization,
            accurate_ch3_volume: self.accurate_ch3_volume,
            emulate_cgb_sustain_bug: self.emulate_cgb_sustain_bug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = PlayerConfig::from_toml_str("").unwrap();
        assert_eq!(config, PlayerConfig::default());
        assert_eq!(config.engine_mode(), EngineSoundMode::default());
        assert_eq!(config.mp2k_mode(), Mp2kSoundMode::default());
    }

    #[test]
    fn parses_enums_and_tables() {
        let config = PlayerConfig::from_toml_str(
            r#"
            wav_output_dir = "out"
            resampler_normal = "blep"
            reverb = "gs2"
            cgb_polyphony = "mono-smooth"
            max_loops = 0
            pad_end_secs = 1.5

            [mp2k]
            vol = 12
            rev = 0x85
            freq = 9

            [[playlist]]
            name = "Title"
            id = 3
            "#,
        )
        .unwrap();
        let engine = config.engine_mode();
        assert_eq!(engine.resampler_normal, ResamplerType::Blep);
        assert_eq!(engine.resampler_fixed, ResamplerType::Linear);
        assert_eq!(engine.reverb, ReverbType::Gs2);
        assert_eq!(engine.cgb_polyphony, CgbPolyphony::MonoSmooth);
        assert_eq!(engine.max_loops, 0);
        assert_eq!(engine.pad_end_secs, 1.5);
        let mp2k = config.mp2k_mode();
        assert_eq!((mp2k.vol, mp2k.rev, mp2k.freq, mp2k.max_channels), (12, 0x85, 9, 12));
        assert_eq!(config.playlist, vec![PlaylistEntry::new("Title", 3)]);
        assert_eq!(config.wav_output_dir, PathBuf::from("out"));
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        assert!(matches!(PlayerConfig::from_toml_str("reverb = \"hall\""), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(matches!(PlayerConfig::from_toml_str("volume = 3"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = PlayerConfig::from_toml_str("[mp2k]\nfreq = 13").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "mp2k.freq", value: 13 }));
        let err = PlayerConfig::from_toml_str("track_limit = 0").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "track_limit", .. }));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(matches!(PlayerConfig::load(&path), Err(ConfigError::Io { .. })));
        std::fs::write(&path, "max_loops = 2").unwrap();
        assert_eq!(PlayerConfig::load(&path).unwrap().max_loops, 2);
    }
}
