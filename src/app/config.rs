//! Mixer configuration, loaded from and saved to TOML.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::{GraphSettings, OutputTaps};
use crate::error::{MixerError, Result};

/// Tunables for the mixer core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Engine sample rate in Hz
    pub sample_rate: u32,

    /// Length of every parameter ramp, in seconds
    pub ramp_seconds: f32,

    /// Stage footprint; half its diagonal is the maximum distance from centre
    pub stage_width: f32,
    pub stage_height: f32,

    /// Radius of the circle instruments are placed on
    pub orbit_radius: f32,

    /// Initial instrument height (0.5 plays at normal speed)
    pub home_height: f32,

    /// Radians per tick while orbiting
    pub orbit_speed: f32,

    /// Default tracks, assigned to instruments cyclically
    pub tracks: Vec<String>,

    pub low_shelf_gain_db: f32,
    pub high_shelf_gain_db: f32,

    /// Light intensity multiplier while an instrument is dragged
    pub drag_intensity_boost: f32,

    pub max_ensemble_size: usize,

    /// Size of the recorder ring, in seconds of stereo audio
    pub recorder_capacity_seconds: f32,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            ramp_seconds: 0.1,
            stage_width: 20.0,
            stage_height: 20.0,
            orbit_radius: 5.0,
            home_height: 0.5,
            orbit_speed: 0.01,
            tracks: vec![
                "drums.mp3".to_string(),
                "bass.mp3".to_string(),
                "guitar.mp3".to_string(),
                "vocals.mp3".to_string(),
            ],
            low_shelf_gain_db: -12.0,
            high_shelf_gain_db: -12.0,
            drag_intensity_boost: 4.0,
            max_ensemble_size: 16,
            recorder_capacity_seconds: 30.0,
        }
    }
}

impl MixerConfig {
    pub fn ramp(&self) -> Duration {
        Duration::from_secs_f32(self.ramp_seconds.max(0.0))
    }

    pub fn graph_settings(&self) -> GraphSettings {
        GraphSettings {
            low_shelf_gain_db: self.low_shelf_gain_db,
            high_shelf_gain_db: self.high_shelf_gain_db,
            taps: OutputTaps::default(),
        }
    }

    pub fn recorder_capacity_frames(&self) -> usize {
        (self.recorder_capacity_seconds.max(0.0) * self.sample_rate as f32) as usize
    }

    /// Reject settings the core cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(MixerError::Config("sample_rate must be positive".to_string()));
        }
        if self.tracks.is_empty() {
            return Err(MixerError::Config("at least one track is required".to_string()));
        }
        if !(self.stage_width > 0.0 && self.stage_height > 0.0) {
            return Err(MixerError::Config("stage dimensions must be positive".to_string()));
        }
        Ok(())
    }
}

/// Loads, holds and saves a [`MixerConfig`]
pub struct ConfigManager {
    settings: MixerConfig,
    config_file: PathBuf,
}

impl ConfigManager {
    /// Use the per-user config file, falling back to defaults if absent
    pub fn new() -> Result<Self> {
        let mut config_dir = dirs::config_dir()
            .ok_or_else(|| MixerError::Config("Failed to determine config directory".to_string()))?;
        config_dir.push("orbit-mixer");
        Self::with_file(config_dir.join("config.toml"))
    }

    /// Use a specific config file (mainly for testing)
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_file = path.as_ref().to_path_buf();
        let settings = if config_file.exists() {
            Self::load_from_file(&config_file)?
        } else {
            debug!("Config file {:?} not found, using defaults", config_file);
            MixerConfig::default()
        };
        settings.validate()?;

        Ok(Self {
            settings,
            config_file,
        })
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<MixerConfig> {
        let contents = fs::read_to_string(path)
            .map_err(|e| MixerError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| MixerError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save(&self) -> Result<()> {
        let toml = toml::to_string_pretty(&self.settings)
            .map_err(|e| MixerError::Config(format!("Failed to serialize settings: {}", e)))?;

        if let Some(parent) = self.config_file.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    MixerError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        fs::write(&self.config_file, toml)
            .map_err(|e| MixerError::Config(format!("Failed to write config file: {}", e)))?;

        debug!("Saved config to {:?}", self.config_file);
        Ok(())
    }

    pub fn settings(&self) -> &MixerConfig {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut MixerConfig {
        &mut self.settings
    }

    pub fn path(&self) -> &Path {
        &self.config_file
    }
}
