//! Configuration for meditation sessions
//!
//! Holds phase timing, gain defaults and audio-context settings. Every field
//! has a default, so a TOML file only needs the values it overrides.

use crate::{ReverieError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Sample rate of generated narration (16-bit mono PCM)
pub const NARRATION_SAMPLE_RATE: u32 = 24000;

/// Configuration for a meditation session
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MeditationConfig {
    /// Length of the breathing phase in milliseconds
    pub breathing_ms: u64,

    /// Length of the conclusion phase in milliseconds
    pub conclusion_ms: u64,

    /// Floor for the estimated meditation-phase duration in milliseconds
    pub min_meditation_ms: u64,

    /// Reading speed used to estimate narration length from the analysis text
    pub narration_chars_per_sec: f64,

    /// Progress sampler interval in milliseconds
    pub progress_interval_ms: u64,

    /// Music fade-out length at the start of the conclusion phase
    pub music_fade_ms: u64,

    /// Music gain multiplier while narration runs (meditation phase)
    pub music_duck_factor: f32,

    /// Initial narration gain (0.0 - 1.0)
    pub narration_gain: f32,

    /// Initial music gain (0.0 - 1.0)
    pub music_gain: f32,

    /// Sample rate of the raw narration payload
    pub narration_sample_rate: u32,

    /// Sample rate of the offline render context
    pub offline_sample_rate: u32,

    /// Render block length of the offline context in milliseconds
    pub offline_block_ms: u64,
}

impl Default for MeditationConfig {
    fn default() -> Self {
        Self {
            breathing_ms: 8000,
            conclusion_ms: 5000,
            min_meditation_ms: 10_000,
            narration_chars_per_sec: 150.0,
            progress_interval_ms: 100,
            music_fade_ms: 1500,
            music_duck_factor: 0.6,
            narration_gain: 1.0,
            music_gain: 0.5,
            narration_sample_rate: NARRATION_SAMPLE_RATE,
            offline_sample_rate: NARRATION_SAMPLE_RATE,
            offline_block_ms: 20,
        }
    }
}

impl MeditationConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ReverieError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Set the initial gains
    pub fn with_gains(mut self, narration: f32, music: f32) -> Self {
        self.narration_gain = narration.clamp(0.0, 1.0);
        self.music_gain = music.clamp(0.0, 1.0);
        self
    }

    /// Set the fixed phase lengths
    pub fn with_phase_lengths(mut self, breathing: Duration, conclusion: Duration) -> Self {
        self.breathing_ms = breathing.as_millis() as u64;
        self.conclusion_ms = conclusion.as_millis() as u64;
        self
    }

    /// Set the progress sampler interval
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn breathing(&self) -> Duration {
        Duration::from_millis(self.breathing_ms)
    }

    pub fn conclusion(&self) -> Duration {
        Duration::from_millis(self.conclusion_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn music_fade(&self) -> Duration {
        Duration::from_millis(self.music_fade_ms)
    }

    pub fn offline_block(&self) -> Duration {
        Duration::from_millis(self.offline_block_ms)
    }

    /// Estimated meditation-phase length for an analysis text
    ///
    /// This is a display estimate only; it is never reconciled with the
    /// decoded narration length.
    pub fn estimate_meditation(&self, analysis: &str) -> Duration {
        let chars = analysis.chars().count() as f64;
        let estimated_ms = (chars / self.narration_chars_per_sec * 1000.0).round() as u64;
        Duration::from_millis(estimated_ms.max(self.min_meditation_ms))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.progress_interval_ms == 0 {
            return Err(ReverieError::Config(
                "progress_interval_ms must be greater than 0".into(),
            ));
        }
        if self.narration_chars_per_sec <= 0.0 {
            return Err(ReverieError::Config(
                "narration_chars_per_sec must be positive".into(),
            ));
        }
        if self.narration_sample_rate == 0 || self.offline_sample_rate == 0 {
            return Err(ReverieError::Config("Sample rates must be greater than 0".into()));
        }
        if self.offline_block_ms == 0 {
            return Err(ReverieError::Config(
                "offline_block_ms must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.music_duck_factor) {
            return Err(ReverieError::Config(
                "music_duck_factor must be between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }
}
