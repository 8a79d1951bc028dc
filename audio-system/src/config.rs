//! Audio configuration, read from TOML.
//!
//! ```toml
//! [output]
//! sample_rate = 44100
//! channels = 2
//! frames_per_buffer = 256
//!
//! [mixer]
//! max_instances_per_category = 64
//! completion_capacity = 256
//! master_volume = 1.0
//!
//! [mixer.category_volumes]
//! music = 0.8
//!
//! [bridge]
//! cancel_on_detach = ["music", "ambient"]
//! ```
//!
//! Every key is optional; missing keys take the defaults shown above.

use audio_backend::StreamSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::category::SoundCategory;

/// Upper bound accepted for any volume setting.
pub const MAX_VOLUME: f32 = 4.0;

/// Bring a runtime volume into `0.0..=MAX_VOLUME`; NaN and infinities mute.
pub(crate) fn clamp_volume(volume: f32) -> f32 {
    if volume.is_finite() {
        volume.clamp(0.0, MAX_VOLUME)
    } else {
        0.0
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub output: OutputConfig,
    pub mixer: MixerConfig,
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames_per_buffer: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let spec = StreamSpec::default();
        Self {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            frames_per_buffer: spec.frames_per_buffer,
        }
    }
}

impl OutputConfig {
    pub fn stream_spec(&self) -> StreamSpec {
        StreamSpec {
            sample_rate: self.sample_rate,
            channels: self.channels,
            frames_per_buffer: self.frames_per_buffer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Registry slots per category, allocated once. Activations beyond this are dropped.
    pub max_instances_per_category: usize,
    /// Capacity of the completion queue back to the control thread.
    pub completion_capacity: usize,
    pub master_volume: f32,
    pub category_volumes: CategoryVolumes,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            max_instances_per_category: 64,
            completion_capacity: 256,
            master_volume: 1.0,
            category_volumes: CategoryVolumes::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryVolumes {
    pub music: f32,
    pub effect: f32,
    pub ambient: f32,
    pub voice: f32,
}

impl Default for CategoryVolumes {
    fn default() -> Self {
        Self {
            music: 1.0,
            effect: 1.0,
            ambient: 1.0,
            voice: 1.0,
        }
    }
}

impl CategoryVolumes {
    pub fn get(&self, category: SoundCategory) -> f32 {
        match category {
            SoundCategory::Music => self.music,
            SoundCategory::Effect => self.effect,
            SoundCategory::Ambient => self.ambient,
            SoundCategory::Voice => self.voice,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Categories whose playback stops when the owning component is detached.
    /// Other categories play to completion.
    pub cancel_on_detach: Vec<SoundCategory>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            cancel_on_detach: vec![SoundCategory::Music, SoundCategory::Ambient],
        }
    }
}

impl BridgeConfig {
    pub fn cancels_on_detach(&self, category: SoundCategory) -> bool {
        self.cancel_on_detach.contains(&category)
    }
}

impl AudioConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: AudioConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let out = &self.output;
        if out.sample_rate == 0 || out.channels == 0 || out.frames_per_buffer == 0 {
            return Err(ConfigError::Invalid(
                "output sample_rate, channels and frames_per_buffer must be non-zero".into(),
            ));
        }
        if self.mixer.max_instances_per_category == 0 {
            return Err(ConfigError::Invalid(
                "mixer.max_instances_per_category must be non-zero".into(),
            ));
        }
        if self.mixer.completion_capacity == 0 {
            return Err(ConfigError::Invalid(
                "mixer.completion_capacity must be non-zero".into(),
            ));
        }
        check_volume("mixer.master_volume", self.mixer.master_volume)?;
        for category in SoundCategory::ALL {
            check_volume(
                &format!("mixer.category_volumes.{}", category),
                self.mixer.category_volumes.get(category),
            )?;
        }
        Ok(())
    }
}

fn check_volume(key: &str, v: f32) -> Result<(), ConfigError> {
    if v.is_finite() && (0.0..=MAX_VOLUME).contains(&v) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} must be within 0..={}, got {}",
            key, MAX_VOLUME, v
        )))
    }
}
