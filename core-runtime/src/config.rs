//! # Player Configuration
//!
//! Tunables of the playback core.
//!
//! ## Overview
//!
//! `PlayerConfig` is built with [`PlayerConfig::builder`] or loaded from JSON
//! with [`PlayerConfig::from_json_str`]. Every field has a default, so an empty
//! JSON object is a valid configuration. Both paths run [`PlayerConfig::validate`]
//! and fail fast with `Error::Config`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::PlayerConfig;
//! use std::time::Duration;
//!
//! let config = PlayerConfig::builder()
//!     .position_poll_interval(Duration::from_millis(500))
//!     .event_buffer_size(256)
//!     .build()
//!     .expect("valid config");
//!
//! let from_file = PlayerConfig::from_json_str(r#"{ "external_tags_timeout": 3000 }"#)?;
//! ```
//!
//! Durations are expressed in milliseconds in JSON.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const CACHE_DIR_NAME: &str = "external_audio_cache";
const APP_DIR_NAME: &str = "music-player";

/// Playback core configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// How often backends publish their track position
    #[serde(with = "millis")]
    pub position_poll_interval: Duration,

    /// Capacity of every broadcast channel (player events, errors)
    pub event_buffer_size: usize,

    /// Speed applied to the first backend instance
    pub initial_playback_speed: f32,

    /// Left/right balance applied to the first backend instance
    pub initial_sound_balance: (f32, f32),

    /// Bound for reading display name and size of an external file
    #[serde(with = "millis")]
    pub external_metadata_timeout: Duration,

    /// Bound for reading tags of an external file
    #[serde(with = "millis")]
    pub external_tags_timeout: Duration,

    /// Where the copy of the last opened external file is kept
    pub external_cache_dir: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            position_poll_interval: Duration::from_secs(1),
            event_buffer_size: 100,
            initial_playback_speed: 1.0,
            initial_sound_balance: (1.0, 1.0),
            external_metadata_timeout: Duration::from_secs(2),
            external_tags_timeout: Duration::from_secs(2),
            external_cache_dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
        .join(CACHE_DIR_NAME)
}

impl PlayerConfig {
    pub fn builder() -> PlayerConfigBuilder {
        PlayerConfigBuilder::default()
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid player config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Intervals and timeouts are non-zero
    /// - Event buffer size is non-zero
    /// - Playback speed is positive and finite
    /// - Both balance channels are within `0.0..=1.0`
    /// - Cache directory is not empty
    pub fn validate(&self) -> Result<()> {
        if self.position_poll_interval.is_zero() {
            return Err(Error::Config(
                "Position poll interval must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if !(self.initial_playback_speed.is_finite() && self.initial_playback_speed > 0.0) {
            return Err(Error::Config(format!(
                "Playback speed must be positive, got {}",
                self.initial_playback_speed
            )));
        }

        let (left, right) = self.initial_sound_balance;
        if !(0.0..=1.0).contains(&left) || !(0.0..=1.0).contains(&right) {
            return Err(Error::Config(format!(
                "Sound balance must be within 0.0..=1.0, got ({}, {})",
                left, right
            )));
        }

        if self.external_metadata_timeout.is_zero() || self.external_tags_timeout.is_zero() {
            return Err(Error::Config(
                "External file timeouts must be greater than 0".to_string(),
            ));
        }

        if self.external_cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Builder for [`PlayerConfig`].
#[derive(Debug, Default)]
pub struct PlayerConfigBuilder {
    config: PlayerConfig,
}

impl PlayerConfigBuilder {
    pub fn position_poll_interval(mut self, interval: Duration) -> Self {
        self.config.position_poll_interval = interval;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn initial_playback_speed(mut self, speed: f32) -> Self {
        self.config.initial_playback_speed = speed;
        self
    }

    pub fn initial_sound_balance(mut self, left: f32, right: f32) -> Self {
        self.config.initial_sound_balance = (left, right);
        self
    }

    pub fn external_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.config.external_metadata_timeout = timeout;
        self
    }

    pub fn external_tags_timeout(mut self, timeout: Duration) -> Self {
        self.config.external_tags_timeout = timeout;
        self
    }

    pub fn external_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.external_cache_dir = dir.into();
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<PlayerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.position_poll_interval, Duration::from_secs(1));
        assert_eq!(config.event_buffer_size, 100);
        assert_eq!(config.initial_playback_speed, 1.0);
        assert_eq!(config.initial_sound_balance, (1.0, 1.0));
        assert_eq!(config.external_metadata_timeout, Duration::from_secs(2));
        assert_eq!(config.external_tags_timeout, Duration::from_secs(2));
        assert!(config.external_cache_dir.ends_with(CACHE_DIR_NAME));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = PlayerConfig::builder()
            .position_poll_interval(Duration::from_millis(250))
            .event_buffer_size(16)
            .initial_sound_balance(0.5, 1.0)
            .external_cache_dir("/tmp/player-cache")
            .build()
            .unwrap();

        assert_eq!(config.position_poll_interval, Duration::from_millis(250));
        assert_eq!(config.event_buffer_size, 16);
        assert_eq!(config.initial_sound_balance, (0.5, 1.0));
        assert_eq!(config.external_cache_dir, PathBuf::from("/tmp/player-cache"));
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            PlayerConfig::builder().position_poll_interval(Duration::ZERO),
            PlayerConfig::builder().event_buffer_size(0),
            PlayerConfig::builder().initial_playback_speed(0.0),
            PlayerConfig::builder().initial_playback_speed(f32::NAN),
            PlayerConfig::builder().initial_sound_balance(1.5, 1.0),
            PlayerConfig::builder().external_tags_timeout(Duration::ZERO),
            PlayerConfig::builder().external_cache_dir(""),
        ];

        for builder in cases {
            assert!(matches!(builder.build(), Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_from_json_partial() {
        let config = PlayerConfig::from_json_str(
            r#"{ "position_poll_interval": 500, "external_tags_timeout": 3000 }"#,
        )
        .unwrap();

        assert_eq!(config.position_poll_interval, Duration::from_millis(500));
        assert_eq!(config.external_tags_timeout, Duration::from_secs(3));
        assert_eq!(config.event_buffer_size, 100);
    }

    #[test]
    fn test_from_json_rejects_invalid_values() {
        assert!(PlayerConfig::from_json_str(r#"{ "event_buffer_size": 0 }"#).is_err());
        assert!(PlayerConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_json_round_trip_uses_millis() {
        let json = serde_json::to_value(PlayerConfig::default()).unwrap();
        assert_eq!(json["position_poll_interval"], 1000);
    }
}
