use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audio::DRIFT_THRESHOLD_SECONDS;
use crate::{Result, TrackLevels, TrackType};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub playback: PlaybackConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Configuration specific to the playback engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaybackConfig {
    pub tick_rate_hz: u32,
    pub drift_threshold_seconds: f64,
    pub track_volumes: BTreeMap<TrackType, f32>,
    pub track_enabled: BTreeMap<TrackType, bool>,
}

impl PlaybackConfig {
    /// Initial mixer overrides carried by the configuration.
    pub fn levels(&self) -> TrackLevels {
        TrackLevels {
            track_volumes: self.track_volumes.clone(),
            track_enabled: self.track_enabled.clone(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            drift_threshold_seconds: DRIFT_THRESHOLD_SECONDS,
            track_volumes: BTreeMap::new(),
            track_enabled: BTreeMap::new(),
        }
    }
}
