use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::TrackType;

/// Optional per-track overrides supplied by configuration or a scene file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackLevels {
    #[serde(default)]
    pub track_volumes: BTreeMap<TrackType, f32>,
    #[serde(default)]
    pub track_enabled: BTreeMap<TrackType, bool>,
}

impl TrackLevels {
    /// Layers `other` on top of `self`; entries in `other` win.
    pub fn merged(mut self, other: &TrackLevels) -> Self {
        self.track_volumes
            .extend(other.track_volumes.iter().map(|(k, v)| (*k, *v)));
        self.track_enabled
            .extend(other.track_enabled.iter().map(|(k, v)| (*k, *v)));
        self
    }
}

/// Session-scoped volume and enable flags per track type.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMixer {
    volumes: [f32; 4],
    enabled: [bool; 4],
}

impl Default for TrackMixer {
    fn default() -> Self {
        Self {
            volumes: [1.0; 4],
            enabled: [true; 4],
        }
    }
}

impl TrackMixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_levels(levels: &TrackLevels) -> Self {
        let mut mixer = Self::new();
        for (track, volume) in &levels.track_volumes {
            mixer.set_volume(*track, *volume);
        }
        for (track, enabled) in &levels.track_enabled {
            mixer.set_enabled(*track, *enabled);
        }
        mixer
    }

    /// Stores `volume` clamped to `[0, 1]`. Returns the stored value.
    pub fn set_volume(&mut self, track: TrackType, volume: f32) -> f32 {
        let volume = clamp_unit(volume);
        self.volumes[track.index()] = volume;
        volume
    }

    pub fn set_enabled(&mut self, track: TrackType, enabled: bool) {
        self.enabled[track.index()] = enabled;
    }

    pub fn volume(&self, track: TrackType) -> f32 {
        self.volumes[track.index()]
    }

    pub fn is_enabled(&self, track: TrackType) -> bool {
        self.enabled[track.index()]
    }

    /// Volume a handle on `track` should play at; zero while disabled.
    pub fn effective_volume(&self, track: TrackType) -> f32 {
        if self.is_enabled(track) {
            self.volume(track)
        } else {
            0.0
        }
    }

    pub fn volumes(&self) -> BTreeMap<TrackType, f32> {
        TrackType::ALL
            .iter()
            .map(|track| (*track, self.volume(*track)))
            .collect()
    }

    pub fn enabled(&self) -> BTreeMap<TrackType, bool> {
        TrackType::ALL
            .iter()
            .map(|track| (*track, self.is_enabled(*track)))
            .collect()
    }
}

pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
