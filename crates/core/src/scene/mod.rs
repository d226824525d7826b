use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::convert::{self, AudioTrackGroups, SegmentDescriptor};
use crate::{PreviewError, Result, SceneTimeline, TrackLevels, TrackType};

/// Raw scene description as produced by upstream scene assembly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    /// Scene length in seconds. Derived from the segments when absent.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub segments: Vec<SegmentDescriptor>,
    #[serde(default)]
    pub audio: AudioTrackGroups,
    #[serde(default)]
    pub track_volumes: BTreeMap<TrackType, f32>,
    #[serde(default)]
    pub track_enabled: BTreeMap<TrackType, bool>,
}

impl SceneDescriptor {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Initial mixer overrides carried by the scene.
    pub fn levels(&self) -> TrackLevels {
        TrackLevels {
            track_volumes: self.track_volumes.clone(),
            track_enabled: self.track_enabled.clone(),
        }
    }

    /// Scene length: the explicit duration, or the sum of segment lengths.
    pub fn resolved_duration(&self) -> Result<f64> {
        let duration = match self.duration {
            Some(duration) => duration,
            None => {
                let mut total = 0.0;
                for (index, segment) in self.segments.iter().enumerate() {
                    total += segment.explicit_duration().ok_or_else(|| {
                        PreviewError::invalid_scene(format!(
                            "scene has no duration and segment {index} has no bounds"
                        ))
                    })?;
                }
                total
            }
        };

        if !duration.is_finite() || duration < 0.0 {
            return Err(PreviewError::invalid_scene(format!(
                "duration must be a non-negative number of seconds, got {duration}"
            )));
        }
        Ok(duration)
    }

    /// Normalizes the descriptor into the clip shapes the engine consumes.
    pub fn to_timeline(&self) -> Result<SceneTimeline> {
        let duration = self.resolved_duration()?;
        Ok(SceneTimeline::new(
            duration,
            convert::visual_clips_from_segments(&self.segments, duration),
            convert::audio_clips_from_tracks(&self.audio, duration),
        ))
    }
}
