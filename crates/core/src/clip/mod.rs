use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification used to group audio clips for volume and mute control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Voiceover,
    Dialogue,
    Music,
    Sfx,
}

impl TrackType {
    pub const ALL: [TrackType; 4] = [
        TrackType::Voiceover,
        TrackType::Dialogue,
        TrackType::Music,
        TrackType::Sfx,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            TrackType::Voiceover => 0,
            TrackType::Dialogue => 1,
            TrackType::Music => 2,
            TrackType::Sfx => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackType::Voiceover => "voiceover",
            TrackType::Dialogue => "dialogue",
            TrackType::Music => "music",
            TrackType::Sfx => "sfx",
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One playable audio asset placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioClip {
    pub id: String,
    pub url: String,
    pub start_time: f64,
    pub duration: f64,
    #[serde(default)]
    pub trim_start: f64,
    pub track_type: TrackType,
    #[serde(default)]
    pub r#loop: bool,
    /// Per-clip gain multiplied with the track volume.
    #[serde(default = "unit_volume")]
    pub volume: f32,
}

fn unit_volume() -> f32 {
    1.0
}

impl AudioClip {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        track_type: TrackType,
        start_time: f64,
        duration: f64,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            start_time,
            duration,
            trim_start: 0.0,
            track_type,
            r#loop: false,
            volume: 1.0,
        }
    }

    pub fn with_trim_start(mut self, trim_start: f64) -> Self {
        self.trim_start = trim_start;
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.r#loop = looping;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Half-open containment test against `[start, start + duration)`.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time()
    }

    /// Position inside the underlying resource that corresponds to `time`.
    pub fn resource_position(&self, time: f64) -> f64 {
        time - self.start_time + self.trim_start
    }
}

/// One displayable segment of the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualClip {
    pub id: String,
    /// Back-reference to the authoring segment. Never used for lifecycle.
    pub segment_id: String,
    pub start_time: f64,
    pub duration: f64,
    pub thumbnail_url: String,
    #[serde(default)]
    pub end_thumbnail_url: Option<String>,
}

impl VisualClip {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time()
    }
}

/// Normalized input of one playback session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneTimeline {
    pub duration: f64,
    #[serde(default)]
    pub visual_clips: Vec<VisualClip>,
    #[serde(default)]
    pub audio_clips: Vec<AudioClip>,
}

impl SceneTimeline {
    pub fn new(duration: f64, visual_clips: Vec<VisualClip>, audio_clips: Vec<AudioClip>) -> Self {
        Self {
            // Negative or NaN durations collapse to an empty scene.
            duration: if duration.is_finite() { duration.max(0.0) } else { 0.0 },
            visual_clips,
            audio_clips,
        }
    }
}

/// Two clips on the same track whose ranges intersect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackOverlap {
    pub track_type: TrackType,
    pub first: String,
    pub second: String,
    pub overlap_seconds: f64,
}

/// Reports every pair of same-track clips with intersecting ranges.
///
/// Overlaps are permitted during playback (each clip keeps its own handle), so
/// this is diagnostics only.
pub fn find_track_overlaps(clips: &[AudioClip]) -> Vec<TrackOverlap> {
    let mut overlaps = Vec::new();
    for (index, first) in clips.iter().enumerate() {
        for second in &clips[index + 1..] {
            if first.track_type != second.track_type {
                continue;
            }
            let start = first.start_time.max(second.start_time);
            let end = first.end_time().min(second.end_time());
            if end > start {
                overlaps.push(TrackOverlap {
                    track_type: first.track_type,
                    first: first.id.clone(),
                    second: second.id.clone(),
                    overlap_seconds: end - start,
                });
            }
        }
    }
    overlaps
}
