//! Normalization of raw upstream data into the clip shapes the engine plays.
//!
//! Upstream segments and audio descriptors arrive with optional bounds and
//! several spellings for the same field. All of that is resolved here so the
//! session only ever sees [`VisualClip`]s and [`AudioClip`]s.

use serde::{Deserialize, Serialize};

use crate::{AudioClip, TrackType, VisualClip};

/// Authoring unit that produced a visual clip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDescriptor {
    #[serde(default, alias = "segmentId")]
    pub id: Option<String>,
    #[serde(default, alias = "start")]
    pub start_time: Option<f64>,
    #[serde(default, alias = "end")]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, alias = "imageUrl", alias = "startFrameUrl")]
    pub thumbnail_url: Option<String>,
    #[serde(default, alias = "endFrameUrl")]
    pub end_thumbnail_url: Option<String>,
}

impl SegmentDescriptor {
    /// Length implied by explicit bounds, if any.
    pub fn explicit_duration(&self) -> Option<f64> {
        match (self.start_time, self.end_time, self.duration) {
            (_, _, Some(duration)) => Some(duration),
            (Some(start), Some(end), None) => Some(end - start),
            _ => None,
        }
    }
}

/// Maps ordered segments onto the scene timeline.
///
/// Segments follow each other in order: a segment without a start begins where
/// the previous one ended. Explicit bounds are used where present and a
/// segment with neither an end nor a duration takes an even share of
/// `scene_duration`. A segment without any frame reference keeps its time
/// slot but produces no clip.
pub fn visual_clips_from_segments(segments: &[SegmentDescriptor], scene_duration: f64) -> Vec<VisualClip> {
    if segments.is_empty() {
        return Vec::new();
    }
    let slot = scene_duration.max(0.0) / segments.len() as f64;
    let mut cursor = 0.0;

    segments
        .iter()
        .enumerate()
        .filter_map(|(index, segment)| {
            let start_time = segment.start_time.unwrap_or(cursor);
            let end_time = segment
                .end_time
                .or_else(|| segment.duration.map(|duration| start_time + duration))
                .unwrap_or(start_time + slot);
            cursor = end_time.max(start_time);

            let segment_id = segment
                .id
                .clone()
                .unwrap_or_else(|| format!("segment-{index}"));
            let Some(thumbnail_url) = segment
                .thumbnail_url
                .clone()
                .or_else(|| segment.end_thumbnail_url.clone())
            else {
                tracing::debug!(segment = %segment_id, "segment has no frame reference, skipping");
                return None;
            };

            Some(VisualClip {
                id: format!("visual-{index}"),
                segment_id,
                start_time,
                duration: (end_time - start_time).max(0.0),
                thumbnail_url,
                end_thumbnail_url: segment.end_thumbnail_url.clone(),
            })
        })
        .collect()
}

/// Raw audio clip descriptor as stored per track upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAudioClip {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "audioUrl")]
    pub url: Option<String>,
    #[serde(default, alias = "start")]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub trim_start: Option<f64>,
    #[serde(default)]
    pub r#loop: Option<bool>,
    #[serde(default)]
    pub volume: Option<f32>,
}

/// Raw audio clips grouped by track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioTrackGroups {
    pub voiceover: Vec<RawAudioClip>,
    pub dialogue: Vec<RawAudioClip>,
    pub music: Vec<RawAudioClip>,
    pub sfx: Vec<RawAudioClip>,
}

impl AudioTrackGroups {
    pub fn track(&self, track: TrackType) -> &[RawAudioClip] {
        match track {
            TrackType::Voiceover => &self.voiceover,
            TrackType::Dialogue => &self.dialogue,
            TrackType::Music => &self.music,
            TrackType::Sfx => &self.sfx,
        }
    }

    pub fn len(&self) -> usize {
        TrackType::ALL.iter().map(|track| self.track(*track).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flattens grouped raw clips into [`AudioClip`]s, track by track.
///
/// Clips without a URL are dropped. A missing duration extends the clip to
/// the end of the scene and a missing id is derived from the track and
/// position.
pub fn audio_clips_from_tracks(groups: &AudioTrackGroups, scene_duration: f64) -> Vec<AudioClip> {
    let mut clips = Vec::with_capacity(groups.len());
    for track in TrackType::ALL {
        for (index, raw) in groups.track(track).iter().enumerate() {
            let id = raw.id.clone().unwrap_or_else(|| format!("{track}-{index}"));
            let Some(url) = raw.url.clone().filter(|url| !url.is_empty()) else {
                tracing::warn!(%track, clip = %id, "audio clip has no URL, skipping");
                continue;
            };

            let start_time = raw.start_time.unwrap_or(0.0).max(0.0);
            let duration = raw
                .duration
                .unwrap_or_else(|| (scene_duration - start_time).max(0.0));

            clips.push(AudioClip {
                id,
                url,
                start_time,
                duration,
                trim_start: raw.trim_start.unwrap_or(0.0).max(0.0),
                track_type: track,
                r#loop: raw.r#loop.unwrap_or(false),
                volume: raw.volume.unwrap_or(1.0),
            });
        }
    }
    clips
}
