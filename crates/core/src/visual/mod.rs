use crate::VisualClip;

/// Which of a clip's two reference frames is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameChoice {
    Start,
    End,
}

/// Index of the clip showing at `time`.
///
/// Returns the first clip whose range contains `time`. When nothing matches,
/// the last clip is returned so the preview freezes on its final frame.
pub fn select_index(clips: &[VisualClip], time: f64) -> Option<usize> {
    clips
        .iter()
        .position(|clip| clip.contains(time))
        .or_else(|| clips.len().checked_sub(1))
}

pub fn select_visual_clip(clips: &[VisualClip], time: f64) -> Option<&VisualClip> {
    select_index(clips, time).map(|index| &clips[index])
}

/// Start frame for the first half of the clip, end frame afterwards.
pub fn frame_choice(clip: &VisualClip, time: f64) -> FrameChoice {
    let offset = time - clip.start_time;
    if offset < clip.duration * 0.5 {
        FrameChoice::Start
    } else {
        FrameChoice::End
    }
}

/// URL of the frame to display for `clip` at `time`. Clips without an end
/// frame keep showing their start frame.
pub fn display_frame(clip: &VisualClip, time: f64) -> &str {
    match (frame_choice(clip, time), clip.end_thumbnail_url.as_deref()) {
        (FrameChoice::End, Some(end)) => end,
        _ => clip.thumbnail_url.as_str(),
    }
}
