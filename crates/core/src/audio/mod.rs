use std::collections::{HashMap, HashSet};

use crate::mixer::clamp_unit;
use crate::{AudioClip, HandleError, Result, TrackMixer, TrackType};

pub mod simulated;

pub use simulated::{SimulatedBackend, SimulatedHandle, SimulatedProbe};

/// Default tolerance between a handle's reported position and the clock.
pub const DRIFT_THRESHOLD_SECONDS: f64 = 0.2;

/// A single playable audio resource owned by the host's media subsystem.
pub trait AudioHandle {
    /// Attempts to start playback. The host may refuse, e.g. before a user
    /// gesture has unlocked audio.
    fn play(&mut self) -> std::result::Result<(), HandleError>;
    fn pause(&mut self);
    fn is_playing(&self) -> bool;
    /// Reported position inside the resource, in seconds.
    fn position(&self) -> f64;
    fn set_position(&mut self, seconds: f64);
    fn set_volume(&mut self, volume: f32);
    /// Drops the reference to the underlying resource. The handle must not
    /// produce output afterwards.
    fn release(&mut self);
    /// Length of the underlying resource in seconds, when the host knows it.
    fn length(&self) -> Option<f64> {
        None
    }
}

/// Factory for [`AudioHandle`]s. Applies the clip's loop flag at creation.
pub trait AudioBackend {
    type Handle: AudioHandle;

    fn create(&mut self, clip: &AudioClip) -> Result<Self::Handle>;
}

/// Pool identity of a handle: one per distinct clip id and source URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleKey {
    pub clip_id: String,
    pub url: String,
}

impl HandleKey {
    pub fn for_clip(clip: &AudioClip) -> Self {
        Self {
            clip_id: clip.id.clone(),
            url: clip.url.clone(),
        }
    }
}

/// Counters describing what one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: usize,
    pub corrected: usize,
    pub paused: usize,
    pub muted: usize,
    pub failed: usize,
}

/// Owns every audio handle of a session and keeps them aligned with the clock.
pub struct AudioPool<H: AudioHandle> {
    handles: HashMap<HandleKey, H>,
    drift_threshold: f64,
}

impl<H: AudioHandle> AudioPool<H> {
    pub fn new(drift_threshold: f64) -> Self {
        Self {
            handles: HashMap::new(),
            drift_threshold: drift_threshold.max(0.0),
        }
    }

    pub fn drift_threshold(&self) -> f64 {
        self.drift_threshold
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Creates handles for keys that are new in `clips` and releases handles
    /// whose key is no longer referenced. Existing handles are kept as-is.
    pub fn configure<B>(&mut self, clips: &[AudioClip], backend: &mut B)
    where
        B: AudioBackend<Handle = H>,
    {
        let required: HashSet<HandleKey> = clips.iter().map(HandleKey::for_clip).collect();

        let stale: Vec<HandleKey> = self
            .handles
            .keys()
            .filter(|key| !required.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(mut handle) = self.handles.remove(&key) {
                handle.pause();
                handle.release();
                tracing::debug!(clip = %key.clip_id, "released audio handle");
            }
        }

        for clip in clips {
            let key = HandleKey::for_clip(clip);
            if self.handles.contains_key(&key) {
                continue;
            }
            match backend.create(clip) {
                Ok(handle) => {
                    self.handles.insert(key, handle);
                }
                Err(err) => {
                    tracing::warn!(clip = %clip.id, url = %clip.url, %err, "could not create audio handle");
                }
            }
        }
    }

    /// Brings every handle in line with the clock at `elapsed`.
    ///
    /// Clips are visited in order, so when several clips share a handle the
    /// last one wins for this pass.
    pub fn reconcile(&mut self, clips: &[AudioClip], mixer: &TrackMixer, elapsed: f64) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let threshold = self.drift_threshold;

        for clip in clips {
            let Some(handle) = self.handles.get_mut(&HandleKey::for_clip(clip)) else {
                continue;
            };

            handle.set_volume(clip_volume(clip, mixer));
            if !mixer.is_enabled(clip.track_type) {
                if handle.is_playing() {
                    handle.pause();
                    report.muted += 1;
                }
                continue;
            }

            if clip.contains(elapsed) {
                let target = handle_target(clip, &*handle, elapsed);
                if !handle.is_playing() {
                    handle.set_position(target);
                    match handle.play() {
                        Ok(()) => report.started += 1,
                        Err(err) => {
                            report.failed += 1;
                            tracing::debug!(clip = %clip.id, %err, "audio start failed");
                        }
                    }
                } else {
                    let drift = handle_drift(clip, &*handle, target);
                    if drift >= threshold {
                        tracing::debug!(clip = %clip.id, drift, "correcting audio drift");
                        handle.set_position(target);
                        report.corrected += 1;
                    }
                }
            } else if handle.is_playing() {
                handle.pause();
                report.paused += 1;
            }
        }

        report
    }

    /// Re-applies the mixer to the handles of `track` without touching their
    /// transport state, except that a disabled track is paused.
    pub fn apply_mix(&mut self, clips: &[AudioClip], mixer: &TrackMixer, track: TrackType) {
        for clip in clips.iter().filter(|clip| clip.track_type == track) {
            let Some(handle) = self.handles.get_mut(&HandleKey::for_clip(clip)) else {
                continue;
            };
            handle.set_volume(clip_volume(clip, mixer));
            if !mixer.is_enabled(track) && handle.is_playing() {
                handle.pause();
            }
        }
    }

    /// Positions every handle whose clip covers `time` without starting it.
    pub fn align_paused(&mut self, clips: &[AudioClip], time: f64) {
        for clip in clips.iter().filter(|clip| clip.contains(time)) {
            if let Some(handle) = self.handles.get_mut(&HandleKey::for_clip(clip)) {
                let target = handle_target(clip, &*handle, time);
                handle.set_position(target);
            }
        }
    }

    pub fn pause_all(&mut self) {
        for handle in self.handles.values_mut() {
            if handle.is_playing() {
                handle.pause();
            }
        }
    }

    /// Pauses and rewinds every handle.
    pub fn stop_all(&mut self) {
        for handle in self.handles.values_mut() {
            handle.pause();
            handle.set_position(0.0);
        }
    }

    /// Pauses and releases every handle, leaving the pool empty.
    pub fn release_all(&mut self) {
        for (key, mut handle) in self.handles.drain() {
            handle.pause();
            handle.release();
            tracing::trace!(clip = %key.clip_id, "released audio handle");
        }
    }
}

impl<H: AudioHandle> Drop for AudioPool<H> {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl<H: AudioHandle> std::fmt::Debug for AudioPool<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPool")
            .field("handles", &self.handles.len())
            .field("drift_threshold", &self.drift_threshold)
            .finish()
    }
}

fn clip_volume(clip: &AudioClip, mixer: &TrackMixer) -> f32 {
    mixer.effective_volume(clip.track_type) * clamp_unit(clip.volume)
}

/// Known loop length of the resource behind `handle`, if `clip` loops.
fn loop_length<H: AudioHandle>(clip: &AudioClip, handle: &H) -> Option<f64> {
    handle
        .length()
        .filter(|length| clip.r#loop && *length > 0.0)
}

/// Where `handle` should be at `elapsed`, wrapped into the resource when the
/// clip loops over a shorter file.
fn handle_target<H: AudioHandle>(clip: &AudioClip, handle: &H, elapsed: f64) -> f64 {
    let target = clip.resource_position(elapsed);
    match loop_length(clip, handle) {
        Some(length) => target.rem_euclid(length),
        None => target,
    }
}

/// Distance between the handle and `target`. Looping handles are compared on
/// the loop circle so a wrap is not mistaken for drift.
fn handle_drift<H: AudioHandle>(clip: &AudioClip, handle: &H, target: f64) -> f64 {
    let drift = (handle.position() - target).abs();
    match loop_length(clip, handle) {
        Some(length) => {
            let drift = drift.rem_euclid(length);
            drift.min(length - drift)
        }
        None => drift,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn pool_with(
        clips: &[AudioClip],
    ) -> (AudioPool<SimulatedHandle<ManualClock>>, SimulatedBackend<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let mut backend = SimulatedBackend::new(clock.clone());
        let mut pool = AudioPool::new(DRIFT_THRESHOLD_SECONDS);
        pool.configure(clips, &mut backend);
        (pool, backend, clock)
    }

    #[test]
    fn creates_one_handle_per_clip_and_url() {
        let clips = vec![
            AudioClip::new("vo", "vo.mp3", TrackType::Voiceover, 0.0, 2.0),
            AudioClip::new("vo", "vo-alt.mp3", TrackType::Voiceover, 2.0, 2.0),
            AudioClip::new("bed", "bed.mp3", TrackType::Music, 0.0, 4.0),
        ];
        let (pool, backend, _) = pool_with(&clips);

        assert_eq!(pool.len(), 3);
        assert_eq!(backend.created(), 3);
    }

    #[test]
    fn reconfigure_keeps_shared_and_releases_stale_handles() {
        let first = vec![
            AudioClip::new("vo", "vo.mp3", TrackType::Voiceover, 0.0, 2.0),
            AudioClip::new("sfx", "hit.wav", TrackType::Sfx, 1.0, 0.5),
        ];
        let (mut pool, mut backend, _) = pool_with(&first);
        let vo = backend.probe("vo", "vo.mp3").unwrap();
        let sfx = backend.probe("sfx", "hit.wav").unwrap();

        let second = vec![AudioClip::new("vo", "vo.mp3", TrackType::Voiceover, 0.0, 2.0)];
        pool.configure(&second, &mut backend);

        assert_eq!(pool.len(), 1);
        assert_eq!(backend.created(), 2);
        assert!(!vo.is_released());
        assert!(sfx.is_released());
    }

    #[test]
    fn starts_in_range_handle_at_trimmed_position() {
        let clips = vec![AudioClip::new("vo", "vo.mp3", TrackType::Voiceover, 1.0, 3.0).with_trim_start(0.5)];
        let (mut pool, backend, _) = pool_with(&clips);

        let report = pool.reconcile(&clips, &TrackMixer::new(), 2.0);
        let probe = backend.probe("vo", "vo.mp3").unwrap();

        assert_eq!(report.started, 1);
        assert!(probe.is_playing());
        assert!((probe.position() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn pauses_handle_outside_its_range() {
        let clips = vec![AudioClip::new("vo", "vo.mp3", TrackType::Voiceover, 0.0, 1.0)];
        let (mut pool, backend, _) = pool_with(&clips);
        pool.reconcile(&clips, &TrackMixer::new(), 0.5);

        let report = pool.reconcile(&clips, &TrackMixer::new(), 1.2);
        assert_eq!(report.paused, 1);
        assert!(!backend.probe("vo", "vo.mp3").unwrap().is_playing());
    }

    #[test]
    fn blocked_start_is_absorbed() {
        let clips = vec![
            AudioClip::new("vo", "vo.mp3", TrackType::Voiceover, 0.0, 2.0),
            AudioClip::new("bed", "bed.mp3", TrackType::Music, 0.0, 2.0),
        ];
        let (mut pool, backend, _) = pool_with(&clips);
        backend.set_autoplay_blocked(true);

        let report = pool.reconcile(&clips, &TrackMixer::new(), 0.5);
        assert_eq!(report.failed, 2);
        assert_eq!(report.started, 0);

        backend.set_autoplay_blocked(false);
        let report = pool.reconcile(&clips, &TrackMixer::new(), 0.6);
        assert_eq!(report.started, 2);
    }

    #[test]
    fn drift_below_threshold_is_left_alone() {
        let clips = vec![AudioClip::new("vo", "vo.mp3", TrackType::Voiceover, 0.0, 5.0)];
        let (mut pool, backend, _) = pool_with(&clips);
        let mixer = TrackMixer::new();
        pool.reconcile(&clips, &mixer, 1.0);
        let probe = backend.probe("vo", "vo.mp3").unwrap();
        let seeks = probe.seek_count();

        probe.nudge(0.1);
        let report = pool.reconcile(&clips, &mixer, 1.0);
        assert_eq!(report.corrected, 0);
        assert_eq!(probe.seek_count(), seeks);

        probe.nudge(0.25);
        let report = pool.reconcile(&clips, &mixer, 1.0);
        assert_eq!(report.corrected, 1);
        assert_eq!(probe.seek_count(), seeks + 1);
        assert!((probe.position() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disabled_track_is_silenced_and_paused() {
        let clips = vec![AudioClip::new("bed", "bed.mp3", TrackType::Music, 0.0, 5.0)];
        let (mut pool, backend, _) = pool_with(&clips);
        let mut mixer = TrackMixer::new();
        pool.reconcile(&clips, &mixer, 1.0);

        mixer.set_enabled(TrackType::Music, false);
        let report = pool.reconcile(&clips, &mixer, 1.1);
        let probe = backend.probe("bed", "bed.mp3").unwrap();

        assert_eq!(report.muted, 1);
        assert!(!probe.is_playing());
        assert_eq!(probe.volume(), 0.0);
    }

    #[test]
    fn handle_volume_combines_track_and_clip_gain() {
        let clips = vec![AudioClip::new("bed", "bed.mp3", TrackType::Music, 0.0, 5.0).with_volume(0.5)];
        let (mut pool, backend, _) = pool_with(&clips);
        let mut mixer = TrackMixer::new();
        mixer.set_volume(TrackType::Music, 0.4);

        pool.reconcile(&clips, &mixer, 1.0);
        assert!((backend.probe("bed", "bed.mp3").unwrap().volume() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn looping_over_short_resource_tracks_wrapped_position() {
        let clips = vec![AudioClip::new("bed", "bed.mp3", TrackType::Music, 0.0, 10.0).looping(true)];
        let clock = ManualClock::new();
        let mut backend = SimulatedBackend::new(clock.clone());
        backend.set_resource_length("bed.mp3", 3.0);
        let mut pool = AudioPool::new(DRIFT_THRESHOLD_SECONDS);
        pool.configure(&clips, &mut backend);
        let mixer = TrackMixer::new();

        pool.reconcile(&clips, &mixer, 0.0);
        let probe = backend.probe("bed", "bed.mp3").unwrap();
        let seeks = probe.seek_count();

        for elapsed in [1.0, 2.5, 3.5, 5.0, 7.25] {
            clock.set(elapsed);
            let report = pool.reconcile(&clips, &mixer, elapsed);
            assert_eq!(report.corrected, 0, "at {elapsed}");
        }
        assert_eq!(probe.seek_count(), seeks);
        assert!((probe.position() - 1.25).abs() < 1e-9);

        probe.nudge(0.5);
        let report = pool.reconcile(&clips, &mixer, 7.25);
        assert_eq!(report.corrected, 1);
        assert!((probe.position() - 1.25).abs() < 1e-9);
    }

    #[test]
    fn wrap_boundary_is_not_drift() {
        let clips = vec![AudioClip::new("bed", "bed.mp3", TrackType::Music, 0.0, 10.0).looping(true)];
        let clock = ManualClock::new();
        let mut backend = SimulatedBackend::new(clock.clone());
        backend.set_resource_length("bed.mp3", 3.0);
        let mut pool = AudioPool::new(DRIFT_THRESHOLD_SECONDS);
        pool.configure(&clips, &mut backend);
        let mixer = TrackMixer::new();

        clock.set(2.95);
        pool.reconcile(&clips, &mixer, 2.95);
        let probe = backend.probe("bed", "bed.mp3").unwrap();
        let seeks = probe.seek_count();

        // Handle has already wrapped to 0.1 while the clock says 2.95.
        probe.nudge(0.15);
        let report = pool.reconcile(&clips, &mixer, 2.95);
        assert_eq!(report.corrected, 0);
        assert_eq!(probe.seek_count(), seeks);
    }

    #[test]
    fn paused_alignment_wraps_looping_target() {
        let clips = vec![AudioClip::new("bed", "bed.mp3", TrackType::Music, 0.0, 10.0).looping(true)];
        let clock = ManualClock::new();
        let mut backend = SimulatedBackend::new(clock.clone());
        backend.set_resource_length("bed.mp3", 3.0);
        let mut pool = AudioPool::new(DRIFT_THRESHOLD_SECONDS);
        pool.configure(&clips, &mut backend);

        pool.align_paused(&clips, 7.5);
        let probe = backend.probe("bed", "bed.mp3").unwrap();
        assert!(!probe.is_playing());
        assert!((probe.position() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn dropping_the_pool_releases_handles() {
        let clips = vec![AudioClip::new("vo", "vo.mp3", TrackType::Voiceover, 0.0, 2.0)];
        let (mut pool, backend, _) = pool_with(&clips);
        pool.reconcile(&clips, &TrackMixer::new(), 0.5);
        let probe = backend.probe("vo", "vo.mp3").unwrap();

        drop(pool);
        assert!(probe.is_released());
        assert!(!probe.is_playing());
    }
}
