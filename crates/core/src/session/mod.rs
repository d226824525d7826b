use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::audio::{AudioBackend, AudioPool, ReconcileReport};
use crate::transport::{TransportCommand, TransportState};
use crate::{
    clip, visual, ClockAnchor, HostClock, PlaybackConfig, SceneTimeline, Scheduler, TrackLevels,
    TrackMixer, TrackType, VisualClip,
};

type TimeUpdateFn = Box<dyn FnMut(f64, Option<&str>)>;
type PlaybackEndFn = Box<dyn FnMut()>;

/// Tunables for a [`PlaybackSession`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub tick_rate_hz: u32,
    pub drift_threshold: f64,
    pub levels: TrackLevels,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&PlaybackConfig::default())
    }
}

impl SessionOptions {
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self {
            tick_rate_hz: config.tick_rate_hz,
            drift_threshold: config.drift_threshold_seconds,
            levels: config.levels(),
        }
    }

    /// Layers additional mixer overrides, e.g. those carried by a scene file.
    pub fn with_levels(mut self, levels: &TrackLevels) -> Self {
        self.levels = self.levels.merged(levels);
        self
    }
}

/// Result of one [`PlaybackSession::tick`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A tick ran and another one is scheduled.
    Continue,
    /// The scene reached its end during this tick.
    Ended,
    /// No tick was pending.
    Idle,
}

/// Serializable view of a session's observable state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: TransportState,
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub visual_clip_id: Option<String>,
    pub segment_id: Option<String>,
    pub display_frame_url: Option<String>,
    pub track_volumes: BTreeMap<TrackType, f32>,
    pub track_enabled: BTreeMap<TrackType, bool>,
    pub audio_handles: usize,
    pub ticks: u64,
}

/// One playback session over a scene timeline.
///
/// The session owns the clock anchor, the scheduler, the track mixer and the
/// audio pool. The host calls [`tick`](Self::tick) once per
/// [`tick_interval`](Self::tick_interval); every other method is a transport
/// or mixer command. Nothing here returns an error: handle failures are
/// absorbed by the pool and logged.
pub struct PlaybackSession<B: AudioBackend, C: HostClock> {
    timeline: SceneTimeline,
    backend: B,
    clock: C,
    anchor: ClockAnchor,
    scheduler: Scheduler,
    state: TransportState,
    mixer: TrackMixer,
    pool: AudioPool<B::Handle>,
    visual: Option<usize>,
    last_report: ReconcileReport,
    on_time_update: Option<TimeUpdateFn>,
    on_playback_end: Option<PlaybackEndFn>,
}

impl<B: AudioBackend, C: HostClock> PlaybackSession<B, C> {
    pub fn new(timeline: SceneTimeline, backend: B, clock: C, options: SessionOptions) -> Self {
        let mut session = Self {
            anchor: ClockAnchor::new(timeline.duration),
            timeline: SceneTimeline::default(),
            backend,
            clock,
            scheduler: Scheduler::new(options.tick_rate_hz),
            state: TransportState::Idle,
            mixer: TrackMixer::with_levels(&options.levels),
            pool: AudioPool::new(options.drift_threshold),
            visual: None,
            last_report: ReconcileReport::default(),
            on_time_update: None,
            on_playback_end: None,
        };
        session.load_timeline(timeline);
        session
    }

    /// Registers the per-tick notification. Receives the logical time and the
    /// segment id of the visual clip on screen.
    pub fn on_time_update(&mut self, callback: impl FnMut(f64, Option<&str>) + 'static) {
        self.on_time_update = Some(Box::new(callback));
    }

    /// Registers the notification fired once when the scene plays to its end.
    pub fn on_playback_end(&mut self, callback: impl FnMut() + 'static) {
        self.on_playback_end = Some(Box::new(callback));
    }

    /// Replaces the clip set. The transport is reset first, then handles for
    /// new clips are created and handles no longer referenced are released.
    pub fn load_timeline(&mut self, timeline: SceneTimeline) {
        self.reset();
        self.anchor = ClockAnchor::new(timeline.duration);
        self.timeline = timeline;

        for overlap in clip::find_track_overlaps(&self.timeline.audio_clips) {
            tracing::warn!(
                track = %overlap.track_type,
                first = %overlap.first,
                second = %overlap.second,
                seconds = overlap.overlap_seconds,
                "overlapping clips on the same track will play simultaneously"
            );
        }

        self.pool
            .configure(&self.timeline.audio_clips, &mut self.backend);
        self.refresh_visual();
    }

    pub fn play(&mut self) {
        let Some(next) = self.state.next(TransportCommand::Play) else {
            return;
        };
        self.anchor.start(self.clock.now());
        self.state = next;
        self.scheduler.arm();
        tracing::debug!(time = self.anchor.current_time(), "playback started");
    }

    pub fn pause(&mut self) {
        let Some(next) = self.state.next(TransportCommand::Pause) else {
            return;
        };
        self.scheduler.cancel();
        let elapsed = self.anchor.elapsed_at(self.clock.now());
        self.anchor.set_current(elapsed);
        self.anchor.stop();
        self.pool.pause_all();
        self.state = next;
        self.refresh_visual();
        tracing::debug!(time = self.anchor.current_time(), "playback paused");
    }

    pub fn toggle_playback(&mut self) {
        match self.state.next(TransportCommand::Toggle) {
            Some(TransportState::Playing) => self.play(),
            Some(TransportState::Paused) => self.pause(),
            _ => {}
        }
    }

    /// Moves the playhead to `time`, clamped to the scene. Legal in every
    /// state and never changes whether the session is playing. While stopped,
    /// in-range handles are positioned so a scrub previews audio alignment.
    pub fn seek_to(&mut self, time: f64) {
        let now = self.clock.now();
        let time = self.anchor.seek(time, now);
        self.refresh_visual();
        if !self.state.is_playing() {
            self.pool.align_paused(&self.timeline.audio_clips, time);
        }
    }

    /// Returns to time zero, stopping the tick loop and rewinding every
    /// handle.
    pub fn reset(&mut self) {
        self.scheduler.cancel();
        self.anchor.rewind();
        if let Some(next) = self.state.next(TransportCommand::Reset) {
            self.state = next;
        }
        self.pool.stop_all();
        self.refresh_visual();
    }

    pub fn set_track_volume(&mut self, track: TrackType, volume: f32) {
        self.mixer.set_volume(track, volume);
        self.pool
            .apply_mix(&self.timeline.audio_clips, &self.mixer, track);
    }

    /// Disabling a track silences and pauses its handles without releasing
    /// them; re-enabling lets the next tick resume the same handles.
    pub fn set_track_enabled(&mut self, track: TrackType, enabled: bool) {
        self.mixer.set_enabled(track, enabled);
        self.pool
            .apply_mix(&self.timeline.audio_clips, &self.mixer, track);
    }

    /// Runs one iteration of the synchronization loop if one is pending.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.scheduler.take() {
            return TickOutcome::Idle;
        }

        let elapsed = self.anchor.elapsed_at(self.clock.now());
        if elapsed >= self.timeline.duration {
            self.finish();
            return TickOutcome::Ended;
        }

        self.anchor.set_current(elapsed);
        self.refresh_visual();
        self.last_report = self
            .pool
            .reconcile(&self.timeline.audio_clips, &self.mixer, elapsed);

        let time = self.anchor.current_time();
        let segment = self
            .visual
            .map(|index| self.timeline.visual_clips[index].segment_id.as_str());
        if let Some(callback) = self.on_time_update.as_mut() {
            callback(time, segment);
        }

        if self.state.is_playing() {
            self.scheduler.arm();
        }
        TickOutcome::Continue
    }

    /// Releases every audio handle and stops the session. The session stays
    /// usable for inspection but has no handles until a new timeline is
    /// loaded.
    pub fn shutdown(&mut self) {
        self.reset();
        self.pool.release_all();
    }

    fn finish(&mut self) {
        self.scheduler.cancel();
        self.anchor.rewind();
        if let Some(next) = self.state.next(TransportCommand::Finish) {
            self.state = next;
        }
        self.pool.stop_all();
        self.refresh_visual();
        tracing::debug!("playback reached scene end");
        if let Some(callback) = self.on_playback_end.as_mut() {
            callback();
        }
    }

    fn refresh_visual(&mut self) {
        self.visual = visual::select_index(&self.timeline.visual_clips, self.anchor.current_time());
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn current_time(&self) -> f64 {
        self.anchor.current_time()
    }

    pub fn duration(&self) -> f64 {
        self.timeline.duration
    }

    pub fn timeline(&self) -> &SceneTimeline {
        &self.timeline
    }

    pub fn current_visual_clip(&self) -> Option<&VisualClip> {
        self.visual.map(|index| &self.timeline.visual_clips[index])
    }

    pub fn display_frame_url(&self) -> Option<&str> {
        self.current_visual_clip()
            .map(|clip| visual::display_frame(clip, self.anchor.current_time()))
    }

    pub fn track_volumes(&self) -> BTreeMap<TrackType, f32> {
        self.mixer.volumes()
    }

    pub fn track_enabled(&self) -> BTreeMap<TrackType, bool> {
        self.mixer.enabled()
    }

    pub fn mixer(&self) -> &TrackMixer {
        &self.mixer
    }

    pub fn pool(&self) -> &AudioPool<B::Handle> {
        &self.pool
    }

    /// Counters from the most recent reconciliation pass.
    pub fn last_report(&self) -> ReconcileReport {
        self.last_report
    }

    pub fn tick_interval(&self) -> Duration {
        self.scheduler.interval()
    }

    pub fn is_tick_pending(&self) -> bool {
        self.scheduler.is_armed()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let clip = self.current_visual_clip();
        SessionSnapshot {
            state: self.state,
            is_playing: self.is_playing(),
            current_time: self.current_time(),
            duration: self.duration(),
            visual_clip_id: clip.map(|clip| clip.id.clone()),
            segment_id: clip.map(|clip| clip.segment_id.clone()),
            display_frame_url: self.display_frame_url().map(str::to_string),
            track_volumes: self.track_volumes(),
            track_enabled: self.track_enabled(),
            audio_handles: self.pool.len(),
            ticks: self.scheduler.ticks(),
        }
    }
}

impl<B: AudioBackend, C: HostClock> fmt::Debug for PlaybackSession<B, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("state", &self.state)
            .field("current_time", &self.anchor.current_time())
            .field("duration", &self.timeline.duration)
            .field("visual", &self.visual)
            .field("mixer", &self.mixer)
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::{AudioClip, ManualClock, SimulatedBackend};

    fn visual(id: &str, start: f64, duration: f64) -> VisualClip {
        VisualClip {
            id: id.to_string(),
            segment_id: format!("seg-{id}"),
            start_time: start,
            duration,
            thumbnail_url: format!("{id}-a.png"),
            end_thumbnail_url: Some(format!("{id}-b.png")),
        }
    }

    fn session(
        timeline: SceneTimeline,
    ) -> (
        PlaybackSession<SimulatedBackend<ManualClock>, ManualClock>,
        SimulatedBackend<ManualClock>,
        ManualClock,
    ) {
        let clock = ManualClock::new();
        let backend = SimulatedBackend::new(clock.clone());
        let session = PlaybackSession::new(
            timeline,
            backend.clone(),
            clock.clone(),
            SessionOptions::default(),
        );
        (session, backend, clock)
    }

    fn scene() -> SceneTimeline {
        SceneTimeline::new(
            10.0,
            vec![visual("a", 0.0, 4.0), visual("b", 4.0, 6.0)],
            vec![
                AudioClip::new("vo", "vo.mp3", TrackType::Voiceover, 1.0, 3.0),
                AudioClip::new("bed", "bed.mp3", TrackType::Music, 0.0, 10.0).looping(true),
            ],
        )
    }

    #[test]
    fn starts_idle_at_zero() {
        let (session, _, _) = session(scene());

        assert_eq!(session.state(), TransportState::Idle);
        assert_eq!(session.current_time(), 0.0);
        assert_eq!(session.current_visual_clip().unwrap().id, "a");
        assert_eq!(session.display_frame_url(), Some("a-a.png"));
        assert!(!session.is_tick_pending());
    }

    #[test]
    fn tick_without_play_does_nothing() {
        let (mut session, _, clock) = session(scene());
        clock.advance(1.0);
        assert_eq!(session.tick(), TickOutcome::Idle);
        assert_eq!(session.current_time(), 0.0);
    }

    #[test]
    fn tick_advances_time_visual_and_audio() {
        let (mut session, backend, clock) = session(scene());
        session.play();
        clock.advance(2.5);

        assert_eq!(session.tick(), TickOutcome::Continue);
        assert!((session.current_time() - 2.5).abs() < 1e-9);
        assert_eq!(session.display_frame_url(), Some("a-b.png"));

        let vo = backend.probe("vo", "vo.mp3").unwrap();
        assert!(vo.is_playing());
        assert!((vo.position() - 1.5).abs() < 1e-9);
        assert!(session.is_tick_pending());
    }

    #[test]
    fn time_update_sees_consistent_state() {
        let (mut session, _, clock) = session(scene());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        session.on_time_update(move |time, segment| {
            sink.borrow_mut().push((time, segment.map(str::to_string)));
        });

        session.play();
        clock.advance(4.5);
        session.tick();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!((seen[0].0 - 4.5).abs() < 1e-9);
        assert_eq!(seen[0].1.as_deref(), Some("seg-b"));
    }

    #[test]
    fn pause_stops_handles_and_tick_loop() {
        let (mut session, backend, clock) = session(scene());
        session.play();
        clock.advance(2.0);
        session.tick();

        clock.advance(0.25);
        session.pause();
        assert_eq!(session.state(), TransportState::Paused);
        assert!((session.current_time() - 2.25).abs() < 1e-9);
        assert!(!session.is_tick_pending());
        assert!(backend.probes().iter().all(|probe| !probe.is_playing()));

        clock.advance(5.0);
        assert_eq!(session.tick(), TickOutcome::Idle);
        assert!((session.current_time() - 2.25).abs() < 1e-9);
    }

    #[test]
    fn resume_continues_from_paused_position() {
        let (mut session, _, clock) = session(scene());
        session.seek_to(3.0);
        session.play();
        clock.advance(1.0);
        session.tick();
        session.pause();

        clock.advance(30.0);
        session.play();
        clock.advance(0.5);
        session.tick();
        assert!((session.current_time() - 4.5).abs() < 1e-9);
    }

    #[test]
    fn toggle_flips_between_playing_and_paused() {
        let (mut session, _, clock) = session(scene());
        session.toggle_playback();
        assert!(session.is_playing());
        assert!(session.is_tick_pending());

        clock.advance(1.0);
        session.toggle_playback();
        assert_eq!(session.state(), TransportState::Paused);
        assert!((session.current_time() - 1.0).abs() < 1e-9);
        assert!(!session.is_tick_pending());

        session.toggle_playback();
        assert!(session.is_playing());
        clock.advance(0.5);
        session.tick();
        assert!((session.current_time() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn paused_seek_aligns_in_range_handles_without_playing() {
        let (mut session, backend, _) = session(scene());
        session.seek_to(2.0);

        let vo = backend.probe("vo", "vo.mp3").unwrap();
        assert!(!vo.is_playing());
        assert!((vo.position() - 1.0).abs() < 1e-9);
        assert_eq!(session.state(), TransportState::Idle);
    }

    #[test]
    fn seek_while_playing_reanchors_clock() {
        let (mut session, _, clock) = session(scene());
        session.play();
        clock.advance(1.0);
        session.tick();

        session.seek_to(6.0);
        assert!(session.is_playing());
        clock.advance(0.5);
        session.tick();
        assert!((session.current_time() - 6.5).abs() < 1e-9);
        assert_eq!(session.current_visual_clip().unwrap().id, "b");
    }

    #[test]
    fn reset_rewinds_everything() {
        let (mut session, backend, clock) = session(scene());
        session.play();
        clock.advance(2.0);
        session.tick();

        session.reset();
        assert_eq!(session.state(), TransportState::Idle);
        assert_eq!(session.current_time(), 0.0);
        assert!(!session.is_tick_pending());
        for probe in backend.probes() {
            assert!(!probe.is_playing());
            assert_eq!(probe.position(), 0.0);
        }
    }

    #[test]
    fn volume_changes_apply_immediately() {
        let (mut session, backend, clock) = session(scene());
        session.play();
        clock.advance(0.5);
        session.tick();

        session.set_track_volume(TrackType::Music, 0.25);
        assert_eq!(backend.probe("bed", "bed.mp3").unwrap().volume(), 0.25);
        assert_eq!(session.track_volumes()[&TrackType::Music], 0.25);
    }

    #[test]
    fn load_timeline_garbage_collects_handles() {
        let (mut session, backend, _) = session(scene());
        let bed = backend.probe("bed", "bed.mp3").unwrap();
        let vo = backend.probe("vo", "vo.mp3").unwrap();

        session.load_timeline(SceneTimeline::new(
            5.0,
            vec![visual("c", 0.0, 5.0)],
            vec![AudioClip::new("bed", "bed.mp3", TrackType::Music, 0.0, 5.0).looping(true)],
        ));

        assert_eq!(session.duration(), 5.0);
        assert_eq!(session.pool().len(), 1);
        assert!(vo.is_released());
        assert!(!bed.is_released());
        assert_eq!(backend.created(), 2);
    }

    #[test]
    fn snapshot_reports_observable_state() {
        let (mut session, _, _) = session(scene());
        session.seek_to(5.0);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, TransportState::Idle);
        assert_eq!(snapshot.visual_clip_id.as_deref(), Some("b"));
        assert_eq!(snapshot.segment_id.as_deref(), Some("seg-b"));
        assert_eq!(snapshot.display_frame_url.as_deref(), Some("b-a.png"));
        assert_eq!(snapshot.audio_handles, 2);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["trackVolumes"]["music"], 1.0);
    }

    #[test]
    fn options_layer_scene_levels_over_config() {
        let mut config = PlaybackConfig::default();
        config.track_volumes.insert(TrackType::Music, 0.5);
        config.track_volumes.insert(TrackType::Sfx, 0.7);
        let scene_levels = TrackLevels {
            track_volumes: BTreeMap::from([(TrackType::Music, 0.1)]),
            track_enabled: BTreeMap::new(),
        };

        let options = SessionOptions::from_config(&config).with_levels(&scene_levels);
        let mixer = TrackMixer::with_levels(&options.levels);
        assert_eq!(mixer.volume(TrackType::Music), 0.1);
        assert_eq!(mixer.volume(TrackType::Sfx), 0.7);
    }
}
