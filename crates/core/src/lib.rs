//! Core library for the scene preview engine.
//!
//! A scene is previewed from pre-rendered assets: a sequence of still frames
//! and several independently timed audio tracks. The crate keeps all of them in
//! step with one logical clock. [`PlaybackSession`] owns the clock anchor, the
//! cooperative tick scheduler, the per-track mixer and the pool of audio
//! handles; the host drives it by calling [`PlaybackSession::tick`] at its
//! frame rate and issues transport commands in between.
//!
//! Raw upstream data is normalized by [`convert`] and [`scene`] before it
//! reaches the session.

pub mod audio;
pub mod clip;
pub mod config;
pub mod convert;
pub mod error;
pub mod mixer;
pub mod scene;
pub mod session;
pub mod timeline;
pub mod transport;
pub mod visual;

pub use audio::{
    AudioBackend, AudioHandle, AudioPool, HandleKey, ReconcileReport, SimulatedBackend,
    SimulatedHandle, SimulatedProbe, DRIFT_THRESHOLD_SECONDS,
};
pub use clip::{find_track_overlaps, AudioClip, SceneTimeline, TrackOverlap, TrackType, VisualClip};
pub use config::{AppConfig, PlaybackConfig};
pub use convert::{AudioTrackGroups, RawAudioClip, SegmentDescriptor};
pub use error::{HandleError, PreviewError, Result};
pub use mixer::{TrackLevels, TrackMixer};
pub use scene::SceneDescriptor;
pub use session::{PlaybackSession, SessionOptions, SessionSnapshot, TickOutcome};
pub use timeline::{ClockAnchor, HostClock, ManualClock, Scheduler, SystemClock};
pub use transport::{TransportCommand, TransportState};
pub use visual::{display_frame, select_visual_clip, FrameChoice};
