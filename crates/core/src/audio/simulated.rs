//! Clock-driven in-memory audio backend.
//!
//! Handles advance their position with a [`HostClock`] while playing, wrap when
//! looping and stop at the end of the resource otherwise. Nothing is decoded or
//! rendered; the backend exists so that sessions can run headlessly and so the
//! synchronization logic can be observed through [`SimulatedProbe`]s.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{AudioBackend, AudioHandle, HandleKey};
use crate::{AudioClip, HandleError, HostClock, Result};

#[derive(Debug)]
struct HandleState {
    instance: usize,
    url: String,
    playing: bool,
    base_position: f64,
    started_at: f64,
    looping: bool,
    length: Option<f64>,
    volume: f32,
    released: bool,
    seeks: usize,
}

impl HandleState {
    fn raw_position(&self, now: f64) -> f64 {
        if self.playing {
            self.base_position + (now - self.started_at)
        } else {
            self.base_position
        }
    }

    fn position(&self, now: f64) -> f64 {
        let raw = self.raw_position(now);
        match self.length {
            Some(length) if length > 0.0 && self.looping => raw.rem_euclid(length),
            Some(length) => raw.min(length),
            None => raw,
        }
    }

    fn is_playing(&self, now: f64) -> bool {
        if !self.playing {
            return false;
        }
        match self.length {
            Some(length) if !self.looping => self.raw_position(now) < length,
            _ => true,
        }
    }

    /// Freezes the running position into `base_position`.
    fn settle(&mut self, now: f64) {
        self.base_position = self.position(now);
        self.started_at = now;
    }
}

fn lock(state: &Mutex<HandleState>) -> MutexGuard<'_, HandleState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle produced by [`SimulatedBackend`].
#[derive(Debug)]
pub struct SimulatedHandle<C> {
    state: Arc<Mutex<HandleState>>,
    clock: C,
    blocked: Arc<AtomicBool>,
    unavailable: Arc<Mutex<HashSet<String>>>,
}

impl<C: HostClock> AudioHandle for SimulatedHandle<C> {
    fn play(&mut self) -> std::result::Result<(), HandleError> {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        if state.released {
            return Err(HandleError::Unavailable(state.url.clone()));
        }
        let missing = self
            .unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&state.url);
        if missing {
            return Err(HandleError::Unavailable(state.url.clone()));
        }
        if self.blocked.load(Ordering::Relaxed) {
            return Err(HandleError::PlaybackBlocked);
        }
        if !state.is_playing(now) {
            // Restart from the clamped position when a one-shot ran out.
            state.settle(now);
            state.playing = true;
        }
        Ok(())
    }

    fn pause(&mut self) {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        if state.playing {
            state.settle(now);
            state.playing = false;
        }
    }

    fn is_playing(&self) -> bool {
        lock(&self.state).is_playing(self.clock.now())
    }

    fn position(&self) -> f64 {
        lock(&self.state).position(self.clock.now())
    }

    fn set_position(&mut self, seconds: f64) {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        state.base_position = seconds.max(0.0);
        state.started_at = now;
        state.seeks += 1;
    }

    fn set_volume(&mut self, volume: f32) {
        lock(&self.state).volume = volume;
    }

    fn release(&mut self) {
        let mut state = lock(&self.state);
        state.playing = false;
        state.released = true;
    }

    fn length(&self) -> Option<f64> {
        lock(&self.state).length
    }
}

/// Read-side view of a simulated handle, kept by the backend for inspection.
#[derive(Debug, Clone)]
pub struct SimulatedProbe<C> {
    state: Arc<Mutex<HandleState>>,
    clock: C,
}

impl<C: HostClock> SimulatedProbe<C> {
    /// Creation order of the handle within its backend, starting at zero.
    pub fn instance(&self) -> usize {
        lock(&self.state).instance
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.state).is_playing(self.clock.now())
    }

    pub fn position(&self) -> f64 {
        lock(&self.state).position(self.clock.now())
    }

    pub fn volume(&self) -> f32 {
        lock(&self.state).volume
    }

    pub fn is_looping(&self) -> bool {
        lock(&self.state).looping
    }

    pub fn is_released(&self) -> bool {
        lock(&self.state).released
    }

    /// Number of explicit repositioning calls made on the handle.
    pub fn seek_count(&self) -> usize {
        lock(&self.state).seeks
    }

    /// Shifts the reported position without counting as a seek, emulating a
    /// handle that drifted away from the clock.
    pub fn nudge(&self, offset: f64) {
        lock(&self.state).base_position += offset;
    }
}

/// Backend that hands out [`SimulatedHandle`]s. Clones share their registry,
/// so a caller can keep a copy for inspection after moving one into a session.
#[derive(Debug, Clone)]
pub struct SimulatedBackend<C> {
    clock: C,
    blocked: Arc<AtomicBool>,
    unavailable: Arc<Mutex<HashSet<String>>>,
    lengths: Arc<Mutex<HashMap<String, f64>>>,
    registry: Arc<Mutex<Vec<(HandleKey, SimulatedProbe<C>)>>>,
}

impl<C: HostClock + Clone> SimulatedBackend<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            blocked: Arc::new(AtomicBool::new(false)),
            unavailable: Arc::new(Mutex::new(HashSet::new())),
            lengths: Arc::new(Mutex::new(HashMap::new())),
            registry: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Emulates a host that refuses to start audio until a user gesture.
    pub fn set_autoplay_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::Relaxed);
    }

    /// Makes every handle for `url` fail to start.
    pub fn mark_unavailable(&self, url: impl Into<String>) {
        self.unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into());
    }

    /// Fixes the length of the resource behind `url` for handles created from
    /// now on. Without it a resource is as long as the trimmed clip needs.
    pub fn set_resource_length(&self, url: impl Into<String>, seconds: f64) {
        self.lengths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), seconds);
    }

    /// Number of handles created so far.
    pub fn created(&self) -> usize {
        self.registry().len()
    }

    /// Most recently created probe for the given clip id and URL.
    pub fn probe(&self, clip_id: &str, url: &str) -> Option<SimulatedProbe<C>> {
        self.registry()
            .iter()
            .rev()
            .find(|(key, _)| key.clip_id == clip_id && key.url == url)
            .map(|(_, probe)| probe.clone())
    }

    pub fn probes(&self) -> Vec<SimulatedProbe<C>> {
        self.registry().iter().map(|(_, probe)| probe.clone()).collect()
    }

    fn registry(&self) -> MutexGuard<'_, Vec<(HandleKey, SimulatedProbe<C>)>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: HostClock + Clone> AudioBackend for SimulatedBackend<C> {
    type Handle = SimulatedHandle<C>;

    fn create(&mut self, clip: &AudioClip) -> Result<Self::Handle> {
        let mut registry = self.registry();
        let length = self
            .lengths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&clip.url)
            .copied()
            .unwrap_or(clip.trim_start + clip.duration);
        let state = Arc::new(Mutex::new(HandleState {
            instance: registry.len(),
            url: clip.url.clone(),
            playing: false,
            base_position: 0.0,
            started_at: self.clock.now(),
            looping: clip.r#loop,
            length: (length > 0.0).then_some(length),
            volume: 1.0,
            released: false,
            seeks: 0,
        }));
        registry.push((
            HandleKey::for_clip(clip),
            SimulatedProbe {
                state: state.clone(),
                clock: self.clock.clone(),
            },
        ));

        Ok(SimulatedHandle {
            state,
            clock: self.clock.clone(),
            blocked: self.blocked.clone(),
            unavailable: self.unavailable.clone(),
        })
    }
}
