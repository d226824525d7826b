use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic wall-clock source, in seconds.
pub trait HostClock {
    fn now(&self) -> f64;
}

/// Host clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually advanced clock. Clones share the same time source, so a test can
/// keep one copy while the session and backend own the others.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(seconds: f64) -> Self {
        let clock = Self::new();
        clock.set(seconds);
        clock
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl HostClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Authoritative logical time of a session.
///
/// While running, the anchor stores the host instant at which logical time
/// zero would have occurred, so every read recomputes `now - epoch` instead of
/// accumulating per-tick deltas.
#[derive(Debug, Clone)]
pub struct ClockAnchor {
    duration: f64,
    current_time: f64,
    epoch: Option<f64>,
}

impl ClockAnchor {
    pub fn new(duration: f64) -> Self {
        Self {
            duration: duration.max(0.0),
            current_time: 0.0,
            epoch: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn is_running(&self) -> bool {
        self.epoch.is_some()
    }

    pub fn clamp(&self, time: f64) -> f64 {
        if time.is_nan() {
            return 0.0;
        }
        time.clamp(0.0, self.duration)
    }

    /// Anchors the epoch so that `now` maps to the current logical time.
    pub fn start(&mut self, now: f64) {
        self.epoch = Some(now - self.current_time);
    }

    pub fn stop(&mut self) {
        self.epoch = None;
    }

    /// Moves logical time to `time` (clamped). A running anchor is re-based
    /// so the next read continues from the new position.
    pub fn seek(&mut self, time: f64, now: f64) -> f64 {
        self.current_time = self.clamp(time);
        if self.epoch.is_some() {
            self.epoch = Some(now - self.current_time);
        }
        self.current_time
    }

    /// Unclamped elapsed logical time at `now`. Stopped anchors report the
    /// stored position.
    pub fn elapsed_at(&self, now: f64) -> f64 {
        match self.epoch {
            Some(epoch) => (now - epoch).max(0.0),
            None => self.current_time,
        }
    }

    pub(crate) fn set_current(&mut self, time: f64) {
        self.current_time = self.clamp(time);
    }

    pub fn rewind(&mut self) {
        self.current_time = 0.0;
        self.epoch = None;
    }
}

/// Re-arm bookkeeping for the cooperative tick loop.
///
/// The host invokes the session once per interval; a tick only runs when the
/// scheduler is armed and the tick body decides whether to arm it again.
#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    armed: bool,
    ticks: u64,
}

impl Scheduler {
    pub fn new(tick_rate_hz: u32) -> Self {
        let rate = tick_rate_hz.max(1);
        Self {
            interval: Duration::from_nanos(1_000_000_000 / u64::from(rate)),
            armed: false,
            ticks: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn cancel(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Consumes the pending invocation. Returns `false` when nothing was
    /// scheduled.
    pub fn take(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        self.armed = false;
        self.ticks += 1;
        true
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(60)
    }
}
