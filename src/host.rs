//! Host capabilities consumed by the effect: a monotonic clock and a
//! frame-scheduling primitive with a cancel counterpart.
//!
//! Both are narrow traits so a non-browser host (or a test harness) can
//! supply deterministic fakes instead of the native implementations.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::{EffectError, EffectResult};
use crate::text::TextRasterizer;

/// Monotonic time source, in milliseconds.
pub trait MonotonicClock {
    fn now_ms(&self) -> f64;
}

/// Handle to a pending scheduled frame. Zero is invalid; a scheduler that
/// hands one out is treated as failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHandle(pub u64);

impl FrameHandle {
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

/// Frame-scheduling primitive. `request` arms the next host frame; the
/// embedding host then calls back into [`Effect::on_host_frame`]
/// (crate::Effect::on_host_frame) when that frame fires.
pub trait FrameScheduler {
    fn request(&mut self) -> EffectResult<FrameHandle>;
    fn cancel(&mut self, handle: FrameHandle);
}

/// Wall-clock backed [`MonotonicClock`].
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}

/// Timer-based scheduler stand-in for hosts without an animation-frame
/// primitive. Handing out a handle always succeeds; pacing is the caller's
/// loop (see the `staticfill` binary).
#[derive(Debug, Default)]
pub struct TimerScheduler {
    next: u64,
}

impl FrameScheduler for TimerScheduler {
    fn request(&mut self) -> EffectResult<FrameHandle> {
        self.next += 1;
        Ok(FrameHandle(self.next))
    }

    fn cancel(&mut self, _handle: FrameHandle) {}
}

/// Shared, manually-advanced clock for tests.
#[derive(Clone, Debug, Default)]
pub struct FakeClock {
    now: Arc<Mutex<f64>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: f64) {
        *self.now.lock().unwrap() += ms;
    }

    pub fn set(&self, ms: f64) {
        *self.now.lock().unwrap() = ms;
    }
}

impl MonotonicClock for FakeClock {
    fn now_ms(&self) -> f64 {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Default)]
struct ManualSchedulerState {
    fail_requests: bool,
    hand_out_invalid: bool,
    requests: u64,
    cancels: u64,
}

/// Test scheduler that can be told to fail or to hand out invalid handles,
/// and that records request/cancel counts. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualSchedulerState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_requests(&self, fail: bool) {
        self.state.lock().unwrap().fail_requests = fail;
    }

    pub fn hand_out_invalid(&self, invalid: bool) {
        self.state.lock().unwrap().hand_out_invalid = invalid;
    }

    pub fn requests(&self) -> u64 {
        self.state.lock().unwrap().requests
    }

    pub fn cancels(&self) -> u64 {
        self.state.lock().unwrap().cancels
    }
}

impl FrameScheduler for ManualScheduler {
    fn request(&mut self) -> EffectResult<FrameHandle> {
        let mut state = self.state.lock().unwrap();
        if state.fail_requests {
            return Err(EffectError::scheduling("manual scheduler told to fail"));
        }
        state.requests += 1;
        if state.hand_out_invalid {
            return Ok(FrameHandle(0));
        }
        Ok(FrameHandle(state.requests))
    }

    fn cancel(&mut self, _handle: FrameHandle) {
        self.state.lock().unwrap().cancels += 1;
    }
}

/// Bundle of host capabilities handed to [`Effect::new`](crate::Effect::new).
pub struct HostEnv {
    pub clock: Box<dyn MonotonicClock>,
    pub scheduler: Box<dyn FrameScheduler>,
    /// Used once if the primary scheduler fails or returns an invalid handle.
    pub fallback_scheduler: Option<Box<dyn FrameScheduler>>,
    pub text: Box<dyn TextRasterizer>,
    /// Seed for the noise source; `None` draws fresh entropy.
    pub noise_seed: Option<u64>,
}

impl HostEnv {
    /// Native host: wall clock, timer scheduling, parley/vello text.
    pub fn native() -> Self {
        Self {
            clock: Box::new(SystemClock::new()),
            scheduler: Box::new(TimerScheduler::default()),
            fallback_scheduler: None,
            text: Box::new(crate::text::VelloTextRasterizer::new()),
            noise_seed: None,
        }
    }
}
