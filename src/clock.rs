//! Frame-rate-independent step counter.
//!
//! The clock accumulates wall-clock deltas between host frames and converts
//! them into whole animation steps, so the scroll speed of the effect does
//! not depend on the host's frame rate.

use tracing::warn;

use crate::error::{EffectError, EffectResult};
use crate::host::{FrameHandle, FrameScheduler, MonotonicClock};

pub const DEFAULT_STEP_MS: f64 = 32.0;
/// Deltas above this are treated as a suspension (tab backgrounding, sleep)
/// rather than elapsed animation time.
const MAX_DELTA_MS: f64 = 1000.0;
/// Hard cap on steps consumed per host frame.
const MAX_STEPS_PER_FRAME: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockState {
    Idle,
    Running,
    Paused,
}

pub struct TickClock {
    clock: Box<dyn MonotonicClock>,
    scheduler: Box<dyn FrameScheduler>,
    fallback: Option<Box<dyn FrameScheduler>>,
    on_fallback: bool,
    state: ClockState,
    step_ms: f64,
    offset: u64,
    accumulator_ms: f64,
    last_ms: f64,
    pending: Option<FrameHandle>,
}

impl TickClock {
    pub fn new(
        clock: Box<dyn MonotonicClock>,
        scheduler: Box<dyn FrameScheduler>,
        fallback: Option<Box<dyn FrameScheduler>>,
    ) -> Self {
        Self {
            clock,
            scheduler,
            fallback,
            on_fallback: false,
            state: ClockState::Idle,
            step_ms: DEFAULT_STEP_MS,
            offset: 0,
            accumulator_ms: 0.0,
            last_ms: 0.0,
            pending: None,
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state == ClockState::Paused
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    pub fn step_interval_ms(&self) -> f64 {
        self.step_ms
    }

    pub fn set_step_interval(&mut self, ms: f64) -> EffectResult<()> {
        if !ms.is_finite() || ms <= 0.0 {
            return Err(EffectError::invalid_parameter(format!(
                "step interval must be finite and > 0 (got {ms})"
            )));
        }
        self.step_ms = ms;
        Ok(())
    }

    /// Baseline the timestamp and arm the first frame. Warns and no-ops when
    /// already running.
    pub fn start(&mut self) -> EffectResult<()> {
        if self.state == ClockState::Running {
            warn!("clock start ignored: already running");
            return Ok(());
        }
        if !self.step_ms.is_finite() || self.step_ms <= 0.0 {
            return Err(EffectError::invalid_parameter(format!(
                "cannot start with step interval {}",
                self.step_ms
            )));
        }

        self.last_ms = self.clock.now_ms();
        self.state = ClockState::Running;
        self.schedule()
    }

    /// Host frame entry point. Consumes elapsed time into whole steps and
    /// reports the new offset when at least one step was consumed. Arms the
    /// next frame; failure to do so is fatal and stops the clock.
    pub fn on_host_frame(&mut self) -> EffectResult<Option<u64>> {
        if self.state != ClockState::Running {
            return Ok(None);
        }
        self.pending = None;

        let now = self.clock.now_ms();
        // Negative deltas happen on clock regression (resume from sleep);
        // huge ones after backgrounding. Neither should turn into catch-up.
        let delta = (now - self.last_ms).clamp(0.0, MAX_DELTA_MS);
        self.last_ms = now;
        self.accumulator_ms += delta;

        let mut steps = 0u32;
        while self.accumulator_ms >= self.step_ms && steps < MAX_STEPS_PER_FRAME {
            self.accumulator_ms -= self.step_ms;
            self.offset += 1;
            steps += 1;
        }
        if steps == MAX_STEPS_PER_FRAME {
            // Bounded per-frame work: drop the remainder instead of spiraling.
            self.accumulator_ms = self.accumulator_ms.min(self.step_ms);
        }

        self.schedule()?;
        Ok((steps > 0).then_some(self.offset))
    }

    /// Cancel the pending frame, keep offset and accumulator.
    pub fn pause(&mut self) {
        if self.state != ClockState::Running {
            return;
        }
        self.cancel_pending();
        self.state = ClockState::Paused;
    }

    /// Re-baseline the timestamp (avoids one huge delta) and re-arm.
    pub fn resume(&mut self) -> EffectResult<()> {
        if self.state != ClockState::Paused {
            return Ok(());
        }
        self.last_ms = self.clock.now_ms();
        self.state = ClockState::Running;
        self.schedule()
    }

    /// Cancel and go idle. Idempotent. Offset survives until `destroy`.
    pub fn stop(&mut self) {
        self.cancel_pending();
        self.state = ClockState::Idle;
    }

    /// Stop and reset all counters and the interval to defaults.
    pub fn destroy(&mut self) {
        self.stop();
        self.offset = 0;
        self.accumulator_ms = 0.0;
        self.step_ms = DEFAULT_STEP_MS;
        self.on_fallback = false;
    }

    fn schedule(&mut self) -> EffectResult<()> {
        if !self.on_fallback {
            match self.scheduler.request() {
                Ok(handle) if handle.is_valid() => {
                    self.pending = Some(handle);
                    return Ok(());
                }
                Ok(_) => warn!("frame scheduler returned an invalid handle; switching to fallback"),
                Err(e) => warn!("frame scheduler failed ({e}); switching to fallback"),
            }
            self.on_fallback = true;
        }

        let Some(fallback) = self.fallback.as_mut() else {
            self.stop();
            return Err(EffectError::scheduling(
                "frame scheduler failed and no fallback is available",
            ));
        };
        match fallback.request() {
            Ok(handle) if handle.is_valid() => {
                self.pending = Some(handle);
                Ok(())
            }
            Ok(_) => {
                self.stop();
                Err(EffectError::scheduling(
                    "fallback scheduler returned an invalid handle",
                ))
            }
            Err(e) => {
                self.stop();
                Err(EffectError::scheduling(format!(
                    "fallback scheduler failed: {e}"
                )))
            }
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            if self.on_fallback {
                if let Some(fallback) = self.fallback.as_mut() {
                    fallback.cancel(handle);
                }
            } else {
                self.scheduler.cancel(handle);
            }
        }
    }
}
