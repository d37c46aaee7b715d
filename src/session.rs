//! Recording session orchestration
//!
//! Owns one `ContextEngine` for the lifetime of a recording and drives its
//! sampling tick from the recording cadence. The host calls `poll` from its
//! event loop (or timer callback); ticks are plain deadlines on the caller's
//! clock, so the session never blocks and never spawns timers of its own.

use crate::config::{EngineConfig, RecordingCadence};
use crate::engine::ContextEngine;
use crate::error::EngineError;
use crate::types::{AccelSample, AutomaticContext, ContextSample, GpsFix, SpeedEstimate};
use tracing::{info, trace};
use uuid::Uuid;

/// Deadline-based tick schedule aligned to the recording cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSchedule {
    period_ms: i64,
    /// `None` once the next tick would fall past the end of the clock
    next_tick_ms: Option<i64>,
}

impl TickSchedule {
    /// First tick one period after `start_ms`
    pub fn starting_at(start_ms: i64, cadence: RecordingCadence) -> Self {
        Self {
            period_ms: cadence.period_ms(),
            next_tick_ms: start_ms.checked_add(cadence.period_ms()),
        }
    }

    pub fn next_tick_ms(&self) -> Option<i64> {
        self.next_tick_ms
    }

    /// Consume the tick due at `now_ms`, if any. Missed ticks are coalesced
    /// into one.
    pub fn take_due(&mut self, now_ms: i64) -> bool {
        let Some(due) = self.next_tick_ms else {
            return false;
        };
        if now_ms < due {
            return false;
        }
        let period = i128::from(self.period_ms);
        let missed = (i128::from(now_ms) - i128::from(due)) / period;
        let next = i128::from(due) + (missed + 1) * period;
        self.next_tick_ms = i64::try_from(next).ok();
        true
    }
}

/// One active recording and the context engine it owns.
#[derive(Debug)]
pub struct RecordingSession {
    id: Uuid,
    engine: ContextEngine,
    schedule: Option<TickSchedule>,
    ticks: u64,
    started: bool,
}

impl RecordingSession {
    pub fn new(config: EngineConfig, cadence: RecordingCadence) -> Result<Self, EngineError> {
        Ok(Self {
            id: Uuid::new_v4(),
            engine: ContextEngine::try_new(config, cadence)?,
            schedule: None,
            ticks: 0,
            started: false,
        })
    }

    /// Start (or restart) recording at `now_ms`.
    ///
    /// Every start after the first gets a fresh session id and fully reset
    /// estimators, whether or not the previous recording was stopped.
    pub fn start(&mut self, now_ms: i64) -> Uuid {
        if self.started {
            self.id = Uuid::new_v4();
        }
        self.started = true;
        self.engine.reset();
        self.schedule = Some(TickSchedule::starting_at(now_ms, self.engine.cadence()));
        self.ticks = 0;
        info!(
            session_id = %self.id,
            period_ms = self.engine.cadence().period_ms(),
            "recording session started"
        );
        self.id
    }

    /// Stop recording: cancels the tick schedule and discards the motion window
    pub fn stop(&mut self) {
        if self.schedule.take().is_some() {
            self.engine.discard_motion();
            info!(session_id = %self.id, ticks = self.ticks, "recording session stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.schedule.is_some()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of ticks resolved since `start`
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn next_tick_ms(&self) -> Option<i64> {
        self.schedule.and_then(|s| s.next_tick_ms())
    }

    /// Forward a GPS fix; dropped when the session is not recording
    pub fn on_gps_fix(&mut self, fix: &GpsFix) -> Option<SpeedEstimate> {
        if !self.is_active() {
            trace!(ts = fix.timestamp_ms, "GPS fix after session stop ignored");
            return None;
        }
        Some(self.engine.on_gps_fix(fix))
    }

    /// Forward an accelerometer sample; dropped when the session is not recording
    pub fn on_accel_sample(&mut self, sample: &AccelSample) -> bool {
        if !self.is_active() {
            trace!(ts = sample.timestamp_ms, "accel sample after session stop ignored");
            return false;
        }
        self.engine.on_accel_sample(sample);
        true
    }

    /// Run the sampling tick if one is due at `now_ms`
    pub fn poll(&mut self, now_ms: i64) -> Option<ContextSample> {
        let schedule = self.schedule.as_mut()?;
        if !schedule.take_due(now_ms) {
            return None;
        }
        self.ticks += 1;
        Some(self.engine.sample_context(now_ms))
    }

    /// Resolve a tick immediately, outside the schedule
    pub fn sample_now(&mut self, now_ms: i64) -> Result<ContextSample, EngineError> {
        if !self.is_active() {
            return Err(EngineError::SessionNotActive);
        }
        self.ticks += 1;
        Ok(self.engine.sample_context(now_ms))
    }

    /// Label to attach to a measurement recorded right now
    pub fn current_context(&self) -> AutomaticContext {
        self.engine.current_context()
    }

    pub fn engine(&self) -> &ContextEngine {
        &self.engine
    }
}
