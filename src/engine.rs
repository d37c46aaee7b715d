//! Context engine
//!
//! This module provides the per-session facade consumed by the measurement
//! recorder. Sensor callbacks push fixes and samples in as they arrive; the
//! sampling tick calls `sample_context` and reads only the published state of
//! each estimator.
//!
//! One engine belongs to exactly one recording session. There is no shared or
//! global state, so concurrent sessions simply own separate engines.

use crate::config::{EngineConfig, RecordingCadence};
use crate::error::EngineError;
use crate::quality::DataQualityClassifier;
use crate::resolver::{ContextRuleResolver, ResolverInput};
use crate::speed::GeoSpeedEstimator;
use crate::types::{
    AccelSample, AutomaticContext, ContextSample, DataQuality, GpsFix, GpsQuality, SpeedEstimate,
    WalkingState,
};
use crate::walking::WalkingSignatureDetector;
use serde::{Deserialize, Serialize};

/// Read-only view of the engine's published state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<SpeedEstimate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fix_ms: Option<i64>,
    pub walking: WalkingState,
    pub context: AutomaticContext,
}

/// Automatic context inference for one recording session.
#[derive(Debug, Clone)]
pub struct ContextEngine {
    config: EngineConfig,
    cadence: RecordingCadence,
    speed: GeoSpeedEstimator,
    walking: WalkingSignatureDetector,
    resolver: ContextRuleResolver,
    latest_speed: Option<SpeedEstimate>,
    last_quality: DataQuality,
}

impl Default for ContextEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default(), RecordingCadence::default())
    }
}

impl ContextEngine {
    /// Create an engine with an already validated configuration
    pub fn new(config: EngineConfig, cadence: RecordingCadence) -> Self {
        Self {
            speed: GeoSpeedEstimator::new(config.speed.clone()),
            walking: WalkingSignatureDetector::new(config.walking.clone()),
            resolver: ContextRuleResolver::new(config.resolver.clone()),
            config,
            cadence,
            latest_speed: None,
            last_quality: DataQuality::Poor,
        }
    }

    /// Create an engine after validating the configuration
    pub fn try_new(config: EngineConfig, cadence: RecordingCadence) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::new(config, cadence))
    }

    /// Feed one GPS fix; returns the updated speed estimate
    pub fn on_gps_fix(&mut self, fix: &GpsFix) -> SpeedEstimate {
        let estimate = self.speed.update(fix);
        self.latest_speed = Some(estimate);
        estimate
    }

    /// Feed one accelerometer sample
    pub fn on_accel_sample(&mut self, sample: &AccelSample) -> WalkingState {
        self.walking.on_sample(sample)
    }

    /// Resolve the context for the sampling tick at `now_ms`.
    pub fn sample_context(&mut self, now_ms: i64) -> ContextSample {
        let accel_timed_out = self.walking.expire(now_ms);
        let gps_fresh =
            self.resolver
                .is_gps_fresh(self.speed.last_fix_ms(), now_ms, self.cadence.period_ms());

        let input = ResolverInput {
            speed: self.latest_speed,
            gps_fresh,
            walking: self.walking.state(),
            accel_timed_out,
        };
        let context = self.resolver.tick(&input);

        let gps_quality = match self.latest_speed {
            Some(estimate) if gps_fresh => estimate.gps_quality,
            _ => GpsQuality::Poor,
        };
        let quality = DataQualityClassifier::combine(gps_quality, input.walking.active);
        self.last_quality = quality;

        ContextSample {
            timestamp_ms: now_ms,
            context,
            quality,
        }
    }

    /// Label resolved at the last tick; attached to measurements recorded between ticks
    pub fn current_context(&self) -> AutomaticContext {
        self.resolver.current()
    }

    /// Quality tier computed at the last tick
    pub fn current_quality(&self) -> DataQuality {
        self.last_quality
    }

    /// Whether the accelerometer stream is absent or silent at `now_ms`
    pub fn accel_timed_out(&self, now_ms: i64) -> bool {
        self.walking.is_timed_out(now_ms)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            speed: self.latest_speed,
            last_fix_ms: self.speed.last_fix_ms(),
            walking: self.walking.state(),
            context: self.resolver.current(),
        }
    }

    pub fn cadence(&self) -> RecordingCadence {
        self.cadence
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Drop the accelerometer window and walking state
    pub fn discard_motion(&mut self) {
        self.walking.reset();
    }

    /// Return every component to its initial state
    pub fn reset(&mut self) {
        self.speed.reset();
        self.walking.reset();
        self.resolver.reset();
        self.latest_speed = None;
        self.last_quality = DataQuality::Poor;
    }
}
