//! Engine configuration
//!
//! All thresholds used by the estimators and the rule resolver. The defaults
//! are the fixed values the engine ships with; hosts may override any subset
//! through JSON (missing fields fall back to the defaults).

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Fixes closer together than this are ignored for speed purposes (seconds)
pub const SPEED_MIN_DT_S: f64 = 0.5;
/// Teleport guard: implied speeds above this are clamped (km/h)
pub const SPEED_MAX_JUMP_KMH: f64 = 100.0;
/// Fixes with a larger accuracy radius are poor quality (meters)
pub const GPS_POOR_ACCURACY_M: f64 = 20.0;
/// EMA weight of the newest speed
pub const SPEED_EMA_ALPHA: f64 = 0.25;

pub const ACC_WIN_SEC: f64 = 6.0;
pub const ACC_PEAK_THR: f64 = 0.8;
pub const ACC_REFRAC_MS: i64 = 300;
pub const ACC_HOLD_ENTER_MS: i64 = 10_000;
pub const ACC_HOLD_EXIT_MS: i64 = 30_000;
pub const ACC_TIMEOUT_MS: i64 = 5_000;

pub const SPEED_DRIVING_ENTER_KMH: f64 = 20.0;
pub const SPEED_RED_LIGHT_MAX_KMH: f64 = 5.0;
/// GPS counts as fresh for this many tick periods after the last fix
pub const GPS_FRESH_FACTOR: f64 = 1.5;

/// Default recording cadence when none is configured
pub const DEFAULT_CADENCE: &str = "10s";

/// GeoSpeedEstimator thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub min_dt_s: f64,
    pub max_jump_kmh: f64,
    pub poor_accuracy_m: f64,
    pub ema_alpha: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            min_dt_s: SPEED_MIN_DT_S,
            max_jump_kmh: SPEED_MAX_JUMP_KMH,
            poor_accuracy_m: GPS_POOR_ACCURACY_M,
            ema_alpha: SPEED_EMA_ALPHA,
        }
    }
}

/// WalkingSignatureDetector thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkingConfig {
    pub window_sec: f64,
    pub peak_threshold: f64,
    pub refractory_ms: i64,
    /// Accepted step cadence range (steps/min), inclusive
    pub cadence_min: f64,
    pub cadence_max: f64,
    /// Maximum coefficient of variation of inter-peak intervals
    pub cv_max: f64,
    /// Accepted RMS range of the window magnitudes (m/s²), inclusive
    pub rms_min: f64,
    pub rms_max: f64,
    pub hold_enter_ms: i64,
    pub hold_exit_ms: i64,
    pub timeout_ms: i64,
}

impl Default for WalkingConfig {
    fn default() -> Self {
        Self {
            window_sec: ACC_WIN_SEC,
            peak_threshold: ACC_PEAK_THR,
            refractory_ms: ACC_REFRAC_MS,
            cadence_min: 70.0,
            cadence_max: 180.0,
            cv_max: 0.30,
            rms_min: 0.5,
            rms_max: 3.5,
            hold_enter_ms: ACC_HOLD_ENTER_MS,
            hold_exit_ms: ACC_HOLD_EXIT_MS,
            timeout_ms: ACC_TIMEOUT_MS,
        }
    }
}

impl WalkingConfig {
    pub fn window_ms(&self) -> i64 {
        (self.window_sec * 1000.0).round() as i64
    }
}

/// ContextRuleResolver thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub driving_enter_kmh: f64,
    pub red_light_max_kmh: f64,
    pub gps_fresh_factor: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            driving_enter_kmh: SPEED_DRIVING_ENTER_KMH,
            red_light_max_kmh: SPEED_RED_LIGHT_MAX_KMH,
            gps_fresh_factor: GPS_FRESH_FACTOR,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub speed: SpeedConfig,
    pub walking: WalkingConfig,
    pub resolver: ResolverConfig,
}

impl EngineConfig {
    /// Parse and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every threshold is usable
    pub fn validate(&self) -> Result<(), EngineError> {
        let s = &self.speed;
        if !(s.min_dt_s.is_finite() && s.min_dt_s >= 0.0) {
            return Err(invalid("speed.min_dt_s must be a non-negative number"));
        }
        if !(s.max_jump_kmh.is_finite() && s.max_jump_kmh > 0.0) {
            return Err(invalid("speed.max_jump_kmh must be positive"));
        }
        if !(s.poor_accuracy_m.is_finite() && s.poor_accuracy_m > 0.0) {
            return Err(invalid("speed.poor_accuracy_m must be positive"));
        }
        if !(s.ema_alpha > 0.0 && s.ema_alpha <= 1.0) {
            return Err(invalid("speed.ema_alpha must be in (0, 1]"));
        }

        let w = &self.walking;
        if !(w.window_sec.is_finite() && w.window_sec > 0.0) {
            return Err(invalid("walking.window_sec must be positive"));
        }
        if !w.peak_threshold.is_finite() {
            return Err(invalid("walking.peak_threshold must be finite"));
        }
        if w.refractory_ms < 0 {
            return Err(invalid("walking.refractory_ms must not be negative"));
        }
        if !(w.cadence_min >= 0.0 && w.cadence_min <= w.cadence_max) {
            return Err(invalid("walking cadence range is empty"));
        }
        if !(w.cv_max.is_finite() && w.cv_max >= 0.0) {
            return Err(invalid("walking.cv_max must be non-negative"));
        }
        if !(w.rms_min >= 0.0 && w.rms_min <= w.rms_max) {
            return Err(invalid("walking RMS range is empty"));
        }
        if w.hold_enter_ms < 0 || w.hold_exit_ms < 0 {
            return Err(invalid("walking hold durations must not be negative"));
        }
        if w.timeout_ms <= 0 {
            return Err(invalid("walking.timeout_ms must be positive"));
        }

        let r = &self.resolver;
        if !(r.red_light_max_kmh >= 0.0 && r.red_light_max_kmh < r.driving_enter_kmh) {
            return Err(invalid(
                "resolver.red_light_max_kmh must be below resolver.driving_enter_kmh",
            ));
        }
        if !(r.gps_fresh_factor.is_finite() && r.gps_fresh_factor > 0.0) {
            return Err(invalid("resolver.gps_fresh_factor must be positive"));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> EngineError {
    EngineError::InvalidConfig(msg.to_string())
}

/// Recording cadence that drives the sampling tick period.
///
/// Accepts the compact strings the recorder settings use: `"500ms"`,
/// `"10s"`, `"1m"`, `"1h"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingCadence {
    period_ms: i64,
}

impl Default for RecordingCadence {
    fn default() -> Self {
        Self { period_ms: 10_000 }
    }
}

impl RecordingCadence {
    pub fn from_millis(period_ms: i64) -> Result<Self, EngineError> {
        if period_ms <= 0 {
            return Err(EngineError::InvalidCadence(format!(
                "period must be positive, got {} ms",
                period_ms
            )));
        }
        Ok(Self { period_ms })
    }

    pub fn parse(value: &str) -> Result<Self, EngineError> {
        let trimmed = value.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| EngineError::InvalidCadence(format!("missing unit in '{}'", value)))?;
        let (digits, unit) = trimmed.split_at(split);

        let amount: i64 = digits
            .parse()
            .map_err(|_| EngineError::InvalidCadence(format!("missing amount in '{}'", value)))?;

        let multiplier = match unit.trim() {
            "ms" => 1,
            "s" | "sec" => 1_000,
            "m" | "min" => 60_000,
            "h" => 3_600_000,
            other => {
                return Err(EngineError::InvalidCadence(format!(
                    "unknown unit '{}' in '{}'",
                    other, value
                )))
            }
        };

        let period_ms = amount
            .checked_mul(multiplier)
            .ok_or_else(|| EngineError::InvalidCadence(format!("'{}' is too large", value)))?;
        Self::from_millis(period_ms)
    }

    pub fn period_ms(&self) -> i64 {
        self.period_ms
    }
}

impl std::str::FromStr for RecordingCadence {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
