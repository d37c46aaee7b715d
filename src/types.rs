//! Core types for the context engine
//!
//! This module defines the data structures that flow between the sensor
//! estimators, the rule resolver and the external measurement recorder.

use serde::{Deserialize, Serialize};

/// One location sample from the platform location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Reported horizontal accuracy radius in meters, if the provider gives one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
    /// Monotonic timestamp in milliseconds
    pub timestamp_ms: i64,
}

impl GpsFix {
    pub fn new(lat: f64, lon: f64, accuracy_m: Option<f64>, timestamp_ms: i64) -> Self {
        Self {
            lat,
            lon,
            accuracy_m,
            timestamp_ms,
        }
    }

    /// Whether both coordinates are finite and inside the valid lat/lon ranges
    pub fn has_valid_coordinates(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// GPS signal quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpsQuality {
    Good,
    Poor,
}

impl GpsQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpsQuality::Good => "good",
            GpsQuality::Poor => "poor",
        }
    }
}

/// Smoothed speed published after every GPS fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedEstimate {
    /// Exponentially smoothed speed in km/h, never negative
    pub speed_kmh: f64,
    pub gps_quality: GpsQuality,
}

impl SpeedEstimate {
    pub fn new(speed_kmh: f64, gps_quality: GpsQuality) -> Self {
        Self {
            speed_kmh,
            gps_quality,
        }
    }
}

/// One motion sample from the platform motion provider.
///
/// `magnitude` is the vertical or combined-axis acceleration after gravity
/// removal, computed upstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    /// Acceleration magnitude (m/s²)
    pub magnitude: f64,
    /// Monotonic timestamp in milliseconds
    pub timestamp_ms: i64,
}

impl AccelSample {
    pub fn new(magnitude: f64, timestamp_ms: i64) -> Self {
        Self {
            magnitude,
            timestamp_ms,
        }
    }
}

/// Hysteresis state of the walking detector.
///
/// Owned by `WalkingSignatureDetector`; readers only ever receive copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalkingState {
    /// Stabilized walking flag
    pub active: bool,
    /// Raw (unstabilized) walking classification of the last evaluated window
    pub last_raw_true: bool,
    /// How long the raw classification has continuously been true (ms)
    pub consecutive_true_ms: i64,
    /// How long the raw classification has continuously been false (ms)
    pub consecutive_false_ms: i64,
    /// Timestamp of the last accepted sample
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sample_timestamp_ms: Option<i64>,
}

/// Overall data quality tier surfaced to status indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Good,
    Partial,
    Poor,
}

impl DataQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataQuality::Good => "good",
            DataQuality::Partial => "partial",
            DataQuality::Poor => "poor",
        }
    }
}

/// What the user is doing, attached to every recorded measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AutomaticContext {
    #[default]
    Stationary,
    Walking,
    Driving,
    /// Momentary stop during a drive
    RedLight,
    /// Neither GPS nor accelerometer data is available
    Unknown,
}

impl AutomaticContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomaticContext::Stationary => "stationary",
            AutomaticContext::Walking => "walking",
            AutomaticContext::Driving => "driving",
            AutomaticContext::RedLight => "redLight",
            AutomaticContext::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AutomaticContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one sampling tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSample {
    /// Tick time (ms, same clock as the sensor timestamps)
    pub timestamp_ms: i64,
    pub context: AutomaticContext,
    pub quality: DataQuality,
}
