//! Data quality classification
//!
//! Combines the GPS quality signal and the accelerometer signal into one
//! `good | partial | poor` tier.
//!
//! Note: the accelerometer input is the detector's *walking-detected* flag,
//! not "the motion stream is live". A user standing still with a perfectly
//! healthy accelerometer therefore caps out at `Partial`. This coupling of
//! motion state with sensor availability is kept as-is for compatibility with
//! stored measurements; hosts that need sensor liveness should read
//! `ContextEngine::accel_timed_out` instead.

use crate::types::{DataQuality, GpsQuality};

/// Pure quality combinator
pub struct DataQualityClassifier;

impl DataQualityClassifier {
    /// Absent or stale GPS must be passed in as `GpsQuality::Poor`.
    pub fn combine(gps_quality: GpsQuality, accel_active: bool) -> DataQuality {
        match (gps_quality, accel_active) {
            (GpsQuality::Good, true) => DataQuality::Good,
            (GpsQuality::Good, false) | (GpsQuality::Poor, true) => DataQuality::Partial,
            (GpsQuality::Poor, false) => DataQuality::Poor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_truth_table() {
        assert_eq!(
            DataQualityClassifier::combine(GpsQuality::Good, true),
            DataQuality::Good
        );
        assert_eq!(
            DataQualityClassifier::combine(GpsQuality::Good, false),
            DataQuality::Partial
        );
        assert_eq!(
            DataQualityClassifier::combine(GpsQuality::Poor, true),
            DataQuality::Partial
        );
        assert_eq!(
            DataQualityClassifier::combine(GpsQuality::Poor, false),
            DataQuality::Poor
        );
    }
}
