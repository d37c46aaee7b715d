//! GPS speed estimation
//!
//! Turns successive GPS fixes into an exponentially smoothed ground speed and
//! a coarse quality signal. Glitches (teleports, inaccurate fixes, bad
//! coordinates) never raise errors; they are absorbed as `Poor` quality.

use crate::config::SpeedConfig;
use crate::types::{GpsFix, GpsQuality, SpeedEstimate};
use tracing::{debug, trace};

/// Mean Earth radius used for haversine distances (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
}

/// Smoothed speed estimator fed by GPS fixes.
#[derive(Debug, Clone)]
pub struct GeoSpeedEstimator {
    config: SpeedConfig,
    prev: Option<GpsFix>,
    ema_kmh: f64,
}

impl Default for GeoSpeedEstimator {
    fn default() -> Self {
        Self::new(SpeedConfig::default())
    }
}

impl GeoSpeedEstimator {
    pub fn new(config: SpeedConfig) -> Self {
        Self {
            config,
            prev: None,
            ema_kmh: 0.0,
        }
    }

    /// Feed one fix and return the updated estimate.
    pub fn update(&mut self, fix: &GpsFix) -> SpeedEstimate {
        let fix_quality = self.fix_quality(fix);

        let prev = match self.prev {
            Some(prev) => prev,
            None => {
                self.prev = Some(*fix);
                return SpeedEstimate::new(0.0, fix_quality);
            }
        };

        let Some(dt_ms) = fix.timestamp_ms.checked_sub(prev.timestamp_ms) else {
            // Timestamps too far apart to compare: no speed, but keep a later fix
            if fix.timestamp_ms > prev.timestamp_ms {
                self.prev = Some(*fix);
            }
            return SpeedEstimate::new(self.ema_kmh, GpsQuality::Poor);
        };
        if dt_ms < 0 {
            trace!(
                prev_ms = prev.timestamp_ms,
                fix_ms = fix.timestamp_ms,
                "dropping out-of-order GPS fix"
            );
            return SpeedEstimate::new(self.ema_kmh, GpsQuality::Poor);
        }

        self.prev = Some(*fix);

        let dt_s = dt_ms as f64 / 1000.0;
        if dt_s <= self.config.min_dt_s {
            return SpeedEstimate::new(self.ema_kmh, fix_quality);
        }

        let mut quality = if fix_quality == GpsQuality::Poor
            || self.fix_quality(&prev) == GpsQuality::Poor
        {
            GpsQuality::Poor
        } else {
            GpsQuality::Good
        };

        if !fix.has_valid_coordinates() || !prev.has_valid_coordinates() {
            return SpeedEstimate::new(self.ema_kmh, GpsQuality::Poor);
        }

        let distance_m = haversine_m(prev.lat, prev.lon, fix.lat, fix.lon);
        let mut v_kmh = distance_m / dt_s * 3.6;
        if !v_kmh.is_finite() {
            return SpeedEstimate::new(self.ema_kmh, GpsQuality::Poor);
        }

        if v_kmh > self.config.max_jump_kmh {
            debug!(
                implied_kmh = v_kmh,
                max_kmh = self.config.max_jump_kmh,
                "clamping GPS jump"
            );
            v_kmh = self.config.max_jump_kmh;
            quality = GpsQuality::Poor;
        }

        self.ema_kmh = if self.ema_kmh == 0.0 {
            v_kmh
        } else {
            let alpha = self.config.ema_alpha;
            alpha * v_kmh + (1.0 - alpha) * self.ema_kmh
        };

        SpeedEstimate::new(self.ema_kmh, quality)
    }

    /// Current smoothed speed in km/h
    pub fn speed_kmh(&self) -> f64 {
        self.ema_kmh
    }

    /// Timestamp of the last accepted fix
    pub fn last_fix_ms(&self) -> Option<i64> {
        self.prev.map(|p| p.timestamp_ms)
    }

    pub fn reset(&mut self) {
        self.prev = None;
        self.ema_kmh = 0.0;
    }

    fn fix_quality(&self, fix: &GpsFix) -> GpsQuality {
        if !fix.has_valid_coordinates() {
            return GpsQuality::Poor;
        }
        match fix.accuracy_m {
            Some(acc) if !acc.is_finite() || acc < 0.0 => GpsQuality::Poor,
            Some(acc) if acc > self.config.poor_accuracy_m => GpsQuality::Poor,
            _ => GpsQuality::Good,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METERS_PER_DEG_LAT: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

    /// Fix `meters` north of the origin
    fn fix_north(meters: f64, t_ms: i64) -> GpsFix {
        GpsFix::new(48.0 + meters / METERS_PER_DEG_LAT, 11.0, Some(5.0), t_ms)
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - METERS_PER_DEG_LAT).abs() < 1e-6);
        assert_eq!(haversine_m(48.0, 11.0, 48.0, 11.0), 0.0);
    }

    #[test]
    fn test_first_fix_returns_zero() {
        let mut est = GeoSpeedEstimator::default();
        let e = est.update(&fix_north(0.0, 0));
        assert_eq!(e.speed_kmh, 0.0);
        assert_eq!(e.gps_quality, GpsQuality::Good);

        let mut est = GeoSpeedEstimator::default();
        let e = est.update(&GpsFix::new(48.0, 11.0, Some(35.0), 0));
        assert_eq!(e.speed_kmh, 0.0);
        assert_eq!(e.gps_quality, GpsQuality::Poor);
    }

    #[test]
    fn test_short_dt_leaves_speed_unchanged() {
        let mut est = GeoSpeedEstimator::default();
        est.update(&fix_north(0.0, 0));
        let before = est.update(&fix_north(10.0, 2_000));
        assert!(before.speed_kmh > 0.0);

        // 0.5 s later, 50 m further: would be 360 km/h if not ignored
        let after = est.update(&fix_north(60.0, 2_500));
        assert_eq!(after.speed_kmh, before.speed_kmh);

        // The short-dt fix still became prev
        assert_eq!(est.last_fix_ms(), Some(2_500));
    }

    #[test]
    fn test_jump_is_clamped_and_poor() {
        let mut est = GeoSpeedEstimator::default();
        est.update(&fix_north(0.0, 0));
        // 1 km in 1 s = 3600 km/h
        let e = est.update(&fix_north(1_000.0, 1_000));
        assert_eq!(e.speed_kmh, 100.0);
        assert_eq!(e.gps_quality, GpsQuality::Poor);

        // Further jumps can never push the EMA above the ceiling
        let e = est.update(&fix_north(5_000.0, 2_000));
        assert!(e.speed_kmh <= 100.0);
    }

    #[test]
    fn test_constant_speed_converges() {
        let mut est = GeoSpeedEstimator::default();
        let meters_per_s = 5.0 / 3.6;
        let mut last = SpeedEstimate::new(0.0, GpsQuality::Good);
        for i in 0..20 {
            last = est.update(&fix_north(meters_per_s * i as f64, i * 1_000));
        }
        assert!((last.speed_kmh - 5.0).abs() < 0.05, "speed {}", last.speed_kmh);
        assert_eq!(last.gps_quality, GpsQuality::Good);
    }

    #[test]
    fn test_ema_smooths_changes() {
        let mut est = GeoSpeedEstimator::default();
        est.update(&fix_north(0.0, 0));
        let e1 = est.update(&fix_north(10.0, 1_000)); // 36 km/h
        assert!((e1.speed_kmh - 36.0).abs() < 1e-6);
        let e2 = est.update(&fix_north(10.0, 2_000)); // 0 km/h
        assert!((e2.speed_kmh - 27.0).abs() < 1e-6);
    }

    #[test]
    fn test_inaccurate_previous_fix_makes_poor() {
        let mut est = GeoSpeedEstimator::default();
        est.update(&GpsFix::new(48.0, 11.0, Some(50.0), 0));
        let e = est.update(&fix_north(5.0, 2_000));
        assert_eq!(e.gps_quality, GpsQuality::Poor);
    }

    #[test]
    fn test_out_of_order_fix_not_stored() {
        let mut est = GeoSpeedEstimator::default();
        est.update(&fix_north(0.0, 10_000));
        let e = est.update(&fix_north(50.0, 5_000));
        assert_eq!(e.gps_quality, GpsQuality::Poor);
        assert_eq!(e.speed_kmh, 0.0);
        assert_eq!(est.last_fix_ms(), Some(10_000));
    }

    #[test]
    fn test_malformed_coordinates_are_poor_and_never_negative() {
        let mut est = GeoSpeedEstimator::default();
        est.update(&fix_north(0.0, 0));
        let e = est.update(&GpsFix::new(f64::NAN, 11.0, Some(5.0), 1_000));
        assert_eq!(e.gps_quality, GpsQuality::Poor);
        assert_eq!(e.speed_kmh, 0.0);
        // Stored as prev since its timestamp was monotonic
        assert_eq!(est.last_fix_ms(), Some(1_000));

        // Next valid fix cannot compute a distance against the NaN prev
        let e = est.update(&fix_north(5.0, 2_000));
        assert_eq!(e.gps_quality, GpsQuality::Poor);
        assert!(e.speed_kmh >= 0.0 && e.speed_kmh.is_finite());

        let e = est.update(&GpsFix::new(48.0, 11.0, Some(-1.0), 3_000));
        assert_eq!(e.gps_quality, GpsQuality::Poor);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut est = GeoSpeedEstimator::default();
        est.update(&fix_north(0.0, 0));
        est.update(&fix_north(10.0, 1_000));
        est.reset();
        assert_eq!(est.speed_kmh(), 0.0);
        assert_eq!(est.last_fix_ms(), None);
        let e = est.update(&fix_north(500.0, 2_000));
        assert_eq!(e.speed_kmh, 0.0);
    }

    #[test]
    fn test_extreme_timestamps_degrade_to_poor() {
        let mut est = GeoSpeedEstimator::default();
        est.update(&fix_north(0.0, i64::MIN));

        // Later, but too far apart to subtract
        let e = est.update(&fix_north(10.0, i64::MAX));
        assert_eq!(e.gps_quality, GpsQuality::Poor);
        assert_eq!(e.speed_kmh, 0.0);
        assert_eq!(est.last_fix_ms(), Some(i64::MAX));

        // Earlier and too far apart: dropped
        let e = est.update(&fix_north(20.0, i64::MIN));
        assert_eq!(e.gps_quality, GpsQuality::Poor);
        assert_eq!(est.last_fix_ms(), Some(i64::MAX));

        let e = est.update(&fix_north(20.0, 0));
        assert_eq!(e.gps_quality, GpsQuality::Poor);
        assert_eq!(est.speed_kmh(), 0.0);
    }
}
