//! Walking signature detection
//!
//! Classifies a rolling window of accelerometer magnitudes as "walking-like"
//! from three gait features:
//! - step cadence from refractory-gated peak detection
//! - regularity of the inter-peak intervals (coefficient of variation)
//! - RMS energy of the window
//!
//! The raw per-window classification is stabilized with an asymmetric
//! hysteresis (quick-ish to enter, slow to exit) so that short pauses do not
//! flip the state. Hold durations are accumulated from sample timestamps, so
//! the state machine depends only on its inputs and never on wall-clock time.

use crate::config::WalkingConfig;
use crate::types::{AccelSample, WalkingState};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Gait features of the current window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowFeatures {
    /// Steps per minute
    pub cadence_spm: f64,
    /// Coefficient of variation of inter-peak intervals; `None` with fewer than two intervals
    pub interval_cv: Option<f64>,
    /// Root-mean-square of window magnitudes (m/s²)
    pub rms: f64,
    /// Time span covered by the window (seconds)
    pub span_s: f64,
    pub peak_count: usize,
}

impl WindowFeatures {
    /// Raw walking classification of this window
    pub fn is_walking(&self, config: &WalkingConfig) -> bool {
        let cadence_ok =
            self.cadence_spm >= config.cadence_min && self.cadence_spm <= config.cadence_max;
        let regular = matches!(self.interval_cv, Some(cv) if cv <= config.cv_max);
        let energy_ok = self.rms >= config.rms_min && self.rms <= config.rms_max;
        cadence_ok && regular && energy_ok
    }
}

/// Hysteresis-stabilized walking detector fed by accelerometer samples.
#[derive(Debug, Clone)]
pub struct WalkingSignatureDetector {
    config: WalkingConfig,
    window: VecDeque<AccelSample>,
    peaks: VecDeque<i64>,
    last_peak_ms: Option<i64>,
    last_features: Option<WindowFeatures>,
    state: WalkingState,
}

impl Default for WalkingSignatureDetector {
    fn default() -> Self {
        Self::new(WalkingConfig::default())
    }
}

impl WalkingSignatureDetector {
    pub fn new(config: WalkingConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
            peaks: VecDeque::new(),
            last_peak_ms: None,
            last_features: None,
            state: WalkingState::default(),
        }
    }

    /// Process one sample and return the updated state.
    ///
    /// Samples with a non-finite magnitude or a timestamp earlier than the
    /// previous sample are dropped and do not count as liveness.
    pub fn on_sample(&mut self, sample: &AccelSample) -> WalkingState {
        if !sample.magnitude.is_finite() {
            trace!(ts = sample.timestamp_ms, "dropping non-finite accel sample");
            return self.state;
        }

        let mut dt_ms = match self.state.last_sample_timestamp_ms {
            Some(last) if sample.timestamp_ms < last => {
                trace!(
                    last_ms = last,
                    sample_ms = sample.timestamp_ms,
                    "dropping out-of-order accel sample"
                );
                return self.state;
            }
            Some(last) => sample.timestamp_ms.saturating_sub(last),
            None => 0,
        };

        if dt_ms >= self.config.timeout_ms {
            self.fail_safe(sample.timestamp_ms);
            dt_ms = 0;
        }

        self.state.last_sample_timestamp_ms = Some(sample.timestamp_ms);
        self.push(sample);

        let features = self.compute_features();
        self.last_features = Some(features);
        let raw = features.is_walking(&self.config);
        self.apply_hysteresis(raw, dt_ms, sample.timestamp_ms);

        self.state
    }

    /// Apply the fail-safe timeout if no sample arrived for `timeout_ms`.
    ///
    /// Returns true when the accelerometer stream is stale at `now_ms`.
    pub fn expire(&mut self, now_ms: i64) -> bool {
        if !self.is_timed_out(now_ms) {
            return false;
        }
        let has_state = self.state.active
            || self.state.consecutive_true_ms > 0
            || self.state.consecutive_false_ms > 0
            || !self.window.is_empty();
        if has_state {
            self.fail_safe(now_ms);
        }
        true
    }

    /// Whether the stream is absent or has been silent for at least `timeout_ms`
    pub fn is_timed_out(&self, now_ms: i64) -> bool {
        match self.state.last_sample_timestamp_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.config.timeout_ms,
            None => true,
        }
    }

    /// Published hysteresis state
    pub fn state(&self) -> WalkingState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// Features of the most recently evaluated window
    pub fn last_features(&self) -> Option<WindowFeatures> {
        self.last_features
    }

    /// Number of samples currently retained in the window
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.peaks.clear();
        self.last_peak_ms = None;
        self.last_features = None;
        self.state = WalkingState::default();
    }

    fn push(&mut self, sample: &AccelSample) {
        let ts = sample.timestamp_ms;

        let refractory_elapsed = self
            .last_peak_ms
            .map_or(true, |last| ts.saturating_sub(last) >= self.config.refractory_ms);
        if sample.magnitude > self.config.peak_threshold && refractory_elapsed {
            self.peaks.push_back(ts);
            self.last_peak_ms = Some(ts);
        }
        self.window.push_back(*sample);

        let oldest_allowed = ts.saturating_sub(self.config.window_ms());
        while self
            .window
            .front()
            .is_some_and(|s| s.timestamp_ms < oldest_allowed)
        {
            self.window.pop_front();
        }
        while self.peaks.front().is_some_and(|&p| p < oldest_allowed) {
            self.peaks.pop_front();
        }
    }

    fn compute_features(&self) -> WindowFeatures {
        let span_ms = match (self.window.front(), self.window.back()) {
            (Some(first), Some(last)) => last.timestamp_ms.saturating_sub(first.timestamp_ms),
            _ => 0,
        };
        let span_s = (span_ms as f64 / 1000.0).min(self.config.window_sec);

        let peak_count = self.peaks.len();
        let cadence_spm = if span_s > 0.0 {
            peak_count as f64 / span_s * 60.0
        } else {
            0.0
        };

        let intervals: Vec<f64> = self
            .peaks
            .iter()
            .zip(self.peaks.iter().skip(1))
            .map(|(a, b)| b.saturating_sub(*a) as f64)
            .collect();
        let interval_cv = coefficient_of_variation(&intervals);

        let rms = if self.window.is_empty() {
            0.0
        } else {
            let sum_sq: f64 = self.window.iter().map(|s| s.magnitude * s.magnitude).sum();
            (sum_sq / self.window.len() as f64).sqrt()
        };

        WindowFeatures {
            cadence_spm,
            interval_cv,
            rms,
            span_s,
            peak_count,
        }
    }

    fn apply_hysteresis(&mut self, raw: bool, dt_ms: i64, ts: i64) {
        let state = &mut self.state;
        if raw {
            state.consecutive_true_ms = if state.last_raw_true {
                state.consecutive_true_ms.saturating_add(dt_ms)
            } else {
                0
            };
            state.consecutive_false_ms = 0;
        } else {
            state.consecutive_false_ms = if state.last_raw_true {
                0
            } else {
                state.consecutive_false_ms.saturating_add(dt_ms)
            };
            state.consecutive_true_ms = 0;
        }
        state.last_raw_true = raw;

        if !state.active && raw && state.consecutive_true_ms >= self.config.hold_enter_ms {
            state.active = true;
            debug!(ts, held_ms = state.consecutive_true_ms, "walking detected");
        } else if state.active && !raw && state.consecutive_false_ms >= self.config.hold_exit_ms {
            state.active = false;
            debug!(ts, held_ms = state.consecutive_false_ms, "walking ended");
        }
    }

    fn fail_safe(&mut self, now_ms: i64) {
        if self.state.active {
            debug!(
                now_ms,
                last_sample_ms = ?self.state.last_sample_timestamp_ms,
                "accelerometer timed out, forcing walking off"
            );
        }
        self.window.clear();
        self.peaks.clear();
        self.last_peak_ms = None;
        self.last_features = None;
        self.state.active = false;
        self.state.last_raw_true = false;
        self.state.consecutive_true_ms = 0;
        self.state.consecutive_false_ms = 0;
    }
}

fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt() / mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_MS: i64 = 20; // 50 Hz
    const STEP_MS: i64 = 500; // 120 steps/min

    /// Pulse train: one 1.6 m/s² peak every `STEP_MS`, 0.7 m/s² in between
    fn walking_sample(t: i64) -> AccelSample {
        let magnitude = if t % STEP_MS == 0 { 1.6 } else { 0.7 };
        AccelSample::new(magnitude, t)
    }

    fn quiet_sample(t: i64) -> AccelSample {
        AccelSample::new(0.3, t)
    }

    /// Feeds samples in `[from, to)` and records the first raw-true time and
    /// the time `active` first flips to `expect_active`.
    fn feed(
        det: &mut WalkingSignatureDetector,
        from: i64,
        to: i64,
        gen: fn(i64) -> AccelSample,
        raw_edge: bool,
        expect_active: bool,
    ) -> (Option<i64>, Option<i64>) {
        let mut first_raw = None;
        let mut flipped = None;
        let mut t = from;
        while t < to {
            let state = det.on_sample(&gen(t));
            if first_raw.is_none() && state.last_raw_true == raw_edge {
                first_raw = Some(t);
            }
            if flipped.is_none() && state.active == expect_active {
                flipped = Some(t);
            }
            t += SAMPLE_MS;
        }
        (first_raw, flipped)
    }

    #[test]
    fn test_peak_refractory_period() {
        let mut det = WalkingSignatureDetector::default();
        det.on_sample(&AccelSample::new(1.5, 0));
        det.on_sample(&AccelSample::new(1.5, 100)); // inside 300 ms refractory
        det.on_sample(&AccelSample::new(1.5, 299));
        det.on_sample(&AccelSample::new(1.5, 300));
        assert_eq!(det.last_features().unwrap().peak_count, 2);
    }

    #[test]
    fn test_steady_cadence_features() {
        let mut det = WalkingSignatureDetector::default();
        feed(&mut det, 0, 8_000, walking_sample, true, true);
        let f = det.last_features().unwrap();
        assert!((f.span_s - 6.0).abs() < 1e-9);
        assert!(f.cadence_spm >= 110.0 && f.cadence_spm <= 140.0, "{}", f.cadence_spm);
        assert!(f.interval_cv.unwrap() < 1e-9);
        assert!(f.rms > 0.5 && f.rms < 3.5);
        assert!(f.is_walking(&WalkingConfig::default()));
    }

    #[test]
    fn test_activates_after_enter_hold() {
        let mut det = WalkingSignatureDetector::default();
        let (first_raw, activated) = feed(&mut det, 0, 15_000, walking_sample, true, true);
        let first_raw = first_raw.expect("raw walking never detected");
        let activated = activated.expect("never activated");

        assert_eq!(activated - first_raw, ACC_HOLD_ENTER);
        assert!(activated >= ACC_HOLD_ENTER);

        // One sample earlier the detector was still inactive
        let mut det = WalkingSignatureDetector::default();
        feed(&mut det, 0, activated, walking_sample, true, true);
        assert!(!det.is_active());
    }

    #[test]
    fn test_deactivates_after_exit_hold() {
        let mut det = WalkingSignatureDetector::default();
        feed(&mut det, 0, 12_000, walking_sample, true, true);
        assert!(det.is_active());

        let quiet_start = 12_000;
        let (first_false, deactivated) =
            feed(&mut det, quiet_start, quiet_start + 45_000, quiet_sample, false, false);
        let first_false = first_false.expect("raw walking never ended");
        let deactivated = deactivated.expect("never deactivated");

        assert_eq!(deactivated - first_false, ACC_HOLD_EXIT);
        assert!(deactivated - quiet_start >= ACC_HOLD_EXIT);
    }

    #[test]
    fn test_short_pause_keeps_walking() {
        let mut det = WalkingSignatureDetector::default();
        feed(&mut det, 0, 12_000, walking_sample, true, true);
        // 15 s wait at a crossing
        feed(&mut det, 12_000, 27_000, quiet_sample, false, false);
        assert!(det.is_active());
        feed(&mut det, 27_000, 35_000, walking_sample, true, true);
        assert!(det.is_active());
        assert_eq!(det.state().consecutive_false_ms, 0);
    }

    #[test]
    fn test_timeout_forces_inactive() {
        let mut det = WalkingSignatureDetector::default();
        feed(&mut det, 0, 12_000, walking_sample, true, true);
        assert!(det.is_active());
        let last = det.state().last_sample_timestamp_ms.unwrap();

        assert!(!det.expire(last + ACC_TIMEOUT - 1));
        assert!(det.is_active());

        assert!(det.expire(last + ACC_TIMEOUT));
        let state = det.state();
        assert!(!state.active);
        assert_eq!(state.consecutive_true_ms, 0);
        assert_eq!(state.consecutive_false_ms, 0);
        assert_eq!(det.window_len(), 0);
    }

    #[test]
    fn test_gap_in_stream_triggers_fail_safe() {
        let mut det = WalkingSignatureDetector::default();
        feed(&mut det, 0, 12_000, walking_sample, true, true);
        assert!(det.is_active());

        // Stream resumes after a 6 s silence
        let state = det.on_sample(&walking_sample(18_000));
        assert!(!state.active);
        assert_eq!(state.consecutive_true_ms, 0);
        assert_eq!(det.window_len(), 1);
    }

    #[test]
    fn test_single_peak_after_reset() {
        let mut det = WalkingSignatureDetector::default();
        feed(&mut det, 0, 12_000, walking_sample, true, true);
        det.reset();
        assert!(!det.is_active());
        assert_eq!(det.state(), WalkingState::default());

        let state = det.on_sample(&AccelSample::new(2.0, 12_020));
        assert!(!state.active);
        assert!(!state.last_raw_true);
    }

    #[test]
    fn test_irregular_steps_rejected() {
        let mut det = WalkingSignatureDetector::default();
        // Alternating 350 ms / 1000 ms intervals: CV ~0.48
        let mut t = 0;
        let mut peak_times = Vec::new();
        let mut next_peak = 0;
        let mut long = false;
        while t < 20_000 {
            if t == next_peak {
                peak_times.push(t);
                next_peak += if long { 1_000 } else { 350 };
                long = !long;
            }
            let magnitude = if peak_times.last() == Some(&t) { 1.6 } else { 0.7 };
            det.on_sample(&AccelSample::new(magnitude, t));
            t += 10;
        }
        assert!(det.last_features().unwrap().interval_cv.unwrap() > 0.30);
        assert!(!det.is_active());
    }

    #[test]
    fn test_dropped_samples_do_not_refresh_liveness() {
        let mut det = WalkingSignatureDetector::default();
        det.on_sample(&AccelSample::new(0.5, 10_000));
        det.on_sample(&AccelSample::new(0.5, 9_000));
        det.on_sample(&AccelSample::new(f64::NAN, 14_000));
        assert_eq!(det.state().last_sample_timestamp_ms, Some(10_000));
        assert!(det.is_timed_out(15_000));
        assert!(!det.is_timed_out(14_999));
    }

    #[test]
    fn test_absent_stream_is_timed_out() {
        let mut det = WalkingSignatureDetector::default();
        assert!(det.is_timed_out(0));
        assert!(det.expire(0));
        assert!(!det.is_active());
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let mut det = WalkingSignatureDetector::default();
        let state = det.on_sample(&AccelSample::new(1.6, i64::MIN));
        assert!(!state.active);
        assert_eq!(det.window_len(), 1);
        assert!(!det.is_timed_out(i64::MIN));
        assert!(det.is_timed_out(i64::MAX));

        // Gap wider than the i64 range is a timeout, not a wrap-around
        let state = det.on_sample(&AccelSample::new(1.6, i64::MAX));
        assert!(!state.active);
        assert_eq!(state.consecutive_true_ms, 0);
        assert_eq!(det.window_len(), 1);
        assert_eq!(det.last_features().unwrap().peak_count, 1);
        assert!(!det.is_timed_out(i64::MIN));
        assert!(!det.expire(i64::MAX));
    }

    const ACC_HOLD_ENTER: i64 = crate::config::ACC_HOLD_ENTER_MS;
    const ACC_HOLD_EXIT: i64 = crate::config::ACC_HOLD_EXIT_MS;
    const ACC_TIMEOUT: i64 = crate::config::ACC_TIMEOUT_MS;
}
