//! Sensor trace replay
//!
//! Recorded sensor traces let the engine be exercised offline: a trace is a
//! time-ordered list of GPS fixes and accelerometer samples, stored as NDJSON
//! (one event per line) or as a JSON array. Replaying a trace drives a
//! `RecordingSession` in event time and yields one record per sampling tick.

use crate::config::{EngineConfig, RecordingCadence};
use crate::error::EngineError;
use crate::session::RecordingSession;
use crate::types::{AccelSample, AutomaticContext, ContextSample, DataQuality, GpsFix};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recorded sensor event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorEvent {
    Gps(GpsFix),
    Accel(AccelSample),
}

impl SensorEvent {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            SensorEvent::Gps(fix) => fix.timestamp_ms,
            SensorEvent::Accel(sample) => sample.timestamp_ms,
        }
    }

    /// Structural checks for recorded traces.
    ///
    /// The engine itself tolerates all of these; validation exists so that
    /// broken recordings are noticed before they are used as test fixtures.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            SensorEvent::Gps(fix) => {
                if !fix.has_valid_coordinates() {
                    return Err(EngineError::InvalidEvent(format!(
                        "GPS fix at {} ms has invalid coordinates ({}, {})",
                        fix.timestamp_ms, fix.lat, fix.lon
                    )));
                }
                if let Some(acc) = fix.accuracy_m {
                    if !acc.is_finite() || acc < 0.0 {
                        return Err(EngineError::InvalidEvent(format!(
                            "GPS fix at {} ms has invalid accuracy {}",
                            fix.timestamp_ms, acc
                        )));
                    }
                }
            }
            SensorEvent::Accel(sample) => {
                if !sample.magnitude.is_finite() {
                    return Err(EngineError::InvalidEvent(format!(
                        "accel sample at {} ms has non-finite magnitude",
                        sample.timestamp_ms
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Context record emitted for each replayed tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub session_id: Uuid,
    pub timestamp_ms: i64,
    /// Tick time interpreted as Unix epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampled_at_utc: Option<DateTime<Utc>>,
    pub context: AutomaticContext,
    pub quality: DataQuality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    pub walking: bool,
}

impl ContextRecord {
    /// Build the record for a tick the session just resolved
    pub fn from_tick(session: &RecordingSession, sample: &ContextSample) -> Self {
        let snapshot = session.engine().snapshot();
        Self {
            session_id: session.id(),
            timestamp_ms: sample.timestamp_ms,
            sampled_at_utc: Utc.timestamp_millis_opt(sample.timestamp_ms).single(),
            context: sample.context,
            quality: sample.quality,
            speed_kmh: snapshot.speed.map(|s| s.speed_kmh),
            walking: snapshot.walking.active,
        }
    }
}

/// Validation failure for one event of a trace
#[derive(Debug)]
pub struct TraceIssue {
    pub index: usize,
    pub timestamp_ms: i64,
    pub error: EngineError,
}

/// Parser and replayer for recorded sensor traces
pub struct TraceReader;

impl TraceReader {
    /// Parse a JSON array of sensor events
    pub fn parse_array(json: &str) -> Result<Vec<SensorEvent>, EngineError> {
        let events: Vec<SensorEvent> = serde_json::from_str(json)?;
        Ok(events)
    }

    /// Parse NDJSON (one sensor event per line, blank lines skipped)
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<SensorEvent>, EngineError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let event = serde_json::from_str::<SensorEvent>(trimmed).map_err(|e| {
                EngineError::ParseError(format!("line {}: {}", line_num + 1, e))
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Collect structural problems, including out-of-order timestamps per stream
    pub fn validate_events(events: &[SensorEvent]) -> Vec<TraceIssue> {
        let mut issues = Vec::new();
        let mut last_gps: Option<i64> = None;
        let mut last_accel: Option<i64> = None;

        for (index, event) in events.iter().enumerate() {
            let ts = event.timestamp_ms();
            if let Err(error) = event.validate() {
                issues.push(TraceIssue {
                    index,
                    timestamp_ms: ts,
                    error,
                });
                continue;
            }

            let last = match event {
                SensorEvent::Gps(_) => &mut last_gps,
                SensorEvent::Accel(_) => &mut last_accel,
            };
            if let Some(prev) = *last {
                if ts < prev {
                    issues.push(TraceIssue {
                        index,
                        timestamp_ms: ts,
                        error: EngineError::InvalidEvent(format!(
                            "timestamp {} ms is earlier than previous {} ms",
                            ts, prev
                        )),
                    });
                    continue;
                }
            }
            *last = Some(ts);
        }

        issues
    }

    /// Replay a trace through a fresh recording session.
    ///
    /// The session starts at the first event's timestamp. Before each event
    /// is delivered, every tick that fell due is resolved, exactly as a live
    /// host would interleave timer callbacks with sensor callbacks. The trace
    /// ends with the last due tick at or before the final event.
    pub fn replay(
        events: &[SensorEvent],
        config: EngineConfig,
        cadence: RecordingCadence,
    ) -> Result<Vec<ContextRecord>, EngineError> {
        let mut session = RecordingSession::new(config, cadence)?;
        let Some(first) = events.first() else {
            return Ok(Vec::new());
        };
        session.start(first.timestamp_ms());

        let mut records = Vec::new();
        for event in events {
            Self::drain_ticks(&mut session, event.timestamp_ms(), &mut records);
            match event {
                SensorEvent::Gps(fix) => {
                    session.on_gps_fix(fix);
                }
                SensorEvent::Accel(sample) => {
                    session.on_accel_sample(sample);
                }
            }
        }
        if let Some(last) = events.last() {
            Self::drain_ticks(&mut session, last.timestamp_ms(), &mut records);
        }
        session.stop();

        Ok(records)
    }

    /// Resolve every tick due at or before `until_ms`, in order
    pub fn drain_ticks(
        session: &mut RecordingSession,
        until_ms: i64,
        records: &mut Vec<ContextRecord>,
    ) {
        while let Some(tick_ms) = session.next_tick_ms() {
            if tick_ms > until_ms {
                break;
            }
            let Some(sample) = session.poll(tick_ms) else {
                break;
            };
            records.push(ContextRecord::from_tick(session, &sample));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commute_trace() -> Vec<SensorEvent> {
        let mut events = Vec::new();
        // 0-20 s: walking to the car, GPS every second at 5 km/h
        // 20-60 s: driving at 50 km/h, phone in a cup holder (no step peaks)
        let mut lat = 47.0;
        let mut t = 0;
        while t < 60_000 {
            if t % 1_000 == 0 {
                events.push(SensorEvent::Gps(GpsFix::new(lat, 8.0, Some(6.0), t)));
                let kmh = if t < 20_000 { 5.0 } else { 50.0 };
                lat += kmh / 3.6 / 111_195.0;
            }
            let magnitude = if t < 20_000 && t % 500 == 0 { 1.6 } else if t < 20_000 { 0.7 } else { 0.2 };
            events.push(SensorEvent::Accel(AccelSample::new(magnitude, t)));
            t += 20;
        }
        events
    }

    #[test]
    fn test_parse_ndjson_and_array() {
        let ndjson = r#"
{"type":"gps","lat":47.0,"lon":8.0,"accuracy_m":5.0,"timestamp_ms":0}

{"type":"accel","magnitude":0.4,"timestamp_ms":20}
"#;
        let events = TraceReader::parse_ndjson(ndjson).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SensorEvent::Gps(_)));
        assert_eq!(events[1].timestamp_ms(), 20);

        let array = serde_json::to_string(&events).unwrap();
        assert_eq!(TraceReader::parse_array(&array).unwrap(), events);
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let err = TraceReader::parse_ndjson("{\"type\":\"gps\"}\n").unwrap_err();
        match err {
            EngineError::ParseError(msg) => assert!(msg.starts_with("line 1")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_validate_events() {
        let events = vec![
            SensorEvent::Gps(GpsFix::new(47.0, 8.0, None, 1_000)),
            SensorEvent::Accel(AccelSample::new(0.5, 500)),
            SensorEvent::Gps(GpsFix::new(47.0, 8.0, None, 900)),
            SensorEvent::Gps(GpsFix::new(147.0, 8.0, None, 2_000)),
            SensorEvent::Accel(AccelSample::new(0.5, 600)),
        ];
        let issues = TraceReader::validate_events(&events);
        let indices: Vec<usize> = issues.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![2, 3]);
    }

    #[test]
    fn test_replay_commute() {
        let records = TraceReader::replay(
            &commute_trace(),
            EngineConfig::default(),
            RecordingCadence::parse("10s").unwrap(),
        )
        .unwrap();

        // Ticks at 10, 20, 30, 40, 50 s
        let times: Vec<i64> = records.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(times, vec![10_000, 20_000, 30_000, 40_000, 50_000]);
        assert!(records.iter().all(|r| r.session_id == records[0].session_id));

        // Still inside the 10 s enter hold at the first tick
        assert_eq!(records[0].context, AutomaticContext::Stationary);
        assert_eq!(records[1].context, AutomaticContext::Walking);
        assert_eq!(records[1].quality, DataQuality::Good);
        assert_eq!(records[3].context, AutomaticContext::Driving);
        assert_eq!(records[4].context, AutomaticContext::Driving);
        assert!(records[4].speed_kmh.unwrap() > 45.0);
        assert_eq!(
            records[0].sampled_at_utc.unwrap().timestamp_millis(),
            10_000
        );
    }

    #[test]
    fn test_replay_empty_trace() {
        let records = TraceReader::replay(
            &[],
            EngineConfig::default(),
            RecordingCadence::default(),
        )
        .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_replay_near_end_of_clock() {
        let events = vec![
            SensorEvent::Gps(GpsFix::new(47.0, 8.0, Some(5.0), i64::MAX - 15_000)),
            SensorEvent::Accel(AccelSample::new(0.4, i64::MAX)),
        ];
        let records = TraceReader::replay(
            &events,
            EngineConfig::default(),
            RecordingCadence::default(),
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp_ms, i64::MAX - 5_000);
        assert_eq!(records[0].sampled_at_utc, None);
    }
}
