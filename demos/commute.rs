//! Simulated commute: walk to the car, drive, stop at a light, drive on.
//!
//! Run with: cargo run --example commute

use airsense_context::{
    AccelSample, EngineConfig, EngineError, GpsFix, RecordingCadence, RecordingSession,
};

const METERS_PER_DEG_LAT: f64 = 111_195.0;

fn main() -> Result<(), EngineError> {
    let mut session = RecordingSession::new(EngineConfig::default(), RecordingCadence::parse("10s")?)?;
    let id = session.start(0);
    println!("session {}", id);

    // (until_ms, km/h, walking)
    let phases = [
        (30_000, 5.0, true),
        (90_000, 45.0, false),
        (110_000, 0.0, false),
        (150_000, 40.0, false),
    ];

    let mut north_m = 0.0;
    let mut t = 0;
    for (until_ms, kmh, walking) in phases {
        while t < until_ms {
            if let Some(sample) = session.poll(t) {
                println!(
                    "{:>7} ms  {:<10} quality={}",
                    sample.timestamp_ms,
                    sample.context.as_str(),
                    sample.quality.as_str()
                );
            }
            if t % 1_000 == 0 {
                let lat = 48.137 + north_m / METERS_PER_DEG_LAT;
                session.on_gps_fix(&GpsFix::new(lat, 11.575, Some(6.0), t));
                north_m += kmh / 3.6;
            }
            let magnitude = match (walking, t % 500 == 0) {
                (true, true) => 1.6,
                (true, false) => 0.7,
                (false, _) => 0.15,
            };
            session.on_accel_sample(&AccelSample::new(magnitude, t));
            t += 20;
        }
    }

    session.stop();
    println!("{} ticks", session.tick_count());
    Ok(())
}
