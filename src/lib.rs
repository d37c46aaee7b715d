//! AirSense Context - automatic context inference for air-quality recordings
//!
//! Every measurement recorded by a portable air-quality sensor is labelled with
//! what the user was doing at the time. The engine derives that label on device
//! from two sensor streams through a small pipeline:
//! GPS fixes → speed estimate, accelerometer magnitudes → walking signature,
//! then one rule pass per sampling tick → `AutomaticContext` + `DataQuality`.
//!
//! ## Modules
//!
//! - **Estimators**: `speed` (haversine + EMA), `walking` (step cadence with hysteresis)
//! - **Resolution**: `resolver` (rule table), `quality` (good/partial/poor tier)
//! - **Orchestration**: `engine` (per-session facade), `session` (tick scheduling)
//! - **Tooling**: `replay` (recorded traces), `ffi` (C ABI for mobile hosts)

pub mod config;
pub mod engine;
pub mod error;
pub mod quality;
pub mod replay;
pub mod resolver;
pub mod session;
pub mod speed;
pub mod types;
pub mod walking;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{EngineConfig, RecordingCadence, ResolverConfig, SpeedConfig, WalkingConfig};
pub use engine::{ContextEngine, EngineSnapshot};
pub use error::EngineError;
pub use quality::DataQualityClassifier;
pub use resolver::{ContextRuleResolver, ResolverInput};
pub use session::RecordingSession;
pub use speed::GeoSpeedEstimator;
pub use types::{
    AccelSample, AutomaticContext, ContextSample, DataQuality, GpsFix, GpsQuality, SpeedEstimate,
    WalkingState,
};
pub use walking::WalkingSignatureDetector;

/// Engine version
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded alongside context output
pub const PRODUCER_NAME: &str = "airsense-context";
