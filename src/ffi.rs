//! FFI bindings for the context engine
//!
//! This module provides C-compatible functions so that mobile hosts can own one
//! engine per recording session. Strings returned by these functions are
//! allocated by Rust and must be freed by the caller using `airsense_free_string`.
//!
//! An engine handle is not thread-safe: the host must deliver sensor callbacks
//! and sampling ticks for one handle from a single thread (or serialize them).

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::{EngineConfig, RecordingCadence, DEFAULT_CADENCE};
use crate::engine::ContextEngine;
use crate::error::EngineError;
use crate::types::{AccelSample, AutomaticContext, GpsFix};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Convert an optional C string; NULL maps to `None`, invalid UTF-8 to `Err`
unsafe fn optional_cstr(ptr: *const c_char) -> Result<Option<String>, ()> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(|s| Some(s.to_string()))
        .map_err(|_| ())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn build_engine(
    config_json: Option<String>,
    cadence: Option<String>,
) -> Result<ContextEngine, EngineError> {
    let config = match config_json {
        Some(json) if !json.trim().is_empty() => EngineConfig::from_json(&json)?,
        _ => EngineConfig::default(),
    };
    let cadence = RecordingCadence::parse(cadence.as_deref().unwrap_or(DEFAULT_CADENCE))?;
    ContextEngine::try_new(config, cadence)
}

// ============================================================================
// Engine lifecycle
// ============================================================================

/// Opaque handle to a ContextEngine
pub struct AirsenseEngineHandle {
    engine: ContextEngine,
}

/// Create an engine for one recording session.
///
/// # Safety
/// - `config_json` may be NULL (defaults) or a null-terminated JSON string.
/// - `cadence` may be NULL (`"10s"`) or a null-terminated string such as `"1m"`.
/// - Must be freed with `airsense_engine_free`.
/// - Returns NULL on error; call `airsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn airsense_engine_new(
    config_json: *const c_char,
    cadence: *const c_char,
) -> *mut AirsenseEngineHandle {
    clear_last_error();

    let Ok(config_json) = optional_cstr(config_json) else {
        set_last_error("Invalid config string pointer");
        return ptr::null_mut();
    };
    let Ok(cadence) = optional_cstr(cadence) else {
        set_last_error("Invalid cadence string pointer");
        return ptr::null_mut();
    };

    match build_engine(config_json, cadence) {
        Ok(engine) => Box::into_raw(Box::new(AirsenseEngineHandle { engine })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a pointer returned by `airsense_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn airsense_engine_free(engine: *mut AirsenseEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Reset the engine to its initial state (new recording session).
///
/// # Safety
/// - `engine` must be a valid pointer returned by `airsense_engine_new`.
#[no_mangle]
pub unsafe extern "C" fn airsense_engine_reset(engine: *mut AirsenseEngineHandle) -> i32 {
    clear_last_error();
    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    (*engine).engine.reset();
    0
}

// ============================================================================
// Sensor input
// ============================================================================

/// Feed one GPS fix. Pass NaN as `accuracy_m` when the provider reports none.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `airsense_engine_new`.
/// - Returns the smoothed speed in km/h, or -1.0 on a NULL handle.
#[no_mangle]
pub unsafe extern "C" fn airsense_engine_on_gps_fix(
    engine: *mut AirsenseEngineHandle,
    lat: f64,
    lon: f64,
    accuracy_m: f64,
    timestamp_ms: i64,
) -> f64 {
    clear_last_error();
    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1.0;
    }
    let accuracy = if accuracy_m.is_nan() {
        None
    } else {
        Some(accuracy_m)
    };
    let fix = GpsFix::new(lat, lon, accuracy, timestamp_ms);
    (*engine).engine.on_gps_fix(&fix).speed_kmh
}

/// Feed one accelerometer sample.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `airsense_engine_new`.
/// - Returns 1 when walking is currently detected, 0 when not, -1 on a NULL handle.
#[no_mangle]
pub unsafe extern "C" fn airsense_engine_on_accel_sample(
    engine: *mut AirsenseEngineHandle,
    magnitude: f64,
    timestamp_ms: i64,
) -> i32 {
    clear_last_error();
    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    let sample = AccelSample::new(magnitude, timestamp_ms);
    i32::from((*engine).engine.on_accel_sample(&sample).active)
}

// ============================================================================
// Sampling
// ============================================================================

/// Resolve the context for the sampling tick at `now_ms`.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `airsense_engine_new`.
/// - Returns a JSON object `{"timestamp_ms", "context", "quality"}` that must be
///   freed with `airsense_free_string`.
/// - Returns NULL on error; call `airsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn airsense_engine_sample_context(
    engine: *mut AirsenseEngineHandle,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();
    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let sample = (*engine).engine.sample_context(now_ms);
    match serde_json::to_string(&sample) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Label resolved at the last tick, for measurements recorded between ticks.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `airsense_engine_new`.
/// - Returns a pointer to a static string. Do NOT free. NULL on a NULL handle.
#[no_mangle]
pub unsafe extern "C" fn airsense_engine_current_context(
    engine: *const AirsenseEngineHandle,
) -> *const c_char {
    clear_last_error();
    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null();
    }
    let label: &'static [u8] = match (*engine).engine.current_context() {
        AutomaticContext::Stationary => b"stationary\0",
        AutomaticContext::Walking => b"walking\0",
        AutomaticContext::Driving => b"driving\0",
        AutomaticContext::RedLight => b"redLight\0",
        AutomaticContext::Unknown => b"unknown\0",
    };
    label.as_ptr() as *const c_char
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by this library.
///
/// # Safety
/// - `ptr` must be a pointer returned by an `airsense_*` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn airsense_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next `airsense_*` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn airsense_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn airsense_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffi_engine_lifecycle() {
        unsafe {
            let cadence = CString::new("10s").unwrap();
            let engine = airsense_engine_new(ptr::null(), cadence.as_ptr());
            assert!(!engine.is_null());

            // 36 km/h northwards, one fix per second
            for i in 0..12 {
                let lat = 50.0 + (i as f64 * 10.0) / 111_195.0;
                let speed = airsense_engine_on_gps_fix(engine, lat, 7.0, 5.0, i * 1_000);
                assert!(speed >= 0.0);
            }
            assert_eq!(airsense_engine_on_accel_sample(engine, 0.2, 11_000), 0);

            let json = airsense_engine_sample_context(engine, 12_000);
            assert!(!json.is_null());
            let value: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(json).to_str().unwrap()).unwrap();
            assert_eq!(value["context"], "driving");
            assert_eq!(value["quality"], "partial");
            assert_eq!(value["timestamp_ms"], 12_000);
            airsense_free_string(json);

            let label = CStr::from_ptr(airsense_engine_current_context(engine));
            assert_eq!(label.to_str().unwrap(), "driving");

            assert_eq!(airsense_engine_reset(engine), 0);
            let label = CStr::from_ptr(airsense_engine_current_context(engine));
            assert_eq!(label.to_str().unwrap(), "stationary");

            airsense_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_missing_accuracy() {
        unsafe {
            let engine = airsense_engine_new(ptr::null(), ptr::null());
            assert!(!engine.is_null());
            let speed = airsense_engine_on_gps_fix(engine, 50.0, 7.0, f64::NAN, 0);
            assert_eq!(speed, 0.0);
            airsense_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let bad_cadence = CString::new("soon").unwrap();
            let engine = airsense_engine_new(ptr::null(), bad_cadence.as_ptr());
            assert!(engine.is_null());

            let error = airsense_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.contains("cadence"));

            let bad_config = CString::new("{\"speed\": {\"ema_alpha\": 2.0}}").unwrap();
            let engine = airsense_engine_new(bad_config.as_ptr(), ptr::null());
            assert!(engine.is_null());
            assert!(!airsense_last_error().is_null());

            let json = airsense_engine_sample_context(ptr::null_mut(), 0);
            assert!(json.is_null());
            assert_eq!(airsense_engine_reset(ptr::null_mut()), -1);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = airsense_version();
            assert!(!version.is_null());
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
