// JNI bindings for the Android camera activity
//
// The Kotlin side owns an opaque `long` handle to a reference-counted monitor.
// Every entry point tolerates a zero handle and reports it instead of crashing.

use std::sync::Arc;
use std::time::Duration;

use jni::objects::{JByteArray, JClass, JString};
use jni::sys::{jdouble, jint, jlong, jstring};
use jni::JNIEnv;
use log::{error, info, warn};

use crate::api::{self, BreathingMonitor, IngestOutcome, PixelFormat};
use crate::error::ErrorCode;
use crate::telemetry::{self, LifecyclePhase};

/// Returned when the handle is zero or arguments cannot be read
const JNI_INVALID_ARGUMENT: jint = -1;

fn monitor_from_handle<'a>(handle: jlong) -> Option<&'a BreathingMonitor> {
    if handle == 0 {
        warn!("[JNI] Call with null monitor handle");
        return None;
    }
    // SAFETY: non-zero handles come from `Arc::into_raw` in nativeCreate and
    // stay valid until nativeDestroy.
    Some(unsafe { &*(handle as *const BreathingMonitor) })
}

fn pixel_format(code: jint) -> Option<PixelFormat> {
    match code {
        0 => Some(PixelFormat::Gray8),
        1 => Some(PixelFormat::Rgb8),
        2 => Some(PixelFormat::Rgba8),
        3 => Some(PixelFormat::Yuv420),
        _ => None,
    }
}

#[no_mangle]
pub extern "system" fn Java_com_breathingrate_BreathingRateNative_nativeCreate(
    _env: JNIEnv,
    _class: JClass,
) -> jlong {
    crate::init_logging();
    let monitor = Arc::new(BreathingMonitor::new());
    crate::http::spawn_if_enabled(Arc::clone(&monitor));
    info!("[JNI] Monitor created");
    Arc::into_raw(monitor) as jlong
}

#[no_mangle]
pub extern "system" fn Java_com_breathingrate_BreathingRateNative_nativeStart(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    config_json: JString,
) -> jint {
    let Some(monitor) = monitor_from_handle(handle) else {
        return JNI_INVALID_ARGUMENT;
    };
    let json: String = if config_json.is_null() {
        String::new()
    } else {
        match env.get_string(&config_json) {
            Ok(value) => value.into(),
            Err(err) => {
                error!("[JNI] Failed to read config string: {err}");
                return JNI_INVALID_ARGUMENT;
            }
        }
    };

    match api::start_with_json(monitor, &json) {
        Ok(()) => 0,
        Err(err) => {
            crate::error::log_session_error(&err, "nativeStart");
            err.code()
        }
    }
}

/// Returns 0 when queued, 1 while warming up, 2 when dropped, or a frame error code.
#[no_mangle]
pub extern "system" fn Java_com_breathingrate_BreathingRateNative_nativeIngest(
    env: JNIEnv,
    _class: JClass,
    handle: jlong,
    data: JByteArray,
    width: jint,
    height: jint,
    format: jint,
    timestamp_nanos: jlong,
) -> jint {
    let Some(monitor) = monitor_from_handle(handle) else {
        return JNI_INVALID_ARGUMENT;
    };
    let Some(format) = pixel_format(format) else {
        warn!("[JNI] Unknown pixel format code {format}");
        return JNI_INVALID_ARGUMENT;
    };
    if width < 0 || height < 0 {
        return JNI_INVALID_ARGUMENT;
    }
    let bytes = match env.convert_byte_array(&data) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("[JNI] Failed to read frame bytes: {err}");
            return JNI_INVALID_ARGUMENT;
        }
    };
    let timestamp = u64::try_from(timestamp_nanos).ok().map(Duration::from_nanos);

    match monitor.ingest(&bytes, width as u32, height as u32, format, timestamp) {
        Ok(IngestOutcome::Queued(_)) => 0,
        Ok(IngestOutcome::WarmingUp { .. }) => 1,
        Ok(IngestOutcome::Dropped(_)) => 2,
        Err(err) => err.code(),
    }
}

#[no_mangle]
pub extern "system" fn Java_com_breathingrate_BreathingRateNative_nativeGetRate(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jdouble {
    monitor_from_handle(handle)
        .map(|monitor| monitor.get_current_rate().rate_bpm)
        .unwrap_or(0.0)
}

/// Status code: 0 no data, 1 low confidence, 2 valid.
#[no_mangle]
pub extern "system" fn Java_com_breathingrate_BreathingRateNative_nativeGetStatus(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jint {
    monitor_from_handle(handle)
        .map(|monitor| monitor.get_current_rate().status as jint)
        .unwrap_or(0)
}

#[no_mangle]
pub extern "system" fn Java_com_breathingrate_BreathingRateNative_nativeGetEstimateJson(
    env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    let json = monitor_from_handle(handle)
        .map(api::estimate_json)
        .unwrap_or_else(|| "{}".to_string());
    match env.new_string(json) {
        Ok(value) => value.into_raw(),
        Err(err) => {
            error!("[JNI] Failed to allocate estimate string: {err}");
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_breathingrate_BreathingRateNative_nativeReset(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if let Some(monitor) = monitor_from_handle(handle) {
        monitor.reset();
    }
}

#[no_mangle]
pub extern "system" fn Java_com_breathingrate_BreathingRateNative_nativeStop(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jint {
    let Some(monitor) = monitor_from_handle(handle) else {
        return JNI_INVALID_ARGUMENT;
    };
    match monitor.stop() {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}

#[no_mangle]
pub extern "system" fn Java_com_breathingrate_BreathingRateNative_nativeDestroy(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if handle == 0 {
        return;
    }
    // SAFETY: the handle was produced by nativeCreate and Kotlin clears it
    // after this call, so the pointer is reclaimed exactly once.
    let monitor = unsafe { Arc::from_raw(handle as *const BreathingMonitor) };
    if monitor.is_running() {
        let _ = monitor.stop();
    }
    drop(monitor);
    telemetry::hub().record_lifecycle(LifecyclePhase::LibraryUnloaded);
    info!("[JNI] Monitor destroyed");
}
