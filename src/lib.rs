// Breathing Rate Core - camera respiratory-rate estimator
// Frame reduction, lock-free sample handoff and spectral rate estimation

// Module declarations
pub mod analysis;
pub mod api;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod fixtures;
pub mod http;
pub mod managers;
pub mod signal;
pub mod state;
pub mod telemetry;

#[cfg(target_os = "android")]
mod android;

// Re-exports for convenience
pub use api::*;

use std::sync::Once;

static LOGGING: Once = Once::new();

/// Install the platform log subscriber. Safe to call more than once.
pub fn init_logging() {
    LOGGING.call_once(|| {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "android")] {
                use tracing_subscriber::layer::SubscriberExt;
                use tracing_subscriber::util::SubscriberInitExt;

                match tracing_android::layer("BreathingRate") {
                    Ok(layer) => {
                        let _ = tracing_subscriber::registry().with(layer).try_init();
                    }
                    Err(err) => eprintln!("[Logging] android layer unavailable: {err}"),
                }
            } else {
                let _ = tracing_subscriber::fmt()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .try_init();
            }
        }
    });
}

/// JNI_OnLoad is called when the native library is loaded by Android
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    _vm: jni::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    init_logging();
    log::info!("[JNI] JNI_OnLoad called");
    telemetry::hub().record_lifecycle(telemetry::LifecyclePhase::LibraryLoaded);

    jni::sys::JNI_VERSION_1_6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }

    #[test]
    fn test_facade_reexports() {
        let monitor = BreathingMonitor::new();
        assert_eq!(monitor.get_current_rate().status, RateStatus::NoData);
        assert!(MonitorConfig::default().validate().is_ok());
    }
}
