//! Debug HTTP server surfaced only in debug feature builds.
//!
//! This module spawns a lightweight Axum server that exposes health, the
//! current rate, JSON stats, Prometheus metrics, an SSE estimate stream and a
//! reset control for diagnostics.

#[cfg(all(feature = "debug_http", debug_assertions))]
mod metrics;
#[cfg(all(feature = "debug_http", debug_assertions))]
mod routes;
#[cfg(all(feature = "debug_http", debug_assertions))]
mod sse;

use std::sync::Arc;

use crate::engine::core::BreathingMonitor;

#[cfg(all(feature = "debug_http", debug_assertions))]
use routes::{run_http_server, DebugHttpState};

#[cfg(all(feature = "debug_http", debug_assertions))]
use log::{error, info, warn};
#[cfg(all(feature = "debug_http", debug_assertions))]
use std::net::SocketAddr;
#[cfg(all(feature = "debug_http", debug_assertions))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(all(feature = "debug_http", debug_assertions))]
use std::thread;

#[cfg(all(feature = "debug_http", debug_assertions))]
static SERVER_STARTED: AtomicBool = AtomicBool::new(false);

/// Spawn the debug HTTP server only when the feature flag and debug builds are enabled.
#[cfg(all(feature = "debug_http", debug_assertions))]
pub fn spawn_if_enabled(monitor: Arc<BreathingMonitor>) {
    if SERVER_STARTED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        warn!("[DebugHttp] Server already running");
        return;
    }

    let addr: SocketAddr = std::env::var("BREATHING_DEBUG_HTTP_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8788".to_string())
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8788)));

    let token = std::env::var("BREATHING_DEBUG_TOKEN")
        .unwrap_or_else(|_| "breathing-debug".to_string());
    let preview = token.chars().take(4).collect::<String>();

    let spawned = thread::Builder::new()
        .name("breath-debug-http".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!("[DebugHttp] Failed to build tokio runtime: {}", err);
                    SERVER_STARTED.store(false, Ordering::SeqCst);
                    return;
                }
            };

            info!(
                "[DebugHttp] Binding {} (token prefix {}***)",
                addr, preview
            );

            runtime.block_on(async move {
                let state = DebugHttpState::new(monitor, token);
                if let Err(err) = run_http_server(state, addr).await {
                    error!("[DebugHttp] Server stopped: {:#}", err);
                }
            });
        });

    if let Err(err) = spawned {
        error!("[DebugHttp] Failed to spawn server thread: {}", err);
        SERVER_STARTED.store(false, Ordering::SeqCst);
    }
}

#[cfg(not(all(feature = "debug_http", debug_assertions)))]
pub fn spawn_if_enabled(_monitor: Arc<BreathingMonitor>) {}

#[cfg(all(test, not(all(feature = "debug_http", debug_assertions))))]
mod tests {
    use super::*;

    #[test]
    fn spawn_is_a_no_op_without_debug_http() {
        let monitor = Arc::new(BreathingMonitor::new());
        spawn_if_enabled(Arc::clone(&monitor));
        assert_eq!(Arc::strong_count(&monitor), 1);
    }
}
