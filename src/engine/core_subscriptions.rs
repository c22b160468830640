use futures::{Stream, StreamExt};
use tokio::runtime::Builder;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};

use super::BreathingMonitor;
use crate::state::RateEstimate;
use crate::telemetry::{self, DiagnosticError, MetricEvent};

impl BreathingMonitor {
    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================

    /// Receiver for every stored estimate.
    ///
    /// Slow receivers lag and skip ahead rather than holding back the
    /// estimation thread.
    pub fn subscribe_estimates(&self) -> broadcast::Receiver<RateEstimate> {
        self.broadcasts.estimates_sender().subscribe()
    }

    /// Estimates forwarded into an unbounded channel by a helper thread.
    ///
    /// For callers without a tokio runtime of their own (JNI, CLI).
    pub fn subscribe_estimates_unbounded(&self) -> mpsc::UnboundedReceiver<RateEstimate> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut broadcast_rx = self.subscribe_estimates();

        let spawned = std::thread::Builder::new()
            .name("breath-estimate-forward".to_string())
            .spawn(move || {
                let rt = match Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(err) => {
                        tracing::error!("[BreathingMonitor] Failed to build forwarder runtime: {}", err);
                        return;
                    }
                };
                rt.block_on(async move {
                    loop {
                        match broadcast_rx.recv().await {
                            Ok(estimate) => {
                                if tx.send(estimate).is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::debug!(
                                    "[BreathingMonitor] Estimate forwarder lagged by {}",
                                    skipped
                                );
                                telemetry::hub().record_error(
                                    DiagnosticError::StreamBackpressure,
                                    format!("estimate forwarder skipped {skipped}"),
                                );
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                });
            });
        if let Err(err) = spawned {
            tracing::error!("[BreathingMonitor] Failed to spawn estimate forwarder: {}", err);
        }

        rx
    }

    /// Telemetry events from the global hub.
    pub fn telemetry_receiver(&self) -> broadcast::Receiver<MetricEvent> {
        telemetry::hub().collector().subscribe()
    }

    // ========================================================================
    // ASYNC STREAM ADAPTERS
    // ========================================================================

    /// Estimates as a `Stream`, skipping over any lag gaps.
    pub fn estimate_stream(&self) -> impl Stream<Item = RateEstimate> + Unpin {
        BroadcastStream::new(self.subscribe_estimates())
            .filter_map(|item| futures::future::ready(item.ok()))
    }

    pub fn estimate_stream_unbounded(&self) -> impl Stream<Item = RateEstimate> + Unpin {
        UnboundedReceiverStream::new(self.subscribe_estimates_unbounded())
    }

    pub fn telemetry_stream(&self) -> impl Stream<Item = MetricEvent> + Unpin {
        BroadcastStream::new(self.telemetry_receiver())
            .filter_map(|item| futures::future::ready(item.ok()))
    }
}
