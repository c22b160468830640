//! Diagnostics telemetry for the breathing pipeline.
//!
//! Every pipeline stage reports into one process-wide [`TelemetryHub`]. The
//! hub keeps a bounded history for HTTP/CLI snapshots and rebroadcasts each
//! event to async subscribers. Estimation latency is summarized over a
//! rolling window and the sample-queue gauge is debounced so a steady queue
//! does not flood the history.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::state::RateEstimate;

pub mod events;

pub use events::{DiagnosticError, DropReason, LifecyclePhase, MetricEvent};

/// Queue gauge changes smaller than this (percentage points) are not reported
const QUEUE_GAUGE_STEP: f32 = 2.5;

static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Point-in-time view of the retained history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    /// Events pushed out of the history by newer ones
    pub evicted_events: u64,
    pub estimation_latency: LatencySummary,
}

/// Rolling estimation latency
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub avg_ms: f32,
    pub max_ms: f32,
    pub window: usize,
}

/// Bounded event history fanned out over a broadcast channel.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    capacity: usize,
    total: AtomicU64,
    evicted: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(channel_capacity: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            capacity: history_capacity.max(1),
            total: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total.fetch_add(1, Ordering::Relaxed);

        let mut history = relock(&self.history);
        while history.len() >= self.capacity {
            history.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        history.push_back(event.clone());
        drop(history);

        // No subscribers is the common case
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    fn recent(&self) -> Vec<MetricEvent> {
        relock(&self.history).iter().cloned().collect()
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

struct LatencyWindow {
    samples: VecDeque<f32>,
    len: usize,
}

impl LatencyWindow {
    fn new(len: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(len),
            len: len.max(1),
        }
    }

    fn push(&mut self, elapsed_ms: f32) -> LatencySummary {
        if self.samples.len() == self.len {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed_ms.max(0.0));
        self.summary()
    }

    fn summary(&self) -> LatencySummary {
        let window = self.samples.len();
        if window == 0 {
            return LatencySummary::default();
        }
        let (sum, max) = self
            .samples
            .iter()
            .fold((0.0_f32, 0.0_f32), |(sum, max), &ms| (sum + ms, max.max(ms)));
        LatencySummary {
            avg_ms: sum / window as f32,
            max_ms: max,
            window,
        }
    }
}

/// Process-wide telemetry entry point.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    latency: Mutex<LatencyWindow>,
    queue_gauge: Mutex<Option<f32>>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, latency_window: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            latency: Mutex::new(LatencyWindow::new(latency_window)),
            queue_gauge: Mutex::new(None),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            recent: self.collector.recent(),
            total_events: self.collector.total.load(Ordering::Relaxed),
            evicted_events: self.collector.evicted.load(Ordering::Relaxed),
            estimation_latency: relock(&self.latency).summary(),
        }
    }

    /// Publish a stored estimate and fold `elapsed_ms` into the latency window
    pub fn record_estimate(&self, estimate: &RateEstimate, elapsed_ms: f32) {
        self.collector.publish(MetricEvent::Estimate {
            rate_bpm: estimate.rate_bpm,
            status: estimate.status,
            peak_ratio: estimate.peak_ratio,
            sample_count: estimate.sample_count,
        });

        let summary = relock(&self.latency).push(elapsed_ms);
        self.collector.publish(MetricEvent::EstimationLatency {
            avg_ms: summary.avg_ms,
            max_ms: summary.max_ms,
            sample_count: summary.window,
        });
    }

    pub fn record_estimation_skipped(&self, total_skipped: u64) {
        self.collector
            .publish(MetricEvent::EstimationSkipped { total_skipped });
    }

    pub fn record_frame_rejected(&self, code: i32) {
        self.collector.publish(MetricEvent::FrameRejected { code });
    }

    pub fn record_sample_dropped(&self, reason: DropReason) {
        self.collector.publish(MetricEvent::SampleDropped { reason });
    }

    /// Sample-queue fill level, reported only when it moved by a full step
    pub fn record_queue_occupancy(&self, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        let mut last = relock(&self.queue_gauge);
        if matches!(*last, Some(prev) if (prev - percent).abs() < QUEUE_GAUGE_STEP) {
            return;
        }
        *last = Some(percent);
        drop(last);
        self.collector
            .publish(MetricEvent::QueueOccupancy { percent });
    }

    pub fn record_lifecycle(&self, phase: LifecyclePhase) {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.collector
            .publish(MetricEvent::Lifecycle { phase, timestamp_ms });
    }

    pub fn record_error(&self, code: DiagnosticError, context: impl Into<String>) {
        let context = context.into();
        log::warn!("[Telemetry] {:?}: {}", code, context);
        self.collector.publish(MetricEvent::Error { code, context });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}
