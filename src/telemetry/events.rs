//! Core telemetry event types describing diagnostics data exposed to
//! CLI/HTTP surfaces and estimate subscribers.

use serde::{Deserialize, Serialize};

use crate::state::RateStatus;

/// High-level lifecycle stages reported by monitor/JNI instrumentation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    LibraryLoaded,
    SessionStarted,
    SessionStopped,
    SessionReset,
    LibraryUnloaded,
}

/// Diagnostic error codes surfaced via telemetry metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticError {
    ConfigLoad,
    WorkerPanic,
    StreamBackpressure,
}

/// Why a reduced sample never reached the signal buffer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Sample queue was full
    QueueFull,
    /// Another caller held the ingestor
    IngestorBusy,
    /// Sample belonged to a generation that was reset
    StaleGeneration,
    /// Signal buffer refused a non-increasing or non-finite sample
    OutOfOrder,
}

/// Rich metric events covering estimates, frame handling, and lifecycle details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    Estimate {
        rate_bpm: f64,
        status: RateStatus,
        peak_ratio: f64,
        sample_count: usize,
    },
    EstimationLatency {
        avg_ms: f32,
        max_ms: f32,
        sample_count: usize,
    },
    EstimationSkipped {
        total_skipped: u64,
    },
    FrameRejected {
        code: i32,
    },
    SampleDropped {
        reason: DropReason,
    },
    QueueOccupancy {
        percent: f32,
    },
    Lifecycle {
        phase: LifecyclePhase,
        timestamp_ms: u64,
    },
    Error {
        code: DiagnosticError,
        context: String,
    },
}
