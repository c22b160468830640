//! BreathingMonitor: owned session object for the breathing-rate pipeline.
//!
//! Wires the frame ingestor, the pipeline threads, the estimator state and
//! the broadcast channels together, and exposes them to the JNI, HTTP and
//! CLI entry points.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::analysis::{EstimationGate, PipelineCounters, PipelineStats};
use crate::capture::{Frame, FrameIngestor, IngestOutcome, PixelFormat};
use crate::config::MonitorConfig;
use crate::engine::clock::{SystemTimeSource, TimeSource};
use crate::error::{log_frame_error, log_session_error, ErrorCode, FrameError, SessionError};
use crate::managers::{BroadcastChannelManager, SessionManager, SessionStartContext};
use crate::state::{CurrentRate, EstimatorState, RateEstimate};
use crate::telemetry::{self, DropReason, LifecyclePhase};

#[path = "core_subscriptions.rs"]
mod core_subscriptions;

/// Point-in-time view of the monitor for diagnostics surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStats {
    pub running: bool,
    pub generation: u64,
    pub uptime_ms: u64,
    pub buffered_samples: usize,
    pub buffer_span_seconds: f64,
    pub estimate_subscribers: usize,
    #[serde(flatten)]
    pub pipeline: PipelineStats,
}

/// Streaming respiratory-rate monitor
///
/// Frames go in through [`ingest`](Self::ingest) on the camera's callback
/// context; the current rate comes out of
/// [`get_current_rate`](Self::get_current_rate) from any thread without
/// blocking.
pub struct BreathingMonitor {
    config: RwLock<MonitorConfig>,
    state: Arc<EstimatorState>,
    gate: Arc<EstimationGate>,
    counters: Arc<PipelineCounters>,
    pub(crate) broadcasts: BroadcastChannelManager,
    session: SessionManager,
    ingestor: Mutex<Option<FrameIngestor>>,
    /// Serializes start/stop/reset
    lifecycle: Mutex<()>,
    time_source: Arc<dyn TimeSource>,
    start_instant: Instant,
}

impl BreathingMonitor {
    /// Create an idle monitor stamping untimed frames with the system clock.
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(SystemTimeSource::default()))
    }

    pub fn with_time_source(time_source: Arc<dyn TimeSource>) -> Self {
        let broadcasts = BroadcastChannelManager::new();
        broadcasts.init_estimates();
        let start_instant = time_source.now();

        Self {
            config: RwLock::new(MonitorConfig::default()),
            state: Arc::new(EstimatorState::new()),
            gate: Arc::new(EstimationGate::new()),
            counters: Arc::new(PipelineCounters::default()),
            broadcasts,
            session: SessionManager::new(),
            ingestor: Mutex::new(None),
            lifecycle: Mutex::new(()),
            time_source,
            start_instant,
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Validate `config` and start the pipeline threads.
    ///
    /// Restarting after `stop()` begins a fresh generation: the estimate
    /// returns to `NoData` and the buffer starts empty.
    pub fn start(&self, config: MonitorConfig) -> Result<(), SessionError> {
        let _lifecycle = lock(&self.lifecycle);

        config.validate().map_err(|err| {
            log_session_error(&err, "start");
            err
        })?;
        if self.session.is_running() {
            let err = SessionError::AlreadyRunning;
            log_session_error(&err, "start");
            return Err(err);
        }

        let generation = self.state.reset();
        let producer = self.session.start(
            &config,
            SessionStartContext {
                state: Arc::clone(&self.state),
                gate: Arc::clone(&self.gate),
                counters: Arc::clone(&self.counters),
                estimate_tx: self.broadcasts.estimates_sender(),
                generation,
            },
        )?;

        let ingestor = FrameIngestor::new(
            &config.ingest,
            producer,
            Arc::clone(&self.time_source),
            self.time_source.now(),
            generation,
        );
        *lock(&self.ingestor) = Some(ingestor);

        tracing::info!(
            "[BreathingMonitor] Started (generation {}, band {:.2}-{:.2} Hz, window {:.0}s)",
            generation,
            config.estimator.min_breathing_hz,
            config.estimator.max_breathing_hz,
            config.signal.retention_window_seconds
        );
        *self.config.write().unwrap_or_else(|err| err.into_inner()) = config;
        telemetry::hub().record_lifecycle(LifecyclePhase::SessionStarted);
        Ok(())
    }

    /// Stop the pipeline threads; the last estimate stays readable.
    pub fn stop(&self) -> Result<(), SessionError> {
        let _lifecycle = lock(&self.lifecycle);

        if !self.session.is_running() {
            let err = SessionError::NotRunning;
            log_session_error(&err, "stop");
            return Err(err);
        }

        // New frames are refused from here on; queued ones still drain
        lock(&self.ingestor).take();
        self.session.stop()?;

        tracing::info!("[BreathingMonitor] Stopped");
        telemetry::hub().record_lifecycle(LifecyclePhase::SessionStopped);
        Ok(())
    }

    /// Clear the signal history and the current estimate.
    ///
    /// Safe at any time; an estimation already in flight finishes but its
    /// result is discarded.
    pub fn reset(&self) {
        let _lifecycle = lock(&self.lifecycle);

        let generation = self.state.reset();
        if let Some(context) = self.session.context() {
            context.buffer.reset_to_generation(generation);
        }
        let _ = self.broadcasts.estimates_sender().send(self.state.read());

        tracing::info!("[BreathingMonitor] Reset to generation {}", generation);
        telemetry::hub().record_lifecycle(LifecyclePhase::SessionReset);
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    // ========================================================================
    // INGEST
    // ========================================================================

    /// Ingest one raw frame.
    pub fn ingest(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp: Option<Duration>,
    ) -> Result<IngestOutcome, FrameError> {
        let mut frame = Frame::new(data, width, height, format);
        frame.timestamp = timestamp;
        self.ingest_frame(&frame)
    }

    /// Ingest one borrowed frame.
    ///
    /// Never blocks: a concurrent second caller gets
    /// `Dropped(IngestorBusy)` instead of waiting for the first.
    pub fn ingest_frame(&self, frame: &Frame<'_>) -> Result<IngestOutcome, FrameError> {
        PipelineCounters::incr(&self.counters.frames_received);

        let mut slot = match self.ingestor.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Ok(self.record_drop(DropReason::IngestorBusy));
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let result = match slot.as_mut() {
            Some(ingestor) => ingestor.ingest(frame, self.state.generation()),
            None => Err(FrameError::NotRunning),
        };
        drop(slot);

        match result {
            Ok(IngestOutcome::Queued(sample)) => {
                PipelineCounters::incr(&self.counters.samples_queued);
                Ok(IngestOutcome::Queued(sample))
            }
            Ok(IngestOutcome::WarmingUp { remaining }) => {
                PipelineCounters::incr(&self.counters.frames_warming_up);
                Ok(IngestOutcome::WarmingUp { remaining })
            }
            Ok(IngestOutcome::Dropped(reason)) => Ok(self.record_drop(reason)),
            Err(err) => {
                log_frame_error(&err, "BreathingMonitor::ingest");
                PipelineCounters::incr(&self.counters.frames_rejected);
                telemetry::hub().record_frame_rejected(err.code());
                Err(err)
            }
        }
    }

    fn record_drop(&self, reason: DropReason) -> IngestOutcome {
        PipelineCounters::incr(&self.counters.samples_dropped);
        telemetry::hub().record_sample_dropped(reason);
        IngestOutcome::Dropped(reason)
    }

    // ========================================================================
    // READERS
    // ========================================================================

    /// Current rate and status; never blocks.
    pub fn get_current_rate(&self) -> CurrentRate {
        self.state.current_rate()
    }

    /// Current estimate with diagnostics.
    pub fn latest_estimate(&self) -> RateEstimate {
        self.state.read()
    }

    /// Run one estimation on the calling thread.
    ///
    /// Returns `None` if another estimation is in flight, a reset retired
    /// the result, or no session was ever started.
    pub fn estimate_now(&self) -> Option<RateEstimate> {
        self.session.context()?.estimate_now()
    }

    pub fn config_snapshot(&self) -> MonitorConfig {
        self.config
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    pub fn uptime_ms(&self) -> u64 {
        self.time_source
            .now()
            .saturating_duration_since(self.start_instant)
            .as_millis() as u64
    }

    pub fn stats(&self) -> MonitorStats {
        let (buffered_samples, buffer_span_seconds) = self
            .session
            .context()
            .map(|ctx| (ctx.buffer.len(), ctx.buffer.span_seconds()))
            .unwrap_or((0, 0.0));

        MonitorStats {
            running: self.is_running(),
            generation: self.state.generation(),
            uptime_ms: self.uptime_ms(),
            buffered_samples,
            buffer_span_seconds,
            estimate_subscribers: self.broadcasts.estimate_subscribers(),
            pipeline: self.counters.snapshot(self.gate.skipped_count()),
        }
    }

    /// Buffered samples of the current generation, oldest first.
    pub fn signal_snapshot(&self) -> Vec<crate::signal::Sample> {
        self.session
            .context()
            .map(|ctx| ctx.buffer.snapshot())
            .unwrap_or_default()
    }
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|err| err.into_inner())
}

impl Drop for BreathingMonitor {
    fn drop(&mut self) {
        if self.session.is_running() {
            let _ = self.stop();
        }
    }
}

impl Default for BreathingMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// ========================================================================
// TEST HELPERS
// ========================================================================
