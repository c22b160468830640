// SessionManager: Focused manager for pipeline thread lifecycle
//
// Single Responsibility: spawn and join the ingest and estimation threads
// Extracted from BreathingMonitor so the monitor only wires state together

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use rtrb::Producer;
use tokio::sync::broadcast;

use crate::analysis::{
    spawn_estimation_thread, spawn_ingest_thread, EstimationContext, EstimationGate,
    IngestWorkerConfig, PipelineCounters, RateEstimator,
};
use crate::capture::{QueuedSample, SampleQueue, SampleQueueChannels};
use crate::config::MonitorConfig;
use crate::error::{log_session_error, SessionError};
use crate::signal::SignalBuffer;
use crate::state::{EstimatorState, RateEstimate};
use crate::telemetry::{self, DiagnosticError};

/// Shared pieces a session is built around
pub struct SessionStartContext {
    pub state: Arc<EstimatorState>,
    pub gate: Arc<EstimationGate>,
    pub counters: Arc<PipelineCounters>,
    pub estimate_tx: broadcast::Sender<RateEstimate>,
    pub generation: u64,
}

/// Running pipeline threads and their shutdown flag
struct ActiveSession {
    running: Arc<AtomicBool>,
    ingest_thread: JoinHandle<()>,
    estimation_thread: JoinHandle<()>,
}

/// Manages the pipeline threads of one monitor
///
/// The estimation context of the most recent session outlives `stop()` so
/// the last buffer can still be estimated and reset.
pub struct SessionManager {
    session: Mutex<Option<ActiveSession>>,
    context: Mutex<Option<Arc<EstimationContext>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(None),
            context: Mutex::new(None),
        }
    }

    /// Spawn the pipeline threads for a validated `config`
    ///
    /// # Returns
    /// * `Ok(Producer)` - Sample queue producer for the frame ingestor
    /// * `Err(SessionError)` - Already running, or a thread could not be spawned
    pub fn start(
        &self,
        config: &MonitorConfig,
        ctx: SessionStartContext,
    ) -> Result<Producer<QueuedSample>, SessionError> {
        let mut guard = lock(&self.session);
        check_not_running(&guard)?;

        let buffer = Arc::new(SignalBuffer::new(config.signal.retention_window_seconds));
        buffer.reset_to_generation(ctx.generation);

        let context = Arc::new(EstimationContext {
            buffer,
            estimator: RateEstimator::new(config.estimator.clone()),
            state: ctx.state,
            gate: ctx.gate,
            estimate_tx: ctx.estimate_tx,
            counters: ctx.counters,
        });

        let SampleQueueChannels { producer, consumer } =
            SampleQueue::new(config.ingest.queue_capacity);
        let running = Arc::new(AtomicBool::new(true));
        let (jobs_tx, jobs_rx) = mpsc::sync_channel(1);

        let estimation_thread = spawn_estimation_thread(Arc::clone(&context), jobs_rx)
            .map_err(|err| spawn_failed(err, "estimation"))?;

        let worker_config = IngestWorkerConfig {
            consumer,
            queue_capacity: config.ingest.queue_capacity,
            interval: config.schedule.estimation_interval,
            idle_poll: Duration::from_millis(config.schedule.idle_poll_ms),
            running: Arc::clone(&running),
            jobs: jobs_tx,
        };
        // On failure the job sender is dropped with the config, which ends
        // the estimation thread
        let ingest_thread = match spawn_ingest_thread(worker_config, &context) {
            Ok(handle) => handle,
            Err(err) => {
                join_worker(estimation_thread, "estimation");
                return Err(spawn_failed(err, "ingest"));
            }
        };

        *lock(&self.context) = Some(context);
        *guard = Some(ActiveSession {
            running,
            ingest_thread,
            estimation_thread,
        });
        Ok(producer)
    }

    /// Signal shutdown and join both threads
    ///
    /// The ingest worker drains whatever is still queued before exiting.
    pub fn stop(&self) -> Result<(), SessionError> {
        let session = lock(&self.session).take().ok_or_else(|| {
            let err = SessionError::NotRunning;
            log_session_error(&err, "stop");
            err
        })?;

        session.running.store(false, Ordering::SeqCst);
        join_worker(session.ingest_thread, "ingest");
        join_worker(session.estimation_thread, "estimation");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.session).is_some()
    }

    /// Estimation context of the current or most recent session
    pub fn context(&self) -> Option<Arc<EstimationContext>> {
        lock(&self.context).clone()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

// ========================================================================
// PRIVATE HELPERS
// ========================================================================

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|err| err.into_inner())
}

fn check_not_running(guard: &Option<ActiveSession>) -> Result<(), SessionError> {
    if guard.is_some() {
        let err = SessionError::AlreadyRunning;
        log_session_error(&err, "check_not_running");
        return Err(err);
    }
    Ok(())
}

fn spawn_failed(err: std::io::Error, worker: &str) -> SessionError {
    let err = SessionError::from(err);
    log_session_error(&err, &format!("spawn_{}_thread", worker));
    err
}

fn join_worker(handle: JoinHandle<()>, worker: &str) {
    if handle.join().is_err() {
        tracing::error!("[SessionManager] {} thread panicked", worker);
        telemetry::hub().record_error(
            DiagnosticError::WorkerPanic,
            format!("{} thread panicked", worker),
        );
    }
}
