// Analysis module - breathing-rate pipeline behind the frame callback
//
// Architecture:
// - IngestWorker: drains the sample queue into the SignalBuffer and decides
//   (via EstimationTrigger) when an estimation is due
// - Estimation thread: runs one RateEstimator pass per EstimationJob
// - EstimationGate: at most one estimation in flight; extra triggers are
//   skipped and counted, never queued
// - Output: RateEstimate stored in EstimatorState and sent on a tokio
//   broadcast channel

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rtrb::{Consumer, PopError};
use serde::{Deserialize, Serialize};

use crate::capture::sample_queue::{occupancy_percent, QueuedSample};
use crate::config::EstimationInterval;
use crate::signal::{AppendOutcome, SignalBuffer};
use crate::state::{EstimatorState, RateEstimate};
use crate::telemetry::{self, DropReason};

pub mod autocorr;
pub mod estimator;
pub mod gate;
pub mod peaks;
pub mod preprocess;
pub mod spectrum;

pub use estimator::RateEstimator;
pub use gate::{EstimationGate, EstimationTrigger, GatePermit};

// ============================================================================
// COUNTERS
// ============================================================================

/// Live counters shared by the frame callback and both pipeline threads
#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub frames_received: AtomicU64,
    pub frames_rejected: AtomicU64,
    pub frames_warming_up: AtomicU64,
    pub samples_queued: AtomicU64,
    pub samples_dropped: AtomicU64,
    pub samples_appended: AtomicU64,
    pub samples_out_of_order: AtomicU64,
    pub samples_stale: AtomicU64,
    pub estimations_completed: AtomicU64,
    pub estimates_discarded: AtomicU64,
}

/// Point-in-time copy of [`PipelineCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub frames_warming_up: u64,
    pub samples_queued: u64,
    /// Dropped at the queue (full, or ingestor busy)
    pub samples_dropped: u64,
    pub samples_appended: u64,
    pub samples_out_of_order: u64,
    /// Arrived tagged with a generation that a reset already retired
    pub samples_stale: u64,
    pub estimations_completed: u64,
    pub estimations_skipped: u64,
    /// Finished after a reset and thrown away
    pub estimates_discarded: u64,
}

impl PipelineCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, estimations_skipped: u64) -> PipelineStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            frames_received: load(&self.frames_received),
            frames_rejected: load(&self.frames_rejected),
            frames_warming_up: load(&self.frames_warming_up),
            samples_queued: load(&self.samples_queued),
            samples_dropped: load(&self.samples_dropped),
            samples_appended: load(&self.samples_appended),
            samples_out_of_order: load(&self.samples_out_of_order),
            samples_stale: load(&self.samples_stale),
            estimations_completed: load(&self.estimations_completed),
            estimations_skipped,
            estimates_discarded: load(&self.estimates_discarded),
        }
    }
}

// ============================================================================
// ESTIMATION
// ============================================================================

/// One scheduled estimation; holding the permit keeps the gate closed
#[derive(Debug)]
pub struct EstimationJob {
    pub permit: GatePermit,
    pub generation: u64,
}

/// Everything an estimation pass reads or writes
pub struct EstimationContext {
    pub buffer: Arc<SignalBuffer>,
    pub estimator: RateEstimator,
    pub state: Arc<EstimatorState>,
    pub gate: Arc<EstimationGate>,
    pub estimate_tx: tokio::sync::broadcast::Sender<RateEstimate>,
    pub counters: Arc<PipelineCounters>,
}

impl EstimationContext {
    /// Snapshot, estimate and publish for `job.generation`
    ///
    /// Returns `None` when a reset retired the job's generation before the
    /// result could be stored.
    pub fn run(&self, job: EstimationJob) -> Option<RateEstimate> {
        // Held until the estimate is published so broadcasts keep store order
        let EstimationJob {
            permit: _permit,
            generation,
        } = job;
        let started = Instant::now();

        let Some(samples) = self.buffer.snapshot_for_generation(generation) else {
            return self.discard(generation);
        };
        let now = samples.last().map(|s| s.timestamp).unwrap_or(0.0);
        let estimate = RateEstimate {
            generation,
            ..self.estimator.estimate(&samples, now)
        };
        let elapsed_ms = started.elapsed().as_secs_f32() * 1000.0;

        if !self.state.update_if_current(estimate, generation) {
            return self.discard(generation);
        }

        PipelineCounters::incr(&self.counters.estimations_completed);
        telemetry::hub().record_estimate(&estimate, elapsed_ms);
        let _ = self.estimate_tx.send(estimate);
        Some(estimate)
    }

    /// Estimate on the calling thread unless one is already in flight
    pub fn estimate_now(&self) -> Option<RateEstimate> {
        match self.gate.try_acquire() {
            Some(permit) => self.run(EstimationJob {
                permit,
                generation: self.state.generation(),
            }),
            None => {
                telemetry::hub().record_estimation_skipped(self.gate.skipped_count());
                None
            }
        }
    }

    fn discard(&self, generation: u64) -> Option<RateEstimate> {
        PipelineCounters::incr(&self.counters.estimates_discarded);
        tracing::debug!(
            "[EstimationThread] Discarded estimate for retired generation {}",
            generation
        );
        None
    }
}

/// Run estimation jobs until every job sender is gone
pub fn spawn_estimation_thread(
    context: Arc<EstimationContext>,
    jobs: Receiver<EstimationJob>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("breath-estimation".to_string())
        .spawn(move || {
            tracing::info!("[EstimationThread] Started");
            while let Ok(job) = jobs.recv() {
                context.run(job);
            }
            tracing::info!("[EstimationThread] Job channel closed, exiting");
        })
}

// ============================================================================
// INGEST WORKER
// ============================================================================

/// Inputs for [`spawn_ingest_thread`]
pub struct IngestWorkerConfig {
    pub consumer: Consumer<QueuedSample>,
    pub queue_capacity: usize,
    pub interval: EstimationInterval,
    pub idle_poll: Duration,
    pub running: Arc<AtomicBool>,
    pub jobs: SyncSender<EstimationJob>,
}

struct IngestWorker {
    consumer: Consumer<QueuedSample>,
    queue_capacity: usize,
    buffer: Arc<SignalBuffer>,
    state: Arc<EstimatorState>,
    gate: Arc<EstimationGate>,
    counters: Arc<PipelineCounters>,
    trigger: EstimationTrigger,
    trigger_generation: u64,
    jobs: SyncSender<EstimationJob>,
    running: Arc<AtomicBool>,
    idle_poll: Duration,
}

impl IngestWorker {
    fn new(config: IngestWorkerConfig, context: &EstimationContext) -> Self {
        Self {
            consumer: config.consumer,
            queue_capacity: config.queue_capacity,
            buffer: Arc::clone(&context.buffer),
            state: Arc::clone(&context.state),
            gate: Arc::clone(&context.gate),
            counters: Arc::clone(&context.counters),
            trigger: EstimationTrigger::new(config.interval),
            trigger_generation: context.buffer.generation(),
            jobs: config.jobs,
            running: config.running,
            idle_poll: config.idle_poll,
        }
    }

    fn run(mut self) {
        tracing::info!("[IngestWorker] Starting ingest loop");

        loop {
            let queued = match self.consumer.pop() {
                Ok(queued) => queued,
                Err(PopError::Empty) => {
                    // Check shutdown flag only when queue is empty
                    if !self.running.load(Ordering::SeqCst) {
                        tracing::info!("[IngestWorker] Shutdown flag set and queue empty, exiting");
                        break;
                    }
                    thread::sleep(self.idle_poll);
                    continue;
                }
            };

            telemetry::hub()
                .record_queue_occupancy(occupancy_percent(&self.consumer, self.queue_capacity));
            self.process(queued);
        }
        // Dropping `jobs` here lets the estimation thread finish
    }

    fn process(&mut self, queued: QueuedSample) {
        let QueuedSample { sample, generation } = queued;

        match self.buffer.append_for_generation(sample, generation) {
            AppendOutcome::Appended { .. } => {
                PipelineCounters::incr(&self.counters.samples_appended);
                if generation != self.trigger_generation {
                    self.trigger.reset();
                    self.trigger_generation = generation;
                }
                if self.trigger.observe(sample.timestamp) {
                    self.schedule(generation);
                }
            }
            AppendOutcome::Rejected => {
                PipelineCounters::incr(&self.counters.samples_out_of_order);
                telemetry::hub().record_sample_dropped(DropReason::OutOfOrder);
            }
            AppendOutcome::Stale => {
                PipelineCounters::incr(&self.counters.samples_stale);
                telemetry::hub().record_sample_dropped(DropReason::StaleGeneration);
            }
        }
    }

    fn schedule(&self, generation: u64) {
        if self.state.generation() != generation {
            return;
        }

        let Some(permit) = self.gate.try_acquire() else {
            let skipped = self.gate.skipped_count();
            tracing::debug!(
                "[IngestWorker] Estimation still running, skipping trigger ({} skipped)",
                skipped
            );
            telemetry::hub().record_estimation_skipped(skipped);
            return;
        };

        match self.jobs.try_send(EstimationJob { permit, generation }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("[IngestWorker] Estimation job slot occupied, dropping trigger");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::error!("[IngestWorker] Estimation thread is gone");
            }
        }
    }
}

/// Spawn the thread that drains the sample queue
pub fn spawn_ingest_thread(
    config: IngestWorkerConfig,
    context: &EstimationContext,
) -> std::io::Result<JoinHandle<()>> {
    let worker = IngestWorker::new(config, context);
    thread::Builder::new()
        .name("breath-ingest".to_string())
        .spawn(move || worker.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::sample_queue::{SampleQueue, SampleQueueChannels};
    use crate::config::EstimatorConfig;
    use crate::signal::Sample;
    use crate::state::RateStatus;
    use std::sync::mpsc;

    fn context(retention: f64) -> Arc<EstimationContext> {
        let (estimate_tx, _) = tokio::sync::broadcast::channel(16);
        Arc::new(EstimationContext {
            buffer: Arc::new(SignalBuffer::new(retention)),
            estimator: RateEstimator::new(EstimatorConfig::default()),
            state: Arc::new(EstimatorState::new()),
            gate: Arc::new(EstimationGate::new()),
            estimate_tx,
            counters: Arc::new(PipelineCounters::default()),
        })
    }

    fn fill(ctx: &EstimationContext, seconds: f64, freq_hz: f64) {
        let generation = ctx.buffer.generation();
        for i in 0..(seconds * 30.0) as usize {
            let t = i as f64 / 30.0;
            let v = 100.0 + 8.0 * (2.0 * std::f64::consts::PI * freq_hz * t).sin();
            ctx.buffer.append_for_generation(Sample::new(t, v), generation);
        }
    }

    #[test]
    fn test_estimate_now_stores_and_broadcasts() {
        let ctx = context(30.0);
        let mut rx = ctx.estimate_tx.subscribe();
        fill(&ctx, 12.0, 0.25);

        let estimate = ctx.estimate_now().expect("gate open and generation current");
        assert_eq!(estimate.status, RateStatus::Valid);
        assert!((estimate.rate_bpm - 15.0).abs() <= 1.0);
        assert_eq!(ctx.state.read(), estimate);
        assert_eq!(rx.try_recv().unwrap(), estimate);
        assert!(!ctx.gate.is_busy());
    }

    #[test]
    fn test_estimate_now_skips_while_busy() {
        let ctx = context(30.0);
        let _held = ctx.gate.try_acquire().unwrap();
        assert!(ctx.estimate_now().is_none());
        assert_eq!(ctx.gate.skipped_count(), 1);
    }

    #[test]
    fn test_retired_generation_is_discarded() {
        let ctx = context(30.0);
        fill(&ctx, 12.0, 0.25);
        let permit = ctx.gate.try_acquire().unwrap();
        let old = ctx.state.generation();

        let new = ctx.state.reset();
        ctx.buffer.reset_to_generation(new);

        assert!(ctx.run(EstimationJob { permit, generation: old }).is_none());
        assert_eq!(ctx.state.read().status, RateStatus::NoData);
        assert_eq!(ctx.counters.estimates_discarded.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_ingest_worker_drains_and_schedules() {
        let ctx = context(30.0);
        let SampleQueueChannels {
            mut producer,
            consumer,
        } = SampleQueue::new(1024);
        let running = Arc::new(AtomicBool::new(true));
        let (jobs_tx, jobs_rx) = mpsc::sync_channel(1);

        let ingest = spawn_ingest_thread(
            IngestWorkerConfig {
                consumer,
                queue_capacity: 1024,
                interval: EstimationInterval::Seconds(1.0),
                idle_poll: Duration::from_millis(1),
                running: Arc::clone(&running),
                jobs: jobs_tx,
            },
            &ctx,
        )
        .unwrap();
        let estimation = spawn_estimation_thread(Arc::clone(&ctx), jobs_rx).unwrap();

        for i in 0..360 {
            let t = i as f64 / 30.0;
            let v = 100.0 + 8.0 * (2.0 * std::f64::consts::PI * 0.25 * t).sin();
            producer
                .push(QueuedSample {
                    sample: Sample::new(t, v),
                    generation: 0,
                })
                .unwrap();
        }

        running.store(false, Ordering::SeqCst);
        ingest.join().unwrap();
        estimation.join().unwrap();

        let stats = ctx.counters.snapshot(ctx.gate.skipped_count());
        assert_eq!(stats.samples_appended, 360);
        assert!(stats.estimations_completed + stats.estimations_skipped >= 1);
        assert_eq!(ctx.buffer.len(), 360);
    }

    #[test]
    fn test_stale_and_out_of_order_samples_counted() {
        let ctx = context(30.0);
        let SampleQueueChannels {
            mut producer,
            consumer,
        } = SampleQueue::new(16);
        let running = Arc::new(AtomicBool::new(true));
        let (jobs_tx, _jobs_rx) = mpsc::sync_channel(1);

        ctx.buffer.reset_to_generation(1);
        let push = |producer: &mut rtrb::Producer<QueuedSample>, t: f64, generation: u64| {
            producer
                .push(QueuedSample {
                    sample: Sample::new(t, 1.0),
                    generation,
                })
                .unwrap();
        };
        push(&mut producer, 0.0, 0);
        push(&mut producer, 1.0, 1);
        push(&mut producer, 0.5, 1);

        let ingest = spawn_ingest_thread(
            IngestWorkerConfig {
                consumer,
                queue_capacity: 16,
                interval: EstimationInterval::Frames(1000),
                idle_poll: Duration::from_millis(1),
                running: Arc::clone(&running),
                jobs: jobs_tx,
            },
            &ctx,
        )
        .unwrap();
        running.store(false, Ordering::SeqCst);
        ingest.join().unwrap();

        let stats = ctx.counters.snapshot(0);
        assert_eq!(stats.samples_stale, 1);
        assert_eq!(stats.samples_appended, 1);
        assert_eq!(stats.samples_out_of_order, 1);
    }
}
