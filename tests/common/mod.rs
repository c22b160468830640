//! Shared helpers for driving a monitor with synthetic frames.

#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use breathing_rate::api::{BreathingMonitor, IngestOutcome, RateEstimate};
use breathing_rate::fixtures::SyntheticBreathing;

/// Outcome counts of one feeding run
#[derive(Debug, Default)]
pub struct FeedSummary {
    pub queued: usize,
    pub dropped: usize,
    pub rejected: usize,
}

/// Ingest `count` frames of `recipe`, pausing briefly so the queue never fills.
pub fn feed(monitor: &BreathingMonitor, recipe: &SyntheticBreathing, count: usize) -> FeedSummary {
    let mut summary = FeedSummary::default();
    for frame in recipe.frames(count) {
        match monitor.ingest(
            &frame.data,
            frame.width,
            frame.height,
            frame.format,
            Some(frame.timestamp),
        ) {
            Ok(IngestOutcome::Queued(_)) => summary.queued += 1,
            Ok(_) => summary.dropped += 1,
            Err(_) => summary.rejected += 1,
        }
        thread::sleep(Duration::from_micros(200));
    }
    summary
}

/// Block until every queued sample has been consumed by the ingest worker.
pub fn wait_for_drain(monitor: &BreathingMonitor) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let stats = monitor.stats().pipeline;
        let consumed = stats.samples_appended + stats.samples_out_of_order + stats.samples_stale;
        if consumed >= stats.samples_queued {
            return;
        }
        assert!(Instant::now() < deadline, "pipeline did not drain: {stats:?}");
        thread::sleep(Duration::from_millis(2));
    }
}

/// Run an estimation on the caller's thread, retrying while a background one is in flight.
pub fn settle_estimate(monitor: &BreathingMonitor) -> RateEstimate {
    for _ in 0..200 {
        if let Some(estimate) = monitor.estimate_now() {
            return estimate;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("estimation never became available");
}
