// Estimation scheduling - when to estimate, and never more than one at a time

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::EstimationInterval;

/// At-most-one-in-flight guard for estimations
///
/// A trigger that finds the gate closed is skipped and counted rather than
/// queued behind the running estimation.
#[derive(Debug, Default)]
pub struct EstimationGate {
    busy: AtomicBool,
    skipped: AtomicU64,
}

/// Held while an estimation runs; reopens the gate on drop
#[derive(Debug)]
pub struct GatePermit {
    gate: Arc<EstimationGate>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

impl EstimationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate, or count a skip if an estimation is already running
    pub fn try_acquire(self: &Arc<Self>) -> Option<GatePermit> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(GatePermit {
                gate: Arc::clone(self),
            })
        } else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn skipped_count(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Decides on the signal clock when the next estimation is due
#[derive(Debug, Clone)]
pub struct EstimationTrigger {
    interval: EstimationInterval,
    last_fired_at: Option<f64>,
    samples_since: u32,
}

impl EstimationTrigger {
    pub fn new(interval: EstimationInterval) -> Self {
        Self {
            interval,
            last_fired_at: None,
            samples_since: 0,
        }
    }

    /// Record one appended sample; returns true when an estimation is due
    pub fn observe(&mut self, timestamp: f64) -> bool {
        match self.interval {
            EstimationInterval::Seconds(period) => match self.last_fired_at {
                // First sample anchors the schedule
                None => {
                    self.last_fired_at = Some(timestamp);
                    false
                }
                Some(last) if timestamp - last >= period => {
                    self.last_fired_at = Some(timestamp);
                    true
                }
                Some(_) => false,
            },
            EstimationInterval::Frames(every) => {
                self.samples_since += 1;
                if self.samples_since >= every {
                    self.samples_since = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_fired_at = None;
        self.samples_since = 0;
    }
}
