//! Time sources used to stamp frames that arrive without a capture timestamp.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Trait representing a monotonic time source used for sample timestamps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic time source for tests and CLI simulation.
///
/// Each call to `now()` advances by a fixed step, so frames ingested without
/// timestamps land on a regular grid regardless of wall-clock jitter.
pub struct StubTimeSource {
    start: Instant,
    step_us: u64,
    offset_us: AtomicU64,
}

impl StubTimeSource {
    /// Time source advancing by one 30 fps frame period per call
    pub fn new() -> Self {
        Self::with_step(Duration::from_micros(33_333))
    }

    pub fn with_step(step: Duration) -> Self {
        Self {
            start: Instant::now(),
            step_us: step.as_micros() as u64,
            offset_us: AtomicU64::new(0),
        }
    }
}

impl Default for StubTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for StubTimeSource {
    fn now(&self) -> Instant {
        let us = self.offset_us.fetch_add(self.step_us, Ordering::SeqCst);
        self.start + Duration::from_micros(us)
    }
}
