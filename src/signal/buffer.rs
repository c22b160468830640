use std::collections::VecDeque;
use std::sync::Mutex;

use super::Sample;

/// Result of appending one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Sample stored; `evicted` older samples fell out of the window
    Appended { evicted: usize },
    /// Sample dropped: non-finite, or not newer than the last stored sample
    Rejected,
    /// Sample belongs to a generation the buffer was reset away from
    Stale,
}

/// Time-bounded, strictly time-ordered sample history
///
/// Never holds a sample older than `newest.timestamp - retention_window_seconds`.
/// All operations take a short internal lock, so a snapshot is never torn.
#[derive(Debug)]
pub struct SignalBuffer {
    inner: Mutex<Inner>,
    retention_window_seconds: f64,
}

#[derive(Debug, Default)]
struct Inner {
    samples: VecDeque<Sample>,
    generation: u64,
}

impl SignalBuffer {
    pub fn new(retention_window_seconds: f64) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            retention_window_seconds,
        }
    }

    pub fn retention_window_seconds(&self) -> f64 {
        self.retention_window_seconds
    }

    /// Append a sample, evicting stale entries oldest-first
    pub fn append(&self, sample: Sample) -> AppendOutcome {
        let mut inner = self.lock();
        Self::push(&mut inner.samples, sample, self.retention_window_seconds)
    }

    /// Append only if the buffer still belongs to `generation`
    ///
    /// The check and the insert happen under one lock, so a concurrent
    /// [`reset_to_generation`](Self::reset_to_generation) can never be
    /// followed by a sample from the old generation.
    pub fn append_for_generation(&self, sample: Sample, generation: u64) -> AppendOutcome {
        let mut inner = self.lock();
        if inner.generation != generation {
            return AppendOutcome::Stale;
        }
        Self::push(&mut inner.samples, sample, self.retention_window_seconds)
    }

    /// Drop all samples and accept only `generation` from now on
    pub fn reset_to_generation(&self, generation: u64) {
        let mut inner = self.lock();
        inner.samples.clear();
        inner.generation = generation;
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn push(samples: &mut VecDeque<Sample>, sample: Sample, window: f64) -> AppendOutcome {
        if !sample.is_finite() || !sample.motion.is_finite() {
            return AppendOutcome::Rejected;
        }

        if let Some(last) = samples.back() {
            if sample.timestamp <= last.timestamp {
                return AppendOutcome::Rejected;
            }
        }

        let cutoff = sample.timestamp - window;
        let mut evicted = 0;
        while samples.front().is_some_and(|oldest| oldest.timestamp < cutoff) {
            samples.pop_front();
            evicted += 1;
        }
        samples.push_back(sample);

        AppendOutcome::Appended { evicted }
    }

    /// Copy out the current contents, oldest first
    pub fn snapshot(&self) -> Vec<Sample> {
        self.lock().samples.iter().copied().collect()
    }

    /// Copy out the contents only if they belong to `generation`
    pub fn snapshot_for_generation(&self, generation: u64) -> Option<Vec<Sample>> {
        let inner = self.lock();
        (inner.generation == generation).then(|| inner.samples.iter().copied().collect())
    }

    pub fn clear(&self) {
        self.lock().samples.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().samples.is_empty()
    }

    /// Time between the oldest and newest stored sample
    pub fn span_seconds(&self) -> f64 {
        let inner = self.lock();
        match (inner.samples.front(), inner.samples.back()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    /// Timestamp of the newest stored sample
    pub fn newest_timestamp(&self) -> Option<f64> {
        self.lock().samples.back().map(|s| s.timestamp)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Contents are plain data and stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }
}
