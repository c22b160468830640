// Estimator state - the single current rate estimate
//
// Written by the estimation thread (and by reset), read by any number of
// pollers. Reads go through a sequence lock over atomic fields and never
// wait on a mutex; writers are serialized by a small mutex so the
// generation check and the store happen as one step.

use std::fmt;
use std::sync::atomic::{fence, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Trust level of a rate estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RateStatus {
    /// Not enough clean signal to attempt an estimate
    NoData = 0,
    /// A rate was computed but the periodicity is weak or ambiguous
    LowConfidence = 1,
    /// Clear in-band periodicity
    Valid = 2,
}

impl RateStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            2 => RateStatus::Valid,
            1 => RateStatus::LowConfidence,
            _ => RateStatus::NoData,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateStatus::NoData => "no_data",
            RateStatus::LowConfidence => "low_confidence",
            RateStatus::Valid => "valid",
        }
    }
}

impl fmt::Display for RateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One breathing-rate estimate with its diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateEstimate {
    /// Breaths per minute, 0.0 for `NoData`
    pub rate_bpm: f64,
    pub status: RateStatus,
    /// Signal-clock time (seconds) of the newest sample analyzed
    pub computed_at: f64,
    /// Refined dominant frequency in Hz (0.0 when none)
    pub dominant_hz: f64,
    /// Peak power over the spectral noise floor
    pub peak_ratio: f64,
    /// Clean samples that went into the analysis
    pub sample_count: usize,
    /// Span of the analyzed window in seconds
    pub window_seconds: f64,
    /// Session generation this estimate belongs to
    pub generation: u64,
}

impl RateEstimate {
    pub fn no_data(computed_at: f64, generation: u64) -> Self {
        Self {
            rate_bpm: 0.0,
            status: RateStatus::NoData,
            computed_at,
            dominant_hz: 0.0,
            peak_ratio: 0.0,
            sample_count: 0,
            window_seconds: 0.0,
            generation,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == RateStatus::Valid
    }

    pub fn current_rate(&self) -> CurrentRate {
        CurrentRate {
            rate_bpm: self.rate_bpm,
            status: self.status,
        }
    }
}

impl Default for RateEstimate {
    fn default() -> Self {
        Self::no_data(0.0, 0)
    }
}

/// The pair exposed to pollers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentRate {
    pub rate_bpm: f64,
    pub status: RateStatus,
}

/// Current estimate behind a sequence lock
///
/// Every field is an atomic; `seq` is odd while a writer is mid-store.
/// Readers retry until they see the same even sequence before and after
/// loading the fields.
#[derive(Debug)]
pub struct EstimatorState {
    seq: AtomicU64,
    rate_bpm: AtomicU64,
    status: AtomicU8,
    computed_at: AtomicU64,
    dominant_hz: AtomicU64,
    peak_ratio: AtomicU64,
    sample_count: AtomicU64,
    window_seconds: AtomicU64,
    estimate_generation: AtomicU64,
    /// Current session generation, bumped by `reset`
    generation: AtomicU64,
    writer: Mutex<()>,
}

impl EstimatorState {
    pub fn new() -> Self {
        let initial = RateEstimate::default();
        Self {
            seq: AtomicU64::new(0),
            rate_bpm: AtomicU64::new(initial.rate_bpm.to_bits()),
            status: AtomicU8::new(initial.status as u8),
            computed_at: AtomicU64::new(initial.computed_at.to_bits()),
            dominant_hz: AtomicU64::new(initial.dominant_hz.to_bits()),
            peak_ratio: AtomicU64::new(initial.peak_ratio.to_bits()),
            sample_count: AtomicU64::new(initial.sample_count as u64),
            window_seconds: AtomicU64::new(initial.window_seconds.to_bits()),
            estimate_generation: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            writer: Mutex::new(()),
        }
    }

    // ========================================================================
    // READERS
    // ========================================================================

    /// Consistent copy of the current estimate; never waits on a lock
    pub fn read(&self) -> RateEstimate {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let estimate = RateEstimate {
                rate_bpm: f64::from_bits(self.rate_bpm.load(Ordering::Relaxed)),
                status: RateStatus::from_u8(self.status.load(Ordering::Relaxed)),
                computed_at: f64::from_bits(self.computed_at.load(Ordering::Relaxed)),
                dominant_hz: f64::from_bits(self.dominant_hz.load(Ordering::Relaxed)),
                peak_ratio: f64::from_bits(self.peak_ratio.load(Ordering::Relaxed)),
                sample_count: self.sample_count.load(Ordering::Relaxed) as usize,
                window_seconds: f64::from_bits(self.window_seconds.load(Ordering::Relaxed)),
                generation: self.estimate_generation.load(Ordering::Relaxed),
            };

            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return estimate;
            }
        }
    }

    pub fn current_rate(&self) -> CurrentRate {
        self.read().current_rate()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    // ========================================================================
    // WRITERS
    // ========================================================================

    /// Replace the current estimate, stamping it with the current generation
    pub fn update(&self, estimate: RateEstimate) {
        let _guard = self.lock_writer();
        let generation = self.generation.load(Ordering::Acquire);
        self.store(&RateEstimate {
            generation,
            ..estimate
        });
    }

    /// Replace the current estimate only if no reset happened since `generation`
    ///
    /// Returns false when the estimate was discarded as stale.
    pub fn update_if_current(&self, estimate: RateEstimate, generation: u64) -> bool {
        let _guard = self.lock_writer();
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        self.store(&RateEstimate {
            generation,
            ..estimate
        });
        true
    }

    /// Restore `NoData` and start a new generation; returns the new generation
    pub fn reset(&self) -> u64 {
        let _guard = self.lock_writer();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.store(&RateEstimate::no_data(0.0, generation));
        generation
    }

    fn store(&self, estimate: &RateEstimate) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.rate_bpm
            .store(estimate.rate_bpm.to_bits(), Ordering::Relaxed);
        self.status.store(estimate.status as u8, Ordering::Relaxed);
        self.computed_at
            .store(estimate.computed_at.to_bits(), Ordering::Relaxed);
        self.dominant_hz
            .store(estimate.dominant_hz.to_bits(), Ordering::Relaxed);
        self.peak_ratio
            .store(estimate.peak_ratio.to_bits(), Ordering::Relaxed);
        self.sample_count
            .store(estimate.sample_count as u64, Ordering::Relaxed);
        self.window_seconds
            .store(estimate.window_seconds.to_bits(), Ordering::Relaxed);
        self.estimate_generation
            .store(estimate.generation, Ordering::Relaxed);

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl Default for EstimatorState {
    fn default() -> Self {
        Self::new()
    }
}
