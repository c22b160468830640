// Preprocessing - sanitize, resample and detrend a sample window
//
// Frames arrive with jittered timestamps and occasional motion artifacts.
// Frequency analysis wants a clean, uniformly spaced, zero-mean series, so
// these steps run before any spectral or autocorrelation work.

use crate::error::EstimationError;
use crate::signal::Sample;

/// Residual variance below this is treated as a flat signal
const MIN_VARIANCE: f64 = 1e-12;

/// Upper bound on the uniform grid length
pub const MAX_RESAMPLED_POINTS: usize = 1 << 20;

/// Clean samples plus counts of what was removed
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub samples: Vec<Sample>,
    /// Input length before sanitizing
    pub total: usize,
    /// Samples removed for exceeding the motion threshold
    pub motion_rejected: usize,
    /// Samples removed for non-finite fields or out-of-order timestamps
    pub invalid_rejected: usize,
    /// Clean samples older than the analysis window
    pub expired: usize,
}

impl Sanitized {
    /// More than half of the window was motion-contaminated
    pub fn motion_dominated(&self) -> bool {
        self.motion_rejected * 2 > self.total
    }

    /// Keep only samples within `max_seconds` of the newest one
    pub fn retain_newest(&mut self, max_seconds: f64) {
        let Some(newest) = self.samples.last().map(|s| s.timestamp) else {
            return;
        };
        let keep_from = self
            .samples
            .partition_point(|s| newest - s.timestamp > max_seconds);
        self.samples.drain(..keep_from);
        self.expired += keep_from;
    }

    pub fn span_seconds(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }
}

/// Drop non-finite, non-increasing, and motion-contaminated samples
pub fn sanitize(samples: &[Sample], motion_threshold: Option<f64>) -> Sanitized {
    let mut clean: Vec<Sample> = Vec::with_capacity(samples.len());
    let mut motion_rejected = 0;
    let mut invalid_rejected = 0;

    for sample in samples {
        if !sample.is_finite() {
            invalid_rejected += 1;
            continue;
        }
        if clean
            .last()
            .is_some_and(|last| sample.timestamp <= last.timestamp)
        {
            invalid_rejected += 1;
            continue;
        }
        if let Some(threshold) = motion_threshold {
            // NaN motion never compares below the threshold
            if !(sample.motion <= threshold) {
                motion_rejected += 1;
                continue;
            }
        }
        clean.push(*sample);
    }

    Sanitized {
        samples: clean,
        total: samples.len(),
        motion_rejected,
        invalid_rejected,
        expired: 0,
    }
}

/// Linearly interpolate onto a uniform grid starting at the first sample
///
/// Requires at least two strictly increasing samples; returns an empty
/// series otherwise. Grids longer than [`MAX_RESAMPLED_POINTS`] are refused.
pub fn resample_linear(samples: &[Sample], rate_hz: f64) -> Result<Vec<f64>, EstimationError> {
    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) if samples.len() >= 2 && rate_hz > 0.0 => (first, last),
        _ => return Ok(Vec::new()),
    };

    let span = last.timestamp - first.timestamp;
    let steps = (span * rate_hz).floor();
    if !(steps.is_finite() && steps < MAX_RESAMPLED_POINTS as f64) {
        return Err(EstimationError::NumericInstability {
            reason: format!(
                "{:.0}s at {} Hz exceeds {} resampled points",
                span, rate_hz, MAX_RESAMPLED_POINTS
            ),
        });
    }
    let count = steps as usize + 1;
    let mut out = Vec::with_capacity(count);

    let mut j = 0;
    for k in 0..count {
        let t = first.timestamp + k as f64 / rate_hz;
        while j + 2 < samples.len() && samples[j + 1].timestamp < t {
            j += 1;
        }
        let a = &samples[j];
        let b = &samples[j + 1];
        if t >= last.timestamp {
            out.push(last.value);
            continue;
        }
        let frac = ((t - a.timestamp) / (b.timestamp - a.timestamp)).clamp(0.0, 1.0);
        out.push(a.value + frac * (b.value - a.value));
    }

    Ok(out)
}

/// Remove the least-squares line in place; returns the residual variance
pub fn detrend(values: &mut [f64]) -> Result<f64, EstimationError> {
    let n = values.len();
    if n < 2 {
        return Err(EstimationError::NumericInstability {
            reason: format!("cannot detrend {} point(s)", n),
        });
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n as f64;
    let (sxx, sxy) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxx, sxy), (i, &y)| {
            let dx = i as f64 - x_mean;
            (sxx + dx * dx, sxy + dx * (y - y_mean))
        });
    let slope = sxy / sxx;

    for (i, y) in values.iter_mut().enumerate() {
        *y -= y_mean + slope * (i as f64 - x_mean);
    }

    let variance = values.iter().map(|y| y * y).sum::<f64>() / n as f64;
    if !variance.is_finite() {
        return Err(EstimationError::NumericInstability {
            reason: "non-finite residual after detrend".to_string(),
        });
    }
    if variance < MIN_VARIANCE {
        return Err(EstimationError::NumericInstability {
            reason: format!("flat signal (residual variance {:.3e})", variance),
        });
    }

    Ok(variance)
}
