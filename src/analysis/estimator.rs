// RateEstimator - breathing rate from a window of samples
//
// Pipeline: sanitize -> newest window -> coverage check -> resample ->
// detrend -> power spectrum -> in-band periodicity -> confidence.
// Pure with respect to its inputs: the same samples and configuration always
// produce the same estimate.

use crate::config::{EstimationMethod, EstimatorConfig};
use crate::error::{log_estimation_error, EstimationError};
use crate::signal::Sample;
use crate::state::{RateEstimate, RateStatus};

use super::autocorr::dominant_lag;
use super::peaks::peak_interval_rate;
use super::preprocess::{detrend, resample_linear, sanitize};
use super::spectrum::FftProcessor;

/// Ratio reported when the noise floor is exactly zero
const MAX_PEAK_RATIO: f64 = 1e12;

/// Breathing rate estimator
pub struct RateEstimator {
    config: EstimatorConfig,
    fft: FftProcessor,
}

impl RateEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        let fft = FftProcessor::new(config.fft_min_size);
        Self { config, fft }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimate the rate for `samples`, stamping the result with `now`
    ///
    /// Never fails: insufficient or degenerate input yields `NoData`.
    pub fn estimate(&self, samples: &[Sample], now: f64) -> RateEstimate {
        match self.try_estimate(samples, now) {
            Ok(estimate) => estimate,
            Err(err) => {
                log_estimation_error(&err, "RateEstimator::estimate");
                let mut estimate = RateEstimate::no_data(now, 0);
                if let EstimationError::InsufficientData {
                    samples,
                    span_seconds,
                    ..
                } = err
                {
                    estimate.sample_count = samples;
                    estimate.window_seconds = span_seconds;
                }
                estimate
            }
        }
    }

    /// Like [`estimate`](Self::estimate) but surfaces why no rate was produced
    pub fn try_estimate(&self, samples: &[Sample], now: f64) -> Result<RateEstimate, EstimationError> {
        let cfg = &self.config;

        // ====== SANITIZE ======
        let mut clean = sanitize(samples, cfg.motion_threshold);
        clean.retain_newest(cfg.max_window_seconds);
        let span = clean.span_seconds();

        // ====== COVERAGE ======
        if clean.samples.len() < cfg.min_samples || span < cfg.min_coverage_seconds {
            return Err(EstimationError::InsufficientData {
                samples: clean.samples.len(),
                required_samples: cfg.min_samples,
                span_seconds: span,
                required_seconds: cfg.min_coverage_seconds,
            });
        }

        // ====== RESAMPLE + DETREND ======
        let mut values = resample_linear(&clean.samples, cfg.resample_hz)?;
        if values.len() < 4 {
            return Err(EstimationError::NumericInstability {
                reason: format!("only {} point(s) after resampling", values.len()),
            });
        }
        detrend(&mut values)?;

        // ====== PERIODICITY ======
        let spectrum = self.fft.power_spectrum(&values, cfg.resample_hz);
        let spectral_peak = spectrum
            .band_peak(cfg.min_breathing_hz, cfg.max_breathing_hz)
            .ok_or_else(|| EstimationError::NumericInstability {
                reason: "breathing band has no spectral bins".to_string(),
            })?;

        let (hz, peak_bin, peak_power, ambiguous) = match cfg.method {
            EstimationMethod::Spectral => (
                spectral_peak.hz,
                spectral_peak.bin,
                spectral_peak.power,
                spectral_peak.at_band_edge,
            ),
            EstimationMethod::Autocorrelation => {
                match dominant_lag(
                    &values,
                    cfg.resample_hz,
                    cfg.min_breathing_hz,
                    cfg.max_breathing_hz,
                ) {
                    Some(lag) => {
                        let (bin, power) = spectrum.lobe_power(lag.hz);
                        (lag.hz, bin, power, false)
                    }
                    // No periodic lag: report the spectral guess without trusting it
                    None => (spectral_peak.hz, spectral_peak.bin, spectral_peak.power, true),
                }
            }
            EstimationMethod::PeakInterval => {
                match peak_interval_rate(&values, cfg.resample_hz, cfg.max_breathing_hz) {
                    Some(rate) => {
                        let (bin, power) = spectrum.lobe_power(rate.hz);
                        let outside_band =
                            rate.hz < cfg.min_breathing_hz || rate.hz > cfg.max_breathing_hz;
                        (rate.hz, bin, power, outside_band)
                    }
                    None => (spectral_peak.hz, spectral_peak.bin, spectral_peak.power, true),
                }
            }
        };

        if !hz.is_finite() || hz <= 0.0 {
            return Err(EstimationError::NumericInstability {
                reason: format!("non-physical dominant frequency {}", hz),
            });
        }

        // ====== CONFIDENCE ======
        let floor = spectrum.noise_floor(peak_bin);
        let peak_ratio = if floor > 0.0 {
            (peak_power / floor).min(MAX_PEAK_RATIO)
        } else {
            MAX_PEAK_RATIO
        };

        // Competing structure around the band makes the peak ambiguous
        let prominence = spectrum
            .strongest_outside_lobe(peak_bin, 0.5 * cfg.min_breathing_hz, 2.0 * cfg.max_breathing_hz)
            .filter(|&rival| rival > 0.0)
            .map_or(MAX_PEAK_RATIO, |rival| (peak_power / rival).min(MAX_PEAK_RATIO));
        let cycles = span * hz;

        let confident = peak_ratio >= cfg.confidence_threshold
            && prominence >= cfg.min_peak_prominence
            && cycles >= cfg.min_cycles
            && !ambiguous
            && !clean.motion_dominated();
        let status = if confident {
            RateStatus::Valid
        } else {
            RateStatus::LowConfidence
        };

        tracing::debug!(
            "[RateEstimator] {:.2} bpm ({}) ratio={:.1} prominence={:.1} cycles={:.1} samples={} span={:.1}s motion_rejected={}",
            hz * 60.0,
            status,
            peak_ratio,
            prominence,
            cycles,
            clean.samples.len(),
            span,
            clean.motion_rejected
        );

        Ok(RateEstimate {
            rate_bpm: hz * 60.0,
            status,
            computed_at: now,
            dominant_hz: hz,
            peak_ratio,
            sample_count: clean.samples.len(),
            window_seconds: span,
            generation: 0,
        })
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}
