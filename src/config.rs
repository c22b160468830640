//! Configuration management for the breathing rate pipeline
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling fast iteration without recompilation. Key parameters for
//! frame reduction, signal retention, rate estimation and scheduling can be
//! adjusted via the config file for rapid experimentation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::capture::sample_queue::DEFAULT_QUEUE_CAPACITY;
use crate::error::SessionError;
use crate::telemetry::{self, DiagnosticError};

/// Complete monitor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Channel reduced to the per-frame scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleChannel {
    /// Green channel for RGB input, luma otherwise
    Green,
    /// Rec.601 luma for RGB input
    Luma,
}

/// Fractional region of interest, `0.0..=1.0` on both axes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl RegionOfInterest {
    /// Whole frame
    pub fn full() -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            x1: 1.0,
            y1: 1.0,
        }
    }
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        // Central region, where the chest/abdomen sits in a framed subject
        Self {
            x0: 0.25,
            y0: 0.25,
            x1: 0.75,
            y1: 0.75,
        }
    }
}

/// Frame ingestion parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Fixed capture width; frames of any other width are rejected
    #[serde(default)]
    pub capture_width: Option<u32>,
    /// Fixed capture height; frames of any other height are rejected
    #[serde(default)]
    pub capture_height: Option<u32>,
    /// Region reduced to the per-frame sample
    pub roi: RegionOfInterest,
    /// Channel reduced for RGB(A) input
    pub channel: SampleChannel,
    /// ROI is split into `block_grid x block_grid` blocks for motion scoring
    pub block_grid: u32,
    /// Valid frames discarded at session start while exposure settles.
    /// Opt-in: 0 keeps every frame.
    pub warmup_frames: u32,
    /// Capacity of the callback-to-pipeline sample queue
    pub queue_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            capture_width: None,
            capture_height: None,
            roi: RegionOfInterest::default(),
            channel: SampleChannel::Green,
            block_grid: 8,
            warmup_frames: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Signal buffer parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Samples older than this (relative to the newest) are evicted
    pub retention_window_seconds: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            retention_window_seconds: 30.0,
        }
    }
}

/// Periodicity detector used by the estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMethod {
    /// Dominant peak of the zero-padded power spectrum
    Spectral,
    /// Strongest in-band autocorrelation lag
    Autocorrelation,
    /// Mean spacing of smoothed peaks above the series mean
    PeakInterval,
}

/// Rate estimation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Lower edge of the plausible breathing band (Hz)
    pub min_breathing_hz: f64,
    /// Upper edge of the plausible breathing band (Hz)
    pub max_breathing_hz: f64,
    /// Minimum peak-to-noise-floor power ratio for a `Valid` estimate
    pub confidence_threshold: f64,
    /// Peak must exceed every out-of-lobe bin near the band by this power ratio
    pub min_peak_prominence: f64,
    /// Breathing cycles the window must span at the detected rate for `Valid`
    pub min_cycles: f64,
    /// Only the newest samples within this span are analyzed (seconds)
    pub max_window_seconds: f64,
    /// Uniform grid rate used before frequency analysis (Hz)
    pub resample_hz: f64,
    /// Minimum covered span before any analysis is attempted (seconds)
    pub min_coverage_seconds: f64,
    /// Minimum number of clean samples before any analysis is attempted
    pub min_samples: usize,
    /// FFT length floor; the analysis window is zero-padded up to it
    pub fft_min_size: usize,
    /// Samples whose motion score exceeds this are discarded as artifacts
    #[serde(default)]
    pub motion_threshold: Option<f64>,
    pub method: EstimationMethod,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_breathing_hz: 0.1,
            max_breathing_hz: 0.67,
            confidence_threshold: 30.0,
            min_peak_prominence: 3.0,
            min_cycles: 2.0,
            max_window_seconds: 120.0,
            resample_hz: 10.0,
            min_coverage_seconds: 5.0,
            min_samples: 16,
            fft_min_size: 4096,
            motion_threshold: Some(15.0),
            method: EstimationMethod::Spectral,
        }
    }
}

/// When the pipeline triggers an estimation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationInterval {
    /// Every N seconds of signal time
    Seconds(f64),
    /// Every N appended samples
    Frames(u32),
}

/// Scheduling parameters for the worker threads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub estimation_interval: EstimationInterval,
    /// Sleep between queue polls when no samples are pending
    pub idle_poll_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            estimation_interval: EstimationInterval::Seconds(1.0),
            idle_poll_ms: 1,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// Loaded configuration, or the defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    telemetry::hub().record_error(DiagnosticError::ConfigLoad, err.to_string());
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                telemetry::hub().record_error(DiagnosticError::ConfigLoad, err.to_string());
                Self::default()
            }
        }
    }

    /// Parse configuration from a JSON document; missing sections take defaults
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), SessionError> {
        let est = &self.estimator;

        if !(est.min_breathing_hz.is_finite() && est.min_breathing_hz > 0.0) {
            return Err(SessionError::invalid_config(
                "estimator.min_breathing_hz",
                format!("must be a positive frequency (got {})", est.min_breathing_hz),
            ));
        }
        if !(est.max_breathing_hz.is_finite() && est.max_breathing_hz > est.min_breathing_hz) {
            return Err(SessionError::invalid_config(
                "estimator.max_breathing_hz",
                format!(
                    "must exceed min_breathing_hz ({} <= {})",
                    est.max_breathing_hz, est.min_breathing_hz
                ),
            ));
        }
        if !(est.resample_hz.is_finite() && est.resample_hz > 2.0 * est.max_breathing_hz) {
            return Err(SessionError::invalid_config(
                "estimator.resample_hz",
                format!(
                    "must be above twice max_breathing_hz (got {})",
                    est.resample_hz
                ),
            ));
        }
        if !(est.confidence_threshold.is_finite() && est.confidence_threshold >= 0.0) {
            return Err(SessionError::invalid_config(
                "estimator.confidence_threshold",
                "must be a non-negative ratio",
            ));
        }
        if !(est.min_peak_prominence.is_finite() && est.min_peak_prominence >= 1.0) {
            return Err(SessionError::invalid_config(
                "estimator.min_peak_prominence",
                "must be a ratio of at least 1",
            ));
        }
        if !(est.min_cycles.is_finite() && est.min_cycles >= 0.0) {
            return Err(SessionError::invalid_config(
                "estimator.min_cycles",
                "must be non-negative",
            ));
        }
        if !(est.min_coverage_seconds.is_finite() && est.min_coverage_seconds > 0.0) {
            return Err(SessionError::invalid_config(
                "estimator.min_coverage_seconds",
                "must be positive",
            ));
        }
        if !(est.max_window_seconds.is_finite() && est.max_window_seconds >= est.min_coverage_seconds) {
            return Err(SessionError::invalid_config(
                "estimator.max_window_seconds",
                format!(
                    "must cover at least min_coverage_seconds ({} < {})",
                    est.max_window_seconds, est.min_coverage_seconds
                ),
            ));
        }
        if est.min_samples < 4 {
            return Err(SessionError::invalid_config(
                "estimator.min_samples",
                "must be at least 4",
            ));
        }
        if est.fft_min_size < 16 {
            return Err(SessionError::invalid_config(
                "estimator.fft_min_size",
                "must be at least 16",
            ));
        }
        if let Some(threshold) = est.motion_threshold {
            if !(threshold.is_finite() && threshold > 0.0) {
                return Err(SessionError::invalid_config(
                    "estimator.motion_threshold",
                    "must be positive when set",
                ));
            }
        }

        let window = self.signal.retention_window_seconds;
        if !(window.is_finite() && window >= est.min_coverage_seconds) {
            return Err(SessionError::invalid_config(
                "signal.retention_window_seconds",
                format!(
                    "must cover at least min_coverage_seconds ({} < {})",
                    window, est.min_coverage_seconds
                ),
            ));
        }

        let roi = &self.ingest.roi;
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !(in_unit(roi.x0) && in_unit(roi.x1) && in_unit(roi.y0) && in_unit(roi.y1))
            || roi.x0 >= roi.x1
            || roi.y0 >= roi.y1
        {
            return Err(SessionError::invalid_config(
                "ingest.roi",
                "must be a non-empty rectangle inside 0.0..=1.0",
            ));
        }
        if self.ingest.block_grid == 0 || self.ingest.block_grid > 64 {
            return Err(SessionError::invalid_config(
                "ingest.block_grid",
                "must be between 1 and 64",
            ));
        }
        if self.ingest.queue_capacity == 0 {
            return Err(SessionError::invalid_config(
                "ingest.queue_capacity",
                "must be greater than 0",
            ));
        }
        if matches!(self.ingest.capture_width, Some(0))
            || matches!(self.ingest.capture_height, Some(0))
        {
            return Err(SessionError::invalid_config(
                "ingest.capture_width/capture_height",
                "must be non-zero when set",
            ));
        }

        match self.schedule.estimation_interval {
            EstimationInterval::Seconds(secs) if !(secs.is_finite() && secs > 0.0) => {
                Err(SessionError::invalid_config(
                    "schedule.estimation_interval",
                    "seconds must be positive",
                ))
            }
            EstimationInterval::Frames(0) => Err(SessionError::invalid_config(
                "schedule.estimation_interval",
                "frame count must be positive",
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.signal.retention_window_seconds, 30.0);
        assert_eq!(config.estimator.min_breathing_hz, 0.1);
        assert_eq!(config.estimator.max_breathing_hz, 0.67);
        assert_eq!(
            config.schedule.estimation_interval,
            EstimationInterval::Seconds(1.0)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = MonitorConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed = MonitorConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "schedule": { "estimation_interval": { "frames": 30 }, "idle_poll_ms": 2 } }"#;
        let config = MonitorConfig::from_json_str(json).unwrap();
        assert_eq!(
            config.schedule.estimation_interval,
            EstimationInterval::Frames(30)
        );
        assert_eq!(config.estimator, EstimatorConfig::default());
    }

    #[test]
    fn test_rejects_inverted_band() {
        let mut config = MonitorConfig::default();
        config.estimator.max_breathing_hz = 0.1;
        match config.validate() {
            Err(SessionError::InvalidConfig { field, .. }) => {
                assert_eq!(field, "estimator.max_breathing_hz")
            }
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_band_above_nyquist() {
        let mut config = MonitorConfig::default();
        config.estimator.resample_hz = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_window_shorter_than_coverage() {
        let mut config = MonitorConfig::default();
        config.signal.retention_window_seconds = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_roi() {
        let mut config = MonitorConfig::default();
        config.ingest.roi.x1 = config.ingest.roi.x0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut config = MonitorConfig::default();
        config.schedule.estimation_interval = EstimationInterval::Frames(0);
        assert!(config.validate().is_err());
        config.schedule.estimation_interval = EstimationInterval::Seconds(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ingest_defaults_keep_every_frame() {
        let ingest = IngestConfig::default();
        assert_eq!(ingest.warmup_frames, 0);
        assert_eq!(ingest.queue_capacity, DEFAULT_QUEUE_CAPACITY);

        let json = r#"{ "ingest": { "warmup_frames": 50 } }"#;
        let config = MonitorConfig::from_json_str(json).unwrap();
        assert_eq!(config.ingest.warmup_frames, 50);
        assert_eq!(config.ingest.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_peak_interval_method_parses() {
        let json = r#"{ "estimator": { "method": "peak_interval" } }"#;
        let config = MonitorConfig::from_json_str(json).unwrap();
        assert_eq!(config.estimator.method, EstimationMethod::PeakInterval);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_confidence_gates() {
        let mut config = MonitorConfig::default();
        config.estimator.min_peak_prominence = 0.5;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.estimator.min_cycles = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.estimator.max_window_seconds = 1.0;
        match config.validate() {
            Err(SessionError::InvalidConfig { field, .. }) => {
                assert_eq!(field, "estimator.max_window_seconds")
            }
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = MonitorConfig::load_from_file("/nonexistent/breathing.json");
        assert_eq!(config, MonitorConfig::default());
    }
}
