// Public API surface for platform bindings
// The JNI layer and embedders reach the monitor through these re-exports and helpers

pub use crate::capture::{Frame, IngestOutcome, PixelFormat};
pub use crate::config::{
    EstimationInterval, EstimationMethod, EstimatorConfig, IngestConfig, MonitorConfig,
    RegionOfInterest, SampleChannel, ScheduleConfig, SignalConfig,
};
pub use crate::engine::{BreathingMonitor, MonitorStats};
pub use crate::error::{ErrorCode, EstimationError, FrameError, SessionError};
pub use crate::state::{CurrentRate, RateEstimate, RateStatus};

/// Parse a JSON configuration and validate it.
///
/// An empty document yields the defaults. Parse failures surface as
/// `SessionError::InvalidConfig` so bindings report a single error family.
pub fn parse_config(json: &str) -> Result<MonitorConfig, SessionError> {
    let config = if json.trim().is_empty() {
        MonitorConfig::default()
    } else {
        MonitorConfig::from_json_str(json)
            .map_err(|err| SessionError::invalid_config("config", err.to_string()))?
    };
    config.validate()?;
    Ok(config)
}

/// Start `monitor` with a JSON configuration.
pub fn start_with_json(monitor: &BreathingMonitor, json: &str) -> Result<(), SessionError> {
    monitor.start(parse_config(json)?)
}

/// Latest estimate as a JSON document for bindings without serde.
pub fn estimate_json(monitor: &BreathingMonitor) -> String {
    serde_json::to_string(&monitor.latest_estimate()).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_empty_is_default() {
        let config = parse_config("  ").unwrap();
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn test_parse_config_rejects_garbage() {
        let err = parse_config("{not json").unwrap_err();
        assert_eq!(err.code(), 3001);
    }

    #[test]
    fn test_parse_config_rejects_inverted_band() {
        let json = r#"{"estimator": {"min_breathing_hz": 0.6, "max_breathing_hz": 0.2}}"#;
        assert!(matches!(
            parse_config(json),
            Err(SessionError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_estimate_json_before_start() {
        let monitor = BreathingMonitor::new();
        let value: serde_json::Value = serde_json::from_str(&estimate_json(&monitor)).unwrap();
        assert_eq!(value["status"], "no_data");
    }
}
