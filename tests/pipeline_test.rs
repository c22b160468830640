//! End-to-end tests: synthetic camera frames through the threaded pipeline.

mod common;

use std::time::Duration;

use breathing_rate::api::{BreathingMonitor, MonitorConfig, PixelFormat, RateStatus};
use breathing_rate::config::EstimationInterval;
use breathing_rate::fixtures::SyntheticBreathing;
use breathing_rate::telemetry::MetricEvent;
use futures::StreamExt;

fn run_recording(config: MonitorConfig, recipe: &SyntheticBreathing, frames: usize) -> BreathingMonitor {
    let monitor = BreathingMonitor::new();
    monitor.start(config).unwrap();
    let summary = common::feed(&monitor, recipe, frames);
    assert_eq!(summary.rejected, 0);
    common::wait_for_drain(&monitor);
    monitor
}

#[test]
fn test_fifteen_bpm_gray_recording_is_valid() {
    let recipe = SyntheticBreathing::new(0.25);
    let monitor = run_recording(MonitorConfig::default(), &recipe, 300);

    let estimate = common::settle_estimate(&monitor);
    println!("[Pipeline] gray estimate: {estimate:?}");
    assert_eq!(estimate.status, RateStatus::Valid);
    assert!(
        (14.0..=16.0).contains(&estimate.rate_bpm),
        "rate {} outside [14, 16]",
        estimate.rate_bpm
    );
    assert_eq!(monitor.get_current_rate().status, RateStatus::Valid);
    monitor.stop().unwrap();
}

#[test]
fn test_rgba_recording_uses_green_channel() {
    let recipe = SyntheticBreathing {
        format: PixelFormat::Rgba8,
        ..SyntheticBreathing::new(0.3)
    };
    let monitor = run_recording(MonitorConfig::default(), &recipe, 300);

    let estimate = common::settle_estimate(&monitor);
    assert_eq!(estimate.status, RateStatus::Valid);
    assert!((estimate.rate_bpm - 18.0).abs() <= 1.0, "{}", estimate.rate_bpm);
    monitor.stop().unwrap();
}

#[test]
fn test_background_estimates_are_published() {
    let recipe = SyntheticBreathing::new(0.25);
    let mut config = MonitorConfig::default();
    config.schedule.estimation_interval = EstimationInterval::Frames(30);

    let monitor = BreathingMonitor::new();
    let mut rx = monitor.subscribe_estimates();
    monitor.start(config).unwrap();
    common::feed(&monitor, &recipe, 300);
    common::wait_for_drain(&monitor);
    monitor.stop().unwrap();

    let mut published = Vec::new();
    while let Ok(estimate) = rx.try_recv() {
        published.push(estimate);
    }
    assert!(!published.is_empty(), "no estimates were broadcast");
    assert!(published.iter().any(|e| e.status == RateStatus::NoData));

    let stats = monitor.stats().pipeline;
    assert_eq!(stats.estimations_completed as usize, published.len());
    assert_eq!(stats.estimates_discarded, 0);
}

#[test]
fn test_noise_only_recording_is_never_valid() {
    for seed in [1, 2, 3] {
        let recipe = SyntheticBreathing::noise_only(seed);
        let monitor = run_recording(MonitorConfig::default(), &recipe, 300);

        let estimate = common::settle_estimate(&monitor);
        assert_ne!(estimate.status, RateStatus::Valid, "seed {seed}: {estimate:?}");
        monitor.stop().unwrap();
    }
}

#[test]
fn test_retention_window_bounds_history() {
    let mut config = MonitorConfig::default();
    config.signal.retention_window_seconds = 6.0;
    let recipe = SyntheticBreathing::new(0.25);
    let monitor = run_recording(config, &recipe, 450);

    let snapshot = monitor.signal_snapshot();
    let newest = snapshot.last().unwrap().timestamp;
    assert!(snapshot.iter().all(|s| newest - s.timestamp <= 6.0));
    assert!((newest - 449.0 / 30.0).abs() < 1e-6);
    assert!(monitor.stats().buffer_span_seconds <= 6.0);
    monitor.stop().unwrap();
}

#[test]
fn test_estimate_stream_yields_published_estimates() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let monitor = BreathingMonitor::new();
    let mut stream = monitor.estimate_stream();
    monitor.start(MonitorConfig::default()).unwrap();
    common::feed(&monitor, &SyntheticBreathing::new(0.25), 300);
    common::wait_for_drain(&monitor);
    let expected = common::settle_estimate(&monitor);
    monitor.stop().unwrap();

    let received = runtime.block_on(async {
        let mut last = None;
        while let Ok(Some(estimate)) =
            tokio::time::timeout(Duration::from_millis(100), stream.next()).await
        {
            last = Some(estimate);
        }
        last
    });
    assert_eq!(received, Some(expected));
}

#[test]
fn test_unbounded_and_telemetry_streams_follow_the_pipeline() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let monitor = BreathingMonitor::new();
    let mut estimates = monitor.estimate_stream_unbounded();
    let mut telemetry = monitor.telemetry_stream();
    monitor.start(MonitorConfig::default()).unwrap();
    common::feed(&monitor, &SyntheticBreathing::new(0.25), 300);
    common::wait_for_drain(&monitor);
    let expected = common::settle_estimate(&monitor);
    monitor.stop().unwrap();

    let (received, saw_estimate_event) = runtime.block_on(async {
        let mut last = None;
        while let Ok(Some(estimate)) =
            tokio::time::timeout(Duration::from_millis(200), estimates.next()).await
        {
            last = Some(estimate);
        }

        let mut saw = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(200), telemetry.next()).await
        {
            if matches!(event, MetricEvent::Estimate { .. }) {
                saw = true;
                break;
            }
        }
        (last, saw)
    });
    assert_eq!(received, Some(expected));
    assert!(saw_estimate_event, "no estimate event on the telemetry stream");
}
