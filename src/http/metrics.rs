use std::fmt::Write;

use crate::engine::core::MonitorStats;
use crate::state::RateEstimate;
use crate::telemetry::{MetricEvent, TelemetrySnapshot};

/// Render monitor counters and the latest estimate in Prometheus text format.
pub fn render_prometheus_metrics(
    stats: &MonitorStats,
    estimate: &RateEstimate,
    snapshot: &TelemetrySnapshot,
) -> String {
    let mut out = PrometheusText::default();

    out.gauge("breathing_running", "Pipeline threads active", flag(stats.running));
    out.gauge("breathing_generation", "Current session generation", stats.generation as f64);
    out.gauge("breathing_uptime_ms", "Milliseconds since monitor creation", stats.uptime_ms as f64);
    out.gauge("breathing_buffered_samples", "Samples in the signal buffer", stats.buffered_samples as f64);
    out.gauge(
        "breathing_buffer_span_seconds",
        "Signal time covered by the buffer",
        stats.buffer_span_seconds,
    );

    let p = &stats.pipeline;
    out.counter("breathing_frames_received_total", "Frames handed to ingest", p.frames_received);
    out.counter("breathing_frames_rejected_total", "Frames failing validation", p.frames_rejected);
    out.counter("breathing_samples_appended_total", "Samples stored in the buffer", p.samples_appended);
    out.counter("breathing_samples_dropped_total", "Samples lost before the buffer", p.samples_dropped);
    out.counter("breathing_estimations_total", "Estimates stored", p.estimations_completed);
    out.counter("breathing_estimations_skipped_total", "Triggers skipped while busy", p.estimations_skipped);
    out.counter("breathing_estimates_discarded_total", "Estimates retired by reset", p.estimates_discarded);

    out.gauge("breathing_rate_bpm", "Latest breathing rate", estimate.rate_bpm);
    out.gauge("breathing_rate_status", "0 no data, 1 low confidence, 2 valid", estimate.status as u8 as f64);
    out.gauge("breathing_peak_ratio", "Dominant peak over noise floor", estimate.peak_ratio);

    let queue = snapshot.recent.iter().rev().find_map(|event| match event {
        MetricEvent::QueueOccupancy { percent } => Some(*percent),
        _ => None,
    });
    if let Some(percent) = queue {
        out.gauge("breathing_queue_occupancy_percent", "Sample queue fill level", f64::from(percent));
    }

    let latency = snapshot.estimation_latency;
    if latency.window > 0 {
        out.gauge("breathing_estimation_latency_avg_ms", "Rolling mean estimation time", f64::from(latency.avg_ms));
        out.gauge("breathing_estimation_latency_max_ms", "Rolling max estimation time", f64::from(latency.max_ms));
    }

    out.counter("breathing_telemetry_events_total", "Telemetry events published", snapshot.total_events);
    out.into_string()
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[derive(Default)]
struct PrometheusText {
    output: String,
}

impl PrometheusText {
    fn gauge(&mut self, name: &str, help: &str, value: f64) {
        self.header(name, help, "gauge");
        let _ = writeln!(self.output, "{name} {value}");
    }

    fn counter(&mut self, name: &str, help: &str, value: u64) {
        self.header(name, help, "counter");
        let _ = writeln!(self.output, "{name} {value}");
    }

    fn header(&mut self, name: &str, help: &str, kind: &str) {
        let _ = writeln!(self.output, "# HELP {name} {help}");
        let _ = writeln!(self.output, "# TYPE {name} {kind}");
    }

    fn into_string(self) -> String {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BreathingMonitor;
    use crate::telemetry::TelemetryHub;

    #[test]
    fn renders_counters_and_estimate() {
        let monitor = BreathingMonitor::new();
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_queue_occupancy(40.0);

        let text = render_prometheus_metrics(&monitor.stats(), &monitor.latest_estimate(), &hub.snapshot());

        assert!(text.contains("# TYPE breathing_frames_received_total counter"));
        assert!(text.contains("breathing_rate_status 0\n"));
        assert!(text.contains("breathing_running 0\n"));
        assert!(text.contains("breathing_queue_occupancy_percent 40\n"));
        assert!(!text.contains("breathing_estimation_latency_avg_ms"));
    }
}
