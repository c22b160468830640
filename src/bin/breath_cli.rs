use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use breathing_rate::analysis::{PipelineStats, RateEstimator};
use breathing_rate::capture::{IngestOutcome, PixelFormat};
use breathing_rate::config::MonitorConfig;
use breathing_rate::engine::BreathingMonitor;
use breathing_rate::fixtures::{SampleTrace, SyntheticBreathing};
use breathing_rate::state::{RateEstimate, RateStatus};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "breath_cli",
    about = "Deterministic harness for the breathing-rate pipeline"
)]
struct Cli {
    /// JSON configuration file (defaults are used when absent or invalid)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log pipeline activity to stderr
    #[arg(long)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Push synthetic frames through the threaded pipeline and report the estimates
    Simulate {
        #[arg(long, default_value_t = 15.0)]
        rate_bpm: f64,
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
        /// Peak per-frame noise in pixel levels
        #[arg(long, default_value_t = 0.8)]
        noise: f64,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        #[arg(long, value_enum, default_value_t = FormatArg::Gray8)]
        format: FormatArg,
        /// Wall-clock pause between frames
        #[arg(long, default_value_t = 1)]
        pace_ms: u64,
        /// Fail with exit code 2 unless the final estimate is valid and within tolerance
        #[arg(long)]
        expect_bpm: Option<f64>,
        #[arg(long, default_value_t = 1.0)]
        tolerance: f64,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Write the buffered signal as a JSON sample trace
        #[arg(long)]
        save_trace: Option<PathBuf>,
    },
    /// Estimate the rate of a JSON sample trace
    Analyze {
        #[arg(long)]
        trace: PathBuf,
    },
    /// Print the effective configuration
    DumpConfig,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Gray8,
    Rgb8,
    Rgba8,
    Yuv420,
}

impl From<FormatArg> for PixelFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Gray8 => PixelFormat::Gray8,
            FormatArg::Rgb8 => PixelFormat::Rgb8,
            FormatArg::Rgba8 => PixelFormat::Rgba8,
            FormatArg::Yuv420 => PixelFormat::Yuv420,
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    if cli.verbose {
        breathing_rate::init_logging();
    }

    let config = match &cli.config {
        Some(path) => MonitorConfig::load_from_file(path),
        None => MonitorConfig::default(),
    };

    match cli.command {
        Commands::Simulate {
            rate_bpm,
            seconds,
            fps,
            noise,
            seed,
            format,
            pace_ms,
            expect_bpm,
            tolerance,
            output,
            save_trace,
        } => {
            let recipe = SyntheticBreathing {
                breathing_hz: rate_bpm / 60.0,
                fps,
                noise,
                seed,
                format: format.into(),
                ..SyntheticBreathing::new(rate_bpm / 60.0)
            };
            let report = run_simulate(config, &recipe, seconds, Duration::from_millis(pace_ms))?;

            if let Some(path) = save_trace {
                let mut trace = SampleTrace::new(report.trace.clone());
                trace.description = Some(format!("synthetic {:.1} bpm", rate_bpm));
                trace.save(&path)?;
            }
            emit_json(&report, output)?;

            match expect_bpm {
                Some(expected) if !matches_expectation(&report.final_estimate, expected, tolerance) => {
                    eprintln!(
                        "Expected {:.1} +/- {:.1} bpm (valid), got {:.2} bpm ({})",
                        expected,
                        tolerance,
                        report.final_estimate.rate_bpm,
                        report.final_estimate.status
                    );
                    Ok(ExitCode::from(2))
                }
                _ => Ok(ExitCode::from(0)),
            }
        }
        Commands::Analyze { trace } => run_analyze(config, trace),
        Commands::DumpConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
    }
}

fn run_simulate(
    config: MonitorConfig,
    recipe: &SyntheticBreathing,
    seconds: f64,
    pace: Duration,
) -> Result<SimulationReport> {
    let monitor = Arc::new(BreathingMonitor::new());
    let mut estimates_rx = monitor.subscribe_estimates();
    monitor.start(config).context("starting monitor")?;

    let frame_count = (seconds * recipe.fps).round() as usize;
    let mut rejected = 0usize;
    let mut dropped = 0usize;
    for frame in recipe.frames(frame_count) {
        match monitor.ingest(
            &frame.data,
            frame.width,
            frame.height,
            frame.format,
            Some(frame.timestamp),
        ) {
            Ok(IngestOutcome::Dropped(_)) => dropped += 1,
            Ok(_) => {}
            Err(_) => rejected += 1,
        }
        if !pace.is_zero() {
            thread::sleep(pace);
        }
    }

    wait_for_drain(&monitor, Duration::from_secs(5))?;
    let final_estimate = monitor
        .estimate_now()
        .unwrap_or_else(|| monitor.latest_estimate());
    let trace = monitor.signal_snapshot();
    monitor.stop().context("stopping monitor")?;

    let mut estimates = Vec::new();
    while let Ok(estimate) = estimates_rx.try_recv() {
        estimates.push(estimate);
    }

    Ok(SimulationReport {
        frames: frame_count,
        frames_rejected: rejected,
        samples_dropped: dropped,
        final_estimate,
        estimates,
        stats: monitor.stats().pipeline,
        trace,
    })
}

/// Wait until the ingest worker has consumed every queued sample
fn wait_for_drain(monitor: &BreathingMonitor, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let stats = monitor.stats().pipeline;
        let consumed = stats.samples_appended + stats.samples_out_of_order + stats.samples_stale;
        if consumed >= stats.samples_queued {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!(
                "pipeline did not drain: {} of {} samples consumed",
                consumed,
                stats.samples_queued
            );
        }
        thread::sleep(Duration::from_millis(2));
    }
}

fn run_analyze(config: MonitorConfig, trace_path: PathBuf) -> Result<ExitCode> {
    let trace = SampleTrace::load(&trace_path)?;
    let newest = trace.samples.last().map(|s| s.timestamp).unwrap_or(0.0);
    let estimator = RateEstimator::new(config.estimator);
    let estimate = estimator.estimate(&trace.samples, newest);
    println!("{}", serde_json::to_string_pretty(&estimate)?);
    Ok(ExitCode::from(0))
}

fn matches_expectation(estimate: &RateEstimate, expected: f64, tolerance: f64) -> bool {
    estimate.status == RateStatus::Valid && (estimate.rate_bpm - expected).abs() <= tolerance
}

fn emit_json<T: Serialize>(report: &T, output_path: Option<PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;

    if let Some(path) = output_path {
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }

    Ok(())
}

#[derive(Serialize)]
struct SimulationReport {
    frames: usize,
    frames_rejected: usize,
    samples_dropped: usize,
    final_estimate: RateEstimate,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    estimates: Vec<RateEstimate>,
    stats: PipelineStats,
    #[serde(skip)]
    trace: Vec<breathing_rate::signal::Sample>,
}
