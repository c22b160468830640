//! Fixture utilities for the deterministic CLI harness and tests.
//!
//! This module synthesizes camera frames whose ROI brightness follows a
//! breathing waveform plus seeded noise, and loads/saves JSON sample traces
//! for offline estimation. It is intentionally desktop-focused to support
//! CI and QA workflows.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::capture::PixelFormat;
use crate::signal::Sample;

/// Per-pixel dither so ROI means are not stuck on integer levels
const PIXEL_JITTER: f64 = 2.0;

/// Recipe for a synthetic breathing recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticBreathing {
    pub breathing_hz: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Mean pixel level
    pub baseline: f64,
    /// Peak deviation of the breathing waveform in pixel levels
    pub amplitude: f64,
    /// Peak uniform per-frame noise in pixel levels
    pub noise: f64,
    pub seed: u64,
}

impl SyntheticBreathing {
    pub fn new(breathing_hz: f64) -> Self {
        Self {
            breathing_hz,
            fps: 30.0,
            width: 64,
            height: 48,
            format: PixelFormat::Gray8,
            baseline: 120.0,
            amplitude: 8.0,
            // 10% of the breathing amplitude
            noise: 0.8,
            seed: 7,
        }
    }

    /// Signal without a breathing component, noise only.
    pub fn noise_only(seed: u64) -> Self {
        Self {
            amplitude: 0.0,
            noise: 4.0,
            seed,
            ..Self::new(0.0)
        }
    }

    /// Ideal ROI level at time `t` before noise.
    pub fn level_at(&self, t: f64) -> f64 {
        self.baseline + self.amplitude * (2.0 * std::f64::consts::PI * self.breathing_hz * t).sin()
    }

    /// Iterator over `count` frames spaced at `1 / fps`.
    pub fn frames(&self, count: usize) -> SyntheticFrames<'_> {
        SyntheticFrames {
            recipe: self,
            rng: StdRng::seed_from_u64(self.seed),
            index: 0,
            count,
        }
    }

    /// Scalar trace of `seconds` of signal, bypassing frame reduction.
    pub fn samples(&self, seconds: f64) -> Vec<Sample> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = self.noise;
        let count = (seconds * self.fps).round() as usize;
        (0..count)
            .map(|i| {
                let t = i as f64 / self.fps;
                let jitter = if noise > 0.0 {
                    rng.gen_range(-noise..noise)
                } else {
                    0.0
                };
                Sample::new(t, self.level_at(t) + jitter)
            })
            .collect()
    }
}

/// One generated frame with its capture timestamp.
#[derive(Debug, Clone)]
pub struct SyntheticFrame {
    pub index: usize,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub timestamp: Duration,
}

pub struct SyntheticFrames<'a> {
    recipe: &'a SyntheticBreathing,
    rng: StdRng,
    index: usize,
    count: usize,
}

impl Iterator for SyntheticFrames<'_> {
    type Item = SyntheticFrame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let recipe = self.recipe;
        let t = self.index as f64 / recipe.fps;
        let noise = recipe.noise;
        let frame_offset = if noise > 0.0 {
            self.rng.gen_range(-noise..noise)
        } else {
            0.0
        };
        let level = recipe.level_at(t) + frame_offset;

        let pixels = recipe.width as usize * recipe.height as usize;
        let len = recipe
            .format
            .frame_len(recipe.width, recipe.height)
            .unwrap_or(0);
        let mut data = vec![128u8; len];

        let pixel = |rng: &mut StdRng| -> u8 {
            let value = level + rng.gen_range(-PIXEL_JITTER..PIXEL_JITTER);
            value.round().clamp(0.0, 255.0) as u8
        };

        match recipe.format {
            PixelFormat::Gray8 | PixelFormat::Yuv420 => {
                // Luma plane first; chroma stays neutral
                for byte in data.iter_mut().take(pixels) {
                    *byte = pixel(&mut self.rng);
                }
            }
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => {
                let stride = if recipe.format == PixelFormat::Rgb8 { 3 } else { 4 };
                for px in data.chunks_exact_mut(stride) {
                    let value = pixel(&mut self.rng);
                    px[0] = value;
                    px[1] = value;
                    px[2] = value;
                    if stride == 4 {
                        px[3] = 255;
                    }
                }
            }
        }

        let frame = SyntheticFrame {
            index: self.index,
            data,
            width: recipe.width,
            height: recipe.height,
            format: recipe.format,
            timestamp: Duration::from_secs_f64(t),
        };
        self.index += 1;
        Some(frame)
    }
}

/// JSON sample trace for offline analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTrace {
    #[serde(default)]
    pub description: Option<String>,
    pub samples: Vec<Sample>,
}

impl SampleTrace {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            description: None,
            samples,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading sample trace {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing sample trace {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("serializing sample trace")?;
        fs::write(path, json).with_context(|| format!("writing sample trace {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Frame;

    #[test]
    fn test_frames_are_valid_and_timestamped() {
        let recipe = SyntheticBreathing::new(0.25);
        let frames: Vec<_> = recipe.frames(5).collect();
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            let borrowed = Frame::new(&frame.data, frame.width, frame.height, frame.format);
            assert!(borrowed.validate().is_ok());
            assert_eq!(frame.timestamp, Duration::from_secs_f64(i as f64 / 30.0));
        }
    }

    #[test]
    fn test_frames_are_reproducible() {
        let recipe = SyntheticBreathing::new(0.25);
        let a: Vec<_> = recipe.frames(3).map(|f| f.data).collect();
        let b: Vec<_> = recipe.frames(3).map(|f| f.data).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rgb_frames_have_expected_length() {
        let recipe = SyntheticBreathing {
            format: PixelFormat::Rgba8,
            ..SyntheticBreathing::new(0.3)
        };
        let frame = recipe.frames(1).next().unwrap();
        assert_eq!(frame.data.len(), 64 * 48 * 4);
        assert!(frame.data.chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn test_noise_only_has_no_breathing_component() {
        let recipe = SyntheticBreathing::noise_only(3);
        assert_eq!(recipe.amplitude, 0.0);
        assert_eq!(recipe.level_at(1.0), recipe.baseline);
        assert!(recipe.noise > 0.0);
    }

    #[test]
    fn test_trace_file_round_trip() {
        let trace = SampleTrace {
            description: Some("short".to_string()),
            ..SampleTrace::new(SyntheticBreathing::new(0.25).samples(1.0))
        };
        let path = std::env::temp_dir().join(format!(
            "breathing_trace_{}.json",
            std::process::id()
        ));
        trace.save(&path).unwrap();
        let loaded = SampleTrace::load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded.description, trace.description);
        assert_eq!(loaded.samples.len(), trace.samples.len());
        for (a, b) in loaded.samples.iter().zip(&trace.samples) {
            assert!((a.timestamp - b.timestamp).abs() < 1e-12);
            assert!((a.value - b.value).abs() < 1e-9);
        }
    }

    #[test]
    fn test_missing_trace_reports_path() {
        let err = SampleTrace::load("/nonexistent/trace.json").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/trace.json"));
    }
}
