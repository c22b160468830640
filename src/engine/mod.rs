//! Engine module housing the breathing-rate monitor.
//!
//! This module exposes the time sources used to stamp frames (`clock`) and
//! the `BreathingMonitor` orchestration layer (`core`) shared by the JNI,
//! HTTP and CLI entry points.

pub mod clock;
pub mod core;

pub use clock::{StubTimeSource, SystemTimeSource, TimeSource};
pub use core::{BreathingMonitor, MonitorStats};
