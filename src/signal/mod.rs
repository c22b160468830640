// Signal module - time-windowed history of per-frame samples
//
// The ingest worker appends one Sample per accepted frame; the estimation
// thread copies out a snapshot. The buffer is bounded by signal time, not
// by count, so its memory follows frame rate times retention window.

pub mod buffer;
pub mod sample;

pub use buffer::{AppendOutcome, SignalBuffer};
pub use sample::Sample;
