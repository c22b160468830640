// Capture module - frame validation and reduction at the camera boundary
//
// Architecture:
// - Frame: borrowed pixel buffer plus dimensions, format and timestamp
// - RoiReducer: frame -> (intensity, motion) over a block grid
// - FrameIngestor: validate -> reduce -> stamp -> wait-free push
// - SampleQueue: SPSC ring buffer into the ingest worker thread

pub mod frame;
pub mod ingestor;
pub mod reducer;
pub mod sample_queue;

pub use frame::{Frame, PixelFormat};
pub use ingestor::{FrameIngestor, IngestOutcome};
pub use reducer::{Reduction, RoiReducer};
pub use sample_queue::{QueuedSample, SampleQueue, SampleQueueChannels};
