// SampleQueue - lock-free handoff from the frame callback to the pipeline
//
// A single SPSC (Single Producer Single Consumer) ring buffer carries reduced
// samples out of the camera callback. The callback side only ever does a
// wait-free push; when the ring is full the sample is dropped instead of
// waiting for the ingest worker.
//
// Sample flow:
// 1. Camera callback reduces a frame to a Sample
// 2. Callback pushes (sample, generation) to the queue, or drops it if full
// 3. Ingest worker pops, discards stale generations, appends to SignalBuffer

use rtrb::{Consumer, Producer};

use crate::signal::Sample;

/// Configuration constants for the sample queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A reduced sample tagged with the session generation it was captured in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedSample {
    pub sample: Sample,
    pub generation: u64,
}

/// Split queue endpoints for producer/consumer separation
///
/// Returned by SampleQueue::new(); the producer moves into the frame
/// ingestor and the consumer into the ingest worker thread.
pub struct SampleQueueChannels {
    /// Producer for pushing samples from the frame callback
    pub producer: Producer<QueuedSample>,
    /// Consumer for draining samples in the ingest worker
    pub consumer: Consumer<QueuedSample>,
}

/// Lock-free sample queue using a single SPSC ring buffer
///
/// # Thread Safety
/// - Lock-free: No mutex locks in queue operations
/// - Wait-free: Push/pop operations have bounded execution time
///
/// # Example
/// ```ignore
/// let SampleQueueChannels { mut producer, mut consumer } = SampleQueue::new(256);
///
/// // In the frame callback:
/// if producer.push(queued).is_err() {
///     // queue full, sample dropped
/// }
///
/// // In the ingest worker:
/// while let Ok(queued) = consumer.pop() {
///     buffer.append(queued.sample);
/// }
/// ```
pub struct SampleQueue;

impl SampleQueue {
    /// Create a new queue holding at most `capacity` pending samples
    ///
    /// # Panics
    /// Panics if capacity is 0
    #[allow(clippy::new_ret_no_self)]
    pub fn new(capacity: usize) -> SampleQueueChannels {
        assert!(capacity > 0, "capacity must be greater than 0");

        let (producer, consumer) = rtrb::RingBuffer::new(capacity);

        SampleQueueChannels { producer, consumer }
    }
}

/// Percentage of the queue currently holding unread samples
pub fn occupancy_percent(consumer: &Consumer<QueuedSample>, capacity: usize) -> f32 {
    if capacity == 0 {
        return 0.0;
    }
    (consumer.slots() as f32 / capacity as f32 * 100.0).clamp(0.0, 100.0)
}
