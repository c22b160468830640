use std::sync::Arc;
use std::time::Instant;

use rtrb::Producer;

use crate::config::IngestConfig;
use crate::engine::clock::TimeSource;
use crate::error::FrameError;
use crate::signal::Sample;
use crate::telemetry::DropReason;

use super::frame::Frame;
use super::reducer::RoiReducer;
use super::sample_queue::QueuedSample;

/// What happened to an accepted frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestOutcome {
    /// Reduced and handed to the pipeline
    Queued(Sample),
    /// Reduced but held back while the camera settles
    WarmingUp { remaining: u32 },
    /// Reduced but not delivered
    Dropped(DropReason),
}

/// Frame-callback side of the pipeline
///
/// Validates a frame, reduces it to a [`Sample`], stamps it, and pushes it
/// onto the sample queue without blocking.
pub struct FrameIngestor {
    capture_width: Option<u32>,
    capture_height: Option<u32>,
    warmup_frames: u32,
    warmup_remaining: u32,
    reducer: RoiReducer,
    producer: Producer<QueuedSample>,
    clock: Arc<dyn TimeSource>,
    session_start: Instant,
    generation: u64,
}

impl FrameIngestor {
    pub fn new(
        config: &IngestConfig,
        producer: Producer<QueuedSample>,
        clock: Arc<dyn TimeSource>,
        session_start: Instant,
        generation: u64,
    ) -> Self {
        Self {
            capture_width: config.capture_width,
            capture_height: config.capture_height,
            warmup_frames: config.warmup_frames,
            warmup_remaining: config.warmup_frames,
            reducer: RoiReducer::new(config.roi, config.channel, config.block_grid),
            producer,
            clock,
            session_start,
            generation,
        }
    }

    /// Validate, reduce, and enqueue one frame for `generation`
    pub fn ingest(
        &mut self,
        frame: &Frame<'_>,
        generation: u64,
    ) -> Result<IngestOutcome, FrameError> {
        frame.validate()?;
        self.check_resolution(frame)?;

        if generation != self.generation {
            self.restart(generation);
        }

        let reduction = self.reducer.reduce(frame)?;

        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            return Ok(IngestOutcome::WarmingUp {
                remaining: self.warmup_remaining,
            });
        }

        let timestamp = match frame.timestamp {
            Some(ts) => ts.as_secs_f64(),
            None => self
                .clock
                .now()
                .saturating_duration_since(self.session_start)
                .as_secs_f64(),
        };
        let sample = Sample::new(timestamp, reduction.value).with_motion(reduction.motion);

        match self.producer.push(QueuedSample { sample, generation }) {
            Ok(()) => Ok(IngestOutcome::Queued(sample)),
            Err(_) => Ok(IngestOutcome::Dropped(DropReason::QueueFull)),
        }
    }

    /// Forget per-frame history and restart warm-up
    pub fn restart(&mut self, generation: u64) {
        self.reducer.reset();
        self.warmup_remaining = self.warmup_frames;
        self.generation = generation;
    }

    fn check_resolution(&self, frame: &Frame<'_>) -> Result<(), FrameError> {
        let expected = (
            self.capture_width.unwrap_or(frame.width),
            self.capture_height.unwrap_or(frame.height),
        );
        if expected != (frame.width, frame.height) {
            return Err(FrameError::DimensionMismatch {
                expected,
                actual: (frame.width, frame.height),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::PixelFormat;
    use crate::capture::sample_queue::{SampleQueue, SampleQueueChannels};
    use crate::engine::clock::StubTimeSource;
    use std::time::Duration;

    fn ingestor_with(config: IngestConfig, capacity: usize) -> (FrameIngestor, rtrb::Consumer<QueuedSample>) {
        let SampleQueueChannels { producer, consumer } = SampleQueue::new(capacity);
        let clock: Arc<dyn TimeSource> =
            Arc::new(StubTimeSource::with_step(Duration::from_millis(100)));
        let start = clock.now();
        (
            FrameIngestor::new(&config, producer, clock, start, 0),
            consumer,
        )
    }

    #[test]
    fn test_queues_reduced_sample() {
        let (mut ingestor, mut consumer) = ingestor_with(IngestConfig::default(), 8);
        let data = vec![42u8; 16 * 16];
        let frame = Frame::new(&data, 16, 16, PixelFormat::Gray8)
            .with_timestamp(Duration::from_millis(1500));

        let outcome = ingestor.ingest(&frame, 0).unwrap();
        let queued = consumer.pop().unwrap();
        assert_eq!(outcome, IngestOutcome::Queued(queued.sample));
        assert_eq!(queued.sample.timestamp, 1.5);
        assert!((queued.sample.value - 42.0).abs() < 1e-9);
        assert_eq!(queued.generation, 0);
    }

    #[test]
    fn test_missing_timestamp_uses_clock() {
        let (mut ingestor, mut consumer) = ingestor_with(IngestConfig::default(), 8);
        let data = vec![10u8; 8 * 8];
        let frame = Frame::new(&data, 8, 8, PixelFormat::Gray8);
        ingestor.ingest(&frame, 0).unwrap();
        ingestor.ingest(&frame, 0).unwrap();
        let first = consumer.pop().unwrap().sample.timestamp;
        let second = consumer.pop().unwrap().sample.timestamp;
        assert!((second - first - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_wrong_resolution() {
        let config = IngestConfig {
            capture_width: Some(640),
            capture_height: Some(480),
            ..IngestConfig::default()
        };
        let (mut ingestor, _consumer) = ingestor_with(config, 8);
        let data = vec![0u8; 320 * 240];
        let frame = Frame::new(&data, 320, 240, PixelFormat::Gray8);
        assert_eq!(
            ingestor.ingest(&frame, 0),
            Err(FrameError::DimensionMismatch {
                expected: (640, 480),
                actual: (320, 240)
            })
        );
    }

    #[test]
    fn test_warmup_holds_back_frames() {
        let config = IngestConfig {
            warmup_frames: 2,
            ..IngestConfig::default()
        };
        let (mut ingestor, mut consumer) = ingestor_with(config, 8);
        let data = vec![0u8; 8 * 8];
        let frame = Frame::new(&data, 8, 8, PixelFormat::Gray8);

        assert_eq!(
            ingestor.ingest(&frame, 0).unwrap(),
            IngestOutcome::WarmingUp { remaining: 1 }
        );
        assert_eq!(
            ingestor.ingest(&frame, 0).unwrap(),
            IngestOutcome::WarmingUp { remaining: 0 }
        );
        assert!(matches!(
            ingestor.ingest(&frame, 0).unwrap(),
            IngestOutcome::Queued(_)
        ));
        assert!(consumer.pop().is_ok());
        assert!(consumer.pop().is_err());

        // New generation restarts warm-up
        assert_eq!(
            ingestor.ingest(&frame, 1).unwrap(),
            IngestOutcome::WarmingUp { remaining: 1 }
        );
    }

    #[test]
    fn test_full_queue_drops_sample() {
        let (mut ingestor, _consumer) = ingestor_with(IngestConfig::default(), 1);
        let data = vec![0u8; 8 * 8];
        let frame = Frame::new(&data, 8, 8, PixelFormat::Gray8);
        assert!(matches!(
            ingestor.ingest(&frame, 0).unwrap(),
            IngestOutcome::Queued(_)
        ));
        assert_eq!(
            ingestor.ingest(&frame, 0).unwrap(),
            IngestOutcome::Dropped(DropReason::QueueFull)
        );
    }
}
