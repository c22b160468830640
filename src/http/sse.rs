use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::engine::core::BreathingMonitor;

pub type EstimateStream = Sse<Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>>;

/// Build a Server-Sent Events stream of rate estimates.
pub fn estimates(monitor: &BreathingMonitor) -> EstimateStream {
    let receiver = monitor.subscribe_estimates();

    let stream = BroadcastStream::new(receiver).filter_map(|result| async move {
        match result {
            Ok(estimate) => match serde_json::to_string(&estimate) {
                Ok(payload) => Some(Ok(Event::default().event("estimate").data(payload))),
                Err(_) => None,
            },
            Err(_) => None,
        }
    });

    Sse::new(Box::pin(stream) as Pin<Box<_>>).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(5))
            .text("debug-keepalive"),
    )
}
