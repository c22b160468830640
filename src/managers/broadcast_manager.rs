// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Broadcast channel lifecycle and subscription

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::state::RateEstimate;

/// Buffer size for the estimate channel
///
/// At one estimate per second this holds well over a minute of history for
/// a slow subscriber before it starts lagging.
const ESTIMATE_CHANNEL_CAPACITY: usize = 100;

/// Manages the tokio broadcast channels fed by the pipeline
///
/// # Channel Types
/// - Estimates: every stored RateEstimate, including NoData after a reset
pub struct BroadcastChannelManager {
    estimates: Arc<Mutex<Option<broadcast::Sender<RateEstimate>>>>,
}

impl BroadcastChannelManager {
    /// Create a new BroadcastChannelManager with all channels uninitialized
    ///
    /// Channels must be explicitly initialized via init_* methods before use.
    pub fn new() -> Self {
        Self {
            estimates: Arc::new(Mutex::new(None)),
        }
    }

    // ========================================================================
    // ESTIMATE CHANNEL
    // ========================================================================

    /// Initialize the estimate broadcast channel
    ///
    /// Replaces any existing channel; receivers of the old channel see it
    /// close once its last sender is dropped.
    pub fn init_estimates(&self) -> broadcast::Sender<RateEstimate> {
        let (tx, _) = broadcast::channel(ESTIMATE_CHANNEL_CAPACITY);
        *lock(&self.estimates) = Some(tx.clone());
        tx
    }

    /// Sender for the estimate channel, initializing it on first use
    pub fn estimates_sender(&self) -> broadcast::Sender<RateEstimate> {
        let mut guard = lock(&self.estimates);
        match guard.as_ref() {
            Some(tx) => tx.clone(),
            None => {
                let (tx, _) = broadcast::channel(ESTIMATE_CHANNEL_CAPACITY);
                *guard = Some(tx.clone());
                tx
            }
        }
    }

    /// Subscribe to estimates
    ///
    /// # Returns
    /// `None` if init_estimates() has not been called yet
    pub fn subscribe_estimates(&self) -> Option<broadcast::Receiver<RateEstimate>> {
        lock(&self.estimates).as_ref().map(|tx| tx.subscribe())
    }

    /// Number of live estimate subscribers
    pub fn estimate_subscribers(&self) -> usize {
        lock(&self.estimates)
            .as_ref()
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|err| err.into_inner())
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_before_init_returns_none() {
        let manager = BroadcastChannelManager::new();
        assert!(manager.subscribe_estimates().is_none());
        assert_eq!(manager.estimate_subscribers(), 0);
    }

    #[test]
    fn test_estimates_reach_every_subscriber() {
        let manager = BroadcastChannelManager::new();
        let tx = manager.init_estimates();
        let mut first = manager.subscribe_estimates().unwrap();
        let mut second = manager.subscribe_estimates().unwrap();
        assert_eq!(manager.estimate_subscribers(), 2);

        let estimate = RateEstimate::no_data(3.0, 1);
        tx.send(estimate).unwrap();
        assert_eq!(first.try_recv().unwrap(), estimate);
        assert_eq!(second.try_recv().unwrap(), estimate);
    }

    #[test]
    fn test_sender_reuses_existing_channel() {
        let manager = BroadcastChannelManager::new();
        let mut rx = {
            manager.init_estimates();
            manager.subscribe_estimates().unwrap()
        };
        manager
            .estimates_sender()
            .send(RateEstimate::default())
            .unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
