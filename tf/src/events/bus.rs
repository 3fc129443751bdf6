//! Event bus - pub/sub for trip lifecycle events
//!
//! The EventBus uses tokio broadcast channels to deliver events to all
//! subscribers. The transition engine emits, the orchestrator's entry-action
//! subscriber and any observers (loggers, tests) receive.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::TripEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Central event bus for trip lifecycle events
///
/// Emission is fire-and-forget: a send with no subscribers is not an error,
/// and a full channel drops the oldest events.
pub struct EventBus {
    tx: broadcast::Sender<TripEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: TripEvent) {
        debug!(
            event_type = event.event_type(),
            trip_id = event.trip_id(),
            "EventBus::emit"
        );
        // Ignore send errors (no subscribers is OK)
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<TripEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus(capacity: usize) -> Arc<EventBus> {
    Arc::new(EventBus::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Stage;

    #[test]
    fn test_event_bus_subscribe() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx1 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(TripEvent::StageChanged {
            trip_id: "trip-123".to_string(),
            from: Stage::Gathering,
            to: Stage::Planning,
            reason: "member threshold reached".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.trip_id(), "trip-123");
        assert_eq!(event.event_type(), "StageChanged");
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers() {
        let bus = EventBus::new(16);
        // This should not panic even with no subscribers
        bus.emit(TripEvent::StageChanged {
            trip_id: "trip-123".to_string(),
            from: Stage::Planning,
            to: Stage::VotingDestination,
            reason: "destination suggestions complete".to_string(),
        });
    }

    #[tokio::test]
    async fn test_multiple_subscribers_all_receive() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(TripEvent::StageChanged {
            trip_id: "trip-xyz".to_string(),
            from: Stage::VotingDates,
            to: Stage::Planning,
            reason: "date poll closed".to_string(),
        });

        assert_eq!(rx1.recv().await.unwrap().trip_id(), "trip-xyz");
        assert_eq!(rx2.recv().await.unwrap().trip_id(), "trip-xyz");
    }
}
