//! Broadcast pub/sub of thing events
//!
//! Integrations fire [`Event`]s onto the bus; the rule runner and any other
//! consumer subscribe to the stream of all events.

use hub_core::Event;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity for event subscriptions
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The event bus for thing events
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the given channel capacity
    ///
    /// Subscribers falling further behind than `capacity` events lag and
    /// skip the oldest ones.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events fired from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        trace!("New event subscriber");
        self.sender.subscribe()
    }

    /// Fire an event to all subscribers
    pub fn fire(&self, event: Event) {
        debug!(
            thing_id = %event.thing_id,
            event_type_id = %event.event_type_id,
            state_change = event.state_change,
            "Firing event"
        );

        // No active receivers is not an error
        let _ = self.sender.send(event);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;
