//! # Event bus for broadcasting session events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from the controller and the session.
//!
//! ## Architecture
//! ```text
//! Publishers:                          Subscribers:
//!   LifecycleController ──┐
//!   Session             ──┼──► Bus ──► subscriber_listener ──► SubscriberSet
//!   signal forwarder    ──┘    (broadcast)   (in Session)
//!                                  └──────► any Bus::subscribe() receiver
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.
//!
//! The bus is observability only. Lifecycle signals from the platform travel
//! through the [`EventBridge`](crate::core::EventBridge), never through here.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for session events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (min 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    ///
    /// A receiver only gets events **sent after** it subscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_receivers_see_events_after_subscribe() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::StartRequested));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::StartCompleted));

        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::StartCompleted);
        assert!(rx.try_recv().is_err());
    }
}
