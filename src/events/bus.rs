//! # Event bus.
//!
//! Every protocol instance, the discovery pass and the daemon itself publish
//! [`Event`]s on one shared [`Bus`]. The daemon keeps a single receiver that
//! forwards to the [`SubscriberSet`](crate::SubscriberSet); tests subscribe
//! directly.
//!
//! ```text
//!   instance "wan" ──┐
//!   instance "lan" ──┼──► Bus (broadcast ring) ──► daemon listener ──► SubscriberSet
//!   discovery      ──┤
//!   daemon         ──┘
//! ```
//!
//! Publishing never waits. A receiver that falls more than `capacity` events
//! behind sees `RecvError::Lagged(n)` and loses the `n` oldest events; events
//! sent while nobody listens are gone.

use tokio::sync::broadcast;

use super::event::Event;

/// Shared publisher handle; clones publish into the same channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus holding up to `capacity` undelivered events (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes `ev`; dropped when nobody is subscribed.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Returns a receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_only_see_later_events() {
        let bus = Bus::new(8);
        bus.publish(Event::new(EventKind::LinkUp));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::Down).with_iface("wan"));

        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::Down);
        assert_eq!(ev.iface.as_deref(), Some("wan"));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let bus = Bus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::LinkLost));
        assert!(rx.try_recv().is_ok());
    }
}
