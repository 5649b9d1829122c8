//! # Subscriber fan-out.
//!
//! [`SubscriberSet`] hands every event to each registered [`Subscribe`]
//! implementation through its own bounded queue and worker task, so a slow
//! log shipper never holds up the daemon's listener.
//!
//! ```text
//! emit(ev) ──try_send──► queue "log" ───► worker ──► LogWriter::on_event
//!          └─try_send──► queue "stats" ─► worker ──► Stats::on_event
//!                                            └── panic ──► SubscriberPanicked on the bus
//! ```
//!
//! ## Rules
//! - A full or closed queue drops the event for that subscriber only and
//!   publishes `SubscriberOverflow`, except for overflow events themselves
//! - Each subscriber observes events in emission order
//! - A panicking subscriber keeps its worker; the panic is caught with
//!   `AssertUnwindSafe`, so state it held a lock on may be left inconsistent

use std::any::Any;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

struct Queue {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Queues and workers for a fixed list of subscribers.
pub struct SubscriberSet {
    queues: Vec<Queue>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (queues, workers) = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let queue = Queue {
                    name: sub.name(),
                    tx,
                };
                (queue, spawn_worker(sub, rx, bus.clone()))
            })
            .unzip();

        Self {
            queues,
            workers,
            bus,
        }
    }

    /// `true` when no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Queues a copy of `event` for every subscriber.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Queues a shared event for every subscriber without copying it.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let overflow = event.is_subscriber_overflow();
        for queue in &self.queues {
            let reason = match queue.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            if !overflow {
                self.bus
                    .publish(Event::subscriber_overflow(queue.name, reason));
            }
        }
    }

    /// Closes every queue and waits for the workers to drain what is left.
    pub async fn shutdown(self) {
        let Self { queues, workers, .. } = self;
        drop(queues);
        for worker in workers {
            let _ = worker.await;
        }
    }
}

fn spawn_worker(
    sub: Arc<dyn Subscribe>,
    mut rx: mpsc::Receiver<Arc<Event>>,
    bus: Bus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            let delivery = std::panic::AssertUnwindSafe(sub.on_event(&ev)).catch_unwind();
            if let Err(payload) = delivery.await {
                bus.publish(Event::subscriber_panicked(sub.name(), panic_message(&*payload)));
            }
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
