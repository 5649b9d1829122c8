//! # Instance registry.
//!
//! Maps interface names to running instance actors. The registry owns each
//! actor's join handle and cancellation token; callers only ever see the
//! cloneable [`InstanceHandle`].
//!
//! ## Rules
//! - At most one instance per interface name
//! - Removal always joins the actor and publishes `InstanceDetached`
//! - An actor that panicked is reported as `InstanceDetached` with reason `actor_panic`

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::actor::{ActorExit, InstanceHandle};
use crate::events::{Bus, Event, EventKind};

/// One attached instance.
pub(crate) struct Entry {
    pub(crate) handle: InstanceHandle,
    pub(crate) join: JoinHandle<ActorExit>,
    pub(crate) cancel: CancellationToken,
}

/// Name → running instance.
pub(crate) struct InstanceRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    bus: Bus,
}

impl InstanceRegistry {
    pub(crate) fn new(bus: Bus) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Inserts the entry built by `make` unless `iface` is already taken.
    ///
    /// `make` runs under the write lock, so two attaches for one interface
    /// cannot both succeed.
    pub(crate) async fn insert_with<E>(
        &self,
        iface: &str,
        make: impl FnOnce() -> Result<Entry, E>,
        taken: impl FnOnce() -> E,
    ) -> Result<InstanceHandle, E> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(iface) {
            return Err(taken());
        }
        let entry = make()?;
        let handle = entry.handle.clone();
        entries.insert(iface.to_string(), entry);
        Ok(handle)
    }

    pub(crate) async fn get(&self, iface: &str) -> Option<InstanceHandle> {
        self.entries.read().await.get(iface).map(|e| e.handle.clone())
    }

    /// Sorted interface names.
    pub(crate) async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub(crate) async fn handles(&self) -> Vec<InstanceHandle> {
        self.entries
            .read()
            .await
            .values()
            .map(|e| e.handle.clone())
            .collect()
    }

    /// Removes `iface` and joins its actor. The actor must already be stopping.
    pub(crate) async fn remove(&self, iface: &str) -> bool {
        let entry = self.entries.write().await.remove(iface);
        match entry {
            Some(entry) => {
                self.join_and_report(iface, entry.join).await;
                true
            }
            None => false,
        }
    }

    /// Cancels every actor and joins them all.
    pub(crate) async fn cancel_all(&self) {
        let drained: Vec<(String, Entry)> = self.entries.write().await.drain().collect();

        for (_, entry) in &drained {
            entry.cancel.cancel();
        }
        for (iface, entry) in drained {
            self.join_and_report(&iface, entry.join).await;
        }
    }

    async fn join_and_report(&self, iface: &str, join: JoinHandle<ActorExit>) {
        let mut ev = Event::new(EventKind::InstanceDetached).with_iface(iface);
        match join.await {
            Ok(ActorExit::Cancelled) => ev = ev.with_reason("cancelled"),
            Ok(_) => {}
            Err(_) => ev = ev.with_reason("actor_panic"),
        }
        self.bus.publish(ev);
    }
}
