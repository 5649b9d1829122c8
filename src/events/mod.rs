//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the daemon, the handler
//! registry and every protocol instance.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Daemon`, `ProtocolInstance`, discovery, `SubscriberSet`
//!   workers (overflow/panic).
//! - **Consumers**: the daemon's subscriber listener (fans out to `SubscriberSet`)
//!   and anything holding [`Bus::subscribe`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
