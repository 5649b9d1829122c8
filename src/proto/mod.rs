//! # Protocol instances.
//!
//! The per-interface lifecycle machine and everything it talks to:
//!
//! - [`ProtocolInstance`] - state machine, process supervision, notification dispatch
//! - [`ProtoState`], [`ProtoCommand`] - lifecycle states and manager commands
//! - [`Interface`] - interface-manager collaborator (link events, devices, IP, routes, errors)
//! - [`DeviceUser`] - claimed layer-3 device, released exactly once
//! - [`Notification`] - decoded backend notification

mod iface;
mod instance;
mod notify;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use iface::{ClaimMode, DeviceUser, Interface, ProtoEvent};
pub use instance::ProtocolInstance;
pub use notify::{MAX_COMMAND_ARGS, MAX_ENV_ENTRIES, MAX_ERROR_ENTRIES, Notification};
pub use state::{ProtoCommand, ProtoState};
