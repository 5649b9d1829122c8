//! # protovisor
//!
//! **Protovisor** lets external executable scripts act as network-interface
//! configuration backends. Each script declares a protocol (`static`, `dhcp`,
//! `ppp`, ...) with a typed parameter schema; the interface manager binds a
//! protocol to an interface and brings it up or down by running the script
//! and reacting to the notifications it sends back.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   proto_dir/*.sh ── '' dump ──► discovery ──► HandlerRegistry (read-only)
//!                                                      │
//!   interface manager ── attach(proto, iface, config) ─┤
//!                                                      ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Daemon                                                           │
//! │  - HandlerRegistry (protocol name → script + schema + flags)      │
//! │  - InstanceRegistry (interface → InstanceActor)                   │
//! │  - Bus (broadcast events) → SubscriberSet (LogWriter, ...)        │
//! └──────┬──────────────────────────┬─────────────────────────────────┘
//!        ▼                          ▼
//! ┌────────────────────┐     ┌────────────────────┐
//! │ InstanceActor wan  │     │ InstanceActor lan  │
//! │  ProtocolInstance  │     │  ProtocolInstance  │
//! │  ├ script_task     │     │  ├ script_task     │
//! │  ├ proto_task      │     │  ├ proto_task      │
//! │  └ deadline        │     │  └ deadline        │
//! └──┬─────────────┬───┘     └────────────────────┘
//!    │ Launcher    │ Interface
//!    ▼             ▼
//!  scripts,     link events, devices,
//!  aux tasks    addresses, routes, errors
//! ```
//!
//! ### Lifecycle
//! ```text
//! setup()    ──► "<script> <proto> setup <iface> <config-json> [<main-dev>]"   IDLE → SETUP
//! notify({action: 0, link-up: true, ...})  ──► claim device, apply IP, Up     SETUP → IDLE
//! teardown() ──► script still running? SIGTERM + 1 s abort deadline            → SETUP_ABORT
//!            ──► otherwise "<script> ... teardown ..." (+ ERROR=<code>)       → TEARDOWN
//! exits / deadline expiry ──► IDLE + Down
//! ```
//!
//! ## Features
//! | Area            | Description                                                   | Key types / traits                              |
//! |-----------------|---------------------------------------------------------------|-------------------------------------------------|
//! | **Handlers**    | Script self-description, schema, discovery.                   | [`HandlerRegistry`], [`Handler`], [`ParamType`] |
//! | **Instances**   | Per-interface lifecycle machine and notification dispatch.    | [`ProtocolInstance`], [`Notification`]          |
//! | **Collaborators** | Seams to the interface manager and process creation.        | [`Interface`], [`Launcher`]                     |
//! | **Runtime**     | Actors, attach/detach, graceful shutdown.                     | [`Daemon`], [`DaemonBuilder`], [`InstanceHandle`] |
//! | **Events**      | Observe every transition and process step.                    | [`Event`], [`EventKind`], [`Subscribe`]         |
//! | **Errors**      | Typed errors with stable labels.                              | [`ProtoError`], [`RegistryError`], [`RuntimeError`] |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use protovisor::{Config, DaemonBuilder, Subscribe};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(protovisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//!
//!     let daemon = DaemonBuilder::new(Config::default())
//!         .with_subscribers(subs)
//!         .build_with_discovery()
//!         .await?;
//!
//!     for name in daemon.handlers().names() {
//!         println!("protocol: {name}");
//!     }
//!     daemon.run_until_signal().await?;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod handlers;
mod process;
mod proto;
mod subscribers;

// ---- Public re-exports ----

pub use config::Config;
pub use core::{Daemon, DaemonBuilder, InstanceHandle, ShutdownSignal};
pub use error::{ProtoError, RegistryError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use handlers::{
    Decoded, Handler, HandlerFlags, HandlerRegistry, JsonStreamDecoder, Param, ParamType,
    discover, discover_script, register_descriptor,
};
pub use process::{
    ExitCode, LaunchRequest, Launcher, ProcessExit, ProcessHandle, ProcessSlot, Signal, SlotKind,
    TokioLauncher,
};
pub use proto::{
    ClaimMode, DeviceUser, Interface, MAX_COMMAND_ARGS, MAX_ENV_ENTRIES, MAX_ERROR_ENTRIES,
    Notification, ProtoCommand, ProtoEvent, ProtoState, ProtocolInstance,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose the built-in tracing subscriber.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
