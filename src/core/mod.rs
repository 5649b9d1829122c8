//! Runtime core: instance actors, the daemon and its lifecycle.
//!
//! The public API from this module is [`Daemon`], its [`DaemonBuilder`] and
//! the [`InstanceHandle`] returned by `attach`.
//!
//! Internal modules:
//! - [`actor`]: drives one protocol instance from a single task;
//! - [`registry`]: interface name → running actor;
//! - [`daemon`]: attach/detach, event fan-out, graceful shutdown;
//! - [`shutdown`]: OS termination signals.

mod actor;
mod builder;
mod daemon;
mod registry;
mod shutdown;

pub use actor::InstanceHandle;
pub use builder::DaemonBuilder;
pub use daemon::Daemon;
pub use shutdown::ShutdownSignal;
