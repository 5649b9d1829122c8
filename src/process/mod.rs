//! # Process supervision primitives.
//!
//! The state machine never forks or waits by itself. It talks to a
//! [`Launcher`] that creates processes and delivers signals, tracks what it
//! started in [`ProcessSlot`]s, and learns about exits through
//! [`ProcessExit`] records fed back by whoever drives the instance.
//!
//! ```text
//! ProtocolInstance ── launch(LaunchRequest) ──► Launcher ──► child process
//!        ▲                                                       │
//!        └──────────── on_exit(ProcessExit) ◄── waiter task ◄────┘
//! ```
//!
//! - [`Launcher`] - spawn/signal seam
//! - [`TokioLauncher`] - production launcher on `tokio::process`
//! - [`ProcessSlot`] - one tracked process (`script_task` or `proto_task`)

mod launcher;
mod slot;
mod tokio_launcher;

pub use launcher::{ExitCode, LaunchRequest, Launcher, ProcessExit, ProcessHandle};
pub use slot::{ProcessSlot, SlotKind};
pub use tokio_launcher::TokioLauncher;

pub use nix::sys::signal::Signal;
