//! # Tracked process slot.
//!
//! A [`ProcessSlot`] remembers at most one running process. Starting a new
//! process replaces tracking of the previous one without killing it;
//! completions for a handle that is no longer tracked are ignored.

use nix::sys::signal::Signal;

use crate::process::launcher::{Launcher, ProcessHandle};

/// Which of the two slots of an instance this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// The backend script invoked for setup/teardown.
    Script,
    /// An auxiliary process started on the script's behalf.
    ProtoTask,
}

/// One tracked process.
#[derive(Debug, Default)]
pub struct ProcessSlot {
    current: Option<ProcessHandle>,
}

impl ProcessSlot {
    /// Creates an idle slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while a process is tracked.
    pub fn is_pending(&self) -> bool {
        self.current.is_some()
    }

    /// Starts tracking `handle`. Returns the handle it replaced, if any.
    pub fn track(&mut self, handle: ProcessHandle) -> Option<ProcessHandle> {
        self.current.replace(handle)
    }

    /// Stops tracking `handle` if it is the tracked one.
    ///
    /// Returns `false` for stale handles.
    pub fn complete(&mut self, handle: ProcessHandle) -> bool {
        if self.current == Some(handle) {
            self.current = None;
            true
        } else {
            false
        }
    }

    /// Signals the tracked process. No-op (returns `None`) when idle.
    pub fn signal(
        &self,
        launcher: &mut dyn Launcher,
        signal: Option<Signal>,
    ) -> Option<ProcessHandle> {
        let handle = self.current?;
        launcher.signal(handle, signal);
        Some(handle)
    }

    /// Force-kills the tracked process and stops tracking it.
    pub fn force_kill(&mut self, launcher: &mut dyn Launcher) -> Option<ProcessHandle> {
        let handle = self.current.take()?;
        launcher.kill(handle);
        Some(handle)
    }
}
