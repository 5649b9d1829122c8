//! # Launcher seam.
//!
//! [`Launcher`] is the process-spawning primitive the state machine depends
//! on. Implementations must not block: `launch` returns as soon as the
//! process exists, and its exit is reported later as a [`ProcessExit`].

use nix::sys::signal::Signal;

use crate::error::ProtoError;

/// What to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    /// Extra `KEY=VALUE` entries added to the inherited environment.
    pub env: Vec<String>,
    /// Prefix used when forwarding the process's output to the log.
    pub log_prefix: String,
}

impl LaunchRequest {
    /// Creates a request with no extra environment.
    pub fn new(argv: Vec<String>, log_prefix: impl Into<String>) -> Self {
        Self {
            argv,
            env: Vec::new(),
            log_prefix: log_prefix.into(),
        }
    }

    /// Returns a copy of the request with extra environment entries.
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// Program to execute (first argv entry).
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }
}

/// Token identifying one started process.
///
/// `id` is unique per launcher, so a recycled pid never matches a stale handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    /// Launcher-assigned serial number.
    pub id: u64,
    /// OS process id.
    pub pid: u32,
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Normal exit with a status code.
    Exited(i32),
    /// Terminated by a signal.
    Signaled(i32),
}

impl ExitCode {
    /// Collapses the exit into one integer for logs: the status code, or `128 + signo`.
    pub fn as_error_code(self) -> i32 {
        match self {
            ExitCode::Exited(code) => code,
            ExitCode::Signaled(signo) => 128 + signo,
        }
    }

    /// Exit status as handed to a teardown script in `ERROR`; `0` when signalled.
    pub fn status(self) -> i32 {
        match self {
            ExitCode::Exited(code) => code,
            ExitCode::Signaled(_) => 0,
        }
    }
}

/// Completion record delivered back to the instance that started the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Process that ended.
    pub handle: ProcessHandle,
    /// How it ended.
    pub code: ExitCode,
}

/// Process creation and signalling.
pub trait Launcher: Send {
    /// Starts a process.
    ///
    /// Fails with [`ProtoError::Spawn`] if the process cannot be created.
    fn launch(&mut self, request: LaunchRequest) -> Result<ProcessHandle, ProtoError>;

    /// Delivers `signal` to the process. `None` sends signal 0 (existence check).
    ///
    /// Signalling a process that already exited is not an error.
    fn signal(&mut self, handle: ProcessHandle, signal: Option<Signal>);

    /// Forcibly terminates the process.
    fn kill(&mut self, handle: ProcessHandle) {
        self.signal(handle, Some(Signal::SIGKILL));
    }
}
