//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the daemon runtime.
//!
//! Config is used in three places:
//! 1. **Discovery**: where backend scripts live and how they are introspected
//! 2. **Instances**: abort/teardown deadlines and the working directory for spawned processes
//! 3. **Daemon**: bus sizing, per-instance request queues and the shutdown grace period
//!
//! ## Sentinel values
//! - `bus_capacity = 0` → clamped to 1
//! - `command_capacity = 0` → clamped to 1

use std::path::PathBuf;
use std::time::Duration;

/// Global configuration for the daemon runtime.
///
/// ## Field semantics
/// - `proto_dir`: directory scanned for backend scripts; working directory of every spawned process
/// - `script_suffix`: only files ending with this suffix are treated as backend scripts
/// - `dump_args`: arguments appended to a script path to make it print its self-description
/// - `abort_timeout`: deadline for an aborted setup to exit after SIGTERM
/// - `teardown_timeout`: deadline for a teardown invocation to finish
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `command_capacity`: per-instance request queue size (min 1)
/// - `grace`: maximum wait for all instances to reach `IDLE` on shutdown
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory holding the backend scripts.
    pub proto_dir: PathBuf,

    /// Filename suffix of candidate scripts.
    pub script_suffix: String,

    /// Introspection arguments passed to each candidate script during discovery.
    pub dump_args: Vec<String>,

    /// How long an aborted setup may take to exit before both processes are force-killed.
    pub abort_timeout: Duration,

    /// How long a teardown invocation may take before both processes are force-killed.
    pub teardown_timeout: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Capacity of each instance actor's request queue.
    pub command_capacity: usize,

    /// Maximum time to wait for instances to finish teardown on shutdown.
    pub grace: Duration,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns a request queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn command_capacity_clamped(&self) -> usize {
        self.command_capacity.max(1)
    }

    /// Returns a copy of this config pointing at another protocol directory.
    pub fn with_proto_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.proto_dir = dir.into();
        self
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `proto_dir = /lib/netifd/proto`
    /// - `script_suffix = ".sh"`
    /// - `dump_args = ["", "dump"]`
    /// - `abort_timeout = 1s`, `teardown_timeout = 5s`
    /// - `bus_capacity = 1024`, `command_capacity = 64`
    /// - `grace = 10s`
    fn default() -> Self {
        Self {
            proto_dir: PathBuf::from("/lib/netifd/proto"),
            script_suffix: ".sh".to_string(),
            dump_args: vec![String::new(), "dump".to_string()],
            abort_timeout: Duration::from_millis(1000),
            teardown_timeout: Duration::from_millis(5000),
            bus_capacity: 1024,
            command_capacity: 64,
            grace: Duration::from_secs(10),
        }
    }
}
