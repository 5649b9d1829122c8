//! Lifecycle states and commands of a protocol instance.

use std::fmt;

/// State of the per-interface lifecycle machine.
///
/// `Idle` is both the initial state and the quiescent state between
/// activations; there is no separate terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtoState {
    /// Nothing in flight (or the interface is up and the script is done).
    #[default]
    Idle,
    /// The setup script was started and the link is not up yet.
    Setup,
    /// Teardown was requested while the setup script was still running.
    SetupAbort,
    /// The teardown script is running (or its leftovers are being reclaimed).
    Teardown,
}

impl ProtoState {
    /// Short stable name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ProtoState::Idle => "idle",
            ProtoState::Setup => "setup",
            ProtoState::SetupAbort => "setup_abort",
            ProtoState::Teardown => "teardown",
        }
    }
}

impl fmt::Display for ProtoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command issued by the interface manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoCommand {
    /// Bring the interface up by running the script's `setup` action.
    Setup,
    /// Bring the interface down by running the script's `teardown` action.
    Teardown,
}

impl ProtoCommand {
    /// Script action name passed on the command line.
    pub fn action(self) -> &'static str {
        match self {
            ProtoCommand::Setup => "setup",
            ProtoCommand::Teardown => "teardown",
        }
    }
}
