//! # OS shutdown signals.
//!
//! [`wait_for_shutdown_signal`] resolves with the first of `SIGINT`, `SIGTERM`
//! or `SIGQUIT` delivered to the daemon.

use tokio::signal::unix::{SignalKind, signal};

/// Signal that asked the daemon to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// `SIGINT`
    Interrupt,
    /// `SIGTERM`
    Terminate,
    /// `SIGQUIT`
    Quit,
}

impl ShutdownSignal {
    /// Conventional signal name.
    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
            ShutdownSignal::Quit => "SIGQUIT",
        }
    }
}

/// Waits for a termination signal.
///
/// Listeners are registered on each call; fails only if registration fails.
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    let mut int = signal(SignalKind::interrupt())?;
    let mut term = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let received = tokio::select! {
        _ = int.recv() => ShutdownSignal::Interrupt,
        _ = term.recv() => ShutdownSignal::Terminate,
        _ = quit.recv() => ShutdownSignal::Quit,
    };
    Ok(received)
}
