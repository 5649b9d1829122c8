//! # LogWriter: tracing-backed event printer
//!
//! A subscriber that renders incoming [`Event`]s through `tracing`.
//!
//! ## Example output
//! ```text
//! INFO  script started iface=wan proto=static action=setup pid=812
//! INFO  state changed iface=wan from=idle to=setup
//! WARN  deadline expired, force-killing iface=wan timeout_ms=1000
//! INFO  link up iface=wan
//! INFO  interface down iface=wan
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let iface = e.iface.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::SubscriberPanicked => {
                warn!(subscriber = iface, info = reason, "subscriber panicked");
            }
            EventKind::SubscriberOverflow => {
                warn!(subscriber = iface, reason, "subscriber overflow");
            }
            EventKind::HandlerRegistered => {
                info!(proto = ?e.proto, script = reason, "handler registered");
            }
            EventKind::HandlerRejected => {
                warn!(proto = ?e.proto, reason, "handler rejected");
            }
            EventKind::ScriptStarted => {
                info!(iface, proto = ?e.proto, action = ?e.action, pid = ?e.pid, "script started");
            }
            EventKind::ScriptExited => {
                debug!(iface, pid = ?e.pid, code = ?e.exit_code, "script exited");
            }
            EventKind::ProtoTaskStarted => {
                info!(iface, pid = ?e.pid, "proto task started");
            }
            EventKind::ProtoTaskExited => {
                info!(iface, pid = ?e.pid, code = ?e.exit_code, "proto task exited");
            }
            EventKind::SignalSent => {
                debug!(iface, pid = ?e.pid, signal = reason, "signal sent");
            }
            EventKind::DeadlineArmed => {
                debug!(iface, timeout_ms = ?e.timeout_ms, "deadline armed");
            }
            EventKind::DeadlineExpired => {
                warn!(iface, timeout_ms = ?e.timeout_ms, "deadline expired, force-killing");
            }
            EventKind::StateChanged => {
                info!(iface, from = reason, to = ?e.state, "state changed");
            }
            EventKind::LinkUp => info!(iface, "link up"),
            EventKind::LinkLost => info!(iface, "link lost"),
            EventKind::Down => info!(iface, "interface down"),
            EventKind::NotifyRejected => {
                warn!(iface, action = ?e.action, reason, "notification rejected");
            }
            EventKind::InstanceAttached => {
                info!(iface, proto = ?e.proto, "instance attached");
            }
            EventKind::InstanceDetached => info!(iface, "instance detached"),
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::AllStoppedWithin => info!("all instances stopped within grace"),
            EventKind::GraceExceeded => warn!("grace exceeded"),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
