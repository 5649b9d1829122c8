//! # Runtime events emitted by the daemon and protocol instances.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Registry events**: handlers accepted or rejected during discovery
//! - **Process events**: script and auxiliary process start/exit/signal
//! - **Protocol events**: state transitions and interface effects
//! - **Daemon events**: attach/detach, shutdown, subscriber health
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! interface name, pid, exit code and deadlines.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use protovisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ScriptStarted)
//!     .with_iface("wan")
//!     .with_action("setup")
//!     .with_pid(4242);
//!
//! assert_eq!(ev.kind, EventKind::ScriptStarted);
//! assert_eq!(ev.iface.as_deref(), Some("wan"));
//! assert_eq!(ev.pid, Some(4242));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::proto::ProtoState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `iface`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `iface`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Registry events ===
    /// A handler was registered from a script's self-description.
    ///
    /// Sets:
    /// - `proto`: protocol name
    /// - `reason`: script path
    HandlerRegistered,

    /// A self-description was rejected (duplicate name, invalid schema, bad shape).
    ///
    /// Sets:
    /// - `proto`: protocol name, when known
    /// - `reason`: error message
    HandlerRejected,

    // === Process events ===
    /// The backend script was started for an action.
    ///
    /// Sets:
    /// - `iface`, `proto`
    /// - `action`: "setup" or "teardown"
    /// - `pid`
    ScriptStarted,

    /// The backend script exited (or was reclaimed).
    ///
    /// Sets:
    /// - `iface`, `pid`
    /// - `exit_code`: exit code, `128 + signo` when killed by a signal
    ScriptExited,

    /// An auxiliary process was started on the script's behalf.
    ///
    /// Sets:
    /// - `iface`, `pid`
    ProtoTaskStarted,

    /// The auxiliary process exited.
    ///
    /// Sets:
    /// - `iface`, `pid`, `exit_code`
    ProtoTaskExited,

    /// A signal was delivered to a tracked process.
    ///
    /// Sets:
    /// - `iface`, `pid`
    /// - `reason`: signal name
    SignalSent,

    /// An abort or teardown deadline was armed.
    ///
    /// Sets:
    /// - `iface`
    /// - `timeout_ms`: deadline length
    DeadlineArmed,

    /// A deadline fired; both tracked processes were force-killed.
    ///
    /// Sets:
    /// - `iface`
    /// - `timeout_ms`: deadline length
    DeadlineExpired,

    // === Protocol events ===
    /// The instance moved between states.
    ///
    /// Sets:
    /// - `iface`
    /// - `state`: the new state
    /// - `reason`: previous state
    StateChanged,

    /// Link-up effect delivered to the interface.
    LinkUp,

    /// Link-lost effect delivered to the interface.
    LinkLost,

    /// Down effect delivered to the interface (teardown completed).
    Down,

    /// A notification was rejected.
    ///
    /// Sets:
    /// - `iface`
    /// - `reason`: rejection message
    /// - `action`: notification name, when the action code was recognized
    NotifyRejected,

    // === Daemon events ===
    /// A protocol instance was attached to an interface.
    ///
    /// Sets:
    /// - `iface`, `proto`
    InstanceAttached,

    /// A protocol instance was detached from its interface.
    ///
    /// Sets:
    /// - `iface`
    InstanceDetached,

    /// Shutdown requested (OS signal observed or explicit call).
    ShutdownRequested,

    /// All instances reached `IDLE` within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some instances did not finish teardown in time.
    GraceExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Interface (or subscriber) name, if applicable.
    pub iface: Option<Arc<str>>,
    /// Protocol name, if applicable.
    pub proto: Option<Arc<str>>,
    /// Script action ("setup" / "teardown") or notification name.
    pub action: Option<&'static str>,
    /// Process id of the process involved.
    pub pid: Option<u32>,
    /// Recorded exit code.
    pub exit_code: Option<i32>,
    /// Deadline in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Instance state after the event.
    pub state: Option<ProtoState>,
    /// Human-readable reason (errors, previous state, signal, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            iface: None,
            proto: None,
            action: None,
            pid: None,
            exit_code: None,
            timeout_ms: None,
            state: None,
            reason: None,
        }
    }

    /// Attaches an interface name.
    #[inline]
    pub fn with_iface(mut self, iface: impl Into<Arc<str>>) -> Self {
        self.iface = Some(iface.into());
        self
    }

    /// Attaches a protocol name.
    #[inline]
    pub fn with_proto(mut self, proto: impl Into<Arc<str>>) -> Self {
        self.proto = Some(proto.into());
        self
    }

    /// Attaches a script action.
    #[inline]
    pub fn with_action(mut self, action: &'static str) -> Self {
        self.action = Some(action);
        self
    }

    /// Attaches a process id.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attaches a deadline (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches the instance state.
    #[inline]
    pub fn with_state(mut self, state: ProtoState) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_iface(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_iface(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}
