//! Error types used by the protovisor runtime, registry and protocol instances.
//!
//! This module defines three error enums:
//!
//! - [`ProtoError`]: errors raised while driving one protocol instance
//!   (spawning scripts, decoding notifications, validating attach payloads).
//! - [`RegistryError`]: errors raised while registering a discovered handler.
//! - [`RuntimeError`]: errors raised by the daemon itself (discovery I/O, shutdown).
//!
//! All types provide `as_label` for logs and keep their `Display` text short.

use std::time::Duration;
use thiserror::Error;

use crate::proto::ProtoState;

/// # Errors produced by a protocol instance.
///
/// None of these leave the instance half-transitioned: a rejected command or
/// notification applies no effect and keeps the previous state.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// The process could not be created (missing executable, resource limits, ...).
    ///
    /// The instance stays in its prior state so the command can be retried.
    #[error("failed to spawn {program}: {reason}")]
    Spawn {
        /// Program that was being started.
        program: String,
        /// Underlying OS error message.
        reason: String,
    },

    /// A notification was malformed (unknown action, missing or mistyped field).
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the payload.
        reason: String,
    },

    /// The configuration supplied on attach does not fit the handler's schema.
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// What was wrong with the payload.
        reason: String,
    },

    /// The instance cannot accept the request in its current state.
    #[error("instance busy in state {state}")]
    Busy {
        /// State the instance was in when the request arrived.
        state: ProtoState,
    },

    /// No handler is registered under the requested protocol name.
    #[error("unknown protocol {name:?}")]
    UnknownProtocol {
        /// Requested protocol name.
        name: String,
    },

    /// The interface already has a protocol instance attached.
    #[error("interface {iface:?} already attached")]
    AlreadyAttached {
        /// Interface name.
        iface: String,
    },

    /// The interface has no protocol instance attached.
    #[error("interface {iface:?} not attached")]
    NotAttached {
        /// Interface name.
        iface: String,
    },

    /// The instance actor is no longer running.
    #[error("instance closed")]
    Closed,
}

impl ProtoError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use protovisor::ProtoError;
    ///
    /// let err = ProtoError::InvalidArgument { reason: "missing action".into() };
    /// assert_eq!(err.as_label(), "proto_invalid_argument");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProtoError::Spawn { .. } => "proto_spawn_error",
            ProtoError::InvalidArgument { .. } => "proto_invalid_argument",
            ProtoError::InvalidConfig { .. } => "proto_invalid_config",
            ProtoError::Busy { .. } => "proto_busy",
            ProtoError::UnknownProtocol { .. } => "proto_unknown_protocol",
            ProtoError::AlreadyAttached { .. } => "proto_already_attached",
            ProtoError::NotAttached { .. } => "proto_not_attached",
            ProtoError::Closed => "proto_closed",
        }
    }

    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        ProtoError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        ProtoError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// # Errors produced while registering a handler.
///
/// Registration failures only discard the offending handler; handlers
/// registered before or after it are unaffected.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A handler with the same protocol name is already registered.
    #[error("duplicate handler {name:?}")]
    DuplicateHandler {
        /// Protocol name that collided.
        name: String,
    },

    /// The parameter schema is unusable (unknown type code, repeated name).
    #[error("invalid schema for {handler:?}: {reason}")]
    InvalidSchema {
        /// Protocol name of the handler being registered.
        handler: String,
        /// What was wrong with the schema.
        reason: String,
    },

    /// A self-description value is not a `{name, config?, no-device?, available?}` object.
    #[error("invalid descriptor from {script}: {reason}")]
    InvalidDescriptor {
        /// Script that produced the value.
        script: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::DuplicateHandler { .. } => "registry_duplicate_handler",
            RegistryError::InvalidSchema { .. } => "registry_invalid_schema",
            RegistryError::InvalidDescriptor { .. } => "registry_invalid_descriptor",
        }
    }
}

/// # Errors produced by the daemon runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some instances never reached `IDLE`.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Interfaces whose instance did not finish teardown in time.
        stuck: Vec<String>,
    },

    /// The protocol directory could not be scanned.
    #[error("discovery failed: {0}")]
    Discovery(#[from] std::io::Error),

    /// Waiting for an OS shutdown signal failed.
    #[error("signal handler: {0}")]
    Signal(String),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use protovisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Discovery(_) => "runtime_discovery_failed",
            RuntimeError::Signal(_) => "runtime_signal_failed",
        }
    }
}
