//! # Notification decoding.
//!
//! Backends report progress with small JSON objects carrying an integer
//! `action` selector:
//!
//! | action | name            | fields                                                         |
//! |--------|-----------------|----------------------------------------------------------------|
//! | 0      | update-link     | `link-up`, `ifname`?, `address-external`?, `routes`?, `routes6`? |
//! | 1      | run-command     | `command`, `env`?                                              |
//! | 2      | kill-command    | `signal`?                                                      |
//! | 3      | notify-error    | `error`                                                        |
//! | 4      | block-restart   |                                                                |
//! | 5      | set-available   | `available`                                                    |
//!
//! A field of the wrong JSON type is treated as absent. Missing required
//! fields and out-of-bounds lists are rejected with `InvalidArgument`.

use nix::sys::signal::Signal;
use serde_json::{Map, Value};

use crate::error::ProtoError;

/// Maximum number of `command` entries.
pub const MAX_COMMAND_ARGS: usize = 63;
/// Maximum number of `env` entries.
pub const MAX_ENV_ENTRIES: usize = 31;
/// Maximum number of `error` entries (code plus details).
pub const MAX_ERROR_ENTRIES: usize = 15;

/// Decoded notification. Borrows from the message it was decoded from.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<'a> {
    /// Link state change, with address and route settings when up.
    UpdateLink {
        /// Whether the link is up.
        link_up: bool,
        /// Device to claim as layer-3 device.
        ifname: Option<&'a str>,
        /// Addresses are managed externally.
        address_external: bool,
        /// IPv4 route entries (not yet filtered).
        routes: &'a [Value],
        /// IPv6 route entries (not yet filtered).
        routes6: &'a [Value],
    },
    /// Start an auxiliary process.
    RunCommand {
        /// Program and arguments.
        command: Vec<String>,
        /// Extra `KEY=VALUE` entries.
        env: Vec<String>,
    },
    /// Signal the auxiliary process. `None` sends signal 0 (existence check).
    KillCommand {
        /// Signal to deliver.
        signal: Option<Signal>,
    },
    /// Report a structured error.
    NotifyError {
        /// Error code.
        code: String,
        /// Detail arguments.
        details: Vec<String>,
    },
    /// Disable automatic restart.
    BlockRestart,
    /// Update availability.
    SetAvailable {
        /// New availability.
        available: bool,
    },
}

impl<'a> Notification<'a> {
    /// Decodes a notification message.
    pub fn decode(msg: &'a Map<String, Value>) -> Result<Self, ProtoError> {
        let action = msg
            .get("action")
            .and_then(Value::as_i64)
            .ok_or_else(|| ProtoError::invalid_argument("missing action"))?;

        match action {
            0 => {
                let link_up = get_bool(msg, "link-up")
                    .ok_or_else(|| ProtoError::invalid_argument("missing link-up"))?;
                Ok(Notification::UpdateLink {
                    link_up,
                    ifname: msg.get("ifname").and_then(Value::as_str),
                    address_external: get_bool(msg, "address-external").unwrap_or(false),
                    routes: get_array(msg, "routes").unwrap_or(&[]),
                    routes6: get_array(msg, "routes6").unwrap_or(&[]),
                })
            }
            1 => {
                let command = get_array(msg, "command")
                    .ok_or_else(|| ProtoError::invalid_argument("missing command"))?;
                let command = string_list("command", command, MAX_COMMAND_ARGS)?;
                if command.is_empty() {
                    return Err(ProtoError::invalid_argument("empty command"));
                }
                let env = match get_array(msg, "env") {
                    Some(env) => string_list("env", env, MAX_ENV_ENTRIES)?,
                    None => Vec::new(),
                };
                Ok(Notification::RunCommand { command, env })
            }
            2 => Ok(Notification::KillCommand {
                signal: kill_signal(msg.get("signal").and_then(Value::as_i64)),
            }),
            3 => {
                let error = get_array(msg, "error")
                    .ok_or_else(|| ProtoError::invalid_argument("missing error"))?;
                let mut entries = string_list("error", error, MAX_ERROR_ENTRIES)?.into_iter();
                let code = entries
                    .next()
                    .ok_or_else(|| ProtoError::invalid_argument("empty error"))?;
                Ok(Notification::NotifyError {
                    code,
                    details: entries.collect(),
                })
            }
            4 => Ok(Notification::BlockRestart),
            5 => {
                let available = get_bool(msg, "available")
                    .ok_or_else(|| ProtoError::invalid_argument("missing available"))?;
                Ok(Notification::SetAvailable { available })
            }
            other => Err(ProtoError::invalid_argument(format!(
                "unknown action {other}"
            ))),
        }
    }

    /// Notification name, as reported on rejection.
    pub fn name(&self) -> &'static str {
        match self {
            Notification::UpdateLink { .. } => "update-link",
            Notification::RunCommand { .. } => "run-command",
            Notification::KillCommand { .. } => "kill-command",
            Notification::NotifyError { .. } => "notify-error",
            Notification::BlockRestart => "block-restart",
            Notification::SetAvailable { .. } => "set-available",
        }
    }
}

fn get_bool(msg: &Map<String, Value>, key: &str) -> Option<bool> {
    msg.get(key).and_then(Value::as_bool)
}

fn get_array<'a>(msg: &'a Map<String, Value>, key: &str) -> Option<&'a [Value]> {
    msg.get(key).and_then(Value::as_array).map(Vec::as_slice)
}

fn string_list(field: &str, values: &[Value], max: usize) -> Result<Vec<String>, ProtoError> {
    if values.len() > max {
        return Err(ProtoError::invalid_argument(format!(
            "{field}: {} entries, at most {max} allowed",
            values.len()
        )));
    }
    values
        .iter()
        .map(|v| match v.as_str() {
            Some(s) if !s.chars().any(char::is_control) => Ok(s.to_string()),
            Some(_) => Err(ProtoError::invalid_argument(format!(
                "{field}: control character in entry"
            ))),
            None => Err(ProtoError::invalid_argument(format!(
                "{field}: non-string entry"
            ))),
        })
        .collect()
}

/// Absent or out-of-range values fall back to SIGTERM; 0 is the null signal.
fn kill_signal(raw: Option<i64>) -> Option<Signal> {
    match raw {
        Some(0) => None,
        Some(n @ 1..=31) => i32::try_from(n)
            .ok()
            .and_then(|n| Signal::try_from(n).ok())
            .or(Some(Signal::SIGTERM)),
        _ => Some(Signal::SIGTERM),
    }
}
