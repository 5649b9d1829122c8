//! # Handler discovery.
//!
//! Every file in the protocol directory carrying the configured suffix is a
//! candidate backend script. Each candidate is run once in introspection mode
//! (`./<script> '' dump`) and its stdout is streamed through a
//! [`JsonStreamDecoder`]; every complete value that deserializes into a
//! handler descriptor is registered.
//!
//! ## Rules
//! - Discovery is best-effort per script: a script that cannot be started,
//!   prints garbage or exits non-zero simply contributes no handlers
//! - Trailing partial output at end of stream is dropped silently
//! - Scripts are visited in sorted filename order, so duplicate protocol
//!   names resolve deterministically (first one wins)

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::error::{RegistryError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::handlers::decoder::{Decoded, JsonStreamDecoder};
use crate::handlers::registry::{Handler, HandlerFlags, HandlerRegistry};

const READ_CHUNK: usize = 512;

/// Self-description printed by a backend script.
///
/// Only `name` is required. Optional fields of the wrong JSON type are
/// treated as absent.
#[derive(Debug, Deserialize)]
struct HandlerDescriptor {
    name: String,
    #[serde(default)]
    config: Option<Value>,
    #[serde(default, rename = "no-device")]
    no_device: Option<Value>,
    #[serde(default)]
    available: Option<Value>,
}

impl HandlerDescriptor {
    fn flags(&self) -> HandlerFlags {
        let set = |v: &Option<Value>| v.as_ref().and_then(Value::as_bool).unwrap_or(false);
        let mut flags = HandlerFlags::NONE;
        if set(&self.no_device) {
            flags = flags | HandlerFlags::NO_DEVICE;
        }
        if set(&self.available) {
            flags = flags | HandlerFlags::INIT_AVAILABLE;
        }
        flags
    }

    /// `(name, type code)` pairs of a `config` array; empty when there is none.
    fn schema(&self) -> Result<Vec<(String, i64)>, RegistryError> {
        let Some(entries) = self.config.as_ref().and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let pair = match entry.as_array().map(Vec::as_slice) {
                    Some([name, code, ..]) => name.as_str().zip(code.as_i64()),
                    _ => None,
                };
                pair.map(|(name, code)| (name.to_string(), code))
                    .ok_or_else(|| RegistryError::InvalidSchema {
                        handler: self.name.clone(),
                        reason: format!("config entry {i} is not a [name, type] pair"),
                    })
            })
            .collect()
    }
}

/// Scans `cfg.proto_dir` and builds a registry from every candidate script.
///
/// Fails only if the directory itself cannot be listed.
pub async fn discover(cfg: &Config, bus: &Bus) -> Result<HandlerRegistry, RuntimeError> {
    let mut scripts = list_scripts(&cfg.proto_dir, &cfg.script_suffix).await?;
    scripts.sort();

    let mut registry = HandlerRegistry::new();
    for script in scripts {
        discover_script(&mut registry, cfg, &script, bus).await;
    }
    Ok(registry)
}

async fn list_scripts(dir: &Path, suffix: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix));
        if matches && entry.file_type().await?.is_file() {
            out.push(path);
        }
    }
    Ok(out)
}

/// Runs one script in introspection mode and registers what it reports.
///
/// Returns the number of handlers registered from this script.
pub async fn discover_script(
    registry: &mut HandlerRegistry,
    cfg: &Config,
    script: &Path,
    bus: &Bus,
) -> usize {
    let spawned = Command::new(script)
        .args(&cfg.dump_args)
        .current_dir(&cfg.proto_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            debug!(script = %script.display(), error = %e, "cannot run script for discovery");
            return 0;
        }
    };
    let Some(mut stdout) = child.stdout.take() else {
        return 0;
    };

    let mut decoder = JsonStreamDecoder::new();
    let mut buf = [0u8; READ_CHUNK];
    let mut registered = 0;
    loop {
        let n = match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(script = %script.display(), error = %e, "read failed during discovery");
                break;
            }
        };
        decoder.push(&buf[..n]);

        loop {
            match decoder.next_value() {
                Decoded::Value(value) => {
                    if register_descriptor(registry, script, value, bus).is_ok() {
                        registered += 1;
                    }
                }
                Decoded::Malformed => {
                    debug!(script = %script.display(), "skipping malformed self-description");
                }
                Decoded::NeedMore => break,
            }
        }
    }
    if decoder.finish() {
        debug!(script = %script.display(), "dropping partial trailing output");
    }

    if let Err(e) = child.wait().await {
        debug!(script = %script.display(), error = %e, "failed to reap discovery process");
    }
    registered
}

/// Registers one decoded self-description value.
///
/// Publishes `HandlerRegistered` or `HandlerRejected` on the bus.
pub fn register_descriptor(
    registry: &mut HandlerRegistry,
    script: &Path,
    value: Value,
    bus: &Bus,
) -> Result<Arc<Handler>, RegistryError> {
    let res = serde_json::from_value::<HandlerDescriptor>(value)
        .map_err(|e| RegistryError::InvalidDescriptor {
            script: script.display().to_string(),
            reason: e.to_string(),
        })
        .and_then(|desc| {
            let schema = desc.schema()?;
            registry.register(desc.name.as_str(), script, schema, desc.flags())
        });

    match &res {
        Ok(handler) => bus.publish(
            Event::new(EventKind::HandlerRegistered)
                .with_proto(handler.name())
                .with_reason(script.display().to_string()),
        ),
        Err(e) => {
            let mut ev = Event::new(EventKind::HandlerRejected).with_reason(e.to_string());
            let proto = match e {
                RegistryError::DuplicateHandler { name } => Some(name.as_str()),
                RegistryError::InvalidSchema { handler, .. } => Some(handler.as_str()),
                _ => None,
            };
            if let Some(proto) = proto {
                ev = ev.with_proto(proto);
            }
            bus.publish(ev);
        }
    }
    res
}
