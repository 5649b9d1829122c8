//! # Daemon: owns handlers, instances, event delivery and shutdown.
//!
//! The [`Daemon`] is what the interface manager talks to. It holds the
//! read-only [`HandlerRegistry`], spawns one [`InstanceActor`] per attached
//! interface, fans bus events out to subscribers and tears everything down
//! on shutdown.
//!
//! ## Architecture
//! ```text
//! attach(proto, iface, config)
//!   └─► HandlerRegistry::lookup(proto)
//!   └─► ProtocolInstance::attach(handler, iface, config, TokioLauncher)
//!   └─► InstanceActor::run(child token) ──► InstanceRegistry[iface]
//!
//! Event flow:
//!   instances / discovery / daemon ── publish ──► Bus ──► listener ──► SubscriberSet
//!
//! Shutdown path:
//!   ShutdownRequested
//!     └─► teardown() every instance
//!     └─► wait (≤ grace) for every instance to reach IDLE
//!            ├─ all idle  → AllStoppedWithin
//!            └─ timed out → GraceExceeded, RuntimeError::GraceExceeded { stuck }
//!     └─► cancel actors (running processes are killed), drain subscribers
//! ```

use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::core::actor::{InstanceActor, InstanceHandle};
use crate::core::registry::{Entry, InstanceRegistry};
use crate::core::shutdown::{self, ShutdownSignal};
use crate::error::{ProtoError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::handlers::HandlerRegistry;
use crate::process::TokioLauncher;
use crate::proto::{Interface, ProtoState, ProtocolInstance};

/// Protocol-shell daemon runtime.
///
/// Built with [`DaemonBuilder`](crate::DaemonBuilder). Dropping the daemon
/// cancels every instance actor.
pub struct Daemon {
    pub(crate) cfg: Config,
    pub(crate) bus: Bus,
    pub(crate) handlers: HandlerRegistry,
    instances: InstanceRegistry,
    runtime_token: CancellationToken,
    listener_token: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Daemon {
    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        handlers: HandlerRegistry,
        listener: JoinHandle<()>,
        listener_token: CancellationToken,
    ) -> Self {
        Self {
            instances: InstanceRegistry::new(bus.clone()),
            cfg,
            bus,
            handlers,
            runtime_token: CancellationToken::new(),
            listener_token,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Event bus shared by the daemon and every instance.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Registered handlers.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Binds the handler registered as `proto` to `iface` and starts its actor.
    ///
    /// # Errors
    /// - [`ProtoError::UnknownProtocol`] if no such handler exists
    /// - [`ProtoError::AlreadyAttached`] if the interface already has an instance
    /// - [`ProtoError::InvalidConfig`] if `config` does not fit the handler's schema
    pub async fn attach<I: Interface>(
        &self,
        proto: &str,
        iface: I,
        config: &Value,
    ) -> Result<InstanceHandle, ProtoError> {
        let handler = self
            .handlers
            .lookup(proto)
            .ok_or_else(|| ProtoError::UnknownProtocol {
                name: proto.to_string(),
            })?;
        let name = iface.name().to_string();

        let handle = self
            .instances
            .insert_with(
                &name,
                || {
                    let (exits_tx, exits_rx) = mpsc::unbounded_channel();
                    let launcher = TokioLauncher::new(self.cfg.proto_dir.clone(), exits_tx);
                    let instance = ProtocolInstance::attach(
                        handler,
                        iface,
                        config,
                        launcher,
                        self.bus.clone(),
                        &self.cfg,
                    )?;

                    let (actor, handle) = InstanceActor::new(
                        instance,
                        exits_rx,
                        self.cfg.command_capacity_clamped(),
                    );
                    let cancel = self.runtime_token.child_token();
                    let join = tokio::spawn(actor.run(cancel.clone()));
                    Ok(Entry {
                        handle,
                        join,
                        cancel,
                    })
                },
                || ProtoError::AlreadyAttached {
                    iface: name.clone(),
                },
            )
            .await?;

        self.bus.publish(
            Event::new(EventKind::InstanceAttached)
                .with_iface(name.as_str())
                .with_proto(proto),
        );
        Ok(handle)
    }

    /// Handle of the instance attached to `iface`.
    pub async fn get(&self, iface: &str) -> Option<InstanceHandle> {
        self.instances.get(iface).await
    }

    /// Sorted names of attached interfaces.
    pub async fn interfaces(&self) -> Vec<String> {
        self.instances.names().await
    }

    /// Detaches the instance bound to `iface`.
    ///
    /// Only valid once the instance is `IDLE` with no process running;
    /// otherwise fails with [`ProtoError::Busy`] and nothing changes.
    pub async fn detach(&self, iface: &str) -> Result<(), ProtoError> {
        let handle = self
            .instances
            .get(iface)
            .await
            .ok_or_else(|| ProtoError::NotAttached {
                iface: iface.to_string(),
            })?;
        handle.detach().await?;
        self.instances.remove(iface).await;
        Ok(())
    }

    /// Tears down every instance and stops the runtime.
    ///
    /// Waits up to `Config::grace` for all instances to reach `IDLE`; fails
    /// with [`RuntimeError::GraceExceeded`] listing the ones that did not.
    /// Actors are stopped either way.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.shutdown_inner(None).await
    }

    /// Waits for SIGINT/SIGTERM/SIGQUIT, then shuts down.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        let sig = shutdown::wait_for_shutdown_signal()
            .await
            .map_err(|e| RuntimeError::Signal(e.to_string()))?;
        info!(signal = sig.as_str(), "shutdown signal received");
        self.shutdown_inner(Some(sig)).await
    }

    async fn shutdown_inner(&self, signal: Option<ShutdownSignal>) -> Result<(), RuntimeError> {
        let mut ev = Event::new(EventKind::ShutdownRequested);
        if let Some(sig) = signal {
            ev = ev.with_reason(sig.as_str());
        }
        self.bus.publish(ev);

        let handles = self.instances.handles().await;
        for h in &handles {
            if let Err(e) = h.teardown().await {
                warn!(iface = h.iface(), error = %e, "teardown on shutdown failed");
            }
        }

        let res = self.wait_idle_with_grace(&handles).await;
        self.instances.cancel_all().await;

        self.listener_token.cancel();
        if let Some(listener) = self.listener.lock().await.take() {
            let _ = listener.await;
        }
        res
    }

    async fn wait_idle_with_grace(&self, handles: &[InstanceHandle]) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        let all_idle = async {
            for h in handles {
                let _ = h.wait_idle().await;
            }
        };

        match time::timeout(grace, all_idle).await {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                let stuck: Vec<String> = handles
                    .iter()
                    .filter(|h| h.state() != ProtoState::Idle)
                    .map(|h| h.iface().to_string())
                    .collect();
                self.bus
                    .publish(Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")));
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.runtime_token.cancel();
        self.listener_token.cancel();
    }
}
