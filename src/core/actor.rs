//! # InstanceActor: drives one protocol instance.
//!
//! The [`ProtocolInstance`] is a synchronous state machine; the actor owns it
//! and feeds it every input from a single task, so transitions never run
//! concurrently.
//!
//! ## Architecture
//! ```text
//! InstanceHandle ── Request ──► mpsc ──┐
//! TokioLauncher  ── ProcessExit ──────►├──► select! ──► ProtocolInstance
//! sleep_until(deadline) ──────────────►│                    │
//! CancellationToken ──────────────────►┘                    ▼
//!                                              watch<ProtoState> ──► InstanceHandle::state()
//! ```
//!
//! ## Rules
//! - Process exits are handled before a deadline that fires at the same time
//! - The published state is refreshed before a request is answered
//! - Dropping the actor drops the instance, which kills whatever still runs

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::ProtoError;
use crate::process::{Launcher, ProcessExit};
use crate::proto::{Interface, ProtoCommand, ProtoState, ProtocolInstance};

type Reply = oneshot::Sender<Result<(), ProtoError>>;

/// Request sent from an [`InstanceHandle`] to its actor.
enum Request {
    Command { cmd: ProtoCommand, reply: Reply },
    Notify { msg: Value, reply: Reply },
    Detach { reply: Reply },
}

/// Why an actor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActorExit {
    /// Detach was accepted.
    Detached,
    /// The runtime token was cancelled.
    Cancelled,
    /// Every handle was dropped.
    Released,
}

/// Owns one [`ProtocolInstance`] and serializes its inputs.
pub(crate) struct InstanceActor<I: Interface, L: Launcher> {
    instance: ProtocolInstance<I, L>,
    requests: mpsc::Receiver<Request>,
    exits: mpsc::UnboundedReceiver<ProcessExit>,
    state: watch::Sender<ProtoState>,
}

impl<I: Interface, L: Launcher> InstanceActor<I, L> {
    /// Wraps `instance`; `exits` must receive the exits of processes its launcher starts.
    pub(crate) fn new(
        instance: ProtocolInstance<I, L>,
        exits: mpsc::UnboundedReceiver<ProcessExit>,
        capacity: usize,
    ) -> (Self, InstanceHandle) {
        let (tx, requests) = mpsc::channel(capacity.max(1));
        let (state, state_rx) = watch::channel(instance.state());
        let handle = InstanceHandle {
            iface: instance.interface().name().into(),
            proto: instance.handler().name().into(),
            tx,
            state: state_rx,
        };
        let actor = Self {
            instance,
            requests,
            exits,
            state,
        };
        (actor, handle)
    }

    /// Runs until detached, cancelled, or every handle is gone.
    pub(crate) async fn run(mut self, token: CancellationToken) -> ActorExit {
        loop {
            let deadline = self.instance.deadline();
            tokio::select! {
                biased;
                _ = token.cancelled() => return ActorExit::Cancelled,
                Some(exit) = self.exits.recv() => self.instance.on_exit(exit),
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.instance.on_deadline();
                }
                req = self.requests.recv() => match req {
                    None => return ActorExit::Released,
                    Some(req) => {
                        if self.handle(req) {
                            return ActorExit::Detached;
                        }
                    }
                },
            }
            self.refresh_state();
        }
    }

    /// Applies one request. Returns `true` once detach was accepted.
    fn handle(&mut self, req: Request) -> bool {
        match req {
            Request::Command { cmd, reply } => {
                let res = self.instance.command(cmd);
                self.reply(reply, res);
                false
            }
            Request::Notify { msg, reply } => {
                let res = self.instance.notify(&msg);
                self.reply(reply, res);
                false
            }
            Request::Detach { reply } => {
                let res = self.instance.check_detach();
                let detached = res.is_ok();
                self.reply(reply, res);
                detached
            }
        }
    }

    fn reply(&self, reply: Reply, res: Result<(), ProtoError>) {
        self.refresh_state();
        let _ = reply.send(res);
    }

    fn refresh_state(&self) {
        self.state.send_if_modified(|s| {
            let next = self.instance.state();
            let changed = *s != next;
            *s = next;
            changed
        });
    }
}

/// Cloneable handle to a running instance actor.
///
/// Every call is answered by the actor once the request has been applied.
/// Calls fail with [`ProtoError::Closed`] after the actor stopped.
#[derive(Clone, Debug)]
pub struct InstanceHandle {
    iface: Arc<str>,
    proto: Arc<str>,
    tx: mpsc::Sender<Request>,
    state: watch::Receiver<ProtoState>,
}

impl InstanceHandle {
    /// Interface name.
    pub fn iface(&self) -> &str {
        &self.iface
    }

    /// Protocol name of the bound handler.
    pub fn proto(&self) -> &str {
        &self.proto
    }

    /// Last published lifecycle state.
    pub fn state(&self) -> ProtoState {
        *self.state.borrow()
    }

    /// Issues `SETUP`.
    pub async fn setup(&self) -> Result<(), ProtoError> {
        self.command(ProtoCommand::Setup).await
    }

    /// Issues `TEARDOWN`.
    pub async fn teardown(&self) -> Result<(), ProtoError> {
        self.command(ProtoCommand::Teardown).await
    }

    /// Issues a lifecycle command.
    pub async fn command(&self, cmd: ProtoCommand) -> Result<(), ProtoError> {
        self.request(|reply| Request::Command { cmd, reply }).await
    }

    /// Delivers a backend notification.
    pub async fn notify(&self, msg: Value) -> Result<(), ProtoError> {
        self.request(|reply| Request::Notify { msg, reply }).await
    }

    /// Waits until the instance reports `IDLE` (returns immediately if it already does).
    pub async fn wait_idle(&self) -> Result<(), ProtoError> {
        let mut rx = self.state.clone();
        rx.wait_for(|s| *s == ProtoState::Idle)
            .await
            .map(|_| ())
            .map_err(|_| ProtoError::Closed)
    }

    pub(crate) async fn detach(&self) -> Result<(), ProtoError> {
        self.request(|reply| Request::Detach { reply }).await
    }

    async fn request(&self, make: impl FnOnce(Reply) -> Request) -> Result<(), ProtoError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| ProtoError::Closed)?;
        rx.await.map_err(|_| ProtoError::Closed)?
    }
}
