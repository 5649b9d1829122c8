use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::daemon::Daemon;
use crate::{
    config::Config,
    error::RuntimeError,
    events::Bus,
    handlers::{self, HandlerRegistry},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Daemon`].
pub struct DaemonBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    handlers: Option<HandlerRegistry>,
}

impl DaemonBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            handlers: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (discovery, process lifecycle,
    /// state changes) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Uses a prepared handler registry instead of an empty one.
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Builds the daemon.
    ///
    /// Must be called from within a tokio runtime (spawns the subscriber listener).
    pub fn build(mut self) -> Daemon {
        let handlers = self.handlers.take().unwrap_or_default();
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let listener_token = CancellationToken::new();
        let listener = spawn_listener(&bus, subs, listener_token.clone());

        Daemon::new_internal(self.cfg, bus, handlers, listener, listener_token)
    }

    /// Builds the daemon and fills its registry by scanning `Config::proto_dir`.
    ///
    /// Subscribers already see the discovery events. Discovered handlers
    /// replace any registry set with [`with_handlers`](Self::with_handlers).
    pub async fn build_with_discovery(self) -> Result<Daemon, RuntimeError> {
        let mut daemon = self.build();
        daemon.handlers = handlers::discover(&daemon.cfg, &daemon.bus).await?;
        Ok(daemon)
    }
}

/// Forwards bus events to the subscriber set until cancelled, then drains it.
fn spawn_listener(bus: &Bus, subs: SubscriberSet, token: CancellationToken) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => subs.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = token.cancelled() => break,
            }
        }
        while let Ok(ev) = rx.try_recv() {
            subs.emit(&ev);
        }
        subs.shutdown().await;
    })
}
