//! # Example: discover
//!
//! Scans a protocol directory, prints every registered handler with its
//! parameter schema, then waits for SIGINT/SIGTERM and shuts down.
//!
//! Shows how to:
//! - Wire the built-in [`LogWriter`] subscriber.
//! - Build a [`Daemon`](protovisor::Daemon) with [`DaemonBuilder::build_with_discovery`].
//! - Inspect [`Handler`](protovisor::Handler) schemas and flags.
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example discover -- /lib/netifd/proto
//! ```

use std::sync::Arc;

use protovisor::{Config, DaemonBuilder, HandlerFlags, LogWriter, Subscribe};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut cfg = Config::default();
    if let Some(dir) = std::env::args().nth(1) {
        cfg = cfg.with_proto_dir(dir);
    }

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let daemon = DaemonBuilder::new(cfg)
        .with_subscribers(subs)
        .build_with_discovery()
        .await?;

    for name in daemon.handlers().names() {
        let Some(handler) = daemon.handlers().lookup(&name) else {
            continue;
        };
        println!("{name} ({})", handler.script().display());
        for param in handler.schema() {
            println!("    {:<16} {:?}", param.name, param.kind);
        }
        if handler.flags().contains(HandlerFlags::NO_DEVICE) {
            println!("    [no-device]");
        }
        if handler.flags().contains(HandlerFlags::INIT_AVAILABLE) {
            println!("    [available]");
        }
    }

    daemon.run_until_signal().await?;
    Ok(())
}
