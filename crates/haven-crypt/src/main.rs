//! haven-crypt daemon: JSON-RPC over stdin/stdout, logs on stderr.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use haven_crypt::keywrap::MemoryNetwork;
use haven_crypt::rpc::Server;
use haven_crypt::{Dispatcher, HybridEngine, RuntimeConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = RuntimeConfig::parse();

    // stdout carries the protocol
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let identity = config.identity().context("invalid private key")?;
    if config.private_key.is_none() {
        warn!(address = %identity.address(), "no private key configured, using an ephemeral identity");
    }
    let network = MemoryNetwork::new();
    let engine = HybridEngine::new(network.client(), config.authenticator(), config.engine_config());
    let dispatcher = Dispatcher::new(engine, identity, config.dispatcher_config());

    info!(network = %config.network_id(), chain = %config.chain, "starting haven-crypt");

    let server = Server::new(dispatcher, config.server_config());
    let report = server
        .run(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("control loop failed")?;

    server.handler().engine().disconnect().await;
    info!(requests = report.requests, errors = report.errors, "haven-crypt stopped");
    Ok(())
}
