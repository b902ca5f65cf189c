//! `echo-server`: runs a test server outside of a test.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`](config::Config) from environment variables.
//! 2. Initialise structured JSON logging.
//! 3. Start the server, register the echo routes, serve until Ctrl-C.

mod config;
mod routes;
mod telemetry;

use anyhow::{Context, Result};
use testserver::TestServer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = config::Config::from_env().map_err(|e| {
        eprintln!("ERROR: echo-server configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;

    // -----------------------------------------------------------------------
    // 3. Server
    // -----------------------------------------------------------------------
    let mut server = TestServer::start_with_config(cfg.server_config()?)
        .await
        .context("failed to start echo server")?;
    server.merge(routes::build(server.is_tls()));
    info!(
        version = env!("CARGO_PKG_VERSION"),
        url = %server.base_url(),
        port = server.port(),
        "echo-server ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutting down");
    server.stop().await;
    Ok(())
}
