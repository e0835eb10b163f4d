//! Dealboard server -- real-time kanban task tracker for sales teams.
//!
//! An axum server that accepts task mutations over WebSocket and REST,
//! persists them to SQLite, and broadcasts every confirmed change to
//! all connected clients.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8080
//! cargo run --bin dealboard-server
//!
//! # Run on custom address with a custom database
//! cargo run --bin dealboard-server -- --bind 127.0.0.1:9090 --db-path ./tasks.db
//!
//! # Or via environment variables
//! DEALBOARD_ADDR=127.0.0.1:9090 cargo run --bin dealboard-server
//! ```

use clap::Parser;
use dealboard_server::config::{ServerCliArgs, ServerConfig};
use dealboard_server::hub;
use dealboard_server::store::TaskStore;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        db = %config.db_path.display(),
        "starting dealboard server"
    );

    let store = match TaskStore::open(&config.db_path) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to open task store");
            std::process::exit(1);
        }
    };

    match hub::start_server(&config.bind_addr, store).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "dealboard server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
