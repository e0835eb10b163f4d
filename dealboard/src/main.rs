//! Dealboard board watcher -- joins the board and streams changes.
//!
//! A presentation-free consumer of the sync layer: connects to the
//! server, joins under the configured name, and logs presence, activity
//! and board changes as they happen. Useful for smoke-testing a server
//! and as a wiring example for richer frontends.
//!
//! # Usage
//!
//! ```bash
//! # Watch the default local server as "guest"
//! cargo run --bin dealboard
//!
//! # Join a remote board by name
//! cargo run --bin dealboard -- \
//!     --server ws://board.example:8080/ws \
//!     --api http://board.example:8080 \
//!     --name adam
//! ```

use clap::Parser;

use dealboard::config::{ClientCliArgs, ClientConfig};
use dealboard::sync::{self, SyncCommand, SyncEvent};

#[tokio::main]
async fn main() {
    let cli = ClientCliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        server = %config.server_url,
        name = %config.name,
        "joining the board"
    );

    let (cmd_tx, mut evt_rx, board) = sync::spawn_sync(config).await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                let _ = cmd_tx.send(SyncCommand::Shutdown).await;
                break;
            }
            event = evt_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    SyncEvent::Connected => tracing::info!("connected, real-time sync active"),
                    SyncEvent::Disconnected => tracing::warn!("disconnected"),
                    SyncEvent::Reconnecting { attempt, max_attempts } => {
                        tracing::warn!(attempt, max_attempts, "reconnecting");
                    }
                    SyncEvent::Degraded => {
                        tracing::warn!("real-time sync unavailable, using direct calls");
                    }
                    SyncEvent::BoardChanged => {
                        let tasks = board.lock().len();
                        tracing::info!(tasks, "board updated");
                    }
                    SyncEvent::Presence(users) => {
                        let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
                        tracing::info!(online = users.len(), ?names, "presence update");
                    }
                    SyncEvent::Activity(line) => tracing::info!(%line, "activity"),
                    SyncEvent::Typing(names) => tracing::debug!(?names, "typing"),
                    SyncEvent::Celebration { user, task_id } => {
                        tracing::info!(%user, %task_id, "deal closed");
                    }
                    SyncEvent::OperationFailed(message) => {
                        tracing::warn!(%message, "operation failed");
                    }
                }
            }
        }
    }
}
