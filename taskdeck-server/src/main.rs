//! `taskdeck` server -- shared, identity-scoped task storage over WebSocket.
//!
//! # Usage
//!
//! ```bash
//! # Memory-only server with two accounts on the default address 0.0.0.0:9100
//! cargo run --bin taskdeck-server -- --account alice=alice-token --account bob=bob-token
//!
//! # Persist tasks across restarts
//! cargo run --bin taskdeck-server -- --snapshot /var/lib/taskdeck/tasks.bin
//!
//! # Or via environment variables
//! TASKDECK_BIND=127.0.0.1:8080 cargo run --bin taskdeck-server
//! ```

use std::sync::Arc;

use clap::Parser;
use taskdeck_server::config::{ServerCliArgs, ServerConfig};
use taskdeck_server::gate::TokenGate;
use taskdeck_server::repository::TaskRepository;
use taskdeck_server::server::{self, ServerState};

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

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting taskdeck server");

    let repository = match &config.snapshot_path {
        Some(path) => match TaskRepository::open(path) {
            Ok(repo) => repo,
            Err(e) => {
                tracing::error!(error = %e, "failed to open task snapshot");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("no snapshot path configured, tasks will not survive a restart");
            TaskRepository::new()
        }
    };

    let gate = TokenGate::from_accounts(&config.accounts);
    if gate.is_empty() {
        tracing::warn!("no accounts configured, every connection will be rejected");
    }

    let state = Arc::new(ServerState::with_config(
        Arc::new(repository),
        gate,
        config.max_message_size,
    ));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "taskdeck server listening");
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
