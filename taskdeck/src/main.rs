//! `taskdeck`: manage a to-do list from the terminal.
//!
//! Talks to a taskdeck server when one is configured, otherwise keeps the
//! list in a local data file. Configuration via CLI flags, environment
//! variables, or config file (`~/.config/taskdeck/config.toml`).
//!
//! ```bash
//! # Local list
//! cargo run --bin taskdeck -- add buy milk
//! cargo run --bin taskdeck -- list --filter active
//!
//! # Against a server
//! TASKDECK_SERVER=ws://127.0.0.1:9100/ws TASKDECK_TOKEN=alice-token \
//!     cargo run --bin taskdeck -- toggle-all
//! ```

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskdeck::cli::{self, CliError, Command};
use taskdeck::config::{CliArgs, ClientConfig, StoreMode};
use taskdeck::gate::SessionGate;
use taskdeck::store::{LocalStore, RemoteStore};
use taskdeck::tasks::TaskSession;
use taskdeck_proto::task::Identity;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file so they never mix with command output.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let command = cli.command.clone().unwrap_or_default();
    tracing::debug!(?command, "taskdeck starting");

    match run(&config, &command).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(err = %e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Picks a store from the configuration and runs one command against it.
async fn run(config: &ClientConfig, command: &Command) -> Result<String, CliError> {
    match config.store_mode()? {
        StoreMode::Remote {
            url,
            token,
            options,
        } => {
            let store = RemoteStore::connect(url.as_str(), &token, options).await?;
            tracing::info!(url = %url, identity = %store.identity(), "connected to server");
            let gate = SessionGate::signed_in(store.identity().clone());
            let session = TaskSession::new(store, gate);
            cli::execute(&session, command, &config.timestamp_format).await
        }
        StoreMode::Local {
            data_file,
            identity,
        } => {
            if let Some(dir) = data_file.parent() {
                std::fs::create_dir_all(dir).map_err(|source| {
                    taskdeck_proto::table::SnapshotError::Io {
                        path: dir.to_path_buf(),
                        source,
                    }
                })?;
            }
            let store = LocalStore::open(&data_file)?;
            let gate = SessionGate::signed_in(Identity::new(identity));
            let session = TaskSession::new(store, gate);
            cli::execute(&session, command, &config.timestamp_format).await
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskdeck.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
