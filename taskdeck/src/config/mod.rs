//! Configuration system for the `taskdeck` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskdeck/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Command;
use crate::store::RemoteOptions;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The server URL is malformed or not a WebSocket URL.
    #[error("invalid server URL '{url}': {reason}")]
    InvalidServerUrl {
        /// The URL as configured.
        url: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A server URL was configured without a token.
    #[error("a server URL requires a token (--token or TASKDECK_TOKEN)")]
    MissingToken,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    local: LocalFileConfig,
    ui: UiFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    url: Option<String>,
    token: Option<String>,
    connect_timeout_secs: Option<u64>,
    hello_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    request_retries: Option<u32>,
}

/// `[local]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LocalFileConfig {
    data_file: Option<PathBuf>,
    identity: Option<String>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    timestamp_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Where tasks live for this invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMode {
    /// A `taskdeck` server.
    Remote {
        /// Validated `ws://` or `wss://` URL.
        url: url::Url,
        /// Bearer token presented in `Hello`.
        token: String,
        /// Timeouts and retries.
        options: RemoteOptions,
    },
    /// A data file on this machine.
    Local {
        /// Snapshot file path.
        data_file: PathBuf,
        /// Identity tasks are created under.
        identity: String,
    },
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Server --
    /// Server WebSocket URL. Local mode when unset.
    pub server_url: Option<String>,
    /// Bearer token for the server.
    pub token: Option<String>,
    /// Timeout for connecting to the server.
    pub connect_timeout: Duration,
    /// Timeout for the server's answer to `Hello`.
    pub hello_timeout: Duration,
    /// Timeout for each request attempt.
    pub request_timeout: Duration,
    /// Extra attempts for idempotent requests after a timeout.
    pub request_retries: u32,

    // -- Local --
    /// Data file for local mode.
    pub data_file: PathBuf,
    /// Identity used in local mode.
    pub local_identity: String,

    // -- UI --
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let data_file = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("taskdeck")
            .join("tasks.bin");
        Self {
            server_url: None,
            token: None,
            connect_timeout: Duration::from_secs(10),
            hello_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            request_retries: 1,
            data_file,
            local_identity: "local".to_string(),
            timestamp_format: "%Y-%m-%d %H:%M".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            server_url: cli.server.clone().or_else(|| file.server.url.clone()),
            token: cli.token.clone().or_else(|| file.server.token.clone()),
            connect_timeout: file
                .server
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            hello_timeout: file
                .server
                .hello_timeout_secs
                .map_or(defaults.hello_timeout, Duration::from_secs),
            request_timeout: file
                .server
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            request_retries: file
                .server
                .request_retries
                .unwrap_or(defaults.request_retries),
            data_file: cli
                .data_file
                .clone()
                .or_else(|| file.local.data_file.clone())
                .unwrap_or(defaults.data_file),
            local_identity: cli
                .identity
                .clone()
                .or_else(|| file.local.identity.clone())
                .unwrap_or(defaults.local_identity),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.ui.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
        }
    }

    /// Timeouts and retries for a [`crate::store::RemoteStore`].
    #[must_use]
    pub const fn remote_options(&self) -> RemoteOptions {
        RemoteOptions {
            connect_timeout: self.connect_timeout,
            hello_timeout: self.hello_timeout,
            request_timeout: self.request_timeout,
            request_retries: self.request_retries,
        }
    }

    /// Decides between server and local mode.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidServerUrl`] for a malformed or non-`ws`
    /// URL and [`ConfigError::MissingToken`] if a URL is set without a token.
    pub fn store_mode(&self) -> Result<StoreMode, ConfigError> {
        let Some(raw) = &self.server_url else {
            return Ok(StoreMode::Local {
                data_file: self.data_file.clone(),
                identity: self.local_identity.clone(),
            });
        };

        let url = url::Url::parse(raw).map_err(|e| ConfigError::InvalidServerUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidServerUrl {
                url: raw.clone(),
                reason: format!("scheme must be ws or wss, not {}", url.scheme()),
            });
        }

        let token = self
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?;

        Ok(StoreMode::Remote {
            url,
            token,
            options: self.remote_options(),
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Multi-user to-do lists from the terminal")]
pub struct CliArgs {
    /// WebSocket URL of the taskdeck server (e.g. `ws://127.0.0.1:9100/ws`).
    #[arg(long, env = "TASKDECK_SERVER")]
    pub server: Option<String>,

    /// Bearer token for the server.
    #[arg(long, env = "TASKDECK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Data file for local mode (default: `<data dir>/taskdeck/tasks.bin`).
    #[arg(long, env = "TASKDECK_DATA_FILE")]
    pub data_file: Option<PathBuf>,

    /// Identity used in local mode.
    #[arg(long)]
    pub identity: Option<String>,

    /// Path to config file (default: `~/.config/taskdeck/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKDECK_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskdeck.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do. Lists tasks when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskdeck").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
