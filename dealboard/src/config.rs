//! Configuration system for the Dealboard client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/dealboard/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur when loading client configuration.
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
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ClientConfigFile {
    connection: ConnectionFileConfig,
    reconnect: ReconnectFileConfig,
}

/// `[connection]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConnectionFileConfig {
    server_url: Option<String>,
    api_url: Option<String>,
    name: Option<String>,
}

/// `[reconnect]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReconnectFileConfig {
    base_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the client.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Dealboard task board client")]
pub struct ClientCliArgs {
    /// WebSocket URL of the board server.
    #[arg(short, long, env = "DEALBOARD_URL")]
    pub server: Option<String>,

    /// Base HTTP URL of the REST API.
    #[arg(short, long, env = "DEALBOARD_API")]
    pub api: Option<String>,

    /// Display name to join the board with.
    #[arg(short, long, env = "DEALBOARD_NAME")]
    pub name: Option<String>,

    /// Path to config file (default: `~/.config/dealboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "DEALBOARD_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Reconnection behavior of the sync supervisor.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base delay between attempts; attempt `n` waits `base_delay * n`.
    pub base_delay: Duration,
    /// Consecutive failures tolerated before degrading to direct calls.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_attempts: 5,
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the board server (e.g., `ws://127.0.0.1:8080/ws`).
    pub server_url: String,
    /// Base HTTP URL of the REST API (e.g., `http://127.0.0.1:8080`).
    pub api_url: String,
    /// Display name to join the board with.
    pub name: String,
    /// Reconnection behavior.
    pub reconnect: ReconnectConfig,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080/ws".to_string(),
            api_url: "http://127.0.0.1:8080".to_string(),
            name: "guest".to_string(),
            reconnect: ReconnectConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Creates a config with explicit endpoints and name, defaults for
    /// the rest. Convenience for tests and embedding.
    #[must_use]
    pub fn new(server_url: String, api_url: String, name: String) -> Self {
        Self {
            server_url,
            api_url,
            name,
            ..Self::default()
        }
    }

    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &ClientCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &ClientCliArgs, file: &ClientConfigFile) -> Self {
        let defaults = Self::default();
        let reconnect_defaults = ReconnectConfig::default();

        Self {
            server_url: cli
                .server
                .clone()
                .or_else(|| file.connection.server_url.clone())
                .unwrap_or(defaults.server_url),
            api_url: cli
                .api
                .clone()
                .or_else(|| file.connection.api_url.clone())
                .unwrap_or(defaults.api_url),
            name: cli
                .name
                .clone()
                .or_else(|| file.connection.name.clone())
                .unwrap_or(defaults.name),
            reconnect: ReconnectConfig {
                base_delay: file
                    .reconnect
                    .base_delay_ms
                    .map_or(reconnect_defaults.base_delay, Duration::from_millis),
                max_attempts: file
                    .reconnect
                    .max_attempts
                    .unwrap_or(reconnect_defaults.max_attempts),
            },
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the client.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<ClientConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ClientConfigFile::default());
        };
        config_dir.join("dealboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
