//! Configuration system for the `relaychat` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/relaychat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::hierarchy::CacheCapacities;
use crate::chat::PipelineOptions;
use crate::orchestrator::{
    BoundedWait, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL, DEFAULT_POOL_SIZE,
};
use crate::transport::websocket::{
    ConnectOptions, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONNECT_TIMEOUT,
};

/// Lowest chat server port accepted.
pub const MIN_PORT: u16 = 1025;

/// Default crypto key-server host.
pub const DEFAULT_CRYPTO_SERVER: &str = "localhost";

/// Default crypto key-server port.
pub const DEFAULT_CRYPTO_PORT: u16 = 5567;

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

    /// A required setting was given neither on the command line nor in the
    /// config file.
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// A port outside the accepted range.
    #[error("port {0} is out of range ({MIN_PORT}..=65535)")]
    InvalidPort(u16),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    crypto: CryptoFileConfig,
    cache: CacheFileConfig,
    pipeline: PipelineFileConfig,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    connect_timeout_secs: Option<u64>,
    channel_capacity: Option<usize>,
}

/// `[crypto]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CryptoFileConfig {
    password: Option<String>,
    device: Option<String>,
    server: Option<String>,
    port: Option<u16>,
}

/// `[cache]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CacheFileConfig {
    private_capacity: Option<usize>,
    shared_capacity: Option<usize>,
    screen_capacity: Option<usize>,
}

/// `[pipeline]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct PipelineFileConfig {
    workers: Option<usize>,
    poll_interval_ms: Option<u64>,
    max_wait_secs: Option<u64>,
    shared_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Settings handed to the crypto provider at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoConfig {
    /// Account password; empty means none.
    pub password: String,
    /// Emulated device identifier, if any.
    pub device: Option<String>,
    /// Key-server host.
    pub server: String,
    /// Key-server port.
    pub port: u16,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            device: None,
            server: DEFAULT_CRYPTO_SERVER.to_string(),
            port: DEFAULT_CRYPTO_PORT,
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Chat server --
    /// Chat server host.
    pub server: Option<String>,
    /// Chat server port.
    pub port: Option<u16>,
    /// Local identity.
    pub username: Option<String>,
    /// WebSocket handshake timeout.
    pub connect_timeout: Duration,
    /// Inbound frame channel capacity.
    pub channel_capacity: usize,

    // -- Crypto --
    /// Crypto provider settings.
    pub crypto: CryptoConfig,

    // -- Caches and pipeline --
    /// Cache capacities.
    pub capacities: CacheCapacities,
    /// Crypto worker pool size.
    pub workers: usize,
    /// Bounded-wait poll interval.
    pub poll_interval: Duration,
    /// Bounded-wait total budget.
    pub max_wait: Duration,
    /// Root directory for received files.
    pub shared_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: None,
            username: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            crypto: CryptoConfig::default(),
            capacities: CacheCapacities::default(),
            workers: DEFAULT_POOL_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
            shared_dir: PathBuf::from("shared"),
        }
    }
}

/// Where to connect and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    /// Chat server host.
    pub server: String,
    /// Chat server port.
    pub port: u16,
    /// Local identity.
    pub username: String,
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

    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            server: cli.server.clone().or_else(|| file.server.host.clone()),
            port: cli.port.or(file.server.port),
            username: cli
                .username
                .clone()
                .or_else(|| file.server.username.clone()),
            connect_timeout: file
                .server
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            channel_capacity: file
                .server
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            crypto: CryptoConfig {
                password: cli
                    .crypto_password
                    .clone()
                    .or_else(|| file.crypto.password.clone())
                    .unwrap_or(defaults.crypto.password),
                device: cli.device.clone().or_else(|| file.crypto.device.clone()),
                server: cli
                    .crypto_server
                    .clone()
                    .or_else(|| file.crypto.server.clone())
                    .unwrap_or(defaults.crypto.server),
                port: cli
                    .crypto_port
                    .or(file.crypto.port)
                    .unwrap_or(defaults.crypto.port),
            },
            capacities: CacheCapacities {
                private: file
                    .cache
                    .private_capacity
                    .unwrap_or(defaults.capacities.private),
                shared: file
                    .cache
                    .shared_capacity
                    .unwrap_or(defaults.capacities.shared),
                screen: file
                    .cache
                    .screen_capacity
                    .unwrap_or(defaults.capacities.screen),
            },
            workers: file.pipeline.workers.unwrap_or(defaults.workers),
            poll_interval: file
                .pipeline
                .poll_interval_ms
                .map_or(defaults.poll_interval, Duration::from_millis),
            max_wait: file
                .pipeline
                .max_wait_secs
                .map_or(defaults.max_wait, Duration::from_secs),
            shared_dir: file
                .pipeline
                .shared_dir
                .clone()
                .unwrap_or(defaults.shared_dir),
        }
    }

    /// The chat server and identity, if all three were provided.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] naming the first absent setting, or
    /// [`ConfigError::InvalidPort`] for a port below [`MIN_PORT`].
    pub fn session_target(&self) -> Result<SessionTarget, ConfigError> {
        let server = self
            .server
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("server"))?;
        let port = self.port.ok_or(ConfigError::Missing("port"))?;
        if port < MIN_PORT {
            return Err(ConfigError::InvalidPort(port));
        }
        let username = self
            .username
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::Missing("username"))?;
        Ok(SessionTarget {
            server,
            port,
            username,
        })
    }

    /// Pipeline tunables.
    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            capacities: self.capacities,
            pool_size: self.workers,
            wait: BoundedWait::new(self.poll_interval, self.max_wait),
            shared_dir: self.shared_dir.clone(),
        }
    }

    /// Transport tunables.
    #[must_use]
    pub const fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            timeout: self.connect_timeout,
            channel_capacity: self.channel_capacity,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Terminal chat client with end-to-end encrypted private messages")]
pub struct CliArgs {
    /// Chat server host.
    #[arg(short, long, env = "RELAYCHAT_SERVER")]
    pub server: Option<String>,

    /// Chat server port.
    #[arg(
        short,
        long,
        env = "RELAYCHAT_PORT",
        value_parser = clap::value_parser!(u16).range(i64::from(MIN_PORT)..=65535)
    )]
    pub port: Option<u16>,

    /// Your chat identity.
    #[arg(short, long, env = "RELAYCHAT_USERNAME")]
    pub username: Option<String>,

    /// Crypto provider account password.
    #[arg(long, env = "RELAYCHAT_CRYPTO_PASSWORD", hide_env_values = true)]
    pub crypto_password: Option<String>,

    /// Emulated device identifier for the crypto provider.
    #[arg(long, env = "RELAYCHAT_DEVICE")]
    pub device: Option<String>,

    /// Crypto key-server host (default: localhost).
    #[arg(long, env = "RELAYCHAT_CRYPTO_SERVER")]
    pub crypto_server: Option<String>,

    /// Crypto key-server port (default: 5567).
    #[arg(long, env = "RELAYCHAT_CRYPTO_PORT")]
    pub crypto_port: Option<u16>,

    /// Path to config file (default: `~/.config/relaychat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RELAYCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/relaychat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// An explicit path must exist; the default path is optional.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("relaychat").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
