//! Server configuration loading from file and environment variables.

use callwire_directory::{DirectoryConfig, GreetingConfig};
use callwire_session::DEFAULT_LISTENER_QUEUE;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Session retention and fan-out settings.
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Session metadata directory.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Opening greeting and assistant routing.
    #[serde(default)]
    pub greeting: GreetingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "callwire_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Session lifetime and delivery settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Seconds a session with no listeners may stay idle before it is
    /// evicted. `0` disables eviction.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Capacity of each connection's outbound queue.
    #[serde(default = "default_listener_queue")]
    pub listener_queue: usize,
}

impl SessionsConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_retention_secs() -> u64 {
    30 * 60
}

fn default_listener_queue() -> usize {
    DEFAULT_LISTENER_QUEUE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            listener_queue: default_listener_queue(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CALLWIRE_HOST` overrides `server.host`
/// - `CALLWIRE_PORT` overrides `server.port`
/// - `CALLWIRE_LOG_LEVEL` overrides `logging.level`
/// - `CALLWIRE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `CALLWIRE_RETENTION_SECS` overrides `sessions.retention_secs`
/// - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_SYNC_SERVICE_SID` and
///   `CALLWIRE_CALLS_MAP_SID` override the `directory` credentials
/// - `RETAIL_ASSISTANT_ID`, `ESTATES_ASSISTANT_ID` and
///   `HEALTHCARE_ASSISTANT_ID` override `greeting.assistants`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("CALLWIRE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("CALLWIRE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(level) = std::env::var("CALLWIRE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("CALLWIRE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(retention) = std::env::var("CALLWIRE_RETENTION_SECS") {
        if let Ok(parsed) = retention.parse() {
            config.sessions.retention_secs = parsed;
        }
    }

    if let Some(sid) = env_string("TWILIO_ACCOUNT_SID") {
        config.directory.account_sid = sid;
    }
    if let Some(token) = env_string("TWILIO_AUTH_TOKEN") {
        config.directory.auth_token = token;
    }
    if let Some(service) = env_string("TWILIO_SYNC_SERVICE_SID") {
        config.directory.service_sid = service;
    }
    if let Some(map) = env_string("CALLWIRE_CALLS_MAP_SID") {
        config.directory.map_sid = map;
    }

    let assistants = &mut config.greeting.assistants;
    if let Some(id) = env_string("RETAIL_ASSISTANT_ID") {
        assistants.retail = Some(id);
    }
    if let Some(id) = env_string("ESTATES_ASSISTANT_ID") {
        assistants.estates = Some(id);
    }
    if let Some(id) = env_string("HEALTHCARE_ASSISTANT_ID") {
        assistants.healthcare = Some(id);
    }

    Ok(config)
}
