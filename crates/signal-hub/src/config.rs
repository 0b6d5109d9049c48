//! Signal Hub configuration.
//!
//! Configuration is loaded from environment variables. Every variable is
//! optional; unset variables fall back to the defaults below, but a variable
//! that is set to an unparseable value is an error rather than silently
//! ignored.

use axum::http::HeaderValue;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Default bind address for the HTTP/WebSocket listener.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default registry mailbox capacity.
pub const DEFAULT_REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// Default per-connection outbound queue capacity.
pub const DEFAULT_OUTBOUND_QUEUE_SIZE: usize = 256;

/// Default largest accepted inbound frame (64 KiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 65536;

/// Default time allowed for closing connections on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 5;

/// Signal Hub configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP/WebSocket bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Registry actor mailbox capacity (default: 1000).
    pub registry_channel_buffer: usize,

    /// Outbound queue capacity per connection (default: 256).
    pub outbound_queue_size: usize,

    /// Inbound frames larger than this are rejected (default: 65536).
    pub max_message_bytes: usize,

    /// Drop rooms from the table once their last member leaves (default: false).
    pub prune_empty_rooms: bool,

    /// Deadline for closing connections during shutdown (default: 5).
    pub shutdown_grace_seconds: u64,

    /// Emit logs as JSON lines (default: false).
    pub log_json: bool,

    /// Browser origins allowed to call the hub (default: none).
    ///
    /// `*` allows any origin. When empty no CORS headers are sent and
    /// WebSocket upgrades are not origin-checked.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("HUB_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        bind_address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                ConfigError::InvalidValue(format!("HUB_BIND_ADDRESS={bind_address}: {e}"))
            })?;

        let registry_channel_buffer = parse_nonzero(
            vars,
            "HUB_REGISTRY_CHANNEL_BUFFER",
            DEFAULT_REGISTRY_CHANNEL_BUFFER,
        )?;
        let outbound_queue_size =
            parse_nonzero(vars, "HUB_OUTBOUND_QUEUE_SIZE", DEFAULT_OUTBOUND_QUEUE_SIZE)?;
        let max_message_bytes =
            parse_nonzero(vars, "HUB_MAX_MESSAGE_BYTES", DEFAULT_MAX_MESSAGE_BYTES)?;

        let prune_empty_rooms = parse_or(vars, "HUB_PRUNE_EMPTY_ROOMS", false)?;
        let shutdown_grace_seconds = parse_or(
            vars,
            "HUB_SHUTDOWN_GRACE_SECONDS",
            DEFAULT_SHUTDOWN_GRACE_SECONDS,
        )?;
        let log_json = parse_or(vars, "HUB_LOG_JSON", false)?;
        let allowed_origins = parse_origins(vars)?;

        Ok(Config {
            bind_address,
            registry_channel_buffer,
            outbound_queue_size,
            max_message_bytes,
            prune_empty_rooms,
            shutdown_grace_seconds,
            log_json,
            allowed_origins,
        })
    }
}

fn parse_or<T>(vars: &HashMap<String, String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(format!("{key}={raw}: {e}"))),
    }
}

fn parse_nonzero(
    vars: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let value = parse_or(vars, key, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(value)
}

/// Comma-separated `HUB_ALLOWED_ORIGINS`; blank entries are skipped.
fn parse_origins(vars: &HashMap<String, String>) -> Result<Vec<String>, ConfigError> {
    let Some(raw) = vars.get("HUB_ALLOWED_ORIGINS") else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map(|_| origin.to_string())
                .map_err(|e| {
                    ConfigError::InvalidValue(format!("HUB_ALLOWED_ORIGINS={origin}: {e}"))
                })
        })
        .collect()
}
