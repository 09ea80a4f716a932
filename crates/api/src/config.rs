//! Application configuration

use axum::http::HeaderValue;
use std::env;
use std::str::FromStr;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub client_origin: HeaderValue,

    // Database
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub run_migrations: bool,

    // Signaling
    pub room_evict_on_disconnect: bool,

    // Logging
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_origin_raw =
            env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let client_origin = HeaderValue::from_str(&client_origin_raw)
            .map_err(|_| ConfigError::Invalid("CLIENT_ORIGIN", client_origin_raw))?;

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            client_origin,

            // Database (optional - presence and room linkage are not persisted without it)
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            run_migrations: parse_var("RUN_MIGRATIONS", true)?,

            // Signaling
            room_evict_on_disconnect: parse_var("ROOM_EVICT_ON_DISCONNECT", true)?,

            // Logging
            log_format: parse_var("LOG_FORMAT", LogFormat::Pretty)?,
        })
    }
}

/// Read and parse an optional variable, falling back to `default` when unset
fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
