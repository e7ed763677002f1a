//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::r#match::{DEFAULT_ROUNDS_TO_WIN, DEFAULT_ROUND_TIME_SECS};
use crate::game::MatchConfig;
use crate::util::rate_limit::RELAY_RATE_LIMIT;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma-separated; `*` allows any
    pub client_origin: String,

    pub round_time_secs: u32,
    pub rounds_to_win: u32,
    /// Cap on draw extensions, unbounded when unset
    pub max_rounds_to_win: Option<u32>,

    /// Idle rooms are closed after this long
    pub room_ttl: Duration,
    /// Inbound frames per second per connection
    pub relay_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            round_time_secs: parse_nonzero("ROUND_TIME_SECS", DEFAULT_ROUND_TIME_SECS)?,
            rounds_to_win: parse_nonzero("ROUNDS_TO_WIN", DEFAULT_ROUNDS_TO_WIN)?,
            max_rounds_to_win: parse_optional("MAX_ROUNDS_TO_WIN")?,

            room_ttl: Duration::from_secs(parse_or("ROOM_TTL_SECS", 3600u64)?),
            relay_rate_limit: parse_or("RELAY_RATE_LIMIT", RELAY_RATE_LIMIT)?,
        })
    }

    /// Match settings for a new server-hosted match
    pub fn match_config(&self, seed: u64) -> MatchConfig {
        MatchConfig {
            round_time_secs: self.round_time_secs,
            rounds_to_win: self.rounds_to_win,
            max_rounds_to_win: self.max_rounds_to_win,
            seed,
            ..MatchConfig::default()
        }
    }
}

fn parse_optional<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(parse_optional(name)?.unwrap_or(default))
}

fn parse_nonzero(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match parse_or(name, default)? {
        0 => Err(ConfigError::Invalid(name)),
        value => Ok(value),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
