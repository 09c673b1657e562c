//! Configuration module - environment variable parsing

use std::env;

/// Client configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the HTTP API (login and ticket endpoints)
    pub api_base: String,
    /// WebSocket endpoint for the realtime session
    pub ws_url: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Account email used by the terminal client
    pub email: String,
    /// Account password used by the terminal client
    pub password: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base =
            env::var("ZERION_API_BASE").unwrap_or_else(|_| "http://localhost:8000".to_string());
        reqwest::Url::parse(&api_base).map_err(|_| ConfigError::InvalidUrl("ZERION_API_BASE"))?;

        let ws_url =
            env::var("ZERION_WS_URL").unwrap_or_else(|_| "ws://localhost:8000/ws".to_string());
        reqwest::Url::parse(&ws_url).map_err(|_| ConfigError::InvalidUrl("ZERION_WS_URL"))?;

        Ok(Self {
            api_base,
            ws_url,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            email: env::var("ZERION_EMAIL").unwrap_or_else(|_| "demo@zerion.local".to_string()),
            password: env::var("ZERION_PASSWORD").unwrap_or_else(|_| "demo".to_string()),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid URL in environment variable {0}")]
    InvalidUrl(&'static str),
}
