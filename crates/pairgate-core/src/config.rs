//! Configuration loaded from `config.toml`, with `PORT` from the environment.

use crate::error::PairgateError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub pairing: PairingConfig,
    pub sessions: SessionsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Pairing and reconnect behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Reconnect attempts after a retryable disconnect before giving up.
    pub max_retries: u32,
    /// Delay before each reconnect attempt.
    pub backoff_ms: u64,
    /// How long a pairing request waits for the adapter's first code.
    pub code_timeout_secs: u64,
    /// Sent to the linked account once the connection opens.
    pub confirmation_message: String,
    /// Capacity of the session update broadcast.
    pub event_buffer: usize,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_ms: 5_000,
            code_timeout_secs: 30,
            confirmation_message: "Your device is now linked. You can close the pairing page."
                .to_string(),
            event_buffer: 64,
        }
    }
}

impl PairingConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn code_timeout(&self) -> Duration {
        Duration::from_secs(self.code_timeout_secs)
    }
}

/// Session bookkeeping: credential directory and sweep windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Root of the per-number credential directories owned by the adapter.
    pub dir: String,
    /// How long failed or abandoned sessions are kept before eviction.
    pub retention_secs: u64,
    /// How long an unconnected session may sit without adapter activity.
    pub pending_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            dir: "sessions".to_string(),
            retention_secs: 600,
            pending_ttl_secs: 300,
            sweep_interval_secs: 30,
        }
    }
}

/// Log filter and optional rolling file output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for daily log files. Empty means stderr only.
    pub dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: String::new(),
        }
    }
}

impl Config {
    /// Parse a TOML document and validate it.
    pub fn from_toml(text: &str) -> Result<Self, PairgateError> {
        let config: Self =
            toml::from_str(text).map_err(|e| PairgateError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    ///
    /// `PORT` from the environment overrides `server.port`.
    pub fn load(path: &Path) -> Result<Self, PairgateError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            Self::from_toml(&text)?
        } else {
            tracing::info!("no config at {}, using defaults", path.display());
            Self::default()
        };

        if let Ok(port) = std::env::var("PORT") {
            config.apply_port_override(&port)?;
        }
        Ok(config)
    }

    /// Apply a `PORT` value on top of the file configuration.
    pub fn apply_port_override(&mut self, raw: &str) -> Result<(), PairgateError> {
        self.server.port = raw
            .trim()
            .parse()
            .map_err(|_| PairgateError::Config(format!("PORT must be a port number, got {raw:?}")))?;
        Ok(())
    }

    /// Reject values that would make the service misbehave.
    pub fn validate(&self) -> Result<(), PairgateError> {
        if self.server.host.trim().is_empty() {
            return Err(PairgateError::Config("server.host must not be empty".into()));
        }
        if self.pairing.event_buffer == 0 {
            return Err(PairgateError::Config(
                "pairing.event_buffer must be at least 1".into(),
            ));
        }
        if self.pairing.code_timeout_secs == 0 {
            return Err(PairgateError::Config(
                "pairing.code_timeout_secs must be at least 1".into(),
            ));
        }
        if self.sessions.sweep_interval_secs == 0 {
            return Err(PairgateError::Config(
                "sessions.sweep_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
