//! Configuration management for the gateway
//!
//! All configuration is environment-driven; every knob has a production
//! default so a bare `cargo run` comes up on a local SQLite file.

use crate::utils::error::{GatewayError, Result};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration struct for the gateway
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Database pool configuration
    pub database: DatabaseConfig,
    /// API key authentication configuration
    pub auth: AuthConfig,
    /// Voice channel configuration
    pub voice: VoiceConfig,
    /// Async job worker configuration
    pub jobs: JobConfig,
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
}

/// Database pool settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (sqlite:path or sqlite::memory:)
    pub url: String,
    /// Maximum pool connections
    pub connection_limit: u32,
    /// Pool acquire timeout in seconds
    pub pool_timeout: u64,
    /// Connection establishment timeout in seconds
    pub connect_timeout: u64,
}

/// API key settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Prefix stamped onto every generated plaintext key
    pub key_prefix: String,
}

/// Voice channel settings
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Directory for stored audio artifacts
    pub storage_dir: String,
    /// Gates audio upload; transcripts are always accepted
    pub enabled: bool,
}

/// Job worker settings
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Poll interval between claim attempts
    pub poll_interval: Duration,
    /// Lease duration for a claimed job
    pub lease: Duration,
    /// Number of worker loops to spawn in-process
    pub worker_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite:data/gateway.db".to_string(),
                connection_limit: 25,
                pool_timeout: 10,
                connect_timeout: 30,
            },
            auth: AuthConfig {
                key_prefix: "vb_live_".to_string(),
            },
            voice: VoiceConfig {
                storage_dir: "data/audio".to_string(),
                enabled: true,
            },
            jobs: JobConfig {
                poll_interval: Duration::from_millis(1000),
                lease: Duration::from_secs(300),
                worker_count: 1,
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let defaults = Config::default();
        let config = Self {
            server: ServerConfig {
                host: env_or("HOST", defaults.server.host),
                port: env_parse("PORT", defaults.server.port)?,
            },
            database: DatabaseConfig {
                url: env_or("DATABASE_URL", defaults.database.url),
                connection_limit: env_parse(
                    "DATABASE_CONNECTION_LIMIT",
                    defaults.database.connection_limit,
                )?,
                pool_timeout: env_parse("DATABASE_POOL_TIMEOUT", defaults.database.pool_timeout)?,
                connect_timeout: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    defaults.database.connect_timeout,
                )?,
            },
            auth: AuthConfig {
                key_prefix: env_or("API_KEY_PREFIX", defaults.auth.key_prefix),
            },
            voice: VoiceConfig {
                storage_dir: env_or("AUDIO_STORAGE_DIR", defaults.voice.storage_dir),
                enabled: env_or("VOICE_MODE", "on".to_string()) != "off",
            },
            jobs: JobConfig {
                poll_interval: Duration::from_millis(env_parse("JOB_POLL_INTERVAL_MS", 1000u64)?),
                lease: Duration::from_secs(env_parse("JOB_LEASE_SECS", 300u64)?),
                worker_count: env_parse("WORKER_COUNT", defaults.jobs.worker_count)?,
            },
        };

        config.validate()?;
        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(GatewayError::Config("DATABASE_URL cannot be empty".into()));
        }
        if self.database.connection_limit == 0 {
            return Err(GatewayError::Config(
                "DATABASE_CONNECTION_LIMIT must be at least 1".into(),
            ));
        }
        if self.auth.key_prefix.is_empty() {
            return Err(GatewayError::Config("API_KEY_PREFIX cannot be empty".into()));
        }
        if self.jobs.worker_count == 0 {
            return Err(GatewayError::Config("WORKER_COUNT must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| GatewayError::Config(format!("invalid value for {}: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.auth.key_prefix, "vb_live_");
        assert_eq!(config.database.connection_limit, 25);
    }

    #[test]
    fn rejects_zero_workers() {
        let mut config = Config::default();
        config.jobs.worker_count = 0;
        assert!(config.validate().is_err());
    }
}
