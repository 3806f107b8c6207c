//! Server configuration
//!
//! All settings come from environment variables and every one of them is
//! optional. An empty variable counts as unset.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use logsink_logging::{LogConfig, LogFormat};
use logsink_storage::{BackendKind, RecordFormat, StoreConfig};
use thiserror::Error;

pub const ENV_PORT: &str = "LOGSINK_PORT";
pub const ENV_BIND: &str = "LOGSINK_BIND";
pub const ENV_BACKEND: &str = "LOGSINK_BACKEND";
pub const ENV_RECORD_FORMAT: &str = "LOGSINK_RECORD_FORMAT";
pub const ENV_LOG_PATH: &str = "LOGSINK_LOG_PATH";
pub const ENV_DB_PATH: &str = "LOGSINK_DB_PATH";
pub const ENV_MAX_BODY_BYTES: &str = "LOGSINK_MAX_BODY_BYTES";
pub const ENV_LOG_LEVEL: &str = "LOGSINK_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "LOGSINK_LOG_FORMAT";
pub const ENV_DB_HOST: &str = "LOGSINK_DB_HOST";
pub const ENV_DB_PORT: &str = "LOGSINK_DB_PORT";
pub const ENV_DB_USER: &str = "LOGSINK_DB_USER";
pub const ENV_DB_PASSWORD: &str = "LOGSINK_DB_PASSWORD";

/// Connection settings of a networked database server
///
/// The relational backend is an embedded SQLite file named by
/// [`ENV_DB_PATH`], so these are recognized but have no effect.
pub const UNSUPPORTED_DB_KEYS: [&str; 4] = [ENV_DB_HOST, ENV_DB_PORT, ENV_DB_USER, ENV_DB_PASSWORD];

/// Default listening port
pub const DEFAULT_PORT: u16 = 6000;

/// Default cap on request bodies (1 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Errors raised while reading the configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Complete configuration of one logsink deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Record shape stored by this deployment
    pub record_format: RecordFormat,
    /// Backend selection and paths
    pub store: StoreConfig,
    /// Largest accepted request body
    pub max_body_bytes: usize,
    /// Default tracing level
    pub log_level: String,
    /// Console log format
    pub log_format: LogFormat,
    /// Unsupported database keys that were set, reported at startup
    pub ignored_keys: Vec<&'static str>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            record_format: RecordFormat::default(),
            store: StoreConfig::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            ignored_keys: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            bind: parse_or(get(ENV_BIND), ENV_BIND, defaults.bind)?,
            port: parse_or(get(ENV_PORT), ENV_PORT, defaults.port)?,
            record_format: parse_or(
                get(ENV_RECORD_FORMAT),
                ENV_RECORD_FORMAT,
                defaults.record_format,
            )?,
            store: StoreConfig {
                backend: parse_or(get(ENV_BACKEND), ENV_BACKEND, defaults.store.backend)?,
                log_path: get(ENV_LOG_PATH)
                    .map(PathBuf::from)
                    .unwrap_or(defaults.store.log_path),
                db_path: get(ENV_DB_PATH)
                    .map(PathBuf::from)
                    .unwrap_or(defaults.store.db_path),
            },
            max_body_bytes: parse_or(
                get(ENV_MAX_BODY_BYTES),
                ENV_MAX_BODY_BYTES,
                defaults.max_body_bytes,
            )?,
            log_level: get(ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            log_format: parse_or(get(ENV_LOG_FORMAT), ENV_LOG_FORMAT, defaults.log_format)?,
            ignored_keys: UNSUPPORTED_DB_KEYS
                .into_iter()
                .filter(|key| get(*key).is_some())
                .collect(),
        })
    }

    /// Socket address to bind
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Backend in use
    pub fn backend(&self) -> BackendKind {
        self.store.backend
    }

    /// Logging configuration derived from the server settings
    pub fn log_config(&self) -> LogConfig {
        let mut config = match self.log_format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };
        config.default_level = self.log_level.clone();
        config
    }
}

fn parse_or<T>(value: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
