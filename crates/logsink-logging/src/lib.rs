//! Structured logging setup for logsink
//!
//! Installs a global `tracing` subscriber that writes either JSON lines
//! (the default, for log aggregation) or human-readable output to the console.
//! `RUST_LOG` always takes precedence over the configured default level.
//!
//! # Quick Start
//!
//! ```ignore
//! use logsink_logging::{LogConfig, LogsinkSubscriberBuilder};
//!
//! // JSON lines to stdout
//! LogsinkSubscriberBuilder::new().init();
//!
//! // Development mode with pretty human-readable output
//! LogsinkSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```

pub mod config;

pub use config::{ConsoleConfig, JsonlConfig, LogConfig, LogFormat, UnknownLogFormat};

use thiserror::Error;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber was already installed
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Builder for configuring and initializing the logsink logging subscriber
pub struct LogsinkSubscriberBuilder {
    config: LogConfig,
}

impl LogsinkSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    ///
    /// Default: JSON lines to console at `info`
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// The active configuration
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.default_level))
    }

    /// Try to initialize the subscriber globally
    ///
    /// Returns an error if a global subscriber has already been set.
    pub fn try_init(self) -> Result<(), LoggingError> {
        let registry = Registry::default().with(self.env_filter());

        match self.config.console.format {
            LogFormat::Json => {
                let jsonl = &self.config.jsonl;
                let console_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(jsonl.include_spans)
                    .flatten_event(jsonl.flatten_events)
                    .with_file(jsonl.include_location)
                    .with_line_number(jsonl.include_location);
                registry.with(console_layer).try_init()?;
            }
            LogFormat::Pretty => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(self.config.console.ansi)
                    .with_target(true);
                registry.with(console_layer).try_init()?;
            }
        }

        Ok(())
    }

    /// Initialize the subscriber globally
    ///
    /// # Panics
    ///
    /// Panics if a global subscriber has already been set.
    pub fn init(self) {
        if let Err(e) = self.try_init() {
            panic!("{}", e);
        }
    }
}

impl Default for LogsinkSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}
