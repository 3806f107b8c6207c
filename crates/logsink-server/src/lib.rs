//! logsink HTTP service
//!
//! Accepts log records on `/log`, appends them to the configured store and
//! serves the full sequence back. One deployment stores exactly one record
//! shape, picked at startup from [`ServerConfig::record_format`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::ApiError;
pub use handlers::AppState;
pub use server::{LogServer, build_router};

use anyhow::Context;
use logsink_storage::{OpaqueRecord, RecordFormat, StructuredRecord, TableRecord, open_store};
use tracing::{info, warn};

/// Open the store described by `config` and serve it until shutdown.
pub async fn run<R: TableRecord>(config: ServerConfig) -> anyhow::Result<()> {
    let store = open_store::<R>(&config.store)
        .await
        .with_context(|| format!("failed to open {} log store", config.backend()))?;

    if !config.ignored_keys.is_empty() {
        warn!(
            keys = ?config.ignored_keys,
            path = %config.store.db_path.display(),
            "Database server settings have no effect, the relational backend is a local SQLite file"
        );
    }

    if !config.backend().is_durable() {
        warn!(
            backend = %config.backend(),
            "Records are kept in memory and will be lost on shutdown"
        );
    }

    LogServer::new(store, config.socket_addr(), config.max_body_bytes)
        .run()
        .await
        .with_context(|| format!("server on {} failed", config.socket_addr()))?;

    info!("logsink stopped");
    Ok(())
}

/// Dispatch to [`run`] for the record shape named in `config`.
pub async fn run_configured(config: ServerConfig) -> anyhow::Result<()> {
    match config.record_format {
        RecordFormat::Opaque => run::<OpaqueRecord>(config).await,
        RecordFormat::Structured => run::<StructuredRecord>(config).await,
    }
}
