//! logsink - HTTP log ingestion service
//!
//! Configured entirely through `LOGSINK_*` environment variables.

use anyhow::Context;
use logsink_logging::LogsinkSubscriberBuilder;
use logsink_server::{ServerConfig, run_configured};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("invalid configuration")?;

    LogsinkSubscriberBuilder::new()
        .with_config(config.log_config())
        .try_init()
        .context("failed to initialize logging")?;

    info!(
        addr = %config.socket_addr(),
        backend = %config.backend(),
        format = %config.record_format,
        "logsink starting"
    );

    run_configured(config).await
}
