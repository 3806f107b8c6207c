//! HTTP server implementation for logsink.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use logsink_storage::{LogStore, Record};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::handlers::{AppState, handle_append, handle_clear, handle_health, handle_list};

/// Builds the axum Router with all endpoints.
///
/// Methods other than GET, POST and DELETE on `/log` get 405 from the method
/// router.
pub fn build_router<R: Record>(state: AppState<R>, max_body_bytes: usize) -> Router {
    Router::new()
        .route(
            "/log",
            get(handle_list::<R>)
                .post(handle_append::<R>)
                .delete(handle_clear::<R>),
        )
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP server for one log store.
pub struct LogServer<R: Record> {
    store: Arc<dyn LogStore<R>>,
    addr: SocketAddr,
    max_body_bytes: usize,
}

impl<R: Record> LogServer<R> {
    /// Create a new log server.
    pub fn new(store: Arc<dyn LogStore<R>>, addr: SocketAddr, max_body_bytes: usize) -> Self {
        Self {
            store,
            addr,
            max_body_bytes,
        }
    }

    /// Bind the listening socket and serve until SIGINT or SIGTERM.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until SIGINT or SIGTERM.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let backend = self.store.backend();
        let app = build_router(AppState::new(self.store), self.max_body_bytes);

        tracing::info!(
            addr = %listener.local_addr()?,
            %backend,
            format = %R::FORMAT,
            "Starting logsink HTTP server"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Listen for SIGTERM (container stop) and SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
