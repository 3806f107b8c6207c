//! HTTP route handlers for `/log` and `/health`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use logsink_storage::{LogStore, Record, StorageError};
use tracing::{debug, info};

use crate::error::ApiError;

/// Shared application state.
pub struct AppState<R: Record> {
    pub store: Arc<dyn LogStore<R>>,
}

impl<R: Record> AppState<R> {
    pub fn new(store: Arc<dyn LogStore<R>>) -> Self {
        Self { store }
    }
}

impl<R: Record> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

/// Handle POST /log
///
/// The body is one record. Returns 200 with an empty body once the record is
/// committed. The write runs on its own task so a client that hangs up does
/// not abort it halfway.
pub async fn handle_append<R: Record>(
    State(state): State<AppState<R>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let record = R::decode(&body).map_err(ApiError::InvalidInput)?;

    let store = Arc::clone(&state.store);
    tokio::spawn(async move { store.append(record).await })
        .await
        .map_err(StorageError::from)
        .and_then(|result| result)
        .map_err(|e| ApiError::from_storage("failed to persist record", e))?;

    debug!(bytes = body.len(), "Stored record");
    Ok(StatusCode::OK)
}

/// Handle GET /log
///
/// Returns the whole sequence, oldest first: newline-terminated lines for
/// opaque records, a JSON array for structured ones.
pub async fn handle_list<R: Record>(State(state): State<AppState<R>>) -> Result<Response, ApiError> {
    let records = state
        .store
        .list_all()
        .await
        .map_err(|e| ApiError::from_storage("failed to read logs", e))?;

    let body =
        R::encode_all(&records).map_err(|e| ApiError::from_storage("failed to read logs", e))?;

    Ok(([(header::CONTENT_TYPE, R::CONTENT_TYPE)], body).into_response())
}

/// Handle DELETE /log
pub async fn handle_clear<R: Record>(
    State(state): State<AppState<R>>,
) -> Result<(StatusCode, &'static str), ApiError> {
    let store = Arc::clone(&state.store);
    tokio::spawn(async move { store.clear().await })
        .await
        .map_err(StorageError::from)
        .and_then(|result| result)
        .map_err(|e| ApiError::from_storage("failed to clear logs", e))?;

    info!("Logs cleared");
    Ok((StatusCode::OK, "logs cleared"))
}

/// Handle GET /health
///
/// Returns 200 OK with the text "OK" while the server is accepting
/// connections.
pub async fn handle_health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
