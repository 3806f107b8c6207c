//! API error type and its HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use logsink_storage::StorageError;
use thiserror::Error;
use tracing::{error, warn};

/// Failure of a `/log` request
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body is not a storable record (400)
    #[error(transparent)]
    InvalidInput(StorageError),

    /// The storage medium could not complete the operation (500)
    #[error("{context}: {source}")]
    Persistence {
        context: &'static str,
        #[source]
        source: StorageError,
    },
}

impl ApiError {
    /// Classify a storage error, `context` describes the failed operation
    pub fn from_storage(context: &'static str, err: StorageError) -> Self {
        if err.is_invalid_input() {
            ApiError::InvalidInput(err)
        } else {
            ApiError::Persistence {
                context,
                source: err,
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::InvalidInput(err) => {
                warn!(error = %err, "Rejected record");
                (status, err.to_string()).into_response()
            }
            ApiError::Persistence { context, source } => {
                error!(error = %source, "{}", context);
                (status, context).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_map_to_400() {
        let err = ApiError::from_storage("failed to persist record", StorageError::EmptyRecord);
        assert!(matches!(err, ApiError::InvalidInput(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_medium_errors_map_to_500() {
        let err = ApiError::from_storage(
            "failed to read logs",
            StorageError::io("permission denied"),
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "failed to read logs: I/O error: permission denied");
    }
}
