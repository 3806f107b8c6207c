//! Error types for logsink-storage
//!
//! Every store operation reports a [`StorageError`]. Callers only need to
//! distinguish two classes: errors caused by the record itself (see
//! [`StorageError::is_invalid_input`]) and failures of the durable medium.

use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// The record was empty after trimming its line terminator
    #[error("empty record")]
    EmptyRecord,

    /// The record could not be decoded into the configured shape
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The record contains a line terminator and cannot be stored as one line
    #[error("record contains a line terminator")]
    NotLineSafe,

    /// I/O error on the backing file
    #[error("I/O error: {0}")]
    Io(String),

    /// Error reported by the relational engine
    #[error("Database error: {0}")]
    Database(String),

    /// A stored record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The existing table does not match the configured record shape
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Task(err.to_string())
    }
}

impl StorageError {
    /// Create a new MalformedRecord error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRecord(message.into())
    }

    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Whether the error was caused by the submitted record rather than the
    /// storage medium. Such errors never change the stored sequence.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            StorageError::EmptyRecord | StorageError::MalformedRecord(_) | StorageError::NotLineSafe
        )
    }
}
