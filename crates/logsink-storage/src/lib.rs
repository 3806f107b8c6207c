//! # logsink Storage
//!
//! Durable, append-only storage for ingested log records.
//!
//! This crate turns concurrent, unordered writes into one ordered record
//! sequence and serves consistent reads of that sequence, whatever the
//! backing medium.
//!
//! ## Features
//!
//! - **LogStore trait**: Append / ListAll / Clear over a record sequence
//! - **FileLogStore**: newline-delimited flat file, fsynced on every append
//! - **SqliteLogStore**: relational table ordered by an autoincrement identifier
//! - **MemoryLogStore**: non-durable implementation for tests and development
//! - **Record model**: [`OpaqueRecord`] lines or [`StructuredRecord`] JSON entries
//!
//! ## Example
//!
//! ```rust,ignore
//! use logsink_storage::{FileLogStore, LogStore, OpaqueRecord, Record};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = FileLogStore::<OpaqueRecord>::open("./data/logs.txt").await.unwrap();
//!
//!     store.append(OpaqueRecord::decode(b"hello").unwrap()).await.unwrap();
//!
//!     let records = store.list_all().await.unwrap();
//!     assert_eq!(records.last().unwrap().as_bytes(), b"hello");
//!
//!     store.clear().await.unwrap();
//! }
//! ```

pub mod error;
pub mod file;
pub mod memory;
pub mod record;
pub mod relational;

// Re-exports
pub use error::StorageError;
pub use file::FileLogStore;
pub use memory::MemoryLogStore;
pub use record::{OpaqueRecord, Record, RecordFormat, StructuredRecord, UnknownRecordFormat};
pub use relational::{SqliteLogStore, TableRecord};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// The durable, append-only record sequence of one deployment
///
/// Implementations must be safe to share between concurrently running
/// requests. The guarantees every backend provides:
///
/// - A successful [`append`](LogStore::append) has been committed to the
///   medium and is visible to every later [`list_all`](LogStore::list_all)
/// - A failed append leaves no trace of the record
/// - Records come back oldest first, in commit order
/// - [`clear`](LogStore::clear) is atomic with respect to appends and reads
///
/// There is no retry anywhere in a store: each call makes one attempt and
/// reports its outcome.
#[async_trait]
pub trait LogStore<R: Record>: Send + Sync {
    /// Durably append one record at the tail of the sequence
    ///
    /// # Errors
    ///
    /// Returns an input error (see [`StorageError::is_invalid_input`]) if the
    /// backend cannot represent the record, or a medium error if the write
    /// could not be committed. In both cases the sequence is unchanged.
    async fn append(&self, record: R) -> Result<(), StorageError>;

    /// Every record in the sequence, oldest first
    ///
    /// Returns an empty vector for an empty (or not yet created) sequence.
    /// Never returns a partial list: any read failure is an error.
    async fn list_all(&self) -> Result<Vec<R>, StorageError>;

    /// Atomically remove every record
    ///
    /// Clearing an empty sequence succeeds. The store stays usable.
    async fn clear(&self) -> Result<(), StorageError>;

    /// Which backend this store is
    fn backend(&self) -> BackendKind;
}

/// The available storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    /// Newline-delimited flat file
    File,
    /// SQLite table
    #[default]
    Relational,
    /// Process memory, lost on exit
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::File => "file",
            BackendKind::Relational => "relational",
            BackendKind::Memory => "memory",
        }
    }

    /// Whether records survive a process restart
    pub fn is_durable(&self) -> bool {
        !matches!(self, BackendKind::Memory)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a backend name is not recognised
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown storage backend `{0}` (expected `file`, `relational` or `memory`)")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "relational" | "sqlite" => Ok(BackendKind::Relational),
            "memory" => Ok(BackendKind::Memory),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

/// Where each backend keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Backend to open
    pub backend: BackendKind,
    /// Flat file used by [`BackendKind::File`]
    pub log_path: PathBuf,
    /// Database file used by [`BackendKind::Relational`]
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            log_path: PathBuf::from("./data/logs.txt"),
            db_path: PathBuf::from("./data/logs.db"),
        }
    }
}

/// Open and initialize the configured backend for records of type `R`
///
/// Structure creation (file, table) happens here, once, before the store is
/// handed out. Any error is a startup failure.
pub async fn open_store<R: TableRecord>(
    config: &StoreConfig,
) -> Result<Arc<dyn LogStore<R>>, StorageError> {
    let store: Arc<dyn LogStore<R>> = match config.backend {
        BackendKind::File => Arc::new(FileLogStore::<R>::open(&config.log_path).await?),
        BackendKind::Relational => {
            let db_path = config.db_path.clone();
            let store = tokio::task::spawn_blocking(move || SqliteLogStore::<R>::open(db_path))
                .await??;
            Arc::new(store)
        }
        BackendKind::Memory => Arc::new(MemoryLogStore::<R>::new()),
    };

    info!(
        backend = %config.backend,
        format = %R::FORMAT,
        "Log store ready"
    );
    Ok(store)
}
