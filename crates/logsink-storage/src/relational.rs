//! SQLite storage implementation
//!
//! Records live in a single `logs` table. Every row gets an `INTEGER PRIMARY
//! KEY AUTOINCREMENT` identifier, which is strictly increasing and never
//! reused (not even after a clear), and reads are ordered by it.
//!
//! The connection is opened once and shared behind a mutex; each operation
//! runs on the blocking pool inside its own transaction.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::{Type, Value, ValueRef};
use rusqlite::{Connection, OpenFlags, Row, TransactionBehavior, params_from_iter};
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::record::{OpaqueRecord, Record, StructuredRecord};
use crate::{BackendKind, LogStore};

/// Name of the table holding the sequence
pub const LOGS_TABLE: &str = "logs";

const PRAGMAS: &str = "PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA busy_timeout=5000;";

/// A record shape with a relational column mapping
pub trait TableRecord: Record {
    /// Column names and types, in order, excluding the `id` column
    const COLUMNS: &'static [(&'static str, &'static str)];

    /// Values to insert, in [`TableRecord::COLUMNS`] order
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MalformedRecord`] if a field cannot be
    /// represented by the engine.
    fn to_values(&self) -> Result<Vec<Value>, StorageError>;

    /// Build a record from a row selected in [`TableRecord::COLUMNS`] order
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

fn conversion_error(
    column: usize,
    ty: Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, ty, Box::new(err))
}

impl TableRecord for OpaqueRecord {
    const COLUMNS: &'static [(&'static str, &'static str)] = &[("record", "TEXT NOT NULL")];

    fn to_values(&self) -> Result<Vec<Value>, StorageError> {
        // Keep valid UTF-8 as TEXT; anything else is stored as a BLOB as-is.
        let value = match std::str::from_utf8(self.as_bytes()) {
            Ok(text) => Value::Text(text.to_owned()),
            Err(_) => Value::Blob(self.as_bytes().to_vec()),
        };
        Ok(vec![value])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let bytes = match row.get_ref(0)? {
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => bytes.to_vec(),
            other => {
                return Err(conversion_error(
                    0,
                    other.data_type(),
                    StorageError::serialization("record column is not text"),
                ));
            }
        };
        OpaqueRecord::new(bytes).map_err(|e| conversion_error(0, Type::Text, e))
    }
}

impl TableRecord for StructuredRecord {
    const COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("service", "TEXT NOT NULL"),
        ("timestamp", "TEXT NOT NULL"),
        ("uptime_seconds", "INTEGER NOT NULL"),
        ("free_mb", "INTEGER NOT NULL"),
    ];

    fn to_values(&self) -> Result<Vec<Value>, StorageError> {
        let uptime = i64::try_from(self.uptime_seconds)
            .map_err(|_| StorageError::malformed("`uptime_seconds` is out of range"))?;
        Ok(vec![
            Value::Text(self.service.clone()),
            Value::Text(self.timestamp.clone()),
            Value::Integer(uptime),
            Value::Integer(self.free_mb),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let uptime: i64 = row.get(2)?;
        let uptime_seconds =
            u64::try_from(uptime).map_err(|e| conversion_error(2, Type::Integer, e))?;
        Ok(StructuredRecord {
            service: row.get(0)?,
            timestamp: row.get(1)?,
            uptime_seconds,
            free_mb: row.get(3)?,
        })
    }
}

/// SQL text derived from a record's column mapping
#[derive(Debug)]
struct TableSql {
    create: String,
    insert: String,
    select_all: String,
}

impl TableSql {
    fn for_record<R: TableRecord>() -> Self {
        let definitions: Vec<String> = R::COLUMNS
            .iter()
            .map(|(name, ty)| format!("{name} {ty}"))
            .collect();
        let names: Vec<&str> = R::COLUMNS.iter().map(|(name, _)| *name).collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();

        Self {
            create: format!(
                "CREATE TABLE IF NOT EXISTS {LOGS_TABLE} (id INTEGER PRIMARY KEY AUTOINCREMENT, {})",
                definitions.join(", ")
            ),
            insert: format!(
                "INSERT INTO {LOGS_TABLE} ({}) VALUES ({})",
                names.join(", "),
                placeholders.join(", ")
            ),
            select_all: format!(
                "SELECT {} FROM {LOGS_TABLE} ORDER BY id ASC",
                names.join(", ")
            ),
        }
    }
}

/// SQLite implementation of LogStore
pub struct SqliteLogStore<R: TableRecord> {
    conn: Arc<Mutex<Connection>>,
    sql: Arc<TableSql>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: TableRecord> SqliteLogStore<R> {
    /// Open or create the database at `path` and create the table if absent
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened, or if an existing
    /// `logs` table was created for a different record shape.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let store = Self::from_connection(conn)?;
        info!(format = %R::FORMAT, "Opened log database");
        Ok(store)
    }

    #[cfg(test)]
    fn in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        let sql = TableSql::for_record::<R>();

        conn.execute_batch(PRAGMAS)?;
        conn.execute(&sql.create, [])?;
        Self::verify_columns(&conn)?;

        debug!("Initialized logs table");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            sql: Arc::new(sql),
            _marker: PhantomData,
        })
    }

    /// Check an existing table matches the record's column mapping
    fn verify_columns(conn: &Connection) -> Result<(), StorageError> {
        let columns: Vec<String> = conn
            .prepare(&format!("PRAGMA table_info({LOGS_TABLE})"))?
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;

        let expected: Vec<&str> = std::iter::once("id")
            .chain(R::COLUMNS.iter().map(|(name, _)| *name))
            .collect();

        if columns != expected {
            return Err(StorageError::SchemaMismatch(format!(
                "table `{LOGS_TABLE}` has columns [{}], {} records need [{}]",
                columns.join(", "),
                R::FORMAT,
                expected.join(", ")
            )));
        }
        Ok(())
    }

    /// Run `f` with exclusive use of the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &TableSql) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let sql = Arc::clone(&self.sql);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StorageError::Task("connection mutex poisoned".into()))?;
            f(&mut conn, &sql)
        })
        .await?
    }
}

#[async_trait]
impl<R: TableRecord> LogStore<R> for SqliteLogStore<R> {
    #[instrument(skip_all, fields(backend = "relational"))]
    async fn append(&self, record: R) -> Result<(), StorageError> {
        let values = record.to_values()?;

        let id = self
            .with_conn(move |conn, sql| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute(&sql.insert, params_from_iter(values))?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok(id)
            })
            .await?;

        debug!(id, "Appended record");
        Ok(())
    }

    #[instrument(skip_all, fields(backend = "relational"))]
    async fn list_all(&self) -> Result<Vec<R>, StorageError> {
        let records = self
            .with_conn(|conn, sql| {
                let tx = conn.transaction()?;
                let records = {
                    let mut stmt = tx.prepare_cached(&sql.select_all)?;
                    stmt.query_map([], R::from_row)?
                        .collect::<Result<Vec<_>, _>>()?
                };
                tx.commit()?;
                Ok(records)
            })
            .await?;

        debug!(count = records.len(), "Read logs table");
        Ok(records)
    }

    #[instrument(skip_all, fields(backend = "relational"))]
    async fn clear(&self) -> Result<(), StorageError> {
        let removed = self
            .with_conn(|conn, _| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let removed = tx.execute(&format!("DELETE FROM {LOGS_TABLE}"), [])?;
                tx.commit()?;
                Ok(removed)
            })
            .await?;

        info!(removed, "Cleared logs table");
        Ok(())
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Relational
    }
}
