//! Flat file storage implementation
//!
//! Records are stored one per line in a single append-only file:
//!
//! ```text
//! <record line>\n<record line>\n...
//! ```
//!
//! There are no boundary markers beyond the terminator, so only line-safe
//! records can be stored (see [`Record::to_line`]).
//!
//! ## Concurrency
//!
//! Inside one process an async `RwLock` orders every append and clear against
//! each other and against reads. Another process writing the same file only
//! gets the atomicity of `O_APPEND` writes, and a clear performed here is not
//! seen by its already-open handle. Point one deployment at one file.
//!
//! ## Clear
//!
//! Clear swaps in an empty file: a fresh sibling file is created and synced,
//! renamed over the log, and the directory entry is synced. The append handle
//! is switched to the new file under the write lock, so no append can land in
//! the replaced file.

use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::error::StorageError;
use crate::record::Record;
use crate::{BackendKind, LogStore};

/// Newline-delimited file implementation of LogStore
#[derive(Debug)]
pub struct FileLogStore<R: Record> {
    /// Path to the log file
    path: PathBuf,
    /// Append handle, opened once at startup and replaced only by clear
    writer: RwLock<File>,
    /// Set when a failed append could not be rolled back
    torn: AtomicBool,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> FileLogStore<R> {
    /// Open (creating if absent) the log file at `path`
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = open_append(&path).await?;
        let size = file.metadata().await?.len();
        let size = repair_tail(&path, &file, size).await?;

        info!(size, format = %R::FORMAT, "Opened log file");

        Ok(Self {
            path,
            writer: RwLock::new(file),
            torn: AtomicBool::new(false),
            _marker: PhantomData,
        })
    }

    fn clear_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".clear");
        self.path.with_file_name(name)
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Split file contents into records
    ///
    /// Every record is followed by exactly one `\n`. A final segment without
    /// its terminator is a write that never completed and is skipped.
    fn parse(contents: &[u8]) -> Result<Vec<R>, StorageError> {
        let mut segments: Vec<&[u8]> = contents.split(|&b| b == b'\n').collect();

        if let Some(tail) = segments.pop()
            && !tail.is_empty()
        {
            warn!(bytes = tail.len(), "Skipping unterminated trailing record");
        }

        segments.into_iter().map(R::from_line).collect()
    }
}

async fn open_append(path: &Path) -> Result<File, StorageError> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await
        .map_err(|e| StorageError::Io(format!("{}: {}", path.display(), e)))
}

/// Cut off a trailing record that a crash left without its terminator
///
/// Otherwise the next append would be glued onto it. Returns the new length.
async fn repair_tail(path: &Path, file: &File, size: u64) -> Result<u64, StorageError> {
    if size == 0 {
        return Ok(size);
    }

    let contents = tokio::fs::read(path).await?;
    let complete = contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos as u64 + 1);
    if complete == contents.len() as u64 {
        return Ok(size);
    }

    warn!(
        bytes = contents.len() as u64 - complete,
        "Truncating unterminated trailing record"
    );
    file.set_len(complete).await?;
    file.sync_all().await?;
    Ok(complete)
}

/// Write `buf` and wait until it reaches the disk
async fn write_durable(file: &mut File, buf: &[u8]) -> std::io::Result<()> {
    file.write_all(buf).await?;
    file.flush().await?;
    file.sync_data().await
}

#[async_trait]
impl<R: Record> LogStore<R> for FileLogStore<R> {
    #[instrument(skip_all, fields(backend = "file"))]
    async fn append(&self, record: R) -> Result<(), StorageError> {
        let line = record.to_line()?;
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(&line);
        buf.push(b'\n');

        let mut file = self.writer.write().await;
        let mut start = file.metadata().await?.len();

        // Appends stay refused until the leftover of a failed one is gone.
        if self.torn.load(Ordering::Acquire) {
            start = repair_tail(&self.path, &file, start).await?;
            self.torn.store(false, Ordering::Release);
        }

        if let Err(e) = write_durable(&mut file, &buf).await {
            // Cut off whatever part of the line made it to the file.
            if let Err(rollback) = file.set_len(start).await {
                warn!(error = %rollback, offset = start, "Failed to roll back partial append");
                self.torn.store(true, Ordering::Release);
            }
            return Err(e.into());
        }

        debug!(offset = start, bytes = buf.len(), "Appended record");
        Ok(())
    }

    #[instrument(skip_all, fields(backend = "file"))]
    async fn list_all(&self) -> Result<Vec<R>, StorageError> {
        // Appends hold the write lock until their line is complete.
        let _guard = self.writer.read().await;

        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Log file missing, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let records = Self::parse(&contents)?;
        debug!(count = records.len(), "Read log file");
        Ok(records)
    }

    #[instrument(skip_all, fields(backend = "file"))]
    async fn clear(&self) -> Result<(), StorageError> {
        let mut writer = self.writer.write().await;

        let clear_path = self.clear_path();
        let fresh = open_append(&clear_path).await?;
        let prepared = async {
            // A leftover from an interrupted clear may hold data.
            fresh.set_len(0).await?;
            fresh.sync_all().await?;
            tokio::fs::rename(&clear_path, &self.path).await
        }
        .await;

        if let Err(e) = prepared {
            if let Err(cleanup) = tokio::fs::remove_file(&clear_path).await {
                debug!(error = %cleanup, "Could not remove clear file");
            }
            return Err(e.into());
        }

        // The rename is done: from here on only the fresh file is the log.
        *writer = fresh;
        self.torn.store(false, Ordering::Release);

        // The log is already empty, so a failed directory sync is not a
        // failed clear; only its durability across a crash is in doubt.
        if let Err(e) = sync_dir(self.parent_dir()).await {
            warn!(error = %e, "Cleared log file but could not sync its directory");
        }

        info!("Cleared log file");
        Ok(())
    }

    fn backend(&self) -> BackendKind {
        BackendKind::File
    }
}

/// Sync a directory so a rename inside it survives a crash
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<(), StorageError> {
    let dir = File::open(dir).await?;
    dir.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<(), StorageError> {
    Ok(())
}
