//! In-memory storage implementation
//!
//! Keeps the sequence in process memory. Nothing survives a restart, so this
//! store is only meant for tests and local development.

use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StorageError;
use crate::record::Record;
use crate::{BackendKind, LogStore};

/// In-memory implementation of LogStore
#[derive(Debug)]
pub struct MemoryLogStore<R: Record> {
    records: RwLock<Vec<R>>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> MemoryLogStore<R> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            _marker: PhantomData,
        }
    }
}

impl<R: Record> Default for MemoryLogStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> LogStore<R> for MemoryLogStore<R> {
    async fn append(&self, record: R) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        records.push(record);
        debug!(len = records.len(), "Appended record in memory");
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<R>, StorageError> {
        Ok(self.records.read().await.clone())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.records.write().await.clear();
        Ok(())
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }
}
