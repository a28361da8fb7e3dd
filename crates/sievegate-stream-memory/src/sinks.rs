//! In-memory quarantine index and blob store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use sievegate_stream_core::{BlobStore, QuarantineIndex, StreamResult};
use sievegate_types::QuarantineRecord;

const BLOB_URI_SCHEME: &str = "mem://";

/// In-memory quarantine index keyed by record id.
///
/// Inserts are upserts, so redelivered records (retry after a crash between
/// route and commit) collapse into one row.
#[derive(Default)]
pub struct MemoryQuarantineIndex {
    records: RwLock<HashMap<String, QuarantineRecord>>,
}

impl MemoryQuarantineIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all indexed records, in no particular order.
    pub async fn all(&self) -> Vec<QuarantineRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl QuarantineIndex for MemoryQuarantineIndex {
    async fn insert(&self, record: &QuarantineRecord) -> StreamResult<()> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> StreamResult<Option<QuarantineRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn count(&self) -> StreamResult<usize> {
        Ok(self.records.read().await.len())
    }
}

/// In-memory blob store issuing `mem://` URIs.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// An empty blob store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> StreamResult<String> {
        self.blobs
            .write()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(format!("{BLOB_URI_SCHEME}{key}"))
    }

    async fn get(&self, uri: &str) -> StreamResult<Option<Vec<u8>>> {
        let key = uri.strip_prefix(BLOB_URI_SCHEME).unwrap_or(uri);
        Ok(self.blobs.read().await.get(key).cloned())
    }
}
