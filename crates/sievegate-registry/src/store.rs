//! Schema backing stores.
//!
//! The registry resolves schemas through the [`SchemaStore`] capability: a
//! key-value view over string documents, keyed by relative path. The shipped
//! driver reads a directory tree; alternative drivers (object stores, config
//! services) implement the same trait in their own crates.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

/// Read-only key-value store over schema documents.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Fetch the document at `path`, or `None` when no such key exists.
    ///
    /// Only genuine store faults (permissions, I/O) are errors; an absent
    /// key is a normal probe miss.
    async fn fetch(&self, path: &str) -> Result<Option<String>>;

    /// List top-level keys, relative to the store root.
    async fn list(&self) -> Result<Vec<String>>;
}

/// Filesystem-backed schema store rooted at a schema directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Create a store rooted at `root`. The directory need not exist yet;
    /// probes against a missing directory behave as misses.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The directory this store reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl SchemaStore for DirectoryStore {
    async fn fetch(&self, path: &str) -> Result<Option<String>> {
        let full = self.root.join(path);
        match tokio::fs::read_to_string(&full).await {
            Ok(contents) => {
                debug!(path = %full.display(), "loaded schema document");
                Ok(Some(contents))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", full.display())),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to list {}", self.root.display()))
            }
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    keys.push(name.to_string());
                }
            }
        }
        Ok(keys)
    }
}
