#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **sievegate-registry** – Versioned schema loading with TTL caching.
//!
//! The registry resolves `(name, version)` pairs to ready-to-use schema
//! documents. Documents live in a backing [`SchemaStore`] as YAML or JSON,
//! optionally wrapped in a `{name, version, schema}` envelope; the registry
//! unwraps the envelope and hands validators the inner schema.
//!
//! Loaded schemas are cached in memory with a TTL so that hot-path lookups
//! never touch the store, while schema updates become visible without a
//! process restart. Expiry is lazy (checked on read) and loads are
//! single-flight: concurrent misses for the same key perform exactly one
//! store round-trip.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

mod store;

pub use store::{DirectoryStore, SchemaStore};

/// Resolvable alias for the newest version of a schema.
pub const LATEST_VERSION: &str = "latest";

/// Lookup order for schema file extensions. First match wins.
const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

//─────────────────────────────
//  Errors
//─────────────────────────────

/// Failures surfaced by registry lookups.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No document exists under the requested name and version.
    #[error("schema not found: {name} (version: {version})")]
    NotFound {
        /// Requested schema name.
        name: String,
        /// Requested schema version.
        version: String,
    },
    /// The document exists but cannot be used as a schema.
    #[error("invalid schema document: {reason}")]
    Invalid {
        /// Why the document was rejected.
        reason: String,
    },
    /// The backing store failed.
    #[error("schema store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

//─────────────────────────────
//  Cache entries
//─────────────────────────────

#[derive(Debug, Clone)]
struct CacheEntry {
    schema: Arc<Value>,
    loaded_at: Instant,
}

/// An entry is live while its age has not exceeded the TTL. An entry at
/// exactly the TTL boundary is still live.
fn is_live(age: Duration, ttl: Duration) -> bool {
    age <= ttl
}

//─────────────────────────────
//  Registry
//─────────────────────────────

/// Loads, caches, and versions schemas from a backing store.
pub struct SchemaRegistry {
    store: Arc<dyn SchemaStore>,
    ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
    load_lock: Mutex<()>,
}

impl SchemaRegistry {
    /// Create a registry over `store` with the given cache TTL.
    pub fn new(store: Arc<dyn SchemaStore>, ttl: Duration) -> Self {
        info!(ttl_secs = ttl.as_secs(), "schema registry initialized");
        Self {
            store,
            ttl,
            cache: RwLock::new(HashMap::new()),
            load_lock: Mutex::new(()),
        }
    }

    /// Resolve a schema by name and version.
    ///
    /// `version` may be [`LATEST_VERSION`], which resolves against the
    /// top-level `name.{yaml,yml,json}` document; explicit versions resolve
    /// against `name/version.{yaml,yml,json}`. The returned document is the
    /// inner schema, ready for a validator.
    pub async fn get(&self, name: &str, version: &str) -> RegistryResult<Arc<Value>> {
        let key = format!("{name}:{version}");

        if let Some(schema) = self.cached(&key).await {
            debug!(%key, "schema cache hit");
            return Ok(schema);
        }

        // Single-flight: serialize loads and re-check after acquisition so
        // concurrent misses for the same key perform exactly one load.
        let _guard = self.load_lock.lock().await;
        if let Some(schema) = self.cached(&key).await {
            return Ok(schema);
        }

        let schema = Arc::new(self.load(name, version).await?);
        self.cache.write().await.insert(
            key.clone(),
            CacheEntry {
                schema: schema.clone(),
                loaded_at: Instant::now(),
            },
        );
        info!(%key, "schema loaded and cached");
        Ok(schema)
    }

    /// Drop all cached entries atomically.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
        info!("schema cache cleared");
    }

    /// Names of all schemas available at the top level of the store.
    pub async fn list_schemas(&self) -> RegistryResult<Vec<String>> {
        let mut names: Vec<String> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter_map(|file| {
                let (stem, ext) = file.rsplit_once('.')?;
                EXTENSIONS
                    .contains(&ext)
                    .then(|| stem.to_string())
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn cached(&self, key: &str) -> Option<Arc<Value>> {
        let cache = self.cache.read().await;
        let entry = cache.get(key)?;
        if is_live(entry.loaded_at.elapsed(), self.ttl) {
            Some(entry.schema.clone())
        } else {
            debug!(%key, "schema cache entry expired");
            None
        }
    }

    async fn load(&self, name: &str, version: &str) -> RegistryResult<Value> {
        for ext in EXTENSIONS {
            let path = if version == LATEST_VERSION {
                format!("{name}.{ext}")
            } else {
                format!("{name}/{version}.{ext}")
            };

            let Some(contents) = self.store.fetch(&path).await? else {
                continue;
            };

            let document: Value = if ext == "json" {
                serde_json::from_str(&contents).map_err(|e| RegistryError::Invalid {
                    reason: format!("{path}: {e}"),
                })?
            } else {
                serde_yaml::from_str(&contents).map_err(|e| RegistryError::Invalid {
                    reason: format!("{path}: {e}"),
                })?
            };

            return unwrap_envelope(document);
        }

        Err(RegistryError::NotFound {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

/// Unwrap a `{name, version, schema}` envelope, or return the document
/// verbatim when it is a raw schema. An envelope missing `name` or
/// `version` is rejected.
fn unwrap_envelope(document: Value) -> RegistryResult<Value> {
    let Some(map) = document.as_object() else {
        return Ok(document);
    };
    if !map.contains_key("schema") {
        return Ok(document);
    }
    for field in ["name", "version"] {
        if !map.contains_key(field) {
            return Err(RegistryError::Invalid {
                reason: format!("schema envelope missing required field: {field}"),
            });
        }
    }
    Ok(map["schema"].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_at_exactly_ttl_is_live() {
        let ttl = Duration::from_secs(300);
        assert!(is_live(Duration::from_secs(299), ttl));
        assert!(is_live(ttl, ttl));
        assert!(!is_live(Duration::from_secs(301), ttl));
    }

    #[test]
    fn raw_documents_pass_through_unwrapped() {
        let raw = serde_json::json!({"type": "object", "required": ["user_id"]});
        assert_eq!(unwrap_envelope(raw.clone()).unwrap(), raw);
    }

    #[test]
    fn envelopes_yield_the_inner_schema() {
        let wrapped = serde_json::json!({
            "name": "user_event",
            "version": "1.0.0",
            "schema": {"type": "object"}
        });
        assert_eq!(
            unwrap_envelope(wrapped).unwrap(),
            serde_json::json!({"type": "object"})
        );
    }

    #[test]
    fn envelope_without_name_or_version_is_rejected() {
        let wrapped = serde_json::json!({"schema": {"type": "object"}});
        assert!(matches!(
            unwrap_envelope(wrapped),
            Err(RegistryError::Invalid { .. })
        ));
    }
}
