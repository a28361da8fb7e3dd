#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **sievegate-stream-core** – Core stream and sink abstractions.
//!
//! This crate defines the contracts between the stream worker and its
//! transports without providing concrete implementations: a partitioned,
//! offset-addressable input log, output stream producers, the quarantine
//! index, and the optional blob store for oversized payloads.
//!
//! Drivers (in-memory, Kafka, relational index, object store) implement
//! these traits in separate crates that depend on this core abstraction.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use sievegate_types::QuarantineRecord;

//─────────────────────────────
//  Stream coordinates
//─────────────────────────────

/// A `(topic, partition)` coordinate within the input stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPartition {
    /// Topic name.
    pub topic: String,
    /// Partition number within the topic.
    pub partition: i32,
}

impl TopicPartition {
    /// Build a coordinate.
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl std::fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.topic, self.partition)
    }
}

/// An undecoded record pulled from the input stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Source topic.
    pub topic: String,
    /// Source partition.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Broker-assigned timestamp.
    pub timestamp: DateTime<Utc>,
    /// Record key, when the producer set one.
    pub key: Option<String>,
    /// Raw value bytes (expected UTF-8 JSON, not yet decoded).
    pub value: Vec<u8>,
}

impl RawRecord {
    /// The record's `(topic, partition)` coordinate.
    pub fn coordinates(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }
}

/// Committed offsets, one *next-to-consume* offset per coordinate.
pub type OffsetMap = HashMap<TopicPartition, i64>;

//─────────────────────────────
//  Errors
//─────────────────────────────

/// Infrastructure failures surfaced by stream and sink drivers.
///
/// These are transport faults, not data defects: data defects travel as
/// validation outcomes. Every variant is considered transient and eligible
/// for bounded-backoff retry by the worker.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The input stream connection was lost.
    #[error("stream disconnected: {0}")]
    Disconnected(String),
    /// A publish to an output stream failed.
    #[error("publish to '{topic}' failed: {reason}")]
    PublishFailed {
        /// Destination topic.
        topic: String,
        /// Driver-reported reason.
        reason: String,
    },
    /// An offset commit failed.
    #[error("offset commit failed: {0}")]
    CommitFailed(String),
    /// The quarantine index rejected a write.
    #[error("quarantine index unavailable: {0}")]
    IndexUnavailable(String),
    /// The blob store rejected a write.
    #[error("blob store unavailable: {0}")]
    BlobUnavailable(String),
}

impl StreamError {
    /// Whether the worker should retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::Disconnected(_)
                | StreamError::PublishFailed { .. }
                | StreamError::CommitFailed(_)
                | StreamError::IndexUnavailable(_)
                | StreamError::BlobUnavailable(_)
        )
    }
}

/// Result alias for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

//─────────────────────────────
//  Consumer / producer capabilities
//─────────────────────────────

/// A consumer over a partitioned, offset-addressable log.
///
/// Implementations use manual offset commit only; consuming a record never
/// advances the committed offset. Batch size is bounded by the caller.
#[async_trait]
pub trait RecordConsumer: Send + Sync {
    /// Pull up to `max_records` records, waiting at most `timeout` for the
    /// first one. An empty vector is a normal idle poll.
    async fn poll(&self, max_records: usize, timeout: Duration) -> StreamResult<Vec<RawRecord>>;

    /// Commit the given next-to-consume offsets.
    async fn commit(&self, offsets: &OffsetMap) -> StreamResult<()>;

    /// Current lag (end offset minus position) for every assigned partition.
    async fn lag(&self) -> StreamResult<HashMap<TopicPartition, i64>>;
}

/// A producer onto partitioned output logs.
#[async_trait]
pub trait RecordProducer: Send + Sync {
    /// Publish one record. Delivery is acknowledged when this returns.
    async fn send(&self, topic: &str, key: Option<&str>, value: &[u8]) -> StreamResult<()>;

    /// Flush any buffered records.
    async fn flush(&self) -> StreamResult<()>;
}

//─────────────────────────────
//  Quarantine sinks
//─────────────────────────────

/// The queryable quarantine index.
///
/// The pipeline only writes; the inspection surface reads. `insert` is an
/// idempotent upsert keyed by record id, so redelivered records collapse.
#[async_trait]
pub trait QuarantineIndex: Send + Sync {
    /// Upsert a record by id.
    async fn insert(&self, record: &QuarantineRecord) -> StreamResult<()>;

    /// Fetch a record by id.
    async fn get(&self, id: &str) -> StreamResult<Option<QuarantineRecord>>;

    /// Number of records currently indexed.
    async fn count(&self) -> StreamResult<usize>;
}

/// Store for payloads too large to inline in the index.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `key`, returning a resolvable URI.
    async fn put(&self, key: &str, bytes: &[u8]) -> StreamResult<String>;

    /// Fetch bytes by URI.
    async fn get(&self, uri: &str) -> StreamResult<Option<Vec<u8>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_display_and_hash() {
        let tp = TopicPartition::new("raw-events", 3);
        assert_eq!(tp.to_string(), "raw-events:3");

        let mut offsets = OffsetMap::new();
        offsets.insert(tp.clone(), 42);
        assert_eq!(offsets[&TopicPartition::new("raw-events", 3)], 42);
    }

    #[test]
    fn every_stream_error_is_retryable() {
        let errors = [
            StreamError::Disconnected("broker gone".into()),
            StreamError::PublishFailed {
                topic: "validated-events".into(),
                reason: "queue full".into(),
            },
            StreamError::CommitFailed("rebalance".into()),
            StreamError::IndexUnavailable("connection refused".into()),
            StreamError::BlobUnavailable("bucket missing".into()),
        ];
        for error in errors {
            assert!(error.is_retryable(), "{error} should be retryable");
        }
    }
}
