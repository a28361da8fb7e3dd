//! In-memory partitioned log with manual offset commit.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use sievegate_stream_core::{
    OffsetMap, RawRecord, RecordConsumer, RecordProducer, StreamResult, TopicPartition,
};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Clone)]
struct StoredRecord {
    offset: i64,
    timestamp: DateTime<Utc>,
    key: Option<String>,
    value: Vec<u8>,
}

#[derive(Default)]
struct LogInner {
    /// topic -> partitions -> append-only record vectors.
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    /// (group, coordinate) -> committed next-to-consume offset.
    committed: HashMap<(String, TopicPartition), i64>,
}

impl LogInner {
    fn topic_mut(&mut self, topic: &str, partitions: usize) -> &mut Vec<Vec<StoredRecord>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions])
    }
}

/// An in-memory, non-persistent partitioned log.
///
/// Topics are created lazily on first publish, each with a fixed partition
/// count. Offsets are dense per partition. Handles returned by
/// [`producer`](MemoryLog::producer) and [`consumer`](MemoryLog::consumer)
/// share the log's state and are internally synchronized, so they can be
/// cloned across tasks like pooled connections.
#[derive(Clone)]
pub struct MemoryLog {
    inner: Arc<RwLock<LogInner>>,
    partitions: usize,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLog {
    /// A log whose topics have a single partition.
    pub fn new() -> Self {
        Self::with_partitions(1)
    }

    /// A log whose topics have `partitions` partitions each.
    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LogInner::default())),
            partitions: partitions.max(1),
        }
    }

    /// A producer handle onto this log.
    pub fn producer(&self) -> MemoryProducer {
        MemoryProducer {
            inner: self.inner.clone(),
            partitions: self.partitions,
            round_robin: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A consumer handle over `topic` in consumer group `group`.
    ///
    /// A fresh consumer resumes from the group's committed offsets, or from
    /// the earliest offset where nothing was committed.
    pub fn consumer(&self, topic: impl Into<String>, group: impl Into<String>) -> MemoryConsumer {
        MemoryConsumer {
            inner: self.inner.clone(),
            topic: topic.into(),
            group: group.into(),
            positions: Mutex::new(HashMap::new()),
        }
    }

    /// Decoded JSON values stored in one partition, in offset order.
    pub async fn partition_values(&self, topic: &str, partition: usize) -> Vec<serde_json::Value> {
        let inner = self.inner.read().await;
        inner
            .topics
            .get(topic)
            .and_then(|parts| parts.get(partition))
            .map(|records| {
                records
                    .iter()
                    .filter_map(|r| serde_json::from_slice(&r.value).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total record count across all partitions of a topic.
    pub async fn record_count(&self, topic: &str) -> usize {
        let inner = self.inner.read().await;
        inner
            .topics
            .get(topic)
            .map(|parts| parts.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// The committed next-to-consume offset for a group and coordinate.
    pub async fn committed_offset(&self, group: &str, tp: &TopicPartition) -> Option<i64> {
        let inner = self.inner.read().await;
        inner.committed.get(&(group.to_string(), tp.clone())).copied()
    }
}

//─────────────────────────────
//  Producer handle
//─────────────────────────────

/// Producer handle onto a [`MemoryLog`].
///
/// Keyed records are partitioned by key hash; unkeyed records round-robin.
#[derive(Clone)]
pub struct MemoryProducer {
    inner: Arc<RwLock<LogInner>>,
    partitions: usize,
    round_robin: Arc<AtomicUsize>,
}

impl MemoryProducer {
    fn partition_for(&self, key: Option<&str>) -> usize {
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() as usize) % self.partitions
            }
            None => self.round_robin.fetch_add(1, Ordering::Relaxed) % self.partitions,
        }
    }
}

#[async_trait]
impl RecordProducer for MemoryProducer {
    async fn send(&self, topic: &str, key: Option<&str>, value: &[u8]) -> StreamResult<()> {
        let partition = self.partition_for(key);
        let mut inner = self.inner.write().await;
        let records = &mut inner.topic_mut(topic, self.partitions)[partition];
        let offset = records.len() as i64;
        records.push(StoredRecord {
            offset,
            timestamp: Utc::now(),
            key: key.map(str::to_string),
            value: value.to_vec(),
        });
        Ok(())
    }

    async fn flush(&self) -> StreamResult<()> {
        // Writes are synchronous; there is nothing to flush.
        Ok(())
    }
}

//─────────────────────────────
//  Consumer handle
//─────────────────────────────

/// Consumer handle over one topic of a [`MemoryLog`].
pub struct MemoryConsumer {
    inner: Arc<RwLock<LogInner>>,
    topic: String,
    group: String,
    /// Local read positions, one per partition, ahead of committed offsets.
    positions: Mutex<HashMap<i32, i64>>,
}

impl MemoryConsumer {
    async fn fetch(&self, max_records: usize) -> Vec<RawRecord> {
        let mut positions = self.positions.lock().await;
        let inner = self.inner.read().await;

        let Some(partitions) = inner.topics.get(&self.topic) else {
            return Vec::new();
        };

        let mut batch = Vec::new();
        for (partition, records) in partitions.iter().enumerate() {
            let partition = partition as i32;
            let tp = TopicPartition::new(self.topic.clone(), partition);
            let start = positions.get(&partition).copied().unwrap_or_else(|| {
                inner
                    .committed
                    .get(&(self.group.clone(), tp.clone()))
                    .copied()
                    // Reset policy: earliest.
                    .unwrap_or(0)
            });

            let mut position = start;
            for record in records.iter().skip(start as usize) {
                if batch.len() >= max_records {
                    break;
                }
                batch.push(RawRecord {
                    topic: self.topic.clone(),
                    partition,
                    offset: record.offset,
                    timestamp: record.timestamp,
                    key: record.key.clone(),
                    value: record.value.clone(),
                });
                position = record.offset + 1;
            }
            positions.insert(partition, position);

            if batch.len() >= max_records {
                break;
            }
        }
        batch
    }
}

#[async_trait]
impl RecordConsumer for MemoryConsumer {
    async fn poll(&self, max_records: usize, timeout: Duration) -> StreamResult<Vec<RawRecord>> {
        let deadline = Instant::now() + timeout;
        loop {
            let batch = self.fetch(max_records).await;
            if !batch.is_empty() || Instant::now() >= deadline {
                return Ok(batch);
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    async fn commit(&self, offsets: &OffsetMap) -> StreamResult<()> {
        let mut inner = self.inner.write().await;
        for (tp, offset) in offsets {
            inner
                .committed
                .insert((self.group.clone(), tp.clone()), *offset);
        }
        Ok(())
    }

    async fn lag(&self) -> StreamResult<HashMap<TopicPartition, i64>> {
        let positions = self.positions.lock().await;
        let inner = self.inner.read().await;

        let mut lags = HashMap::new();
        if let Some(partitions) = inner.topics.get(&self.topic) {
            for (partition, records) in partitions.iter().enumerate() {
                let partition = partition as i32;
                let tp = TopicPartition::new(self.topic.clone(), partition);
                let position = positions.get(&partition).copied().unwrap_or_else(|| {
                    inner
                        .committed
                        .get(&(self.group.clone(), tp.clone()))
                        .copied()
                        .unwrap_or(0)
                });
                lags.insert(tp, records.len() as i64 - position);
            }
        }
        Ok(lags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn producer_appends_and_consumer_polls_in_order() {
        let log = MemoryLog::new();
        let producer = log.producer();
        for i in 0..3 {
            let value = serde_json::to_vec(&json!({"n": i})).unwrap();
            producer.send("raw-events", Some("k"), &value).await.unwrap();
        }

        let consumer = log.consumer("raw-events", "test-group");
        let batch = consumer.poll(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(
            batch.iter().map(|r| r.offset).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn poll_respects_max_records_and_resumes() {
        let log = MemoryLog::new();
        let producer = log.producer();
        for i in 0..5 {
            producer
                .send("raw-events", None, format!("{{\"n\": {i}}}").as_bytes())
                .await
                .unwrap();
        }

        let consumer = log.consumer("raw-events", "test-group");
        let first = consumer.poll(2, Duration::from_millis(50)).await.unwrap();
        let second = consumer.poll(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].offset, 2);
    }

    #[tokio::test]
    async fn idle_poll_returns_empty_after_timeout() {
        let log = MemoryLog::new();
        let consumer = log.consumer("raw-events", "test-group");
        let batch = consumer.poll(10, Duration::from_millis(20)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn fresh_consumer_resumes_from_committed_offset() {
        let log = MemoryLog::new();
        let producer = log.producer();
        for i in 0..4 {
            producer
                .send("raw-events", Some("k"), format!("{{\"n\": {i}}}").as_bytes())
                .await
                .unwrap();
        }

        let consumer = log.consumer("raw-events", "test-group");
        consumer.poll(2, Duration::from_millis(50)).await.unwrap();
        let mut offsets = OffsetMap::new();
        offsets.insert(TopicPartition::new("raw-events", 0), 2);
        consumer.commit(&offsets).await.unwrap();
        drop(consumer);

        // Same group: resume at 2. Uncommitted records are redelivered.
        let restarted = log.consumer("raw-events", "test-group");
        let batch = restarted.poll(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(batch[0].offset, 2);
        assert_eq!(batch.len(), 2);

        // Unknown group: earliest reset.
        let other = log.consumer("raw-events", "other-group");
        let batch = other.poll(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(batch[0].offset, 0);
    }

    #[tokio::test]
    async fn keyed_records_land_in_one_partition() {
        let log = MemoryLog::with_partitions(4);
        let producer = log.producer();
        for i in 0..8 {
            producer
                .send("raw-events", Some("same-key"), format!("{{\"n\": {i}}}").as_bytes())
                .await
                .unwrap();
        }

        let mut non_empty = 0;
        for partition in 0..4 {
            let values = log.partition_values("raw-events", partition).await;
            if !values.is_empty() {
                non_empty += 1;
                assert_eq!(values.len(), 8);
            }
        }
        assert_eq!(non_empty, 1);
    }

    #[tokio::test]
    async fn lag_tracks_unconsumed_records() {
        let log = MemoryLog::new();
        let producer = log.producer();
        for i in 0..6 {
            producer
                .send("raw-events", Some("k"), format!("{{\"n\": {i}}}").as_bytes())
                .await
                .unwrap();
        }

        let consumer = log.consumer("raw-events", "test-group");
        consumer.poll(4, Duration::from_millis(50)).await.unwrap();

        let lag = consumer.lag().await.unwrap();
        assert_eq!(lag[&TopicPartition::new("raw-events", 0)], 2);
    }
}
