//! Fault-injecting driver wrappers for exercising retry paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use sievegate_stream_core::{
    QuarantineIndex, RecordProducer, StreamError, StreamResult,
};
use sievegate_types::QuarantineRecord;

/// Producer wrapper that fails the first `n` sends, then delegates.
pub struct FlakyProducer {
    inner: Arc<dyn RecordProducer>,
    remaining_failures: AtomicUsize,
}

impl FlakyProducer {
    /// Fail the first `n` sends with a retryable publish error.
    pub fn fail_first(n: usize, inner: Arc<dyn RecordProducer>) -> Self {
        Self {
            inner,
            remaining_failures: AtomicUsize::new(n),
        }
    }
}

#[async_trait]
impl RecordProducer for FlakyProducer {
    async fn send(&self, topic: &str, key: Option<&str>, value: &[u8]) -> StreamResult<()> {
        if take_failure(&self.remaining_failures) {
            return Err(StreamError::PublishFailed {
                topic: topic.to_string(),
                reason: "injected fault".into(),
            });
        }
        self.inner.send(topic, key, value).await
    }

    async fn flush(&self) -> StreamResult<()> {
        self.inner.flush().await
    }
}

/// Index wrapper that fails the first `n` inserts, then delegates.
pub struct FlakyIndex {
    inner: Arc<dyn QuarantineIndex>,
    remaining_failures: AtomicUsize,
}

impl FlakyIndex {
    /// Fail the first `n` inserts with a retryable index error.
    pub fn fail_first(n: usize, inner: Arc<dyn QuarantineIndex>) -> Self {
        Self {
            inner,
            remaining_failures: AtomicUsize::new(n),
        }
    }
}

#[async_trait]
impl QuarantineIndex for FlakyIndex {
    async fn insert(&self, record: &QuarantineRecord) -> StreamResult<()> {
        if take_failure(&self.remaining_failures) {
            return Err(StreamError::IndexUnavailable("injected fault".into()));
        }
        self.inner.insert(record).await
    }

    async fn get(&self, id: &str) -> StreamResult<Option<QuarantineRecord>> {
        self.inner.get(id).await
    }

    async fn count(&self) -> StreamResult<usize> {
        self.inner.count().await
    }
}

fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
