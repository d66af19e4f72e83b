//! Execution store backed by an external keyed-list service
//!
//! Each key maps to a list of whole unix seconds, newest at the front. Pruning
//! inspects the back of the list and pops while the oldest entry is expired.
//! Entries and the cutoff are both truncated to whole seconds, so with a
//! fixed-boundary window whose period is not a whole number of seconds an
//! admission made in the first fraction of a second of a window can be pruned
//! early.
//! Other processes may prune the same list concurrently, so every pop is
//! checked against the value that was inspected; when they differ the popped
//! value is pushed back and the pass stops.
//!
//! Counts are not coordinated across processes. Two processes can both see a
//! count one below the threshold and both admit, so the shared backend can
//! over-admit by a small margin under contention.

use super::{ExecutionStore, StorageBackend};
use crate::clock::unix_secs;
use crate::error::ThrottlerResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{trace, warn};

/// Prefix applied to every key written to the external service.
pub const DEFAULT_NAMESPACE: &str = "throttled";

/// List operations the shared store needs from its transport.
#[async_trait]
pub trait ListTransport: Send + Sync {
    /// Length of the list, zero when it does not exist.
    async fn length(&self, key: &str) -> ThrottlerResult<u64>;

    async fn push_front(&self, key: &str, value: &str) -> ThrottlerResult<()>;

    async fn pop_back(&self, key: &str) -> ThrottlerResult<Option<String>>;

    async fn push_back(&self, key: &str, value: &str) -> ThrottlerResult<()>;

    /// Reads the last element without removing it.
    async fn peek_back(&self, key: &str) -> ThrottlerResult<Option<String>>;

    /// Deletes every key matching a glob `pattern`. Returns how many were removed.
    async fn delete_matching(&self, pattern: &str) -> ThrottlerResult<u64>;

    async fn ping(&self) -> ThrottlerResult<()> {
        Ok(())
    }
}

pub struct SharedStore {
    transport: Arc<dyn ListTransport>,
    namespace: String,
    race_corrections: AtomicU64,
}

impl SharedStore {
    pub fn new(transport: Arc<dyn ListTransport>) -> Self {
        Self::with_namespace(transport, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(transport: Arc<dyn ListTransport>, namespace: impl Into<String>) -> Self {
        Self {
            transport,
            namespace: namespace.into(),
            race_corrections: AtomicU64::new(0),
        }
    }

    pub fn namespace_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// How many times pruning restored a value another process had moved.
    pub fn race_corrections(&self) -> u64 {
        self.race_corrections.load(Ordering::Relaxed)
    }

    /// Unparseable entries are treated as expired.
    fn parse_timestamp(value: &str) -> u64 {
        value.trim().parse().unwrap_or(0)
    }
}

#[async_trait]
impl ExecutionStore for SharedStore {
    async fn count(&self, key: &str) -> ThrottlerResult<u64> {
        self.transport.length(&self.namespace_key(key)).await
    }

    async fn append(&self, key: &str, at: SystemTime) -> ThrottlerResult<()> {
        self.transport
            .push_front(&self.namespace_key(key), &unix_secs(at).to_string())
            .await
    }

    async fn prune(&self, key: &str, cutoff: SystemTime) -> ThrottlerResult<()> {
        let list = self.namespace_key(key);
        let cutoff = unix_secs(cutoff);
        let mut removed = 0u64;

        while let Some(oldest) = self.transport.peek_back(&list).await? {
            if Self::parse_timestamp(&oldest) > cutoff {
                break;
            }

            match self.transport.pop_back(&list).await? {
                Some(popped) if popped == oldest => removed += 1,
                Some(popped) => {
                    self.transport.push_back(&list, &popped).await?;
                    self.race_corrections.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        key = %list,
                        expected = %oldest,
                        restored = %popped,
                        "Concurrent prune detected, restored popped admission"
                    );
                    break;
                }
                None => break,
            }
        }

        trace!(key = %list, cutoff, removed, "Pruned shared executions");
        Ok(())
    }

    async fn reset(&self) -> ThrottlerResult<()> {
        let removed = self
            .transport
            .delete_matching(&self.namespace_key("*"))
            .await?;
        trace!(namespace = %self.namespace, removed, "Reset shared executions");
        Ok(())
    }

    async fn ping(&self) -> ThrottlerResult<()> {
        self.transport.ping().await
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Shared
    }
}
