//! Execution stores
//!
//! An execution store records the instant of every admission, per key. The
//! limiter prunes expired entries, counts what is left and appends a new entry
//! when it admits a job. Two backends are provided:
//!
//! - [`MemoryStore`]: process-local, full timestamp precision.
//! - [`SharedStore`]: keyed lists in an external service (Redis), shared by
//!   every process pointing at it, whole-second precision.

pub mod memory;
pub mod shared;

#[cfg(test)]
pub(crate) mod fake;

use crate::error::{ThrottlerError, ThrottlerResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

pub use memory::MemoryStore;
pub use shared::{ListTransport, SharedStore, DEFAULT_NAMESPACE};

/// Record of admission timestamps per key.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Number of admissions currently recorded for `key`. Does not prune.
    async fn count(&self, key: &str) -> ThrottlerResult<u64>;

    /// Records one admission for `key`.
    async fn append(&self, key: &str, at: SystemTime) -> ThrottlerResult<()>;

    /// Removes every admission for `key` recorded at or before `cutoff`.
    async fn prune(&self, key: &str, cutoff: SystemTime) -> ThrottlerResult<()>;

    /// Forgets every key.
    async fn reset(&self) -> ThrottlerResult<()>;

    /// Checks that the backing service is reachable.
    async fn ping(&self) -> ThrottlerResult<()> {
        Ok(())
    }

    fn backend(&self) -> StorageBackend;
}

/// Identifier of a storage backend in worker options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Shared,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::Shared => write!(f, "shared"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = ThrottlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "shared" | "redis" => Ok(StorageBackend::Shared),
            other => Err(ThrottlerError::Configuration(format!(
                "unknown storage backend '{}' (expected 'memory' or 'shared')",
                other
            ))),
        }
    }
}
