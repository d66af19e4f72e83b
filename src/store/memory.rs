use super::{ExecutionStore, StorageBackend};
use crate::error::{ThrottlerError, ThrottlerResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::SystemTime;

/// Process-local execution store. One instance is shared by every limiter in
/// the process; it is invisible to other processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    executions: Mutex<HashMap<String, VecDeque<SystemTime>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> ThrottlerResult<std::sync::MutexGuard<'_, HashMap<String, VecDeque<SystemTime>>>> {
        self.executions.lock().map_err(|_| {
            ThrottlerError::Internal("Failed to acquire lock on memory store".to_string())
        })
    }

    /// Number of keys with at least one recorded admission.
    pub fn key_count(&self) -> ThrottlerResult<usize> {
        Ok(self.lock()?.len())
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn count(&self, key: &str) -> ThrottlerResult<u64> {
        let executions = self.lock()?;
        Ok(executions.get(key).map_or(0, |times| times.len() as u64))
    }

    async fn append(&self, key: &str, at: SystemTime) -> ThrottlerResult<()> {
        let mut executions = self.lock()?;
        executions.entry(key.to_string()).or_default().push_back(at);
        Ok(())
    }

    async fn prune(&self, key: &str, cutoff: SystemTime) -> ThrottlerResult<()> {
        let mut executions = self.lock()?;

        if let Some(times) = executions.get_mut(key) {
            times.retain(|at| *at > cutoff);
            if times.is_empty() {
                executions.remove(key);
            }
        }

        Ok(())
    }

    async fn reset(&self) -> ThrottlerResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
