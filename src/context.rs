//! Process-wide state shared by every limiter.

use crate::clock::{Clock, SystemClock};
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::job::Job;
use crate::metrics::MetricsCollector;
use crate::options::ThrottleOptions;
use crate::rate_limiter::RateLimiter;
use crate::store::{ExecutionStore, MemoryStore, StorageBackend};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

/// The single lock every evaluation in the process holds while it prunes,
/// counts and appends. It is not per key: evaluations are serialized
/// process-wide.
#[derive(Debug)]
pub struct CriticalSection {
    name: &'static str,
    lock: Mutex<()>,
}

impl CriticalSection {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lock: Mutex::new(()),
        }
    }

    /// Waits for exclusive access. Access ends when the guard is dropped.
    pub async fn enter(&self) -> MutexGuard<'_, ()> {
        let guard = self.lock.lock().await;
        trace!(section = self.name, "Entered critical section");
        guard
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Owns the execution stores, the critical section and the clock, and hands
/// them to each limiter it builds.
///
/// Build one per process at startup and pass it down explicitly.
pub struct ExecutionContext {
    memory: Arc<MemoryStore>,
    shared: Option<Arc<dyn ExecutionStore>>,
    critical_section: CriticalSection,
    clock: Arc<dyn Clock>,
    metrics: MetricsCollector,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            memory: Arc::new(MemoryStore::new()),
            shared: None,
            critical_section: CriticalSection::new("rate_limit"),
            clock: Arc::new(SystemClock),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_shared_store(mut self, store: Arc<dyn ExecutionStore>) -> Self {
        self.shared = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Store for `backend`. Fails when the shared backend was never configured.
    pub fn store(&self, backend: StorageBackend) -> ThrottlerResult<Arc<dyn ExecutionStore>> {
        match backend {
            StorageBackend::Memory => Ok(self.memory.clone()),
            StorageBackend::Shared => self.shared.clone().ok_or_else(|| {
                ThrottlerError::Configuration(
                    "shared storage requested but no shared store is configured".to_string(),
                )
            }),
        }
    }

    pub fn memory_store(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn has_shared_store(&self) -> bool {
        self.shared.is_some()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn critical_section(&self) -> &CriticalSection {
        &self.critical_section
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Builds a limiter for one evaluation of `job`.
    pub fn limiter<'a, T>(
        &'a self,
        job: &'a Job,
        options: &'a ThrottleOptions,
    ) -> ThrottlerResult<RateLimiter<'a, T>> {
        let store = self.store(options.storage)?;
        Ok(RateLimiter::new(self, store, job, options))
    }

    /// Clears every recorded admission in `backend`.
    pub async fn reset(&self, backend: StorageBackend) -> ThrottlerResult<()> {
        let store = self.store(backend)?;
        let _guard = self.critical_section.enter().await;
        store.reset().await
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
