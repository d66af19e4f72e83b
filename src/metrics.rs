use crate::rate_limiter::Verdict;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleMetrics {
    pub total_evaluations: u64,
    pub admitted: u64,
    pub deferred: u64,
    pub unthrottled: u64,
    pub last_reset: u64,
}

impl Default for ThrottleMetrics {
    fn default() -> Self {
        Self {
            total_evaluations: 0,
            admitted: 0,
            deferred: 0,
            unthrottled: 0,
            last_reset: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// Most workers tracked individually before new names share one entry.
pub const DEFAULT_MAX_WORKERS: usize = 1024;

/// Entry that absorbs evaluations of workers seen after the limit is reached.
pub const OVERFLOW_WORKER: &str = "_other";

/// Evaluation counters per worker.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    worker_metrics: Arc<RwLock<HashMap<String, ThrottleMetrics>>>,
    max_workers: usize,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::with_max_workers(DEFAULT_MAX_WORKERS)
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_workers(max_workers: usize) -> Self {
        Self {
            worker_metrics: Arc::new(RwLock::new(HashMap::new())),
            max_workers,
        }
    }

    pub async fn record_evaluation(&self, worker: &str, verdict: &Verdict) {
        let mut metrics = self.worker_metrics.write().await;
        let name = if metrics.contains_key(worker) || metrics.len() < self.max_workers {
            worker
        } else {
            OVERFLOW_WORKER
        };
        let worker_metrics = metrics.entry(name.to_string()).or_default();

        worker_metrics.total_evaluations += 1;
        match verdict {
            Verdict::Unthrottled => worker_metrics.unthrottled += 1,
            Verdict::Admitted => worker_metrics.admitted += 1,
            Verdict::Deferred { .. } => worker_metrics.deferred += 1,
        }
    }

    pub async fn get_worker_metrics(&self, worker: &str) -> Option<ThrottleMetrics> {
        let metrics = self.worker_metrics.read().await;
        metrics.get(worker).cloned()
    }

    pub async fn get_all_metrics(&self) -> HashMap<String, ThrottleMetrics> {
        let metrics = self.worker_metrics.read().await;
        metrics.clone()
    }

    pub async fn reset_worker_metrics(&self, worker: &str) {
        let mut metrics = self.worker_metrics.write().await;
        if let Some(worker_metrics) = metrics.get_mut(worker) {
            *worker_metrics = ThrottleMetrics::default();
        }
    }

    pub async fn get_global_metrics(&self) -> ThrottleMetrics {
        let metrics = self.worker_metrics.read().await;
        let mut global = ThrottleMetrics::default();

        for worker_metrics in metrics.values() {
            global.total_evaluations += worker_metrics.total_evaluations;
            global.admitted += worker_metrics.admitted;
            global.deferred += worker_metrics.deferred;
            global.unthrottled += worker_metrics.unthrottled;
        }

        global
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_record_evaluation() {
        let collector = MetricsCollector::new();
        collector.record_evaluation("LolzWorker", &Verdict::Admitted).await;
        collector.record_evaluation("LolzWorker", &Verdict::Admitted).await;
        collector
            .record_evaluation(
                "LolzWorker",
                &Verdict::Deferred {
                    retry_after: Duration::from_secs(60),
                },
            )
            .await;
        collector.record_evaluation("OtherWorker", &Verdict::Unthrottled).await;

        let lolz = collector.get_worker_metrics("LolzWorker").await.unwrap();
        assert_eq!(lolz.total_evaluations, 3);
        assert_eq!(lolz.admitted, 2);
        assert_eq!(lolz.deferred, 1);

        let global = collector.get_global_metrics().await;
        assert_eq!(global.total_evaluations, 4);
        assert_eq!(global.unthrottled, 1);
    }

    #[tokio::test]
    async fn test_reset_worker_metrics() {
        let collector = MetricsCollector::new();
        collector.record_evaluation("LolzWorker", &Verdict::Admitted).await;
        collector.reset_worker_metrics("LolzWorker").await;

        let lolz = collector.get_worker_metrics("LolzWorker").await.unwrap();
        assert_eq!(lolz.total_evaluations, 0);
        assert!(collector.get_worker_metrics("Unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_workers_past_limit_share_one_entry() {
        let collector = MetricsCollector::with_max_workers(2);
        for worker in ["AWorker", "BWorker", "CWorker", "DWorker"] {
            collector.record_evaluation(worker, &Verdict::Unthrottled).await;
        }
        collector.record_evaluation("AWorker", &Verdict::Admitted).await;

        let all = collector.get_all_metrics().await;
        assert_eq!(all.len(), 3);
        assert_eq!(all["AWorker"].total_evaluations, 2);
        assert_eq!(all[OVERFLOW_WORKER].unthrottled, 2);
        assert!(collector.get_worker_metrics("CWorker").await.is_none());
        assert_eq!(collector.get_global_metrics().await.total_evaluations, 5);
    }
}
