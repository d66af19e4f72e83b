use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::context::ExecutionContext;
use crate::store::StorageBackend;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub shared_store: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

pub struct HealthChecker {
    context: Arc<ExecutionContext>,
}

impl HealthChecker {
    pub fn new(context: Arc<ExecutionContext>) -> Self {
        Self { context }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME).unwrap_or_default().as_secs();

        let shared_store = self.check_shared_store().await;

        // Memory-only deployments are healthy without a shared store.
        let overall_status = match shared_store.status.as_str() {
            "healthy" | "not_configured" => "healthy",
            _ => "degraded",
        };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            dependencies: DependencyStatus { shared_store },
        }
    }

    async fn check_shared_store(&self) -> ServiceStatus {
        let start = Instant::now();

        let store = match self.context.store(StorageBackend::Shared) {
            Ok(store) => store,
            Err(_) => {
                return ServiceStatus {
                    status: "not_configured".to_string(),
                    response_time_ms: 0,
                    error: None,
                }
            }
        };

        match store.ping().await {
            Ok(()) => ServiceStatus {
                status: "healthy".to_string(),
                response_time_ms: start.elapsed().as_millis() as u64,
                error: None,
            },
            Err(e) => ServiceStatus {
                status: "unavailable".to_string(),
                response_time_ms: start.elapsed().as_millis() as u64,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fake::FakeListTransport;
    use crate::store::SharedStore;

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus {
            status: "healthy".to_string(),
            timestamp: 1234567890,
            version: "1.0.0".to_string(),
            uptime_seconds: 3600,
            dependencies: DependencyStatus {
                shared_store: ServiceStatus {
                    status: "healthy".to_string(),
                    response_time_ms: 5,
                    error: None,
                },
            },
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("shared_store"));
        assert!(json.contains("1234567890"));
    }

    #[tokio::test]
    async fn test_memory_only_is_healthy() {
        let checker = HealthChecker::new(Arc::new(ExecutionContext::new()));
        let health = checker.check_health().await;

        assert!(health.is_healthy());
        assert_eq!(health.dependencies.shared_store.status, "not_configured");
    }

    #[tokio::test]
    async fn test_unreachable_shared_store_degrades() {
        let transport = Arc::new(FakeListTransport::default());
        let context = ExecutionContext::new()
            .with_shared_store(Arc::new(SharedStore::new(transport.clone())));
        let checker = HealthChecker::new(Arc::new(context));

        assert!(checker.check_health().await.is_healthy());

        transport.fail();
        let health = checker.check_health().await;
        assert_eq!(health.status, "degraded");
        assert!(health.dependencies.shared_store.error.is_some());
    }
}
