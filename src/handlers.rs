use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::error::ThrottlerError;
use crate::health::HealthChecker;
use crate::rate_limit_config::WorkerRule;
use crate::rate_limiter::Verdict;
use crate::response::{retry_after_header, AdmissionResponse, ResetResponse, RuleResponse};
use crate::store::StorageBackend;
use crate::throttler::Throttler;
use crate::validation::{AdmissionRequest, RequestValidator};

/// Shared application state
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub throttler: Arc<Throttler>,
    pub health: HealthChecker,
}

impl AppState {
    pub fn new(throttler: Arc<Throttler>) -> Self {
        let health = HealthChecker::new(Arc::clone(throttler.context()));
        Self { throttler, health }
    }
}

/// Decide whether a job of `worker` may run now
pub async fn admit_job(
    State(state): State<SharedState>,
    Path(worker): Path<String>,
    Json(payload): Json<AdmissionRequest>,
) -> Result<Response, ThrottlerError> {
    let job = RequestValidator::validate_admission_request(&worker, payload)?;
    let verdict = state.throttler.admit(&job).await?;

    let mut resp = Json(AdmissionResponse::from_verdict(&worker, &verdict)).into_response();

    if let Verdict::Deferred { retry_after } = verdict {
        *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        let value = HeaderValue::from_str(&retry_after_header(retry_after))
            .map_err(|e| ThrottlerError::Internal(format!("Invalid Retry-After value: {}", e)))?;
        resp.headers_mut().insert(header::RETRY_AFTER, value);
    }

    Ok(resp)
}

pub async fn list_rules(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.throttler.get_all_rules().await)
}

pub async fn get_rule(
    State(state): State<SharedState>,
    Path(worker): Path<String>,
) -> Result<impl IntoResponse, ThrottlerError> {
    RequestValidator::validate_worker_name(&worker)?;

    state
        .throttler
        .get_rule(&worker)
        .await
        .map(Json)
        .ok_or_else(|| ThrottlerError::NotFound(format!("No rule for worker {}", worker)))
}

pub async fn set_rule(
    State(state): State<SharedState>,
    Path(worker): Path<String>,
    Json(rule): Json<WorkerRule>,
) -> Result<impl IntoResponse, ThrottlerError> {
    RequestValidator::validate_worker_name(&worker)?;

    state.throttler.set_rule(worker.clone(), rule.clone()).await?;
    tracing::info!(worker = %worker, threshold = rule.threshold, "Rule updated");

    Ok(Json(RuleResponse::updated(worker, rule)))
}

pub async fn delete_rule(
    State(state): State<SharedState>,
    Path(worker): Path<String>,
) -> Result<impl IntoResponse, ThrottlerError> {
    RequestValidator::validate_worker_name(&worker)?;

    let rule = state
        .throttler
        .remove_rule(&worker)
        .await
        .ok_or_else(|| ThrottlerError::NotFound(format!("No rule for worker {}", worker)))?;
    tracing::info!(worker = %worker, "Rule removed");

    Ok(Json(RuleResponse::removed(worker, rule)))
}

/// Forget every recorded admission in one backend
pub async fn reset_executions(
    State(state): State<SharedState>,
    Path(storage): Path<String>,
) -> Result<impl IntoResponse, ThrottlerError> {
    let backend = RequestValidator::validate_storage(&storage)?;
    let context = state.throttler.context();

    if backend == StorageBackend::Shared && !context.has_shared_store() {
        return Err(ThrottlerError::NotFound(
            "Shared store is not configured".to_string(),
        ));
    }

    context.reset(backend).await?;
    tracing::warn!(storage = %backend, "Execution history cleared");

    Ok(Json(ResetResponse::reset(backend.to_string())))
}

pub async fn get_metrics(State(state): State<SharedState>) -> impl IntoResponse {
    let metrics = state.throttler.context().metrics();

    Json(serde_json::json!({
        "global": metrics.get_global_metrics().await,
        "workers": metrics.get_all_metrics().await,
    }))
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.health.check_health().await)
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<SharedState>) -> impl IntoResponse {
    let health = state.health.check_health().await;

    if health.is_healthy() {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "shared_store": health.dependencies.shared_store.status,
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "shared_store": health.dependencies.shared_store.status,
                "error": health.dependencies.shared_store.error,
            })),
        )
    }
}
