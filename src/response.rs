use crate::rate_limit_config::WorkerRule;
use crate::rate_limiter::Verdict;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct AdmissionResponse {
    pub admitted: bool,
    pub worker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<f64>,
}

impl AdmissionResponse {
    pub fn from_verdict(worker: impl Into<String>, verdict: &Verdict) -> Self {
        match verdict {
            Verdict::Deferred { retry_after } => Self::deferred(worker, *retry_after),
            Verdict::Admitted | Verdict::Unthrottled => Self::admitted(worker),
        }
    }

    pub fn admitted(worker: impl Into<String>) -> Self {
        Self {
            admitted: true,
            worker: worker.into(),
            retry_after_secs: None,
        }
    }

    pub fn deferred(worker: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            admitted: false,
            worker: worker.into(),
            retry_after_secs: Some(retry_after.as_secs_f64()),
        }
    }
}

/// Value of a `Retry-After` header: whole seconds, rounded up.
pub fn retry_after_header(retry_after: Duration) -> String {
    retry_after.as_secs_f64().ceil().max(0.0).to_string()
}

#[derive(Debug, Serialize)]
pub struct RuleResponse {
    pub message: String,
    pub worker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<WorkerRule>,
}

impl RuleResponse {
    pub fn updated(worker: impl Into<String>, rule: WorkerRule) -> Self {
        Self {
            message: "Rule updated".to_string(),
            worker: worker.into(),
            rule: Some(rule),
        }
    }

    pub fn removed(worker: impl Into<String>, rule: WorkerRule) -> Self {
        Self {
            message: "Rule removed".to_string(),
            worker: worker.into(),
            rule: Some(rule),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub message: String,
    pub storage: String,
}

impl ResetResponse {
    pub fn reset(storage: impl Into<String>) -> Self {
        Self {
            message: "Executions cleared".to_string(),
            storage: storage.into(),
        }
    }
}
