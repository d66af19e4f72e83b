use crate::error::ThrottlerError;
use crate::job::Job;
use crate::store::StorageBackend;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use validator::Validate;

/// Plain or path-qualified type names: `LolzWorker`, `app::workers::LolzWorker`.
static WORKER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*$")
        .unwrap_or_else(|e| panic!("invalid worker name pattern: {}", e))
});

static QUEUE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap_or_else(|e| panic!("invalid queue pattern: {}", e))
});

fn default_queue() -> String {
    "default".to_string()
}

/// Body of an admission request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdmissionRequest {
    #[serde(default)]
    #[validate(length(max = 64))]
    pub args: Vec<Value>,
    #[serde(default = "default_queue")]
    #[validate(length(min = 1, max = 128), regex(path = *QUEUE_NAME))]
    pub queue: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 256))]
    pub group: Option<String>,
}

impl AdmissionRequest {
    pub fn into_job(self, worker: &str) -> Job {
        let job = Job::new(worker, self.args, self.queue);
        match self.group {
            Some(group) => job.in_group(group),
            None => job,
        }
    }
}

/// Request validation utilities
pub struct RequestValidator;

impl RequestValidator {
    pub fn validate_worker_name(worker: &str) -> Result<(), ThrottlerError> {
        if worker.is_empty() || worker.len() > 256 {
            return Err(ThrottlerError::Validation(
                "Worker name must be between 1 and 256 characters".to_string(),
            ));
        }

        if !WORKER_NAME.is_match(worker) {
            return Err(ThrottlerError::Validation(format!(
                "Invalid worker name '{}'",
                worker
            )));
        }

        Ok(())
    }

    /// Validates the body and builds the job it describes
    pub fn validate_admission_request(
        worker: &str,
        request: AdmissionRequest,
    ) -> Result<Job, ThrottlerError> {
        Self::validate_worker_name(worker)?;
        request.validate()?;
        Ok(request.into_job(worker))
    }

    pub fn validate_storage(storage: &str) -> Result<StorageBackend, ThrottlerError> {
        storage.parse().map_err(|e: ThrottlerError| match e {
            ThrottlerError::Configuration(msg) => ThrottlerError::Validation(msg),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> AdmissionRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_valid_worker_names() {
        assert!(RequestValidator::validate_worker_name("LolzWorker").is_ok());
        assert!(RequestValidator::validate_worker_name("app::workers::LolzWorker").is_ok());
    }

    #[test]
    fn test_invalid_worker_names() {
        assert!(RequestValidator::validate_worker_name("").is_err());
        assert!(RequestValidator::validate_worker_name("lolz worker").is_err());
        assert!(RequestValidator::validate_worker_name("app::").is_err());
    }

    #[test]
    fn test_admission_request_defaults() {
        let job = RequestValidator::validate_admission_request("LolzWorker", request(json!({})))
            .unwrap();

        assert_eq!(job.worker, "LolzWorker");
        assert_eq!(job.queue, "default");
        assert!(job.args.is_empty());
        assert!(job.group.is_none());
    }

    #[test]
    fn test_admission_request_builds_job() {
        let body = json!({"args": ["world", 3], "queue": "meow", "group": "batch-1"});
        let job = RequestValidator::validate_admission_request("LolzWorker", request(body))
            .unwrap();

        assert_eq!(job.args, vec![json!("world"), json!(3)]);
        assert_eq!(job.queue, "meow");
        assert_eq!(job.group.as_deref(), Some("batch-1"));
    }

    #[test]
    fn test_invalid_admission_request() {
        let result =
            RequestValidator::validate_admission_request("LolzWorker", request(json!({"queue": ""})));
        assert!(matches!(result, Err(ThrottlerError::Validation(_))));

        let result = RequestValidator::validate_admission_request(
            "LolzWorker",
            request(json!({"queue": "no spaces"})),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_storage() {
        assert_eq!(
            RequestValidator::validate_storage("shared").unwrap(),
            StorageBackend::Shared
        );
        assert!(matches!(
            RequestValidator::validate_storage("disk"),
            Err(ThrottlerError::Validation(_))
        ));
    }
}
