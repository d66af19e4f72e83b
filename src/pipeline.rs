use crate::error::{ThrottlerError, ThrottlerResult};
use crate::job::Job;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;

/// The job system deferred jobs are handed back to.
#[async_trait]
pub trait JobPipeline: Send + Sync {
    /// Enqueues `job` again to run no earlier than `delay` from now.
    async fn resubmit_after(&self, delay: Duration, job: &Job) -> ThrottlerResult<()>;

    /// Enqueues `job` again as part of an existing group. Pipelines without
    /// group support resubmit the job on its own.
    async fn resubmit_within_group(
        &self,
        group_id: &str,
        delay: Duration,
        job: &Job,
    ) -> ThrottlerResult<()> {
        let _ = group_id;
        self.resubmit_after(delay, job).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resubmission {
    pub job: Job,
    pub delay: Duration,
    pub group: Option<String>,
}

/// Keeps resubmitted jobs in memory for the embedding application to drain.
#[derive(Debug, Default)]
pub struct RecordingPipeline {
    resubmissions: Mutex<Vec<Resubmission>>,
}

impl RecordingPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resubmissions(&self) -> Vec<Resubmission> {
        self.resubmissions
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Removes and returns everything resubmitted so far.
    pub fn drain(&self) -> Vec<Resubmission> {
        self.resubmissions
            .lock()
            .map(|mut r| std::mem::take(&mut *r))
            .unwrap_or_default()
    }

    fn record(&self, resubmission: Resubmission) -> ThrottlerResult<()> {
        self.resubmissions
            .lock()
            .map_err(|_| ThrottlerError::Pipeline("resubmission queue is poisoned".to_string()))?
            .push(resubmission);
        Ok(())
    }
}

#[async_trait]
impl JobPipeline for RecordingPipeline {
    async fn resubmit_after(&self, delay: Duration, job: &Job) -> ThrottlerResult<()> {
        self.record(Resubmission {
            job: job.clone(),
            delay,
            group: None,
        })
    }

    async fn resubmit_within_group(
        &self,
        group_id: &str,
        delay: Duration,
        job: &Job,
    ) -> ThrottlerResult<()> {
        self.record(Resubmission {
            job: job.clone(),
            delay,
            group: Some(group_id.to_string()),
        })
    }
}
