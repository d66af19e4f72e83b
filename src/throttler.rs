use crate::context::ExecutionContext;
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::job::Job;
use crate::options::ThrottleOptions;
use crate::pipeline::JobPipeline;
use crate::rate_limit_config::{WorkerRule, WorkerRules};
use crate::rate_limiter::Verdict;
use crate::store::StorageBackend;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// What happened to a job that went through the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome<R> {
    /// The job was admitted and its work ran.
    Performed(R),
    /// The job was handed back to the pipeline.
    Rescheduled { delay: Duration },
    /// Rescheduling is disabled for the worker; the job was discarded.
    Dropped { delay: Duration },
    /// The worker's own deferral handler took the job.
    Deferred { delay: Duration },
}

impl<R> GateOutcome<R> {
    pub fn is_performed(&self) -> bool {
        matches!(self, GateOutcome::Performed(_))
    }
}

/// Admission gate in front of the job pipeline.
pub struct Throttler {
    context: Arc<ExecutionContext>,
    pipeline: Arc<dyn JobPipeline>,
    rules: Arc<RwLock<WorkerRules>>,
}

impl Throttler {
    pub fn new(context: Arc<ExecutionContext>, pipeline: Arc<dyn JobPipeline>) -> Self {
        Self::with_rules(context, pipeline, WorkerRules::default())
    }

    pub fn with_rules(
        context: Arc<ExecutionContext>,
        pipeline: Arc<dyn JobPipeline>,
        rules: WorkerRules,
    ) -> Self {
        Self {
            context,
            pipeline,
            rules: Arc::new(RwLock::new(rules)),
        }
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Runs `work` for `job` when the limit allows it; otherwise applies the
    /// worker's deferral behavior.
    pub async fn call<'a, F, Fut, R>(
        &'a self,
        job: &'a Job,
        options: &'a ThrottleOptions,
        work: F,
    ) -> ThrottlerResult<GateOutcome<R>>
    where
        F: FnOnce(&'a Job) -> Fut + Send + 'a,
        Fut: Future<Output = R> + Send + 'a,
        R: Send + 'a,
    {
        let mut limiter = self
            .context
            .limiter::<BoxFuture<'a, ThrottlerResult<GateOutcome<R>>>>(job, options)?;

        limiter
            .within_bounds(move || {
                async move { Ok::<_, ThrottlerError>(GateOutcome::Performed(work(job).await)) }
                    .boxed()
            })
            .exceeded(move |delay| self.defer(job, options, delay).boxed());

        limiter.execute().await?.await
    }

    /// Decision only: whether `job` may run now under its worker's rule.
    /// Admissions are recorded; nothing is resubmitted.
    pub async fn admit(&self, job: &Job) -> ThrottlerResult<Verdict> {
        let options = self.rules.read().await.options_for(&job.worker);
        let mut limiter = self.context.limiter(job, &options)?;
        limiter
            .within_bounds(|| Verdict::Admitted)
            .exceeded(|retry_after| Verdict::Deferred { retry_after });
        limiter.execute().await
    }

    async fn defer<R>(
        &self,
        job: &Job,
        options: &ThrottleOptions,
        delay: Duration,
    ) -> ThrottlerResult<GateOutcome<R>> {
        if let Some(handler) = &options.on_deferred {
            debug!(
                worker = %job.worker,
                delay_secs = delay.as_secs_f64(),
                "Handing deferred job to custom handler"
            );
            handler(delay, job)?;
            return Ok(GateOutcome::Deferred { delay });
        }

        if !options.reschedule {
            info!(
                worker = %job.worker,
                delay_secs = delay.as_secs_f64(),
                "Dropping throttled job"
            );
            return Ok(GateOutcome::Dropped { delay });
        }

        match &job.group {
            Some(group_id) => {
                self.pipeline
                    .resubmit_within_group(group_id, delay, job)
                    .await?
            }
            None => self.pipeline.resubmit_after(delay, job).await?,
        }
        info!(
            worker = %job.worker,
            group = job.group.as_deref().unwrap_or(""),
            delay_secs = delay.as_secs_f64(),
            "Rescheduled throttled job"
        );
        Ok(GateOutcome::Rescheduled { delay })
    }

    pub async fn get_rule(&self, worker: &str) -> Option<WorkerRule> {
        self.rules.read().await.get_rule(worker).cloned()
    }

    pub async fn get_all_rules(&self) -> WorkerRules {
        self.rules.read().await.clone()
    }

    /// Add or update the rule of a worker
    pub async fn set_rule(&self, worker: String, rule: WorkerRule) -> ThrottlerResult<()> {
        rule.validate().map_err(ThrottlerError::Validation)?;
        if rule.storage == StorageBackend::Shared && !self.context.has_shared_store() {
            return Err(ThrottlerError::Validation(
                "rule uses shared storage but no shared store is configured".to_string(),
            ));
        }
        self.rules.write().await.set_rule(worker, rule);
        Ok(())
    }

    pub async fn remove_rule(&self, worker: &str) -> Option<WorkerRule> {
        self.rules.write().await.remove_rule(worker)
    }

    pub async fn update_rules(&self, rules: WorkerRules) {
        *self.rules.write().await = rules;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::pipeline::RecordingPipeline;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn throttler() -> (Throttler, Arc<RecordingPipeline>) {
        let context =
            ExecutionContext::new().with_clock(Arc::new(ManualClock::at_unix_secs(1_000)));
        let pipeline = Arc::new(RecordingPipeline::new());
        (Throttler::new(Arc::new(context), pipeline.clone()), pipeline)
    }

    async fn run(throttler: &Throttler, job: &Job, options: &ThrottleOptions) -> GateOutcome<u32> {
        throttler.call(job, options, |_| async { 7 }).await.unwrap()
    }

    #[tokio::test]
    async fn test_admitted_job_runs_work() {
        let (throttler, pipeline) = throttler();
        let job = Job::new("LolzWorker", vec![json!("world")], "meow");
        let options = ThrottleOptions::new(1, Duration::from_secs(60));

        assert_eq!(run(&throttler, &job, &options).await, GateOutcome::Performed(7));
        assert!(pipeline.resubmissions().is_empty());
    }

    #[tokio::test]
    async fn test_deferred_job_is_rescheduled() {
        let (throttler, pipeline) = throttler();
        let job = Job::new("LolzWorker", vec![json!("world")], "meow");
        let options = ThrottleOptions::new(1, Duration::from_secs(60));

        run(&throttler, &job, &options).await;
        let outcome = run(&throttler, &job, &options).await;

        assert_eq!(
            outcome,
            GateOutcome::Rescheduled {
                delay: Duration::from_secs(60)
            }
        );
        let resubmitted = pipeline.resubmissions();
        assert_eq!(resubmitted.len(), 1);
        assert_eq!(resubmitted[0].job, job);
        assert_eq!(resubmitted[0].delay, Duration::from_secs(60));
        assert_eq!(resubmitted[0].group, None);
    }

    #[tokio::test]
    async fn test_grouped_job_is_rescheduled_within_group() {
        let (throttler, pipeline) = throttler();
        let job = Job::new("LolzWorker", vec![], "default").in_group("batch-7");
        let options = ThrottleOptions::new(1, Duration::from_secs(10));

        run(&throttler, &job, &options).await;
        assert!(!run(&throttler, &job, &options).await.is_performed());

        assert_eq!(pipeline.resubmissions()[0].group.as_deref(), Some("batch-7"));
    }

    #[tokio::test]
    async fn test_reschedule_disabled_drops_job() {
        let (throttler, pipeline) = throttler();
        let job = Job::new("LolzWorker", vec![], "default");
        let options = ThrottleOptions::new(1, Duration::from_secs(60)).reschedule(false);

        run(&throttler, &job, &options).await;
        assert_eq!(
            run(&throttler, &job, &options).await,
            GateOutcome::Dropped {
                delay: Duration::from_secs(60)
            }
        );
        assert!(pipeline.resubmissions().is_empty());
    }

    #[tokio::test]
    async fn test_custom_handler_takes_precedence() {
        let (throttler, pipeline) = throttler();
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        let job = Job::new("LolzWorker", vec![], "default");
        let options = ThrottleOptions::new(1, Duration::from_secs(60))
            .reschedule(false)
            .on_deferred(move |delay, job| {
                assert_eq!(delay, Duration::from_secs(60));
                assert_eq!(job.worker, "LolzWorker");
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        run(&throttler, &job, &options).await;
        assert_eq!(
            run(&throttler, &job, &options).await,
            GateOutcome::Deferred {
                delay: Duration::from_secs(60)
            }
        );
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert!(pipeline.resubmissions().is_empty());
    }

    #[tokio::test]
    async fn test_admit_uses_worker_rules() {
        let (throttler, _pipeline) = throttler();
        throttler
            .set_rule(
                "LolzWorker".to_string(),
                WorkerRule::new(2, Duration::from_secs(60)),
            )
            .await
            .unwrap();
        let job = Job::new("LolzWorker", vec![], "default");
        let other = Job::new("OtherWorker", vec![], "default");

        assert_eq!(throttler.admit(&job).await.unwrap(), Verdict::Admitted);
        assert_eq!(throttler.admit(&job).await.unwrap(), Verdict::Admitted);
        assert!(!throttler.admit(&job).await.unwrap().is_admitted());
        assert_eq!(throttler.admit(&other).await.unwrap(), Verdict::Unthrottled);
    }

    #[tokio::test]
    async fn test_shared_rule_requires_shared_store() {
        let (throttler, _pipeline) = throttler();
        let rule = WorkerRule {
            storage: StorageBackend::Shared,
            ..WorkerRule::new(2, Duration::from_secs(60))
        };

        let err = throttler.set_rule("LolzWorker".to_string(), rule).await.unwrap_err();
        assert!(matches!(err, ThrottlerError::Validation(_)));
    }
}
