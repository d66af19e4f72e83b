//! The admission decision for one job.

use crate::context::ExecutionContext;
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::job::Job;
use crate::options::ThrottleOptions;
use crate::policy::RateLimitPolicy;
use crate::store::ExecutionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

type WithinBounds<'a, T> = Box<dyn FnOnce() -> T + Send + 'a>;
type Exceeded<'a, T> = Box<dyn FnOnce(Duration) -> T + Send + 'a>;

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No effective limit is configured; storage was not consulted.
    Unthrottled,
    /// Under the threshold; the admission was recorded.
    Admitted,
    /// At or over the threshold; nothing was recorded.
    Deferred { retry_after: Duration },
}

impl Verdict {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Verdict::Deferred { .. })
    }
}

/// Decides whether one job may run now and invokes exactly one of two
/// caller-supplied callbacks.
///
/// Register both callbacks, then call [`RateLimiter::execute`]:
///
/// ```ignore
/// let mut limiter = context.limiter(&job, &options)?;
/// limiter.within_bounds(|| run(job));
/// limiter.exceeded(|delay| requeue(job, delay));
/// let outcome = limiter.execute().await?;
/// ```
pub struct RateLimiter<'a, T> {
    evaluation: Evaluation<'a>,
    within_bounds: Option<WithinBounds<'a, T>>,
    exceeded: Option<Exceeded<'a, T>>,
}

struct Evaluation<'a> {
    context: &'a ExecutionContext,
    store: Arc<dyn ExecutionStore>,
    job: &'a Job,
    policy: RateLimitPolicy<'a>,
}

impl<'a, T> RateLimiter<'a, T> {
    pub(crate) fn new(
        context: &'a ExecutionContext,
        store: Arc<dyn ExecutionStore>,
        job: &'a Job,
        options: &'a ThrottleOptions,
    ) -> Self {
        Self {
            evaluation: Evaluation {
                context,
                store,
                job,
                policy: RateLimitPolicy::new(job, options),
            },
            within_bounds: None,
            exceeded: None,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy<'a> {
        &self.evaluation.policy
    }

    pub fn job(&self) -> &Job {
        self.evaluation.job
    }

    /// Runs when the job is admitted.
    pub fn within_bounds<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce() -> T + Send + 'a,
    {
        self.within_bounds = Some(Box::new(callback));
        self
    }

    /// Runs when the job is deferred, with the suggested delay.
    pub fn exceeded<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(Duration) -> T + Send + 'a,
    {
        self.exceeded = Some(Box::new(callback));
        self
    }

    /// Evaluates the job and runs the matching callback.
    ///
    /// Both callbacks must be registered first. The callback runs after the
    /// critical section is released. Resolution and storage failures are
    /// returned without running either callback.
    pub async fn execute(self) -> ThrottlerResult<T> {
        let Self {
            evaluation,
            within_bounds,
            exceeded,
        } = self;

        let within_bounds = within_bounds.ok_or_else(|| missing_callback("within_bounds"))?;
        let exceeded = exceeded.ok_or_else(|| missing_callback("exceeded"))?;

        let verdict = evaluation.decide().await?;
        evaluation
            .context
            .metrics()
            .record_evaluation(&evaluation.job.worker, &verdict)
            .await;

        Ok(match verdict {
            Verdict::Unthrottled | Verdict::Admitted => within_bounds(),
            Verdict::Deferred { retry_after } => exceeded(retry_after),
        })
    }
}

impl Evaluation<'_> {
    async fn decide(&self) -> ThrottlerResult<Verdict> {
        if !self.policy.can_throttle()? {
            trace!(worker = %self.job.worker, "No limit configured, admitting");
            return Ok(Verdict::Unthrottled);
        }

        let key = self.policy.key()?;
        let threshold = self.policy.threshold()?;
        let period = self.policy.period()?;
        let window = self.policy.options().window.algorithm();

        let _guard = self.context.critical_section().enter().await;
        let now = self.context.clock().now();

        self.store.prune(key, window.cutoff(now, period)).await?;
        let count = self.store.count(key).await?;

        if count >= threshold {
            let retry_after = window.retry_after(now, period);
            debug!(
                worker = %self.job.worker,
                key,
                count,
                threshold,
                retry_after_secs = retry_after.as_secs_f64(),
                "Threshold reached, deferring"
            );
            return Ok(Verdict::Deferred { retry_after });
        }

        self.store.append(key, now).await?;
        trace!(worker = %self.job.worker, key, count = count + 1, threshold, "Admitted");
        Ok(Verdict::Admitted)
    }
}

fn missing_callback(name: &str) -> ThrottlerError {
    ThrottlerError::Configuration(format!(
        "rate limiter executed without a '{}' callback",
        name
    ))
}
