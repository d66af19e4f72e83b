//! Resolution of key, threshold and period for one evaluation.

use crate::error::{ThrottlerError, ThrottlerResult};
use crate::job::Job;
use crate::key_generator::KeyGenerator;
use crate::options::{clamp_non_negative, Resolvable, ThrottleOptions};
use std::sync::OnceLock;
use std::time::Duration;

/// Limiting parameters for one job, resolved lazily and at most once.
///
/// Computed values are invoked with the job's full argument list the first
/// time they are read; later reads return the cached result. A failed
/// resolution is not cached and is returned to the caller.
#[derive(Debug)]
pub struct RateLimitPolicy<'a> {
    job: &'a Job,
    options: &'a ThrottleOptions,
    key: OnceLock<String>,
    threshold: OnceLock<u64>,
    period: OnceLock<Duration>,
}

impl<'a> RateLimitPolicy<'a> {
    pub fn new(job: &'a Job, options: &'a ThrottleOptions) -> Self {
        Self {
            job,
            options,
            key: OnceLock::new(),
            threshold: OnceLock::new(),
            period: OnceLock::new(),
        }
    }

    pub fn options(&self) -> &ThrottleOptions {
        self.options
    }

    /// Admissions allowed per window.
    pub fn threshold(&self) -> ThrottlerResult<u64> {
        if let Some(threshold) = self.threshold.get() {
            return Ok(*threshold);
        }

        let threshold = self
            .options
            .threshold
            .resolve(&self.job.args)
            .map_err(|e| resolution_error("threshold", e))?;
        Ok(*self.threshold.get_or_init(|| threshold))
    }

    /// Window length.
    pub fn period(&self) -> ThrottlerResult<Duration> {
        if let Some(period) = self.period.get() {
            return Ok(*period);
        }

        let seconds = self
            .options
            .period
            .resolve(&self.job.args)
            .and_then(clamp_non_negative)
            .map_err(|e| resolution_error("period", e))?;
        let period = Duration::try_from_secs_f64(seconds).map_err(|e| {
            ThrottlerError::Configuration(format!("period {}s is out of range: {}", seconds, e))
        })?;
        Ok(*self.period.get_or_init(|| period))
    }

    /// Bucket the job is counted in.
    pub fn key(&self) -> ThrottlerResult<&str> {
        if let Some(key) = self.key.get() {
            return Ok(key.as_str());
        }

        let key = match &self.options.key {
            Some(Resolvable::Computed(f)) => {
                f(&self.job.args).map_err(|e| resolution_error("key", e))?
            }
            Some(Resolvable::Literal(literal)) => self.with_unique_suffix(literal),
            None => self.with_unique_suffix(&KeyGenerator::worker_key(
                &self.job.worker,
                &self.job.queue,
            )),
        };
        Ok(self.key.get_or_init(|| key).as_str())
    }

    /// False when the worker declares no effective limit; such jobs are
    /// always admitted.
    pub fn can_throttle(&self) -> ThrottlerResult<bool> {
        Ok(self.threshold()? != 0 && !self.period()?.is_zero())
    }

    fn with_unique_suffix(&self, base: &str) -> String {
        if self.options.unique_per_arguments {
            KeyGenerator::with_argument_suffix(base, &self.job.args)
        } else {
            base.to_string()
        }
    }
}

fn resolution_error(option: &str, err: ThrottlerError) -> ThrottlerError {
    match err {
        ThrottlerError::Configuration(msg) => {
            ThrottlerError::Configuration(format!("failed to resolve {}: {}", option, msg))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn lolz_job() -> Job {
        Job::new("LolzWorker", vec![json!("world")], "meow")
    }

    #[test]
    fn test_default_key_combines_worker_and_queue() {
        let job = lolz_job();
        let options = ThrottleOptions::new(10, Duration::from_secs(60));
        let policy = RateLimitPolicy::new(&job, &options);

        assert_eq!(policy.key().unwrap(), "lolz_worker:meow");
    }

    #[test]
    fn test_literal_key() {
        let job = lolz_job();
        let options = ThrottleOptions::new(10, Duration::from_secs(60)).with_key("winning");
        let policy = RateLimitPolicy::new(&job, &options);

        assert_eq!(policy.key().unwrap(), "winning");
    }

    #[test]
    fn test_computed_key_is_used_verbatim() {
        let job = Job::new("ProcWorker", vec![json!("a"), json!("b"), json!("c")], "default");
        let options = ThrottleOptions::new(10, Duration::from_secs(60))
            .with_key(Resolvable::<String>::joined_arguments(":"))
            .unique_per_arguments(true);
        let policy = RateLimitPolicy::new(&job, &options);

        assert_eq!(policy.key().unwrap(), "a:b:c");
    }

    #[test]
    fn test_unique_per_arguments_extends_literal_key() {
        let job = Job::new("W", vec![json!("x"), json!("y")], "default");
        let other_job = Job::new("W", vec![json!("x"), json!("z")], "default");
        let options = ThrottleOptions::new(10, Duration::from_secs(60))
            .with_key("k")
            .unique_per_arguments(true);

        let key = RateLimitPolicy::new(&job, &options).key().unwrap().to_string();
        let other = RateLimitPolicy::new(&other_job, &options)
            .key()
            .unwrap()
            .to_string();

        assert_eq!(key, "k:x/y");
        assert_ne!(key, other);
    }

    #[test]
    fn test_unique_per_arguments_extends_default_key() {
        let job = lolz_job();
        let options = ThrottleOptions::new(10, Duration::from_secs(60)).unique_per_arguments(true);
        let policy = RateLimitPolicy::new(&job, &options);

        assert_eq!(policy.key().unwrap(), "lolz_worker:meow:world");
    }

    #[test]
    fn test_computed_threshold_and_period() {
        let job = Job::new("ProcWorker", vec![json!("user-1"), json!(4), json!("30")], "default");
        let options = ThrottleOptions::default()
            .with_threshold(Resolvable::<u64>::from_argument(1))
            .with_period(Resolvable::<f64>::from_argument(2));
        let policy = RateLimitPolicy::new(&job, &options);

        assert_eq!(policy.threshold().unwrap(), 4);
        assert_eq!(policy.period().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_values_are_resolved_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let job = lolz_job();
        let options = ThrottleOptions::new(10, Duration::from_secs(60)).with_threshold(
            Resolvable::<u64>::computed(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(26)
            }),
        );
        let policy = RateLimitPolicy::new(&job, &options);

        assert_eq!(policy.threshold().unwrap(), 26);
        assert_eq!(policy.threshold().unwrap(), 26);
        assert!(policy.can_throttle().unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_can_throttle_false_on_zero_threshold_or_period() {
        let job = lolz_job();

        let zero_threshold = ThrottleOptions::new(0, Duration::from_secs(60));
        assert!(!RateLimitPolicy::new(&job, &zero_threshold).can_throttle().unwrap());

        let zero_period = ThrottleOptions::new(10, Duration::ZERO);
        assert!(!RateLimitPolicy::new(&job, &zero_period).can_throttle().unwrap());

        let unconfigured = ThrottleOptions::default();
        assert!(!RateLimitPolicy::new(&job, &unconfigured).can_throttle().unwrap());
    }

    #[test]
    fn test_negative_period_clamps_to_zero() {
        let job = lolz_job();
        let options = ThrottleOptions::new(10, Duration::from_secs(60)).with_period(-5.0_f64);
        let policy = RateLimitPolicy::new(&job, &options);

        assert_eq!(policy.period().unwrap(), Duration::ZERO);
        assert!(!policy.can_throttle().unwrap());
    }

    #[test]
    fn test_failed_resolution_propagates() {
        let job = lolz_job();
        let options = ThrottleOptions::new(10, Duration::from_secs(60)).with_key(
            Resolvable::<String>::computed(|_| {
                Err(ThrottlerError::Configuration("tenant lookup failed".to_string()))
            }),
        );
        let policy = RateLimitPolicy::new(&job, &options);

        let err = policy.key().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: failed to resolve key: tenant lookup failed"
        );
    }

    #[test]
    fn test_non_finite_period_is_rejected() {
        let job = lolz_job();
        let options = ThrottleOptions::new(10, Duration::from_secs(60)).with_period(f64::NAN);
        let policy = RateLimitPolicy::new(&job, &options);

        assert!(matches!(
            policy.period(),
            Err(ThrottlerError::Configuration(_))
        ));
    }
}
