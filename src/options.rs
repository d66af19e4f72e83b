//! Per-worker throttle options.

use crate::algorithms::WindowPolicy;
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::job::Job;
use crate::key_generator::KeyGenerator;
use crate::store::StorageBackend;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type Compute<T> = Arc<dyn Fn(&[Value]) -> ThrottlerResult<T> + Send + Sync>;

/// Custom deferral behavior. Receives the retry delay and the deferred job.
pub type OnDeferred = Arc<dyn Fn(Duration, &Job) -> ThrottlerResult<()> + Send + Sync>;

/// A configured value that is either fixed or computed from the job's arguments.
pub enum Resolvable<T> {
    Literal(T),
    Computed(Compute<T>),
}

impl<T: Clone> Resolvable<T> {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> ThrottlerResult<T> + Send + Sync + 'static,
    {
        Resolvable::Computed(Arc::new(f))
    }

    pub fn resolve(&self, args: &[Value]) -> ThrottlerResult<T> {
        match self {
            Resolvable::Literal(value) => Ok(value.clone()),
            Resolvable::Computed(f) => f(args),
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Resolvable::Computed(_))
    }
}

impl Resolvable<u64> {
    /// Threshold taken from the argument at `index`, coerced to a non-negative integer.
    pub fn from_argument(index: usize) -> Self {
        Self::computed(move |args| coerce_threshold(argument_at(args, index)?))
    }
}

impl Resolvable<f64> {
    /// Period in seconds taken from the argument at `index`, coerced to a non-negative number.
    pub fn from_argument(index: usize) -> Self {
        Self::computed(move |args| coerce_period(argument_at(args, index)?))
    }
}

impl Resolvable<String> {
    /// Key made of every argument joined by `separator`.
    pub fn joined_arguments(separator: impl Into<String>) -> Self {
        let separator = separator.into();
        Self::computed(move |args| Ok(KeyGenerator::join_arguments(args, &separator)))
    }
}

impl<T: Clone> Clone for Resolvable<T> {
    fn clone(&self) -> Self {
        match self {
            Resolvable::Literal(value) => Resolvable::Literal(value.clone()),
            Resolvable::Computed(f) => Resolvable::Computed(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Resolvable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolvable::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Resolvable::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<T> From<T> for Resolvable<T> {
    fn from(value: T) -> Self {
        Resolvable::Literal(value)
    }
}

impl From<&str> for Resolvable<String> {
    fn from(value: &str) -> Self {
        Resolvable::Literal(value.to_string())
    }
}

fn argument_at(args: &[Value], index: usize) -> ThrottlerResult<&Value> {
    args.get(index).ok_or_else(|| {
        ThrottlerError::Configuration(format!(
            "job has {} argument(s), none at index {}",
            args.len(),
            index
        ))
    })
}

/// Integers pass through, floats truncate, numeric strings are parsed, negatives clamp to zero.
pub fn coerce_threshold(value: &Value) -> ThrottlerResult<u64> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                Ok(v)
            } else if let Some(v) = n.as_i64() {
                Ok(v.max(0) as u64)
            } else {
                Ok(clamp_non_negative(n.as_f64().unwrap_or_default())?.trunc() as u64)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(v) = s.parse::<i64>() {
                Ok(v.max(0) as u64)
            } else {
                s.parse::<f64>()
                    .map_err(|_| {
                        ThrottlerError::Configuration(format!("threshold '{}' is not a number", s))
                    })
                    .and_then(clamp_non_negative)
                    .map(|v| v.trunc() as u64)
            }
        }
        other => Err(ThrottlerError::Configuration(format!(
            "threshold must be a number, got {}",
            other
        ))),
    }
}

/// Numbers and numeric strings become seconds, negatives clamp to zero.
pub fn coerce_period(value: &Value) -> ThrottlerResult<f64> {
    match value {
        Value::Number(n) => clamp_non_negative(n.as_f64().unwrap_or_default()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ThrottlerError::Configuration(format!("period '{}' is not a number", s)))
            .and_then(clamp_non_negative),
        other => Err(ThrottlerError::Configuration(format!(
            "period must be a number of seconds, got {}",
            other
        ))),
    }
}

pub(crate) fn clamp_non_negative(value: f64) -> ThrottlerResult<f64> {
    if !value.is_finite() {
        return Err(ThrottlerError::Configuration(format!(
            "{} is not a finite number",
            value
        )));
    }
    Ok(value.max(0.0))
}

/// Throttle options declared by a worker.
///
/// The default is a worker with no effective limits: threshold and period are
/// zero, so every job is admitted without touching storage.
#[derive(Clone)]
pub struct ThrottleOptions {
    /// Admissions allowed per window.
    pub threshold: Resolvable<u64>,
    /// Window length in seconds.
    pub period: Resolvable<f64>,
    /// Explicit bucket key. Defaults to the worker key.
    pub key: Option<Resolvable<String>>,
    /// Give each argument set its own bucket.
    pub unique_per_arguments: bool,
    /// Resubmit deferred jobs. When false they are dropped.
    pub reschedule: bool,
    /// Replaces the default resubmission.
    pub on_deferred: Option<OnDeferred>,
    pub storage: StorageBackend,
    pub window: WindowPolicy,
}

impl Default for ThrottleOptions {
    fn default() -> Self {
        Self {
            threshold: Resolvable::Literal(0),
            period: Resolvable::Literal(0.0),
            key: None,
            unique_per_arguments: false,
            reschedule: true,
            on_deferred: None,
            storage: StorageBackend::default(),
            window: WindowPolicy::default(),
        }
    }
}

impl ThrottleOptions {
    pub fn new(threshold: u64, period: Duration) -> Self {
        Self {
            threshold: Resolvable::Literal(threshold),
            period: Resolvable::Literal(period.as_secs_f64()),
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: impl Into<Resolvable<u64>>) -> Self {
        self.threshold = threshold.into();
        self
    }

    pub fn with_period(mut self, period: impl Into<Resolvable<f64>>) -> Self {
        self.period = period.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<Resolvable<String>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn unique_per_arguments(mut self, unique: bool) -> Self {
        self.unique_per_arguments = unique;
        self
    }

    pub fn reschedule(mut self, reschedule: bool) -> Self {
        self.reschedule = reschedule;
        self
    }

    pub fn on_deferred<F>(mut self, handler: F) -> Self
    where
        F: Fn(Duration, &Job) -> ThrottlerResult<()> + Send + Sync + 'static,
    {
        self.on_deferred = Some(Arc::new(handler));
        self
    }

    pub fn with_storage(mut self, storage: StorageBackend) -> Self {
        self.storage = storage;
        self
    }

    /// Selects the storage backend by identifier (`"memory"` or `"shared"`).
    pub fn storage(self, backend: &str) -> ThrottlerResult<Self> {
        Ok(self.with_storage(backend.parse()?))
    }

    pub fn with_window(mut self, window: WindowPolicy) -> Self {
        self.window = window;
        self
    }
}

impl fmt::Debug for ThrottleOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleOptions")
            .field("threshold", &self.threshold)
            .field("period", &self.period)
            .field("key", &self.key)
            .field("unique_per_arguments", &self.unique_per_arguments)
            .field("reschedule", &self.reschedule)
            .field("on_deferred", &self.on_deferred.is_some())
            .field("storage", &self.storage)
            .field("window", &self.window)
            .finish()
    }
}
