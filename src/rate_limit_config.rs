use crate::algorithms::WindowPolicy;
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::options::{Resolvable, ThrottleOptions};
use crate::store::StorageBackend;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Throttling rules per worker, as loaded from a rules file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkerRules {
    #[serde(default)]
    pub workers: HashMap<String, WorkerRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_rule: Option<WorkerRule>,
}

/// Throttling declaration of one worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerRule {
    #[serde(default)]
    pub threshold: u64,
    #[serde(default, with = "humantime_serde")]
    pub period: Duration,
    /// Fixed bucket name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Derives the bucket from the job arguments joined by this separator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_separator: Option<String>,
    /// Reads the threshold from this job argument instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_argument: Option<usize>,
    /// Reads the period, in seconds, from this job argument instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_argument: Option<usize>,
    #[serde(default)]
    pub unique_per_arguments: bool,
    #[serde(default = "default_reschedule")]
    pub reschedule: bool,
    #[serde(default)]
    pub storage: StorageBackend,
    #[serde(default)]
    pub window: WindowPolicy,
}

fn default_reschedule() -> bool {
    true
}

impl Default for WorkerRule {
    fn default() -> Self {
        Self {
            threshold: 0,
            period: Duration::ZERO,
            key: None,
            key_separator: None,
            threshold_argument: None,
            period_argument: None,
            unique_per_arguments: false,
            reschedule: true,
            storage: StorageBackend::Memory,
            window: WindowPolicy::Rolling,
        }
    }
}

impl WorkerRules {
    pub fn from_json(json: &str) -> ThrottlerResult<Self> {
        let rules: WorkerRules = serde_json::from_str(json)
            .map_err(|e| ThrottlerError::Configuration(format!("Invalid rules file: {}", e)))?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ThrottlerResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ThrottlerError::Configuration(format!(
                "Failed to read rules file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    /// Rule for `worker`, falling back to the default rule.
    pub fn get_rule(&self, worker: &str) -> Option<&WorkerRule> {
        self.workers.get(worker).or(self.default_rule.as_ref())
    }

    /// Options for `worker`. Workers without any rule are never throttled.
    pub fn options_for(&self, worker: &str) -> ThrottleOptions {
        self.get_rule(worker)
            .map(WorkerRule::to_options)
            .unwrap_or_default()
    }

    pub fn set_rule(&mut self, worker: String, rule: WorkerRule) {
        self.workers.insert(worker, rule);
    }

    pub fn remove_rule(&mut self, worker: &str) -> Option<WorkerRule> {
        self.workers.remove(worker)
    }

    /// Backends any rule refers to.
    pub fn uses_storage(&self, backend: StorageBackend) -> bool {
        self.workers
            .values()
            .chain(self.default_rule.iter())
            .any(|rule| rule.storage == backend)
    }

    pub fn validate(&self) -> ThrottlerResult<()> {
        for (worker, rule) in &self.workers {
            rule.validate().map_err(|e| {
                ThrottlerError::Configuration(format!("Invalid rule for {}: {}", worker, e))
            })?;
        }
        if let Some(rule) = &self.default_rule {
            rule.validate().map_err(|e| {
                ThrottlerError::Configuration(format!("Invalid default rule: {}", e))
            })?;
        }
        Ok(())
    }
}

impl WorkerRule {
    pub fn new(threshold: u64, period: Duration) -> Self {
        Self {
            threshold,
            period,
            ..Default::default()
        }
    }

    pub fn to_options(&self) -> ThrottleOptions {
        let mut options = ThrottleOptions::new(self.threshold, self.period)
            .unique_per_arguments(self.unique_per_arguments)
            .reschedule(self.reschedule)
            .with_storage(self.storage)
            .with_window(self.window);

        if let Some(index) = self.threshold_argument {
            options = options.with_threshold(Resolvable::<u64>::from_argument(index));
        }
        if let Some(index) = self.period_argument {
            options = options.with_period(Resolvable::<f64>::from_argument(index));
        }
        if let Some(key) = &self.key {
            options = options.with_key(key.clone());
        } else if let Some(separator) = &self.key_separator {
            options = options.with_key(Resolvable::<String>::joined_arguments(separator.clone()));
        }

        options
    }

    /// Validate rule parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.key.is_some() && self.key_separator.is_some() {
            return Err("key and key_separator are mutually exclusive".to_string());
        }
        if self.key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err("key must not be empty".to_string());
        }
        if self.threshold > 0 && self.period.is_zero() && self.period_argument.is_none() {
            return Err("a threshold needs a period greater than 0".to_string());
        }
        Ok(())
    }

    /// True when the rule can ever defer a job.
    pub fn is_limited(&self) -> bool {
        (self.threshold > 0 || self.threshold_argument.is_some())
            && (!self.period.is_zero() || self.period_argument.is_some())
    }
}
