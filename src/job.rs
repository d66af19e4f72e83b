use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of one unit of work as seen by the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Fully-qualified worker type name, e.g. `app::workers::LolzWorker`.
    pub worker: String,
    /// Argument payload the worker is performed with.
    #[serde(default)]
    pub args: Vec<Value>,
    pub queue: String,
    /// Batch/group the job was enqueued in, if any.
    #[serde(default)]
    pub group: Option<String>,
}

impl Job {
    pub fn new(worker: impl Into<String>, args: Vec<Value>, queue: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            args,
            queue: queue.into(),
            group: None,
        }
    }

    /// Builds a job whose worker identity is the type name of `W`.
    pub fn for_worker<W: ?Sized>(args: Vec<Value>, queue: impl Into<String>) -> Self {
        Self::new(std::any::type_name::<W>(), args, queue)
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}
