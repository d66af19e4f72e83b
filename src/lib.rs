//! Sliding-window admission control for background job pipelines.
//!
//! A [`Throttler`] sits in front of job execution. For every job it resolves
//! the worker's [`ThrottleOptions`], counts the admissions recorded for the
//! job's key within the window and either runs the job or defers it.

pub mod algorithms;
pub mod clock;
pub mod config;
pub mod config_validator;
pub mod context;
pub mod error;
pub mod handlers;
pub mod health;
pub mod job;
pub mod key_generator;
pub mod metrics;
pub mod middleware;
pub mod options;
pub mod pipeline;
pub mod policy;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod redis;
pub mod response;
pub mod server;
pub mod store;
pub mod throttler;
pub mod validation;

pub use algorithms::WindowPolicy;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use context::ExecutionContext;
pub use error::{ThrottlerError, ThrottlerResult};
pub use job::Job;
pub use options::{Resolvable, ThrottleOptions};
pub use pipeline::{JobPipeline, RecordingPipeline};
pub use rate_limit_config::{WorkerRule, WorkerRules};
pub use rate_limiter::{RateLimiter, Verdict};
pub use server::create_app;
pub use store::{ExecutionStore, MemoryStore, SharedStore, StorageBackend};
pub use throttler::{GateOutcome, Throttler};
