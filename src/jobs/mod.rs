mod error;
mod job;
mod registry;
mod runner;

pub use error::JobError;
pub use job::{Job, JobId, JobStatus};
pub use registry::JobRegistry;
pub use runner::{JobRunner, RunnerOptions};
