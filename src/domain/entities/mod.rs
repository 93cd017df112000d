pub mod job;
pub mod optimizing_job;

pub use job::{
    CompletionDisposition, CompletionOutcome, Job, JobRecord, StartOutcome,
    DEFAULT_COLLECTION_INTERVAL_SECS,
};
pub use optimizing_job::{OptimizingJob, OptimizingJobRecord};
