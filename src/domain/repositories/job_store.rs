//! Job store capability module
//!
//! Persistence interface for job and optimizing-job records. Jobs are
//! persisted after every state-relevant mutation and reloaded on demand; the
//! byte-level format is owned by the implementation, and the in-memory state
//! stays authoritative when a persist fails.

use crate::domain::entities::{JobRecord, OptimizingJobRecord};
use crate::domain::error::CoreResult;
use crate::domain::value_objects::JobId;

/// Store of persisted job and optimizing-job records
pub trait JobStore: Send + Sync {
    /// Saves or replaces a job record
    fn save_job(&self, record: &JobRecord) -> CoreResult<()>;

    /// Loads a job record by id
    fn load_job(&self, job_id: &JobId) -> CoreResult<Option<JobRecord>>;

    /// Lists all job records in id order
    fn list_jobs(&self) -> CoreResult<Vec<JobRecord>>;

    /// Removes a job record
    fn delete_job(&self, job_id: &JobId) -> CoreResult<()>;

    /// Saves or replaces an optimizing-job record
    fn save_optimizing_job(&self, record: &OptimizingJobRecord) -> CoreResult<()>;

    /// Loads an optimizing-job record by id
    fn load_optimizing_job(&self, job_id: &JobId) -> CoreResult<Option<OptimizingJobRecord>>;

    /// Lists all optimizing-job records in id order
    fn list_optimizing_jobs(&self) -> CoreResult<Vec<OptimizingJobRecord>>;
}
