//! Worker connection capability module
//!
//! A worker connection is the opaque handle through which the server talks
//! to one remote worker or resource-monitor process, and the worker pool is
//! the capability a job uses to acquire and release those handles. The
//! transport behind a handle is not prescribed; the bundled in-process
//! transport lives in the infrastructure layer, and tests substitute mocks.

use std::sync::Arc;

use crate::domain::error::CoreResult;
use crate::domain::value_objects::{JobControlOp, JobId, JobRequest, WorkerReply};

/// Handle to one connected worker process
///
/// Transport failures are reported through the closed response-code set
/// (`LocalError` for faults local to the connection), so callers only ever
/// deal with protocol replies.
#[cfg_attr(test, mockall::automock)]
pub trait WorkerConnection: Send + Sync {
    /// Stable identifier of the worker behind this handle
    fn client_id(&self) -> String;

    /// Defines a job run on the worker
    fn send_job_request(&self, request: &JobRequest) -> WorkerReply;

    /// Sends a control operation for a previously defined job
    fn send_job_control(&self, job_id: &JobId, op: JobControlOp) -> WorkerReply;
}

/// Pool of connected workers, as seen by a starting job
///
/// Selection is all-or-nothing: a job either receives its full worker set
/// or an error. A handle is in at most one job's active set at a time;
/// released handles return to the idle pool.
pub trait WorkerPool: Send + Sync {
    /// Selects the compute workers for a job
    fn get_client_connections(
        &self,
        job: &crate::domain::entities::Job,
    ) -> CoreResult<Vec<Arc<dyn WorkerConnection>>>;

    /// Selects the resource-monitor workers for a job
    ///
    /// `selected` names the compute workers already chosen, so co-resident
    /// monitors can be added when the job asks for them.
    fn get_monitor_client_connections(
        &self,
        job: &crate::domain::entities::Job,
        selected: &[Arc<dyn WorkerConnection>],
    ) -> CoreResult<Vec<Arc<dyn WorkerConnection>>>;

    /// Returns a handle to the idle pool after a job releases it
    fn set_available_for_processing(&self, connection: Arc<dyn WorkerConnection>);
}
