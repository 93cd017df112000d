//! Worker protocol value object module
//!
//! This module defines the logical messages exchanged with worker
//! processes: the job-run request, the job-control request, the closed set
//! of worker response codes, and the worker-initiated completion report.
//! The framework does not prescribe a wire format; any transport that
//! round-trips these values is admissible, and the in-process transport
//! passes them by value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::stats::StatTracker;
use crate::domain::value_objects::{JobId, JobState, ParameterList};

/// Closed set of codes a worker may return for a job request or control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    /// The request was accepted
    Success,
    /// The requested workload class is not known to the worker
    ClassNotFound,
    /// The workload class exists but is not a valid workload
    ClassNotValid,
    /// The workload could not be instantiated or initialized
    JobCreationFailure,
    /// The worker failed for a reason local to itself
    LocalError,
    /// The referenced job is not defined on the worker
    NoSuchJob,
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResponseCode::Success => "SUCCESS",
            ResponseCode::ClassNotFound => "CLASS_NOT_FOUND",
            ResponseCode::ClassNotValid => "CLASS_NOT_VALID",
            ResponseCode::JobCreationFailure => "JOB_CREATION_FAILURE",
            ResponseCode::LocalError => "LOCAL_ERROR",
            ResponseCode::NoSuchJob => "NO_SUCH_JOB",
        };
        write!(f, "{}", text)
    }
}

/// Reply returned by a worker for a request or control message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReply {
    pub code: ResponseCode,
    pub message: String,
}

impl WorkerReply {
    /// Builds a success reply
    pub fn success() -> Self {
        Self {
            code: ResponseCode::Success,
            message: String::new(),
        }
    }

    /// Builds a reply with the given code and message
    pub fn failure<S: Into<String>>(code: ResponseCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns true if the reply code is success
    pub fn is_success(&self) -> bool {
        self.code == ResponseCode::Success
    }
}

/// Control operation sent to a worker for a defined job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobControlOp {
    /// Begin executing the job's threads
    Start,
    /// Request a cooperative stop; the reply does not wait for the threads
    Stop,
    /// Request a cooperative stop and reply only after the threads exited
    StopAndWait,
}

/// Request defining a job run on one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Job this request belongs to
    pub job_id: JobId,
    /// Registry key of the workload to run
    pub workload_class: String,
    /// Workload parameter values
    pub parameters: ParameterList,
    /// Number of threads the worker should run
    pub num_threads: u32,
    /// Delay between starting consecutive threads
    pub thread_startup_delay_ms: u64,
    /// Width of one statistics collection interval
    pub collection_interval_secs: u32,
    /// Scheduled start time
    pub start_time: DateTime<Utc>,
    /// Optional scheduled stop time
    pub stop_time: Option<DateTime<Utc>>,
    /// Optional maximum duration in seconds
    pub duration_secs: Option<u64>,
    /// Position of this worker within the job's worker set
    pub worker_ordinal: u32,
}

/// Worker-initiated report describing one worker's completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    /// Job the report belongs to
    pub job_id: JobId,
    /// Identifier of the reporting worker
    pub client_id: String,
    /// True when the reporting worker is a resource monitor
    pub resource_monitor: bool,
    /// Terminal state from this worker's point of view
    pub final_state: JobState,
    /// When the worker actually started the job
    pub actual_start: DateTime<Utc>,
    /// When the worker actually finished the job
    pub actual_stop: DateTime<Utc>,
    /// How long the worker actually ran, in seconds
    pub actual_duration_secs: u64,
    /// Per-thread statistics collected by the worker
    pub stat_trackers: Vec<StatTracker>,
    /// Messages logged by the worker during the run
    pub log_messages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_helpers() {
        assert!(WorkerReply::success().is_success());
        let reply = WorkerReply::failure(ResponseCode::ClassNotFound, "unknown class");
        assert!(!reply.is_success());
        assert_eq!(reply.code, ResponseCode::ClassNotFound);
    }

    #[test]
    fn test_response_code_display_matches_wire_names() {
        assert_eq!(ResponseCode::JobCreationFailure.to_string(), "JOB_CREATION_FAILURE");
        assert_eq!(ResponseCode::NoSuchJob.to_string(), "NO_SUCH_JOB");
    }
}
