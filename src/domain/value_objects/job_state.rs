//! Job state value object module
//!
//! This module defines the lifecycle state of a job together with the
//! severity ordering used to merge worker-reported terminal states into a
//! single job-level final state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a job
///
/// A job moves from `Uninitialized` through `NotYetStarted` (optionally
/// toggling with `Disabled`) into `Running`, and finishes in exactly one of
/// the terminal states. Worker processes report their own terminal state per
/// completion report; the job merges them under the monotone severity rule
/// so the final state is independent of report arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Created but not yet accepted by the scheduler
    Uninitialized,
    /// Accepted and waiting for its start time and dependencies
    NotYetStarted,
    /// Held back by an operator; not admissible until re-enabled
    Disabled,
    /// Dispatched to workers and executing
    Running,
    /// All workers finished without errors
    CompletedSuccessfully,
    /// Finished, but at least one worker reported errors
    CompletedWithErrors,
    /// Stopped by an explicit operator request
    StoppedByUser,
    /// Stopped because the maximum duration elapsed
    StoppedDueToDuration,
    /// Stopped because the scheduled stop time arrived
    StoppedDueToStopTime,
    /// Stopped because of an unrecoverable error
    StoppedDueToError,
    /// Stopped because the server was shut down
    StoppedByShutdown,
    /// Cancelled before any worker produced results
    Cancelled,
    /// The workload class was not known to a worker
    NoSuchJob,
}

impl JobState {
    /// Returns true if this state is terminal
    ///
    /// A terminal job is no longer reachable from the scheduler's caches.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            JobState::Uninitialized
                | JobState::NotYetStarted
                | JobState::Disabled
                | JobState::Running
        )
    }

    /// Returns true if an optimizing-job iteration may end in this state
    ///
    /// Iterations stopped by their duration or stop time still produced a
    /// full set of statistics, so the search can continue. Any other
    /// terminal state halts the optimizing job.
    pub fn is_acceptable_iteration_stop(&self) -> bool {
        matches!(
            self,
            JobState::CompletedSuccessfully
                | JobState::StoppedDueToDuration
                | JobState::StoppedDueToStopTime
        )
    }

    /// Returns the severity rank of this state
    ///
    /// The rank is total over terminal states and consistent with the
    /// required chain: success < with-errors < stopped-by-user <
    /// stopped-due-to-error < cancelled. Acceptable stops rank between
    /// success and with-errors; a missing workload class ranks most severe.
    /// Non-terminal states rank zero.
    pub fn severity(&self) -> u8 {
        match self {
            JobState::Uninitialized
            | JobState::NotYetStarted
            | JobState::Disabled
            | JobState::Running => 0,
            JobState::CompletedSuccessfully => 0,
            JobState::StoppedDueToDuration => 1,
            JobState::StoppedDueToStopTime => 2,
            JobState::CompletedWithErrors => 3,
            JobState::StoppedByUser => 4,
            JobState::StoppedByShutdown => 5,
            JobState::StoppedDueToError => 6,
            JobState::Cancelled => 7,
            JobState::NoSuchJob => 8,
        }
    }

    /// Returns the more severe of two states under the monotone rule
    pub fn more_severe(self, other: JobState) -> JobState {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JobState::Uninitialized => "Uninitialized",
            JobState::NotYetStarted => "Not Yet Started",
            JobState::Disabled => "Disabled",
            JobState::Running => "Running",
            JobState::CompletedSuccessfully => "Completed Successfully",
            JobState::CompletedWithErrors => "Completed With Errors",
            JobState::StoppedByUser => "Stopped By User",
            JobState::StoppedDueToDuration => "Stopped Due To Duration",
            JobState::StoppedDueToStopTime => "Stopped Due To Stop Time",
            JobState::StoppedDueToError => "Stopped Due To Error",
            JobState::StoppedByShutdown => "Stopped By Shutdown",
            JobState::Cancelled => "Cancelled",
            JobState::NoSuchJob => "No Such Job",
        };
        write!(f, "{}", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::NotYetStarted.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Disabled.is_terminal());
        assert!(JobState::CompletedSuccessfully.is_terminal());
        assert!(JobState::StoppedDueToError.is_terminal());
        assert!(JobState::NoSuchJob.is_terminal());
    }

    #[test]
    fn test_severity_chain() {
        // success < with-errors < stopped-by-user < stopped-due-to-error < cancelled
        assert!(
            JobState::CompletedSuccessfully.severity() < JobState::CompletedWithErrors.severity()
        );
        assert!(JobState::CompletedWithErrors.severity() < JobState::StoppedByUser.severity());
        assert!(JobState::StoppedByUser.severity() < JobState::StoppedDueToError.severity());
        assert!(JobState::StoppedDueToError.severity() < JobState::Cancelled.severity());
    }

    #[test]
    fn test_more_severe_keeps_worst() {
        let merged = JobState::CompletedSuccessfully
            .more_severe(JobState::StoppedDueToDuration)
            .more_severe(JobState::StoppedDueToError)
            .more_severe(JobState::CompletedWithErrors);
        assert_eq!(merged, JobState::StoppedDueToError);
    }

    #[test]
    fn test_acceptable_iteration_stops() {
        assert!(JobState::CompletedSuccessfully.is_acceptable_iteration_stop());
        assert!(JobState::StoppedDueToDuration.is_acceptable_iteration_stop());
        assert!(JobState::StoppedDueToStopTime.is_acceptable_iteration_stop());
        assert!(!JobState::StoppedByUser.is_acceptable_iteration_stop());
        assert!(!JobState::StoppedDueToError.is_acceptable_iteration_stop());
    }
}
