//! Optimizing job entity module
//!
//! An optimizing job is the controller state for an adaptive search over
//! thread counts: it repeatedly schedules the same base workload as child
//! jobs with monotonically increasing thread counts, tracks the best
//! iteration seen so far, and optionally re-runs the best iteration for a
//! longer validation period. The decision logic lives in the application
//! layer; this entity owns the configuration, the mutable search state, and
//! the construction of child jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::domain::entities::Job;
use crate::domain::value_objects::{JobId, JobState, ParameterList};

/// Mutable search state, guarded by the optimizing job's mutex
///
/// `cancel_requested` and `pause_requested` are only read and written under
/// this mutex; the completion decision tree takes the lock before consulting
/// them.
struct OptimizingState {
    job_state: JobState,
    stop_reason: Option<String>,
    child_ids: Vec<JobId>,
    rerun_id: Option<JobId>,
    current_optimal_id: Option<JobId>,
    current_optimal_threads: u32,
    current_optimal_value: f64,
    rerun_value: f64,
    current_non_improving: u32,
    pause_requested: bool,
    cancel_requested: bool,
    actual_start: Option<DateTime<Utc>>,
    actual_stop: Option<DateTime<Utc>>,
    best_value_snapshot: Option<f64>,
}

/// Controller state for an adaptive thread-count search
pub struct OptimizingJob {
    /// Unique identifier; child job ids extend it
    pub optimizing_job_id: JobId,
    /// Registry key of the base workload
    pub workload_class: String,
    /// Human-readable description, propagated to children
    pub description: Option<String>,
    /// Folder the job is filed under
    pub folder_name: Option<String>,
    /// Workload parameter values shared by all iterations
    pub parameters: ParameterList,
    /// Number of compute workers per iteration
    pub num_clients: u32,
    /// Explicit worker names, shared by all iterations
    pub requested_clients: Vec<String>,
    /// Explicit resource-monitor worker names
    pub monitor_clients: Vec<String>,
    /// Also monitor workers co-resident with selected compute workers
    pub monitor_clients_if_available: bool,
    /// Statistics collection interval for all iterations
    pub collection_interval_secs: u32,
    /// Per-iteration maximum duration in seconds
    pub duration_secs: Option<u64>,
    /// Delay between starting consecutive threads
    pub thread_startup_delay_ms: u64,
    /// Thread count of the first iteration
    pub min_threads: u32,
    /// Thread-count cap; zero or negative means no cap
    pub max_threads: i64,
    /// Thread-count step between iterations
    pub thread_increment: u32,
    /// Consecutive non-improving iterations tolerated before stopping
    pub max_non_improving: u32,
    /// Re-run the best iteration after the search ends
    pub rerun_best: bool,
    /// Duration of the validation re-run in seconds
    pub rerun_duration_secs: Option<u64>,
    /// Delay between one iteration's completion and the next start
    pub delay_between_iterations_secs: u64,
    /// Name of the optimization algorithm driving the search
    pub algorithm_name: String,
    /// The algorithm's parameter values
    pub algorithm_parameters: ParameterList,
    /// Addresses notified on the terminal transition
    pub notify_addresses: Vec<String>,
    state: Mutex<OptimizingState>,
}

impl OptimizingJob {
    /// Creates an optimizing job with the given identity and base workload
    pub fn new(optimizing_job_id: JobId, workload_class: &str) -> Self {
        Self {
            optimizing_job_id,
            workload_class: workload_class.to_string(),
            description: None,
            folder_name: None,
            parameters: ParameterList::new(),
            num_clients: 1,
            requested_clients: Vec::new(),
            monitor_clients: Vec::new(),
            monitor_clients_if_available: false,
            collection_interval_secs: super::job::DEFAULT_COLLECTION_INTERVAL_SECS,
            duration_secs: None,
            thread_startup_delay_ms: 0,
            min_threads: 1,
            max_threads: -1,
            thread_increment: 1,
            max_non_improving: 1,
            rerun_best: false,
            rerun_duration_secs: None,
            delay_between_iterations_secs: 0,
            algorithm_name: String::new(),
            algorithm_parameters: ParameterList::new(),
            notify_addresses: Vec::new(),
            state: Mutex::new(OptimizingState {
                job_state: JobState::NotYetStarted,
                stop_reason: None,
                child_ids: Vec::new(),
                rerun_id: None,
                current_optimal_id: None,
                current_optimal_threads: 0,
                current_optimal_value: f64::NAN,
                rerun_value: f64::NAN,
                current_non_improving: 0,
                pause_requested: false,
                cancel_requested: false,
                actual_start: None,
                actual_stop: None,
                best_value_snapshot: None,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, OptimizingState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current lifecycle state
    pub fn job_state(&self) -> JobState {
        self.lock_state().job_state
    }

    /// Stop reason recorded at the terminal transition, if any
    pub fn stop_reason(&self) -> Option<String> {
        self.lock_state().stop_reason.clone()
    }

    /// Ordered ids of the scheduled iterations
    pub fn child_ids(&self) -> Vec<JobId> {
        self.lock_state().child_ids.clone()
    }

    /// Id of the validation re-run, once scheduled
    pub fn rerun_id(&self) -> Option<JobId> {
        self.lock_state().rerun_id.clone()
    }

    /// Best iteration seen so far: id, thread count, and summary value
    pub fn current_optimal(&self) -> (Option<JobId>, u32, f64) {
        let state = self.lock_state();
        (
            state.current_optimal_id.clone(),
            state.current_optimal_threads,
            state.current_optimal_value,
        )
    }

    /// Summary value observed by the validation re-run
    pub fn rerun_value(&self) -> f64 {
        self.lock_state().rerun_value
    }

    /// Number of consecutive non-improving iterations
    pub fn current_non_improving(&self) -> u32 {
        self.lock_state().current_non_improving
    }

    /// Restored best value from persistence, when one was captured
    pub fn best_value_snapshot(&self) -> Option<f64> {
        self.lock_state().best_value_snapshot
    }

    /// Actual start and stop timestamps
    pub fn actual_times(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let state = self.lock_state();
        (state.actual_start, state.actual_stop)
    }

    /// Requests cancellation; honoured when the running iteration completes
    pub fn request_cancel(&self) {
        self.lock_state().cancel_requested = true;
    }

    /// Returns the cancel flag, read under the lock
    pub fn cancel_requested(&self) -> bool {
        self.lock_state().cancel_requested
    }

    /// Requests that the next iteration be created disabled
    pub fn request_pause(&self) {
        self.lock_state().pause_requested = true;
    }

    /// Consumes the pause flag, clearing it
    pub fn take_pause_request(&self) -> bool {
        let mut state = self.lock_state();
        std::mem::take(&mut state.pause_requested)
    }

    /// Marks the search as running and stamps the actual start time
    pub fn mark_started(&self) {
        let mut state = self.lock_state();
        if state.job_state == JobState::NotYetStarted {
            state.job_state = JobState::Running;
            state.actual_start = Some(Utc::now());
        }
    }

    /// Applies the terminal state; only the first transition wins
    pub fn mark_terminal(&self, job_state: JobState, reason: &str) -> bool {
        let mut state = self.lock_state();
        if state.job_state.is_terminal() {
            return false;
        }
        state.job_state = job_state;
        state.stop_reason = Some(reason.to_string());
        let now = Utc::now();
        state.actual_start.get_or_insert(now);
        state.actual_stop = Some(now);
        drop(state);
        info!(
            optimizing_job_id = %self.optimizing_job_id,
            state = %job_state,
            "optimizing job terminal: {}",
            reason
        );
        true
    }

    /// Records a newly scheduled iteration
    pub fn append_child(&self, child_id: JobId) {
        self.lock_state().child_ids.push(child_id);
    }

    /// Records the validation re-run; at most one is ever scheduled
    pub fn set_rerun(&self, rerun_id: JobId) {
        let mut state = self.lock_state();
        debug_assert!(state.rerun_id.is_none());
        state.rerun_id = Some(rerun_id);
    }

    /// True when the given job is the recorded validation re-run
    pub fn is_rerun_child(&self, job_id: &JobId) -> bool {
        self.lock_state().rerun_id.as_ref() == Some(job_id)
    }

    /// Records the summary value observed by the validation re-run
    pub fn set_rerun_value(&self, value: f64) {
        self.lock_state().rerun_value = value;
    }

    /// Records an improvement: the iteration becomes the new optimum and the
    /// non-improving counter resets
    pub fn record_improvement(&self, child_id: JobId, threads: u32, value: f64) {
        let mut state = self.lock_state();
        state.current_optimal_id = Some(child_id);
        state.current_optimal_threads = threads;
        state.current_optimal_value = value;
        state.current_non_improving = 0;
        state.best_value_snapshot = Some(value);
    }

    /// Records a non-improving iteration and returns the new counter value
    pub fn record_non_improvement(&self) -> u32 {
        let mut state = self.lock_state();
        state.current_non_improving += 1;
        state.current_non_improving
    }

    /// Thread count of the iteration after the given one
    ///
    /// The cap applies only when `max_threads` is positive; zero or negative
    /// means the search is uncapped.
    pub fn next_thread_count(&self, current_threads: u32) -> u32 {
        let next = current_threads.saturating_add(self.thread_increment.max(1));
        if self.max_threads > 0 {
            next.min(self.max_threads as u32)
        } else {
            next
        }
    }

    /// True when the given iteration reached the thread-count cap
    pub fn reached_thread_cap(&self, threads: u32) -> bool {
        self.max_threads > 0 && i64::from(threads) >= self.max_threads
    }

    /// Builds the child job for one iteration
    ///
    /// The child id extends the optimizing-job id with the thread count (and
    /// a rerun tag for the validation run), so children sort in iteration
    /// order directly after the parent.
    pub fn build_iteration_job(
        &self,
        threads: u32,
        start_time: DateTime<Utc>,
        rerun: bool,
    ) -> Job {
        let job_id = if rerun {
            self.optimizing_job_id.rerun_child(threads)
        } else {
            self.optimizing_job_id.iteration_child(threads)
        };
        let mut job = Job::new(job_id, &self.workload_class, start_time);
        job.optimizing_job_id = Some(self.optimizing_job_id.clone());
        job.folder_name = self.folder_name.clone();
        job.description = Some(match (&self.description, threads) {
            (Some(description), 1) => format!("1 Thread - {}", description),
            (Some(description), n) => format!("{} Threads - {}", n, description),
            (None, 1) => "1 Thread".to_string(),
            (None, n) => format!("{} Threads", n),
        });
        job.parameters = self.parameters.clone();
        job.num_clients = self.num_clients;
        job.requested_clients = self.requested_clients.clone();
        job.monitor_clients = self.monitor_clients.clone();
        job.monitor_clients_if_available = self.monitor_clients_if_available;
        job.collection_interval_secs = self.collection_interval_secs;
        job.thread_startup_delay_ms = self.thread_startup_delay_ms;
        job.threads_per_client = threads;
        job.duration_secs = if rerun {
            self.rerun_duration_secs.or(self.duration_secs)
        } else {
            self.duration_secs
        };
        // Iterations always wait for workers: the previous iteration's
        // workers may not have been returned to the pool yet.
        job.wait_for_clients = true;
        job
    }

    /// Converts the optimizing job to its persistence image
    pub fn to_record(&self) -> OptimizingJobRecord {
        let state = self.lock_state();
        OptimizingJobRecord {
            optimizing_job_id: self.optimizing_job_id.clone(),
            workload_class: self.workload_class.clone(),
            description: self.description.clone(),
            folder_name: self.folder_name.clone(),
            parameters: self.parameters.clone(),
            num_clients: self.num_clients,
            requested_clients: self.requested_clients.clone(),
            monitor_clients: self.monitor_clients.clone(),
            monitor_clients_if_available: self.monitor_clients_if_available,
            collection_interval_secs: self.collection_interval_secs,
            duration_secs: self.duration_secs,
            thread_startup_delay_ms: self.thread_startup_delay_ms,
            min_threads: self.min_threads,
            max_threads: self.max_threads,
            thread_increment: self.thread_increment,
            max_non_improving: self.max_non_improving,
            rerun_best: self.rerun_best,
            rerun_duration_secs: self.rerun_duration_secs,
            delay_between_iterations_secs: self.delay_between_iterations_secs,
            algorithm_name: self.algorithm_name.clone(),
            algorithm_parameters: self.algorithm_parameters.clone(),
            notify_addresses: self.notify_addresses.clone(),
            job_state: state.job_state,
            stop_reason: state.stop_reason.clone(),
            child_ids: state.child_ids.clone(),
            rerun_id: state.rerun_id.clone(),
            current_optimal_id: state.current_optimal_id.clone(),
            current_optimal_threads: state.current_optimal_threads,
            current_non_improving: state.current_non_improving,
            pause_requested: state.pause_requested,
            actual_start: state.actual_start,
            actual_stop: state.actual_stop,
            best_value_snapshot: state.best_value_snapshot,
        }
    }

    /// Rebuilds an optimizing job from its persistence image
    pub fn from_record(record: OptimizingJobRecord) -> Self {
        let mut job = OptimizingJob::new(record.optimizing_job_id, &record.workload_class);
        job.description = record.description;
        job.folder_name = record.folder_name;
        job.parameters = record.parameters;
        job.num_clients = record.num_clients;
        job.requested_clients = record.requested_clients;
        job.monitor_clients = record.monitor_clients;
        job.monitor_clients_if_available = record.monitor_clients_if_available;
        job.collection_interval_secs = record.collection_interval_secs;
        job.duration_secs = record.duration_secs;
        job.thread_startup_delay_ms = record.thread_startup_delay_ms;
        job.min_threads = record.min_threads;
        job.max_threads = record.max_threads;
        job.thread_increment = record.thread_increment;
        job.max_non_improving = record.max_non_improving;
        job.rerun_best = record.rerun_best;
        job.rerun_duration_secs = record.rerun_duration_secs;
        job.delay_between_iterations_secs = record.delay_between_iterations_secs;
        job.algorithm_name = record.algorithm_name;
        job.algorithm_parameters = record.algorithm_parameters;
        job.notify_addresses = record.notify_addresses;
        {
            let mut state = job.lock_state();
            state.job_state = record.job_state;
            state.stop_reason = record.stop_reason;
            state.child_ids = record.child_ids;
            state.rerun_id = record.rerun_id;
            state.current_optimal_id = record.current_optimal_id;
            state.current_optimal_threads = record.current_optimal_threads;
            state.current_optimal_value = record.best_value_snapshot.unwrap_or(f64::NAN);
            state.current_non_improving = record.current_non_improving;
            state.pause_requested = record.pause_requested;
            state.actual_start = record.actual_start;
            state.actual_stop = record.actual_stop;
            state.best_value_snapshot = record.best_value_snapshot;
        }
        job
    }
}

/// Persistence image of an optimizing job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizingJobRecord {
    pub optimizing_job_id: JobId,
    pub workload_class: String,
    pub description: Option<String>,
    pub folder_name: Option<String>,
    pub parameters: ParameterList,
    pub num_clients: u32,
    pub requested_clients: Vec<String>,
    pub monitor_clients: Vec<String>,
    pub monitor_clients_if_available: bool,
    pub collection_interval_secs: u32,
    pub duration_secs: Option<u64>,
    pub thread_startup_delay_ms: u64,
    pub min_threads: u32,
    pub max_threads: i64,
    pub thread_increment: u32,
    pub max_non_improving: u32,
    pub rerun_best: bool,
    pub rerun_duration_secs: Option<u64>,
    pub delay_between_iterations_secs: u64,
    pub algorithm_name: String,
    pub algorithm_parameters: ParameterList,
    pub notify_addresses: Vec<String>,
    pub job_state: JobState,
    pub stop_reason: Option<String>,
    pub child_ids: Vec<JobId>,
    pub rerun_id: Option<JobId>,
    pub current_optimal_id: Option<JobId>,
    pub current_optimal_threads: u32,
    pub current_non_improving: u32,
    pub pause_requested: bool,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_stop: Option<DateTime<Utc>>,
    /// Captured best value; absent in records written before the algorithm
    /// snapshot existed, in which case the child list is replayed
    pub best_value_snapshot: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimizing_job() -> OptimizingJob {
        let mut job = OptimizingJob::new(JobId::from("20260101000000-abc1231"), "NullWorkload");
        job.min_threads = 1;
        job.max_threads = 8;
        job.thread_increment = 2;
        job
    }

    #[test]
    fn test_child_ids_sort_in_iteration_order() {
        let job = optimizing_job();
        let first = job.build_iteration_job(1, Utc::now(), false);
        let second = job.build_iteration_job(3, Utc::now(), false);
        let rerun = job.build_iteration_job(1, Utc::now(), true);
        assert!(job.optimizing_job_id < first.job_id);
        assert!(first.job_id < second.job_id);
        assert!(second.job_id < rerun.job_id);
        assert!(first.job_id.is_child_of(&job.optimizing_job_id));
        assert!(rerun.job_id.is_child_of(&job.optimizing_job_id));
    }

    #[test]
    fn test_children_wait_for_clients() {
        let job = optimizing_job();
        let child = job.build_iteration_job(1, Utc::now(), false);
        assert!(child.wait_for_clients);
        assert_eq!(child.threads_per_client, 1);
        assert_eq!(
            child.optimizing_job_id.as_ref(),
            Some(&job.optimizing_job_id)
        );
    }

    #[test]
    fn test_rerun_child_uses_rerun_duration() {
        let mut job = optimizing_job();
        job.duration_secs = Some(120);
        job.rerun_duration_secs = Some(600);
        let rerun = job.build_iteration_job(4, Utc::now(), true);
        assert_eq!(rerun.duration_secs, Some(600));
        let normal = job.build_iteration_job(4, Utc::now(), false);
        assert_eq!(normal.duration_secs, Some(120));
    }

    #[test]
    fn test_thread_description_prefix() {
        let mut job = optimizing_job();
        job.description = Some("replay search".to_string());
        assert_eq!(
            job.build_iteration_job(1, Utc::now(), false)
                .description
                .as_deref(),
            Some("1 Thread - replay search")
        );
        assert_eq!(
            job.build_iteration_job(4, Utc::now(), false)
                .description
                .as_deref(),
            Some("4 Threads - replay search")
        );
    }

    #[test]
    fn test_next_thread_count_caps_only_when_positive() {
        let mut job = optimizing_job();
        job.thread_increment = 3;
        job.max_threads = 8;
        assert_eq!(job.next_thread_count(7), 8);
        job.max_threads = -1;
        assert_eq!(job.next_thread_count(7), 10);
        assert!(!job.reached_thread_cap(1000));
    }

    #[test]
    fn test_non_improving_counter_resets_on_improvement() {
        let job = optimizing_job();
        assert_eq!(job.record_non_improvement(), 1);
        assert_eq!(job.record_non_improvement(), 2);
        job.record_improvement(JobId::from("20260101000000-abc1231-5"), 5, 50.0);
        assert_eq!(job.current_non_improving(), 0);
        let (optimal_id, threads, value) = job.current_optimal();
        assert_eq!(
            optimal_id.unwrap().as_str(),
            "20260101000000-abc1231-5"
        );
        assert_eq!(threads, 5);
        assert!((value - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_round_trip() {
        let job = optimizing_job();
        job.mark_started();
        job.append_child(JobId::from("20260101000000-abc1231-1"));
        job.record_improvement(JobId::from("20260101000000-abc1231-1"), 1, 10.0);
        let record = job.to_record();
        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: OptimizingJobRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(record, decoded);
        let restored = OptimizingJob::from_record(decoded);
        assert_eq!(restored.to_record(), record);
    }

    #[test]
    fn test_terminal_transition_happens_once() {
        let job = optimizing_job();
        assert!(job.mark_terminal(JobState::Cancelled, "cancelled by user request"));
        assert!(!job.mark_terminal(JobState::CompletedSuccessfully, "later"));
        assert_eq!(job.job_state(), JobState::Cancelled);
    }
}
