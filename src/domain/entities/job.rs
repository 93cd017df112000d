//! Job entity module
//!
//! A job is one scheduled execution of a workload with fixed parameters, on
//! a fixed set of workers, with a fixed thread count. The entity owns the
//! start protocol, the merging of worker completion reports under the
//! monotone severity rule, and the cooperative stop operations. All
//! run-time state lives behind a single mutex; the mutex is never held
//! across calls into the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::stats::{aggregate_into, StatTracker};
use crate::domain::value_objects::{
    CompletionReport, JobControlOp, JobId, JobRequest, JobState, ParameterList, ResponseCode,
};
use crate::domain::workers::{WorkerConnection, WorkerPool};
use crate::workloads::Workload;

/// Default width of one statistics collection interval
pub const DEFAULT_COLLECTION_INTERVAL_SECS: u32 = 60;

/// Outcome of an admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Workers accepted the job; it is now running
    Started,
    /// Not enough workers and the job waits for clients; try again later
    RetryLater,
    /// The job could not start and has taken a terminal state
    Failed,
}

/// Disposition reported by the completion-merging operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionDisposition {
    /// More workers are still active
    InProgress,
    /// All compute workers finished; monitor reports are still outstanding
    AwaitingMonitors,
    /// The last outstanding report arrived; the caller must finalize
    Finalize,
}

/// Result of merging one completion report
pub struct CompletionOutcome {
    /// What the caller has to do next
    pub disposition: CompletionDisposition,
    /// The reporting worker's handle, for return to the idle pool
    pub released: Option<Arc<dyn WorkerConnection>>,
}

/// Mutable run-time state of a job, guarded by the job's mutex
struct JobRuntime {
    state: JobState,
    tentative_final_state: JobState,
    stop_reason: Option<String>,
    active_clients: Vec<Arc<dyn WorkerConnection>>,
    active_monitor_clients: Vec<Arc<dyn WorkerConnection>>,
    aggregated_stats: Vec<StatTracker>,
    monitor_stats: Vec<StatTracker>,
    log_messages: Vec<String>,
    actual_start: Option<DateTime<Utc>>,
    actual_stop: Option<DateTime<Utc>>,
    actual_duration_secs: Option<u64>,
    done: bool,
}

/// One scheduled execution of a workload
pub struct Job {
    /// Unique identifier and total-ordering key
    pub job_id: JobId,
    /// Parent optimizing job, when this job is an iteration
    pub optimizing_job_id: Option<JobId>,
    /// Registry key of the workload to run
    pub workload_class: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Folder the job is filed under
    pub folder_name: Option<String>,
    /// Optional job group
    pub group_name: Option<String>,
    /// Whether the admin surface shows the job read-only
    pub display_read_only: bool,
    /// Scheduled start time
    pub start_time: DateTime<Utc>,
    /// Optional scheduled stop time
    pub stop_time: Option<DateTime<Utc>>,
    /// Optional maximum duration in seconds
    pub duration_secs: Option<u64>,
    /// Retry admission instead of failing when workers are scarce
    pub wait_for_clients: bool,
    /// Number of compute workers requested
    pub num_clients: u32,
    /// Explicit worker names, overriding the idle-pool draw
    pub requested_clients: Vec<String>,
    /// Explicit resource-monitor worker names
    pub monitor_clients: Vec<String>,
    /// Also monitor any worker co-resident with a selected compute worker
    pub monitor_clients_if_available: bool,
    /// Threads each worker runs
    pub threads_per_client: u32,
    /// Delay between starting consecutive threads
    pub thread_startup_delay_ms: u64,
    /// Width of one statistics collection interval
    pub collection_interval_secs: u32,
    /// Jobs that must have terminated before this one becomes admissible
    pub dependencies: Vec<JobId>,
    /// Workload parameter values
    pub parameters: ParameterList,
    /// Addresses notified on the terminal transition
    pub notify_addresses: Vec<String>,
    /// Free-form operator comments
    pub comments: Option<String>,
    runtime: Mutex<JobRuntime>,
    completion_cv: Condvar,
}

impl Job {
    /// Creates a job with the given identity, workload, and start time
    pub fn new(job_id: JobId, workload_class: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            job_id,
            optimizing_job_id: None,
            workload_class: workload_class.to_string(),
            description: None,
            folder_name: None,
            group_name: None,
            display_read_only: false,
            start_time,
            stop_time: None,
            duration_secs: None,
            wait_for_clients: false,
            num_clients: 1,
            requested_clients: Vec::new(),
            monitor_clients: Vec::new(),
            monitor_clients_if_available: false,
            threads_per_client: 1,
            thread_startup_delay_ms: 0,
            collection_interval_secs: DEFAULT_COLLECTION_INTERVAL_SECS,
            dependencies: Vec::new(),
            parameters: ParameterList::new(),
            notify_addresses: Vec::new(),
            comments: None,
            runtime: Mutex::new(JobRuntime {
                state: JobState::Uninitialized,
                tentative_final_state: JobState::CompletedSuccessfully,
                stop_reason: None,
                active_clients: Vec::new(),
                active_monitor_clients: Vec::new(),
                aggregated_stats: Vec::new(),
                monitor_stats: Vec::new(),
                log_messages: Vec::new(),
                actual_start: None,
                actual_stop: None,
                actual_duration_secs: None,
                done: false,
            }),
            completion_cv: Condvar::new(),
        }
    }

    fn lock_runtime(&self) -> MutexGuard<'_, JobRuntime> {
        self.runtime
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current lifecycle state
    pub fn state(&self) -> JobState {
        self.lock_runtime().state
    }

    /// Forces the lifecycle state; used by the scheduler for the
    /// pending/disabled transitions before the job starts
    pub(crate) fn set_state(&self, state: JobState) {
        self.lock_runtime().state = state;
    }

    /// Stop reason recorded at the terminal transition, if any
    pub fn stop_reason(&self) -> Option<String> {
        self.lock_runtime().stop_reason.clone()
    }

    /// Snapshot of the aggregated compute-worker statistics
    pub fn aggregated_stats(&self) -> Vec<StatTracker> {
        self.lock_runtime().aggregated_stats.clone()
    }

    /// Snapshot of the per-worker resource-monitor statistics
    pub fn monitor_stats(&self) -> Vec<StatTracker> {
        self.lock_runtime().monitor_stats.clone()
    }

    /// Snapshot of the accumulated log messages
    pub fn log_messages(&self) -> Vec<String> {
        self.lock_runtime().log_messages.clone()
    }

    /// Actual start, stop, and duration observed so far
    pub fn actual_times(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>, Option<u64>) {
        let runtime = self.lock_runtime();
        (
            runtime.actual_start,
            runtime.actual_stop,
            runtime.actual_duration_secs,
        )
    }

    /// Appends a timestamped message to the job log
    pub fn log_message(&self, message: &str) {
        let mut runtime = self.lock_runtime();
        Self::log_to(&mut runtime, message.to_string());
    }

    /// Appends a timestamped message through an already-held runtime guard
    fn log_to(runtime: &mut JobRuntime, message: String) {
        runtime.log_messages.push(format!(
            "[{}] {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            message
        ));
    }

    /// Builds the run request sent to one compute worker
    pub fn job_request(&self, worker_ordinal: u32) -> JobRequest {
        JobRequest {
            job_id: self.job_id.clone(),
            workload_class: self.workload_class.clone(),
            parameters: self.parameters.clone(),
            num_threads: self.threads_per_client,
            thread_startup_delay_ms: self.thread_startup_delay_ms,
            collection_interval_secs: self.collection_interval_secs,
            start_time: self.start_time,
            stop_time: self.stop_time,
            duration_secs: self.duration_secs,
            worker_ordinal,
        }
    }

    /// Builds the run request sent to one resource-monitor worker
    ///
    /// Monitor workers substitute their own resource-monitor workload, so
    /// the request carries a single thread and the job's timing envelope.
    pub fn monitor_request(&self, worker_ordinal: u32) -> JobRequest {
        let mut request = self.job_request(worker_ordinal);
        request.num_threads = 1;
        request.thread_startup_delay_ms = 0;
        request
    }

    /// Runs the start protocol against the worker pool
    ///
    /// The job transitions to `Running` before any worker dispatch so a
    /// worker-reported terminal transition is never overwritten. A failure
    /// reply from any compute worker aborts the whole dispatch: every
    /// assigned worker is stopped and released, and the job takes the
    /// terminal state mapped from the reply code.
    pub fn start_processing(
        &self,
        pool: &dyn WorkerPool,
        workload: &mut dyn Workload,
    ) -> StartOutcome {
        {
            let runtime = self.lock_runtime();
            if !matches!(runtime.state, JobState::NotYetStarted | JobState::Running) {
                warn!(
                    job_id = %self.job_id,
                    state = %runtime.state,
                    "start requested in invalid state"
                );
                return StartOutcome::Failed;
            }
        }

        // Step 1: compute-worker assignment.
        let clients = match pool.get_client_connections(self) {
            Ok(clients) => clients,
            Err(error) => {
                if self.wait_for_clients {
                    info!(job_id = %self.job_id, "workers unavailable, will retry: {}", error);
                    return StartOutcome::RetryLater;
                }
                self.log_message(&format!("unable to obtain worker assignment: {}", error));
                self.mark_terminal(JobState::StoppedDueToError, &error.to_string());
                return StartOutcome::Failed;
            }
        };

        // Step 2: monitor-worker assignment; any missing requested monitor
        // makes the job unable to run.
        let monitors = match pool.get_monitor_client_connections(self, &clients) {
            Ok(monitors) => monitors,
            Err(error) => {
                self.release_connections(pool, clients, Vec::new());
                self.log_message(&format!("unable to obtain monitor assignment: {}", error));
                self.mark_terminal(JobState::StoppedDueToError, &error.to_string());
                return StartOutcome::Failed;
            }
        };

        {
            let mut runtime = self.lock_runtime();
            runtime.state = JobState::Running;
            runtime.tentative_final_state = JobState::CompletedSuccessfully;
            runtime.actual_start = Some(Utc::now());
        }

        // Step 3: server-side workload initialization.
        if let Err(error) = workload.initialize_job(&self.parameters) {
            self.release_connections(pool, clients, monitors);
            self.log_message(&format!("workload initialization failed: {}", error));
            self.mark_terminal(JobState::StoppedDueToError, &error.to_string());
            return StartOutcome::Failed;
        }

        // Steps 4-6 run under the job mutex: a completion report arriving
        // mid-dispatch waits in client_done until the worker sets are fully
        // installed. Worker sends never take this mutex, so holding it over
        // the dispatch loop cannot deadlock.
        let mut runtime = self.lock_runtime();

        // Step 4: dispatch monitor workers. A monitor failure is logged and
        // the monitor dropped; it never fails the job by itself.
        let mut active_monitors: Vec<Arc<dyn WorkerConnection>> = Vec::new();
        for (ordinal, monitor) in monitors.into_iter().enumerate() {
            let reply = monitor.send_job_request(&self.monitor_request(ordinal as u32));
            if !reply.is_success() {
                Self::log_to(
                    &mut runtime,
                    format!(
                        "monitor worker {} rejected the job: {} ({})",
                        monitor.client_id(),
                        reply.code,
                        reply.message
                    ),
                );
                pool.set_available_for_processing(monitor);
                continue;
            }
            let reply = monitor.send_job_control(&self.job_id, JobControlOp::Start);
            if reply.is_success() {
                active_monitors.push(monitor);
            } else {
                Self::log_to(
                    &mut runtime,
                    format!(
                        "monitor worker {} failed to start: {} ({})",
                        monitor.client_id(),
                        reply.code,
                        reply.message
                    ),
                );
                pool.set_available_for_processing(monitor);
            }
        }

        // Step 5: dispatch compute workers.
        let mut active: Vec<Arc<dyn WorkerConnection>> = Vec::new();
        let mut failure_state: Option<JobState> = None;
        for (ordinal, client) in clients.into_iter().enumerate() {
            if failure_state.is_some() {
                pool.set_available_for_processing(client);
                continue;
            }
            let reply = client.send_job_request(&self.job_request(ordinal as u32));
            match reply.code {
                ResponseCode::Success => {
                    let control = client.send_job_control(&self.job_id, JobControlOp::Start);
                    if control.is_success() {
                        active.push(client);
                    } else {
                        Self::log_to(
                            &mut runtime,
                            format!(
                                "worker {} failed to start: {} ({})",
                                client.client_id(),
                                control.code,
                                control.message
                            ),
                        );
                        pool.set_available_for_processing(client);
                    }
                }
                ResponseCode::ClassNotFound => {
                    Self::log_to(
                        &mut runtime,
                        format!(
                            "worker {} does not know workload class {}",
                            client.client_id(),
                            self.workload_class
                        ),
                    );
                    failure_state = Some(JobState::NoSuchJob);
                    pool.set_available_for_processing(client);
                }
                code => {
                    Self::log_to(
                        &mut runtime,
                        format!(
                            "worker {} rejected the job: {} ({})",
                            client.client_id(),
                            code,
                            reply.message
                        ),
                    );
                    failure_state = Some(JobState::StoppedDueToError);
                    pool.set_available_for_processing(client);
                }
            }
        }

        if let Some(state) = failure_state {
            // Abort: stop and release every worker that already accepted.
            for client in &active {
                client.send_job_control(&self.job_id, JobControlOp::Stop);
            }
            for monitor in &active_monitors {
                monitor.send_job_control(&self.job_id, JobControlOp::Stop);
            }
            drop(runtime);
            self.release_connections(pool, active, active_monitors);
            self.mark_terminal(state, "a worker rejected the job request");
            return StartOutcome::Failed;
        }

        // Step 6: a job with no accepted compute workers cannot run.
        if active.is_empty() {
            for monitor in &active_monitors {
                monitor.send_job_control(&self.job_id, JobControlOp::Stop);
            }
            drop(runtime);
            self.release_connections(pool, Vec::new(), active_monitors);
            self.mark_terminal(
                JobState::StoppedDueToError,
                "no workers accepted the job request",
            );
            return StartOutcome::Failed;
        }

        runtime.active_clients = active;
        runtime.active_monitor_clients = active_monitors;
        drop(runtime);
        info!(job_id = %self.job_id, "job started");
        StartOutcome::Started
    }

    /// Returns every connection to the pool
    fn release_connections(
        &self,
        pool: &dyn WorkerPool,
        clients: Vec<Arc<dyn WorkerConnection>>,
        monitors: Vec<Arc<dyn WorkerConnection>>,
    ) {
        for client in clients {
            pool.set_available_for_processing(client);
        }
        for monitor in monitors {
            pool.set_available_for_processing(monitor);
        }
    }

    /// Merges one compute worker's completion report
    ///
    /// Runs under the job's mutex. When the last compute worker reports and
    /// monitors are still active, each monitor is told to stop and the job
    /// stays open until their reports arrive.
    pub fn client_done(&self, report: &CompletionReport) -> CompletionOutcome {
        let mut runtime = self.lock_runtime();

        let released = runtime
            .active_clients
            .iter()
            .position(|client| client.client_id() == report.client_id)
            .map(|index| runtime.active_clients.remove(index));

        // Monotone severity: the tentative state only ever worsens.
        runtime.tentative_final_state =
            runtime.tentative_final_state.more_severe(report.final_state);

        aggregate_into(&mut runtime.aggregated_stats, &report.stat_trackers);
        runtime
            .log_messages
            .extend(report.log_messages.iter().cloned());
        Self::merge_timing(&mut runtime, report);

        if !runtime.active_clients.is_empty() {
            return CompletionOutcome {
                disposition: CompletionDisposition::InProgress,
                released,
            };
        }

        let disposition = if runtime.active_monitor_clients.is_empty() {
            runtime.done = true;
            self.completion_cv.notify_all();
            CompletionDisposition::Finalize
        } else {
            for monitor in &runtime.active_monitor_clients {
                monitor.send_job_control(&self.job_id, JobControlOp::Stop);
            }
            CompletionDisposition::AwaitingMonitors
        };
        CompletionOutcome {
            disposition,
            released,
        }
    }

    /// Merges one resource-monitor worker's completion report
    ///
    /// Monitor statistics are merged per worker rather than across workers,
    /// so constraint checks can still see each monitored machine.
    pub fn resource_client_done(&self, report: &CompletionReport) -> CompletionOutcome {
        let mut runtime = self.lock_runtime();

        let released = runtime
            .active_monitor_clients
            .iter()
            .position(|monitor| monitor.client_id() == report.client_id)
            .map(|index| runtime.active_monitor_clients.remove(index));

        for tracker in &report.stat_trackers {
            match runtime.monitor_stats.iter_mut().find(|existing| {
                existing.same_class(tracker) && existing.client_id() == tracker.client_id()
            }) {
                Some(existing) => {
                    if let Err(error) = existing.aggregate(tracker) {
                        warn!(job_id = %self.job_id, "dropping monitor tracker: {}", error);
                    }
                }
                None => runtime.monitor_stats.push(tracker.clone()),
            }
        }
        runtime
            .log_messages
            .extend(report.log_messages.iter().cloned());

        let disposition =
            if runtime.active_clients.is_empty() && runtime.active_monitor_clients.is_empty() {
                runtime.done = true;
                self.completion_cv.notify_all();
                CompletionDisposition::Finalize
            } else {
                CompletionDisposition::InProgress
            };
        CompletionOutcome {
            disposition,
            released,
        }
    }

    fn merge_timing(runtime: &mut JobRuntime, report: &CompletionReport) {
        runtime.actual_start = Some(match runtime.actual_start {
            Some(existing) => existing.min(report.actual_start),
            None => report.actual_start,
        });
        runtime.actual_stop = Some(match runtime.actual_stop {
            Some(existing) => existing.max(report.actual_stop),
            None => report.actual_stop,
        });
        runtime.actual_duration_secs = Some(
            runtime
                .actual_duration_secs
                .map_or(report.actual_duration_secs, |existing| {
                    existing.max(report.actual_duration_secs)
                }),
        );
    }

    /// Broadcasts a stop request to every active worker; does not block
    ///
    /// Idempotent: once the job is terminal there is nothing to stop.
    pub fn stop_processing(&self, reason: &str) {
        let runtime = self.lock_runtime();
        if runtime.state.is_terminal() {
            return;
        }
        for client in runtime
            .active_clients
            .iter()
            .chain(runtime.active_monitor_clients.iter())
        {
            client.send_job_control(&self.job_id, JobControlOp::Stop);
        }
        drop(runtime);
        self.log_message(&format!("stop requested: {}", reason));
    }

    /// Broadcasts stop-and-wait and blocks until every worker reported
    ///
    /// Idempotent: a second call on a terminal job returns immediately.
    pub fn stop_and_wait(&self, reason: &str) {
        {
            let runtime = self.lock_runtime();
            if runtime.state.is_terminal() || runtime.done {
                return;
            }
            for client in runtime
                .active_clients
                .iter()
                .chain(runtime.active_monitor_clients.iter())
            {
                client.send_job_control(&self.job_id, JobControlOp::StopAndWait);
            }
        }
        self.log_message(&format!("stop-and-wait requested: {}", reason));

        let mut runtime = self.lock_runtime();
        while !runtime.done && !runtime.state.is_terminal() {
            let (guard, _timeout) = self
                .completion_cv
                .wait_timeout(runtime, Duration::from_millis(100))
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            runtime = guard;
        }
    }

    /// Applies a terminal state directly, outside the completion flow
    ///
    /// Used for admission failures, cancellation, and shutdown. Only the
    /// first terminal transition wins; later calls are no-ops.
    pub fn mark_terminal(&self, state: JobState, reason: &str) -> bool {
        let mut runtime = self.lock_runtime();
        if runtime.state.is_terminal() {
            return false;
        }
        let now = Utc::now();
        runtime.state = state;
        runtime.stop_reason = Some(reason.to_string());
        runtime.actual_start.get_or_insert(now);
        runtime.actual_stop.get_or_insert(now);
        runtime.actual_duration_secs.get_or_insert(0);
        runtime.done = true;
        drop(runtime);
        self.completion_cv.notify_all();
        info!(job_id = %self.job_id, state = %state, "job terminal: {}", reason);
        true
    }

    /// Promotes the tentative final state to the actual final state
    ///
    /// Called after the last completion report has been merged and the
    /// workload finalized. Returns the final state.
    pub fn complete(&self) -> JobState {
        let mut runtime = self.lock_runtime();
        if runtime.state.is_terminal() {
            return runtime.state;
        }
        runtime.state = runtime.tentative_final_state;
        let now = Utc::now();
        runtime.actual_start.get_or_insert(now);
        runtime.actual_stop.get_or_insert(now);
        if runtime.actual_duration_secs.is_none() {
            if let (Some(start), Some(stop)) = (runtime.actual_start, runtime.actual_stop) {
                runtime.actual_duration_secs = Some((stop - start).num_seconds().max(0) as u64);
            }
        }
        runtime.done = true;
        let state = runtime.state;
        drop(runtime);
        self.completion_cv.notify_all();
        info!(job_id = %self.job_id, state = %state, "job completed");
        state
    }

    /// Converts the job to its persistence image
    pub fn to_record(&self) -> JobRecord {
        let runtime = self.lock_runtime();
        JobRecord {
            job_id: self.job_id.clone(),
            optimizing_job_id: self.optimizing_job_id.clone(),
            workload_class: self.workload_class.clone(),
            description: self.description.clone(),
            folder_name: self.folder_name.clone(),
            group_name: self.group_name.clone(),
            display_read_only: self.display_read_only,
            job_state: runtime.state,
            start_time: self.start_time,
            stop_time: self.stop_time,
            duration_secs: self.duration_secs,
            wait_for_clients: self.wait_for_clients,
            num_clients: self.num_clients,
            requested_clients: self.requested_clients.clone(),
            monitor_clients: self.monitor_clients.clone(),
            monitor_clients_if_available: self.monitor_clients_if_available,
            threads_per_client: self.threads_per_client,
            thread_startup_delay_ms: self.thread_startup_delay_ms,
            collection_interval_secs: self.collection_interval_secs,
            dependencies: self.dependencies.clone(),
            parameters: self.parameters.clone(),
            notify_addresses: self.notify_addresses.clone(),
            comments: self.comments.clone(),
            stop_reason: runtime.stop_reason.clone(),
            actual_start: runtime.actual_start,
            actual_stop: runtime.actual_stop,
            actual_duration_secs: runtime.actual_duration_secs,
            stat_trackers: runtime.aggregated_stats.clone(),
            monitor_stat_trackers: runtime.monitor_stats.clone(),
            log_messages: runtime.log_messages.clone(),
        }
    }

    /// Rebuilds a job from its persistence image
    ///
    /// Worker handles are run-time only, so the active sets start empty.
    pub fn from_record(record: JobRecord) -> Self {
        let mut job = Job::new(record.job_id, &record.workload_class, record.start_time);
        job.optimizing_job_id = record.optimizing_job_id;
        job.description = record.description;
        job.folder_name = record.folder_name;
        job.group_name = record.group_name;
        job.display_read_only = record.display_read_only;
        job.stop_time = record.stop_time;
        job.duration_secs = record.duration_secs;
        job.wait_for_clients = record.wait_for_clients;
        job.num_clients = record.num_clients;
        job.requested_clients = record.requested_clients;
        job.monitor_clients = record.monitor_clients;
        job.monitor_clients_if_available = record.monitor_clients_if_available;
        job.threads_per_client = record.threads_per_client;
        job.thread_startup_delay_ms = record.thread_startup_delay_ms;
        job.collection_interval_secs = record.collection_interval_secs;
        job.dependencies = record.dependencies;
        job.parameters = record.parameters;
        job.notify_addresses = record.notify_addresses;
        job.comments = record.comments;
        {
            let mut runtime = job.lock_runtime();
            runtime.state = record.job_state;
            runtime.stop_reason = record.stop_reason;
            runtime.actual_start = record.actual_start;
            runtime.actual_stop = record.actual_stop;
            runtime.actual_duration_secs = record.actual_duration_secs;
            runtime.aggregated_stats = record.stat_trackers;
            runtime.monitor_stats = record.monitor_stat_trackers;
            runtime.log_messages = record.log_messages;
            runtime.done = record.job_state.is_terminal();
        }
        job
    }
}

/// Persistence image of a job
///
/// A self-describing record; any round-trippable encoding is admissible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub optimizing_job_id: Option<JobId>,
    pub workload_class: String,
    pub description: Option<String>,
    pub folder_name: Option<String>,
    pub group_name: Option<String>,
    pub display_read_only: bool,
    pub job_state: JobState,
    pub start_time: DateTime<Utc>,
    pub stop_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<u64>,
    pub wait_for_clients: bool,
    pub num_clients: u32,
    pub requested_clients: Vec<String>,
    pub monitor_clients: Vec<String>,
    pub monitor_clients_if_available: bool,
    pub threads_per_client: u32,
    pub thread_startup_delay_ms: u64,
    pub collection_interval_secs: u32,
    pub dependencies: Vec<JobId>,
    pub parameters: ParameterList,
    pub notify_addresses: Vec<String>,
    pub comments: Option<String>,
    pub stop_reason: Option<String>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_stop: Option<DateTime<Utc>>,
    pub actual_duration_secs: Option<u64>,
    pub stat_trackers: Vec<StatTracker>,
    pub monitor_stat_trackers: Vec<StatTracker>,
    pub log_messages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stats::IncrementalTracker;
    use proptest::prelude::*;

    fn report(client_id: &str, state: JobState) -> CompletionReport {
        CompletionReport {
            job_id: JobId::from("20260101000000-abc1231"),
            client_id: client_id.to_string(),
            resource_monitor: false,
            final_state: state,
            actual_start: Utc::now(),
            actual_stop: Utc::now(),
            actual_duration_secs: 1,
            stat_trackers: Vec::new(),
            log_messages: Vec::new(),
        }
    }

    fn running_job() -> Job {
        let job = Job::new(
            JobId::from("20260101000000-abc1231"),
            "NullWorkload",
            Utc::now(),
        );
        job.set_state(JobState::Running);
        job
    }

    #[test]
    fn test_tentative_state_is_monotone() {
        let job = running_job();
        job.client_done(&report("client-1", JobState::StoppedDueToDuration));
        job.client_done(&report("client-2", JobState::StoppedDueToError));
        job.client_done(&report("client-3", JobState::CompletedSuccessfully));
        assert_eq!(job.complete(), JobState::StoppedDueToError);
    }

    #[test]
    fn test_all_successful_workers_complete_successfully() {
        let job = running_job();
        job.client_done(&report("client-1", JobState::CompletedSuccessfully));
        job.client_done(&report("client-2", JobState::CompletedSuccessfully));
        assert_eq!(job.complete(), JobState::CompletedSuccessfully);
    }

    #[test]
    fn test_terminal_transition_happens_once() {
        let job = running_job();
        assert!(job.mark_terminal(JobState::Cancelled, "first"));
        assert!(!job.mark_terminal(JobState::CompletedSuccessfully, "second"));
        assert_eq!(job.state(), JobState::Cancelled);
        assert_eq!(job.stop_reason().as_deref(), Some("first"));
    }

    #[test]
    fn test_timing_merge() {
        let job = running_job();
        let start = Utc::now();
        let mut first = report("client-1", JobState::CompletedSuccessfully);
        first.actual_start = start;
        first.actual_stop = start + chrono::Duration::seconds(30);
        first.actual_duration_secs = 30;
        let mut second = report("client-2", JobState::CompletedSuccessfully);
        second.actual_start = start - chrono::Duration::seconds(5);
        second.actual_stop = start + chrono::Duration::seconds(20);
        second.actual_duration_secs = 25;

        job.client_done(&first);
        job.client_done(&second);
        job.complete();

        let (actual_start, actual_stop, duration) = job.actual_times();
        assert_eq!(actual_start.unwrap(), start - chrono::Duration::seconds(5));
        assert_eq!(actual_stop.unwrap(), start + chrono::Duration::seconds(30));
        assert_eq!(duration, Some(30));
        assert!(actual_start.unwrap() <= actual_stop.unwrap());
    }

    #[test]
    fn test_stats_are_aggregated_across_workers() {
        let job = running_job();
        let mut first = report("client-1", JobState::CompletedSuccessfully);
        let mut tracker = IncrementalTracker::new("client-1", "0", "Operations", 5);
        tracker.push_interval(10);
        first.stat_trackers.push(StatTracker::Incremental(tracker));
        let mut second = report("client-2", JobState::CompletedSuccessfully);
        let mut tracker = IncrementalTracker::new("client-2", "0", "Operations", 5);
        tracker.push_interval(20);
        second.stat_trackers.push(StatTracker::Incremental(tracker));

        job.client_done(&first);
        job.client_done(&second);

        let stats = job.aggregated_stats();
        assert_eq!(stats.len(), 1);
        assert!((stats[0].summary_value() - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stop_is_idempotent_on_terminal_job() {
        let job = running_job();
        job.mark_terminal(JobState::StoppedByUser, "stopped");
        job.stop_processing("again");
        job.stop_and_wait("again");
        assert_eq!(job.state(), JobState::StoppedByUser);
    }

    #[test]
    fn test_record_round_trip() {
        let mut job = Job::new(
            JobId::from("20260101000000-abc1231"),
            "LogReplayWorkload",
            Utc::now(),
        );
        job.num_clients = 4;
        job.threads_per_client = 8;
        job.dependencies.push(JobId::from("20251231000000-xyz9871"));
        job.notify_addresses.push("ops@example.com".to_string());
        job.set_state(JobState::Running);
        job.log_message("started");

        let record = job.to_record();
        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: JobRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(record, decoded);

        let restored = Job::from_record(decoded);
        assert_eq!(restored.to_record(), record);
    }

    /// Pool stub handing out a fixed set of connections
    struct FixedPool {
        connections: Mutex<Vec<Arc<dyn WorkerConnection>>>,
        released: Mutex<Vec<String>>,
    }

    impl FixedPool {
        fn with(connections: Vec<Arc<dyn WorkerConnection>>) -> Self {
            Self {
                connections: Mutex::new(connections),
                released: Mutex::new(Vec::new()),
            }
        }

        fn released_ids(&self) -> Vec<String> {
            self.released.lock().unwrap().clone()
        }
    }

    impl WorkerPool for FixedPool {
        fn get_client_connections(
            &self,
            job: &Job,
        ) -> crate::domain::error::CoreResult<Vec<Arc<dyn WorkerConnection>>> {
            let mut connections = self.connections.lock().unwrap();
            if connections.len() < job.num_clients as usize {
                return Err(crate::domain::error::CoreError::UnableToRun(
                    "not enough workers".to_string(),
                ));
            }
            Ok(connections.drain(..job.num_clients as usize).collect())
        }

        fn get_monitor_client_connections(
            &self,
            _job: &Job,
            _selected: &[Arc<dyn WorkerConnection>],
        ) -> crate::domain::error::CoreResult<Vec<Arc<dyn WorkerConnection>>> {
            Ok(Vec::new())
        }

        fn set_available_for_processing(&self, connection: Arc<dyn WorkerConnection>) {
            self.released.lock().unwrap().push(connection.client_id());
        }
    }

    use crate::domain::value_objects::{JobControlOp, ResponseCode, WorkerReply};
    use crate::domain::workers::MockWorkerConnection;
    use crate::workloads::NullWorkload;

    fn accepting_worker(id: &str) -> MockWorkerConnection {
        let mut mock = MockWorkerConnection::new();
        mock.expect_client_id().return_const(id.to_string());
        mock.expect_send_job_request()
            .returning(|_| WorkerReply::success());
        mock.expect_send_job_control()
            .returning(|_, _| WorkerReply::success());
        mock
    }

    #[test]
    fn test_start_protocol_reaches_running() {
        let pool = FixedPool::with(vec![Arc::new(accepting_worker("mock-1:worker"))]);
        let job = Job::new(
            JobId::from("20260101000000-abc1231"),
            "NullWorkload",
            Utc::now(),
        );
        job.set_state(JobState::NotYetStarted);
        let mut workload = NullWorkload::new();

        assert_eq!(
            job.start_processing(&pool, &mut workload),
            StartOutcome::Started
        );
        assert_eq!(job.state(), JobState::Running);
        assert!(pool.released_ids().is_empty());
    }

    #[test]
    fn test_start_control_failure_releases_the_worker() {
        let mut mock = MockWorkerConnection::new();
        mock.expect_client_id()
            .return_const("mock-1:worker".to_string());
        mock.expect_send_job_request()
            .returning(|_| WorkerReply::success());
        mock.expect_send_job_control()
            .returning(|_, op| match op {
                JobControlOp::Start => {
                    WorkerReply::failure(ResponseCode::LocalError, "start refused")
                }
                _ => WorkerReply::success(),
            });
        let pool = FixedPool::with(vec![Arc::new(mock)]);
        let job = Job::new(
            JobId::from("20260101000000-abc1231"),
            "NullWorkload",
            Utc::now(),
        );
        job.set_state(JobState::NotYetStarted);
        let mut workload = NullWorkload::new();

        // The only worker accepted the request but refused the start, so no
        // compute worker remains and the job cannot run.
        assert_eq!(
            job.start_processing(&pool, &mut workload),
            StartOutcome::Failed
        );
        assert_eq!(job.state(), JobState::StoppedDueToError);
        assert_eq!(pool.released_ids(), vec!["mock-1:worker".to_string()]);
    }

    #[test]
    fn test_class_not_found_aborts_the_whole_dispatch() {
        let mut rejecting = MockWorkerConnection::new();
        rejecting
            .expect_client_id()
            .return_const("mock-2:worker".to_string());
        rejecting.expect_send_job_request().returning(|_| {
            WorkerReply::failure(ResponseCode::ClassNotFound, "unknown class")
        });
        rejecting
            .expect_send_job_control()
            .returning(|_, _| WorkerReply::success());

        let pool = FixedPool::with(vec![
            Arc::new(accepting_worker("mock-1:worker")),
            Arc::new(rejecting),
            Arc::new(accepting_worker("mock-3:worker")),
        ]);
        let mut job = Job::new(
            JobId::from("20260101000000-abc1231"),
            "NullWorkload",
            Utc::now(),
        );
        job.num_clients = 3;
        job.set_state(JobState::NotYetStarted);
        let mut workload = NullWorkload::new();

        assert_eq!(
            job.start_processing(&pool, &mut workload),
            StartOutcome::Failed
        );
        assert_eq!(job.state(), JobState::NoSuchJob);
        // Every assigned worker went back to the pool.
        assert_eq!(pool.released_ids().len(), 3);
    }

    #[test]
    fn test_wait_for_clients_retries_instead_of_failing() {
        let pool = FixedPool::with(Vec::new());
        let mut job = Job::new(
            JobId::from("20260101000000-abc1231"),
            "NullWorkload",
            Utc::now(),
        );
        job.wait_for_clients = true;
        job.set_state(JobState::NotYetStarted);
        let mut workload = NullWorkload::new();

        assert_eq!(
            job.start_processing(&pool, &mut workload),
            StartOutcome::RetryLater
        );
        assert_eq!(job.state(), JobState::NotYetStarted);
    }

    proptest! {
        #[test]
        fn prop_final_state_is_order_independent(
            order in Just(vec![0usize, 1, 2, 3]).prop_shuffle()
        ) {
            let states = [
                JobState::CompletedSuccessfully,
                JobState::CompletedWithErrors,
                JobState::StoppedDueToDuration,
                JobState::StoppedDueToError,
            ];
            let job = running_job();
            for index in order.iter() {
                job.client_done(&report(&format!("client-{}", index), states[*index]));
            }
            prop_assert_eq!(job.complete(), JobState::StoppedDueToError);
        }
    }
}
