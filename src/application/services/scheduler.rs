//! Scheduler service module
//!
//! Tracks pending and running jobs plus in-flight optimizing jobs, runs the
//! admission loop on one dedicated thread, and routes worker completion
//! reports into the owning job and, for iterations, into the optimizing-job
//! controller. Cache locks are never held across calls into a job, and jobs
//! never call back into the scheduler while holding their own mutex.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::application::algorithms::{AlgorithmRegistry, OptimizationAlgorithm};
use crate::application::services::client_coordinator::ClientCoordinator;
use crate::application::services::dependency_check::DependencyGraph;
use crate::application::services::notifier::{job_notification, Notifier};
use crate::application::services::optimize_controller;
use crate::domain::entities::{Job, OptimizingJob, StartOutcome};
use crate::domain::error::{CoreError, CoreResult};
use crate::domain::repositories::JobStore;
use crate::domain::value_objects::{CompletionReport, JobId, JobState};
use crate::domain::workers::WorkerPool;
use crate::workloads::{Workload, WorkloadRegistry};

/// A running job together with its server-side workload instance
///
/// The workload is created at admission for `initialize_job` and consumed
/// at completion for `finalize_job`.
pub struct RunningJob {
    pub job: Arc<Job>,
    workload: Mutex<Option<Box<dyn Workload>>>,
}

/// A cached optimizing job together with its live algorithm instance
pub struct CachedOptimizingJob {
    pub entity: Arc<OptimizingJob>,
    pub algorithm: Mutex<Box<dyn OptimizationAlgorithm>>,
}

impl CachedOptimizingJob {
    /// Locks the algorithm instance
    pub fn lock_algorithm(&self) -> MutexGuard<'_, Box<dyn OptimizationAlgorithm>> {
        self.algorithm
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The scheduling core of the server
pub struct Scheduler {
    coordinator: Arc<ClientCoordinator>,
    store: Arc<dyn JobStore>,
    workloads: Arc<WorkloadRegistry>,
    algorithms: Arc<AlgorithmRegistry>,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    pending: Mutex<BTreeMap<JobId, Arc<Job>>>,
    running: Mutex<HashMap<String, Arc<RunningJob>>>,
    optimizing: Mutex<HashMap<String, Arc<CachedOptimizingJob>>>,
    shutdown_requested: AtomicBool,
    admission_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Creates a scheduler over the given collaborators
    pub fn new(
        coordinator: Arc<ClientCoordinator>,
        store: Arc<dyn JobStore>,
        workloads: Arc<WorkloadRegistry>,
        algorithms: Arc<AlgorithmRegistry>,
        notifier: Arc<dyn Notifier>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            store,
            workloads,
            algorithms,
            notifier,
            poll_interval,
            pending: Mutex::new(BTreeMap::new()),
            running: Mutex::new(HashMap::new()),
            optimizing: Mutex::new(HashMap::new()),
            shutdown_requested: AtomicBool::new(false),
            admission_thread: Mutex::new(None),
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, BTreeMap<JobId, Arc<Job>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_running(&self) -> MutexGuard<'_, HashMap<String, Arc<RunningJob>>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_optimizing(&self) -> MutexGuard<'_, HashMap<String, Arc<CachedOptimizingJob>>> {
        self.optimizing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The coordinator owning the worker pool
    pub fn coordinator(&self) -> &Arc<ClientCoordinator> {
        &self.coordinator
    }

    /// The notifier used for terminal transitions
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// The workload registry
    pub fn workloads(&self) -> &Arc<WorkloadRegistry> {
        &self.workloads
    }

    /// Persists a job record, logging instead of failing
    ///
    /// The in-memory state stays authoritative until the next successful
    /// persist.
    pub fn persist_job(&self, job: &Job) {
        if let Err(persist_error) = self.store.save_job(&job.to_record()) {
            warn!(job_id = %job.job_id, "job persist failed: {}", persist_error);
        }
    }

    /// Persists an optimizing-job record, logging instead of failing
    pub fn persist_optimizing_job(&self, optimizing_job: &OptimizingJob) {
        if let Err(persist_error) = self
            .store
            .save_optimizing_job(&optimizing_job.to_record())
        {
            warn!(
                optimizing_job_id = %optimizing_job.optimizing_job_id,
                "optimizing job persist failed: {}",
                persist_error
            );
        }
    }

    /// Accepts a job into the pending set
    ///
    /// Validates the workload class, applies workload overrides, runs the
    /// workload's own validation, and rejects dependency cycles among the
    /// pending jobs.
    pub fn submit_job(&self, mut job: Job) -> CoreResult<Arc<Job>> {
        let workload = self.workloads.create(&job.workload_class).ok_or_else(|| {
            CoreError::InvalidValue(format!("unknown workload class '{}'", job.workload_class))
        })?;

        // Workload overrides win over the submitted shape.
        if let Some(num_clients) = workload.override_num_clients() {
            job.num_clients = num_clients;
        }
        if let Some(threads) = workload.override_threads_per_client() {
            job.threads_per_client = threads;
        }
        if let Some(interval) = workload.override_collection_interval() {
            job.collection_interval_secs = interval;
        }

        workload.validate_job_info(&job)?;

        {
            let pending = self.lock_pending();
            DependencyGraph::validate_submission(
                pending
                    .values()
                    .map(|pending_job| (pending_job.job_id.clone(), pending_job.dependencies.clone())),
                &job.job_id,
                &job.dependencies,
            )?;
        }

        if job.state() == JobState::Uninitialized {
            job.set_state(JobState::NotYetStarted);
        }
        let job = Arc::new(job);
        self.persist_job(&job);
        self.lock_pending().insert(job.job_id.clone(), job.clone());
        info!(job_id = %job.job_id, "job submitted");
        Ok(job)
    }

    /// Accepts an optimizing job, caches it, and schedules its first
    /// iteration
    pub fn submit_optimizing_job(
        &self,
        optimizing_job: OptimizingJob,
    ) -> CoreResult<Arc<CachedOptimizingJob>> {
        let workload = self
            .workloads
            .create(&optimizing_job.workload_class)
            .ok_or_else(|| {
                CoreError::InvalidValue(format!(
                    "unknown workload class '{}'",
                    optimizing_job.workload_class
                ))
            })?;
        if optimizing_job.min_threads < 1 {
            return Err(CoreError::InvalidValue(
                "the minimum thread count must be at least 1".to_string(),
            ));
        }
        let mut algorithm = self
            .algorithms
            .create(&optimizing_job.algorithm_name)
            .ok_or_else(|| {
                CoreError::InvalidValue(format!(
                    "unknown optimization algorithm '{}'",
                    optimizing_job.algorithm_name
                ))
            })?;
        if !algorithm.available_with_workload(workload.as_ref()) {
            return Err(CoreError::InvalidValue(format!(
                "algorithm '{}' is not available with workload '{}'",
                optimizing_job.algorithm_name, optimizing_job.workload_class
            )));
        }
        algorithm.initialize(&optimizing_job, &optimizing_job.algorithm_parameters)?;

        optimizing_job.mark_started();
        let cached = Arc::new(CachedOptimizingJob {
            entity: Arc::new(optimizing_job),
            algorithm: Mutex::new(algorithm),
        });
        self.persist_optimizing_job(&cached.entity);
        self.lock_optimizing().insert(
            cached.entity.optimizing_job_id.as_str().to_string(),
            cached.clone(),
        );
        optimize_controller::schedule_first_iteration(self, &cached)?;
        info!(
            optimizing_job_id = %cached.entity.optimizing_job_id,
            "optimizing job submitted"
        );
        Ok(cached)
    }

    /// Starts the admission loop on its dedicated thread
    pub fn start(self: Arc<Self>) {
        let scheduler = self.clone();
        let handle = std::thread::Builder::new()
            .name("scheduler-admission".to_string())
            .spawn(move || {
                debug!("admission loop started");
                while !scheduler.shutdown_requested.load(Ordering::SeqCst) {
                    scheduler.admission_pass();
                    std::thread::sleep(scheduler.poll_interval);
                }
                debug!("admission loop stopped");
            })
            .expect("failed to spawn the admission thread");
        *self
            .admission_thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
    }

    /// One pass of the admission loop
    ///
    /// Admits every pending job whose start time arrived and whose
    /// dependencies all terminated. Public so tests and the CLI can drive
    /// admission deterministically.
    pub fn admission_pass(&self) {
        let now = Utc::now();
        let due: Vec<Arc<Job>> = {
            let pending = self.lock_pending();
            pending
                .values()
                .filter(|job| job.state() == JobState::NotYetStarted && job.start_time <= now)
                .cloned()
                .collect()
        };

        for job in due {
            if !self.dependencies_terminated(&job) {
                continue;
            }
            match self.try_start_job(&job) {
                StartOutcome::Started => {
                    self.lock_pending().remove(&job.job_id);
                }
                StartOutcome::RetryLater => {}
                StartOutcome::Failed => {
                    self.lock_pending().remove(&job.job_id);
                    self.job_done(&job);
                }
            }
        }
    }

    /// True when every dependency of the job has terminated
    ///
    /// Dependencies are completion-based, not success-based: a dependency
    /// that failed still unblocks its dependents. Unknown dependency ids are
    /// treated as terminated with a warning.
    fn dependencies_terminated(&self, job: &Job) -> bool {
        for dependency in &job.dependencies {
            if self.lock_pending().contains_key(dependency) {
                return false;
            }
            if self.lock_running().contains_key(dependency.as_str()) {
                return false;
            }
            match self.store.load_job(dependency) {
                Ok(Some(record)) => {
                    if !record.job_state.is_terminal() {
                        return false;
                    }
                }
                Ok(None) => {
                    warn!(
                        job_id = %job.job_id,
                        dependency = %dependency,
                        "dependency not found, treating as terminated"
                    );
                }
                Err(load_error) => {
                    warn!(dependency = %dependency, "dependency lookup failed: {}", load_error);
                }
            }
        }
        true
    }

    /// Attempts to start one admissible job
    fn try_start_job(&self, job: &Arc<Job>) -> StartOutcome {
        let Some(mut workload) = self.workloads.create(&job.workload_class) else {
            job.mark_terminal(
                JobState::StoppedDueToError,
                &format!("workload class '{}' is no longer registered", job.workload_class),
            );
            return StartOutcome::Failed;
        };

        // The job becomes routable before dispatch: a worker that finishes
        // instantly must find its job in the running cache.
        let running_job = Arc::new(RunningJob {
            job: job.clone(),
            workload: Mutex::new(None),
        });
        self.lock_running()
            .insert(job.job_id.as_str().to_string(), running_job.clone());

        let outcome = job.start_processing(self.coordinator.as_ref(), workload.as_mut());
        match outcome {
            StartOutcome::Started => {
                *running_job
                    .workload
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(workload);
            }
            StartOutcome::RetryLater | StartOutcome::Failed => {
                self.lock_running().remove(job.job_id.as_str());
            }
        }
        if outcome != StartOutcome::RetryLater {
            self.persist_job(job);
        }
        outcome
    }

    /// Routes one worker completion report into the owning job
    ///
    /// Reports for jobs the scheduler no longer caches are dropped: the job
    /// already took a terminal state and its results are final.
    pub fn route_completion(&self, report: CompletionReport) {
        let running_job = {
            let running = self.lock_running();
            running.get(report.job_id.as_str()).cloned()
        };
        let Some(running_job) = running_job else {
            warn!(job_id = %report.job_id, client_id = %report.client_id, "dropping completion report for unknown job");
            return;
        };

        let outcome = if report.resource_monitor {
            running_job.job.resource_client_done(&report)
        } else {
            running_job.job.client_done(&report)
        };
        if let Some(connection) = outcome.released {
            self.coordinator.set_available_for_processing(connection);
        }
        self.persist_job(&running_job.job);

        if outcome.disposition == crate::domain::entities::CompletionDisposition::Finalize {
            let workload = running_job
                .workload
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            if let Some(mut workload) = workload {
                workload.finalize_job();
            }
            running_job.job.complete();
            self.job_done(&running_job.job);
        }
    }

    /// Handles a job's terminal transition
    ///
    /// Persists the final state, evicts the job from the running cache,
    /// notifies the configured addresses, and routes iterations to the
    /// owning optimizing job.
    pub fn job_done(&self, job: &Arc<Job>) {
        self.persist_job(job);
        self.lock_running().remove(job.job_id.as_str());

        if !job.notify_addresses.is_empty() {
            let (subject, body) = job_notification(job);
            self.notifier.notify(&job.notify_addresses, &subject, &body);
        }

        if let Some(optimizing_job_id) = job.optimizing_job_id.clone() {
            match self.get_or_load_optimizing_job(&optimizing_job_id) {
                Ok(cached) => {
                    optimize_controller::job_iteration_complete(self, &cached, Some(job));
                }
                Err(lookup_error) => {
                    error!(
                        job_id = %job.job_id,
                        optimizing_job_id = %optimizing_job_id,
                        "iteration completed but its optimizing job is unavailable: {}",
                        lookup_error
                    );
                }
            }
        }
    }

    /// Fetches an optimizing job from the cache, loading it if necessary
    ///
    /// A load without a captured algorithm snapshot replays the persisted
    /// children in id order to restore the running best.
    pub fn get_or_load_optimizing_job(
        &self,
        optimizing_job_id: &JobId,
    ) -> CoreResult<Arc<CachedOptimizingJob>> {
        if let Some(cached) = self.lock_optimizing().get(optimizing_job_id.as_str()) {
            return Ok(cached.clone());
        }

        let record = self
            .store
            .load_optimizing_job(optimizing_job_id)?
            .ok_or_else(|| CoreError::NoSuchJob(optimizing_job_id.as_str().to_string()))?;
        let entity = Arc::new(OptimizingJob::from_record(record));

        let mut algorithm = self
            .algorithms
            .create(&entity.algorithm_name)
            .ok_or_else(|| {
                CoreError::Algorithm(format!(
                    "unknown optimization algorithm '{}'",
                    entity.algorithm_name
                ))
            })?;
        algorithm.initialize(&entity, &entity.algorithm_parameters)?;

        match entity.best_value_snapshot() {
            Some(best_value) => algorithm.restore_best_value(best_value),
            None => self.replay_children(&entity, algorithm.as_mut()),
        }

        let cached = Arc::new(CachedOptimizingJob {
            entity,
            algorithm: Mutex::new(algorithm),
        });
        self.lock_optimizing().insert(
            cached.entity.optimizing_job_id.as_str().to_string(),
            cached.clone(),
        );
        info!(optimizing_job_id = %optimizing_job_id, "optimizing job loaded");
        Ok(cached)
    }

    /// Replays completed iterations to restore the algorithm's best value
    fn replay_children(&self, entity: &OptimizingJob, algorithm: &mut dyn OptimizationAlgorithm) {
        let rerun_id = entity.rerun_id();
        let mut child_ids = entity.child_ids();
        child_ids.sort();
        for child_id in child_ids {
            if Some(&child_id) == rerun_id.as_ref() {
                continue;
            }
            match self.store.load_job(&child_id) {
                Ok(Some(record)) if record.job_state.is_acceptable_iteration_stop() => {
                    let child = Job::from_record(record);
                    if let Err(replay_error) = algorithm.is_best_iteration_so_far(&child) {
                        warn!(child_id = %child_id, "skipping iteration during replay: {}", replay_error);
                    }
                }
                Ok(_) => {}
                Err(load_error) => {
                    warn!(child_id = %child_id, "unable to load iteration for replay: {}", load_error);
                }
            }
        }
    }

    /// Drops an optimizing job from the cache; the next access reloads it
    pub fn decache_optimizing_job(&self, optimizing_job_id: &JobId) {
        self.lock_optimizing().remove(optimizing_job_id.as_str());
        debug!(optimizing_job_id = %optimizing_job_id, "optimizing job decached");
    }

    /// Requests cancellation of an optimizing job
    ///
    /// Sets the cancel flag and stops the in-flight iteration, if any.
    /// Returns true when a pending or running child was found.
    pub fn cancel_optimizing_job(&self, optimizing_job_id: &JobId) -> CoreResult<bool> {
        let cached = self.get_or_load_optimizing_job(optimizing_job_id)?;
        cached.entity.request_cancel();

        let pending_child: Option<Arc<Job>> = {
            let pending = self.lock_pending();
            pending
                .values()
                .find(|job| job.optimizing_job_id.as_ref() == Some(optimizing_job_id))
                .cloned()
        };
        if let Some(child) = pending_child {
            self.lock_pending().remove(&child.job_id);
            child.mark_terminal(JobState::Cancelled, "optimizing job cancelled");
            self.job_done(&child);
            return Ok(true);
        }

        let running_child: Option<Arc<RunningJob>> = {
            let running = self.lock_running();
            running
                .values()
                .find(|running_job| {
                    running_job.job.optimizing_job_id.as_ref() == Some(optimizing_job_id)
                })
                .cloned()
        };
        if let Some(running_job) = running_child {
            running_job.job.stop_processing("optimizing job cancelled");
            return Ok(true);
        }
        Ok(false)
    }

    /// Stops one job by id, wherever it currently is
    pub fn stop_job(&self, job_id: &JobId, reason: &str) -> CoreResult<()> {
        let pending_job = self.lock_pending().get(job_id).cloned();
        if let Some(job) = pending_job {
            self.lock_pending().remove(job_id);
            job.mark_terminal(JobState::Cancelled, reason);
            self.job_done(&job);
            return Ok(());
        }
        let running_job = self.lock_running().get(job_id.as_str()).cloned();
        if let Some(running_job) = running_job {
            running_job.job.stop_processing(reason);
            return Ok(());
        }
        Err(CoreError::NoSuchJob(job_id.as_str().to_string()))
    }

    /// Toggles a pending job between disabled and admissible
    pub fn set_job_disabled(&self, job_id: &JobId, disabled: bool) -> CoreResult<()> {
        let pending_job = self
            .lock_pending()
            .get(job_id)
            .cloned()
            .ok_or_else(|| CoreError::NoSuchJob(job_id.as_str().to_string()))?;
        let current = pending_job.state();
        match (current, disabled) {
            (JobState::NotYetStarted, true) => pending_job.set_state(JobState::Disabled),
            (JobState::Disabled, false) => pending_job.set_state(JobState::NotYetStarted),
            _ => {
                return Err(CoreError::InvalidValue(format!(
                    "job {} cannot change disabled state while {}",
                    job_id, current
                )))
            }
        }
        self.persist_job(&pending_job);
        Ok(())
    }

    /// True when no pending or running job remains
    pub fn is_idle(&self) -> bool {
        self.lock_pending().is_empty() && self.lock_running().is_empty()
    }

    /// Snapshot of the pending jobs in id order
    pub fn pending_jobs(&self) -> Vec<Arc<Job>> {
        self.lock_pending().values().cloned().collect()
    }

    /// Snapshot of the running jobs
    pub fn running_jobs(&self) -> Vec<Arc<Job>> {
        self.lock_running()
            .values()
            .map(|running_job| running_job.job.clone())
            .collect()
    }

    /// Removes one job from the pending set
    pub(crate) fn take_pending(&self, job_id: &JobId) -> Option<Arc<Job>> {
        self.lock_pending().remove(job_id)
    }

    /// Stops the admission loop and broadcasts shutdown to running jobs
    pub fn shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        let handle = self
            .admission_thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }

        let running_jobs: Vec<Arc<RunningJob>> =
            self.lock_running().values().cloned().collect();
        for running_job in running_jobs {
            running_job.job.stop_processing("server shutdown");
            running_job
                .job
                .mark_terminal(JobState::StoppedByShutdown, "server shutdown");
            self.persist_job(&running_job.job);
        }
        self.lock_running().clear();
        info!("scheduler shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::notifier::RecordingNotifier;
    use crate::domain::value_objects::{JobControlOp, JobRequest, WorkerReply};
    use crate::domain::workers::WorkerConnection;
    use crate::infrastructure::repositories::InMemoryJobStore;

    struct StubConnection {
        id: String,
    }

    impl WorkerConnection for StubConnection {
        fn client_id(&self) -> String {
            self.id.clone()
        }

        fn send_job_request(&self, _request: &JobRequest) -> WorkerReply {
            WorkerReply::success()
        }

        fn send_job_control(&self, _job_id: &JobId, _op: JobControlOp) -> WorkerReply {
            WorkerReply::success()
        }
    }

    fn scheduler_with_workers(worker_ids: &[&str]) -> (Arc<Scheduler>, Arc<RecordingNotifier>) {
        let coordinator = Arc::new(ClientCoordinator::new());
        for id in worker_ids {
            coordinator.register_client(Arc::new(StubConnection { id: id.to_string() }));
        }
        let notifier = Arc::new(RecordingNotifier::new());
        let scheduler = Arc::new(Scheduler::new(
            coordinator,
            Arc::new(InMemoryJobStore::new()),
            Arc::new(WorkloadRegistry::with_builtins()),
            Arc::new(AlgorithmRegistry::with_builtins()),
            notifier.clone(),
            Duration::from_millis(10),
        ));
        (scheduler, notifier)
    }

    fn completed_report(job: &Job, client_id: &str) -> CompletionReport {
        CompletionReport {
            job_id: job.job_id.clone(),
            client_id: client_id.to_string(),
            resource_monitor: false,
            final_state: JobState::CompletedSuccessfully,
            actual_start: Utc::now(),
            actual_stop: Utc::now(),
            actual_duration_secs: 1,
            stat_trackers: Vec::new(),
            log_messages: Vec::new(),
        }
    }

    fn null_job(id: &str) -> Job {
        Job::new(JobId::from(id), "NullWorkload", Utc::now())
    }

    #[test]
    fn test_admission_starts_due_job() {
        let (scheduler, _) = scheduler_with_workers(&["w:1"]);
        let job = scheduler.submit_job(null_job("20260101000000-abc1231")).unwrap();
        scheduler.admission_pass();
        assert_eq!(job.state(), JobState::Running);

        scheduler.route_completion(completed_report(&job, "w:1"));
        assert_eq!(job.state(), JobState::CompletedSuccessfully);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_unknown_workload_class_is_rejected() {
        let (scheduler, _) = scheduler_with_workers(&["w:1"]);
        let job = Job::new(
            JobId::from("20260101000000-abc1231"),
            "NoSuchWorkload",
            Utc::now(),
        );
        assert!(scheduler.submit_job(job).is_err());
    }

    #[test]
    fn test_wait_for_clients_keeps_job_pending() {
        let (scheduler, _) = scheduler_with_workers(&[]);
        let mut job = null_job("20260101000000-abc1231");
        job.wait_for_clients = true;
        let job = scheduler.submit_job(job).unwrap();
        scheduler.admission_pass();
        // No workers: the job stays pending instead of failing.
        assert_eq!(job.state(), JobState::NotYetStarted);
        assert!(!scheduler.is_idle());
    }

    #[test]
    fn test_insufficient_workers_fails_without_wait() {
        let (scheduler, _) = scheduler_with_workers(&[]);
        let job = scheduler.submit_job(null_job("20260101000000-abc1231")).unwrap();
        scheduler.admission_pass();
        assert_eq!(job.state(), JobState::StoppedDueToError);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_dependency_gates_admission() {
        let (scheduler, _) = scheduler_with_workers(&["w:1"]);
        let first = scheduler.submit_job(null_job("20260101000000-abc1231")).unwrap();
        let mut second = null_job("20260101000000-abc1232");
        second.dependencies.push(first.job_id.clone());
        let second = scheduler.submit_job(second).unwrap();

        scheduler.admission_pass();
        assert_eq!(first.state(), JobState::Running);
        // The dependency has not terminated, so the second job waits.
        assert_eq!(second.state(), JobState::NotYetStarted);

        scheduler.route_completion(completed_report(&first, "w:1"));
        scheduler.admission_pass();
        assert_eq!(second.state(), JobState::Running);
    }

    #[test]
    fn test_failed_dependency_still_unblocks() {
        let (scheduler, _) = scheduler_with_workers(&["w:1"]);
        let first = scheduler.submit_job(null_job("20260101000000-abc1231")).unwrap();
        let mut second = null_job("20260101000000-abc1232");
        second.dependencies.push(first.job_id.clone());
        let second = scheduler.submit_job(second).unwrap();

        scheduler.stop_job(&first.job_id, "operator").unwrap();
        assert_eq!(first.state(), JobState::Cancelled);

        scheduler.admission_pass();
        // Dependencies are completion-based, not success-based.
        assert_eq!(second.state(), JobState::Running);
    }

    #[test]
    fn test_disabled_job_is_not_admitted() {
        let (scheduler, _) = scheduler_with_workers(&["w:1"]);
        let job = scheduler.submit_job(null_job("20260101000000-abc1231")).unwrap();
        scheduler.set_job_disabled(&job.job_id, true).unwrap();
        scheduler.admission_pass();
        assert_eq!(job.state(), JobState::Disabled);

        scheduler.set_job_disabled(&job.job_id, false).unwrap();
        scheduler.admission_pass();
        assert_eq!(job.state(), JobState::Running);
    }

    #[test]
    fn test_job_done_notifies_configured_addresses() {
        let (scheduler, notifier) = scheduler_with_workers(&["w:1"]);
        let mut job = null_job("20260101000000-abc1231");
        job.notify_addresses.push("ops@example.com".to_string());
        let job = scheduler.submit_job(job).unwrap();
        scheduler.admission_pass();
        scheduler.route_completion(completed_report(&job, "w:1"));
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].subject.contains("Completed Successfully"));
    }

    #[test]
    fn test_completion_for_unknown_job_is_dropped() {
        let (scheduler, _) = scheduler_with_workers(&["w:1"]);
        let job = null_job("20260101000000-abc1231");
        // Never submitted: the report is dropped without effect.
        scheduler.route_completion(completed_report(&job, "w:1"));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_shutdown_stops_running_jobs() {
        let (scheduler, _) = scheduler_with_workers(&["w:1"]);
        let job = scheduler.submit_job(null_job("20260101000000-abc1231")).unwrap();
        scheduler.admission_pass();
        assert_eq!(job.state(), JobState::Running);
        scheduler.shutdown();
        assert_eq!(job.state(), JobState::StoppedByShutdown);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_dependency_cycle_is_rejected_at_submission() {
        let (scheduler, _) = scheduler_with_workers(&["w:1"]);
        let mut first = null_job("20260101000000-abc1231");
        first.dependencies.push(JobId::from("20260101000000-abc1232"));
        scheduler.submit_job(first).unwrap();

        let mut second = null_job("20260101000000-abc1232");
        second.dependencies.push(JobId::from("20260101000000-abc1231"));
        assert!(scheduler.submit_job(second).is_err());
    }
}
