//! Workload capability module
//!
//! A workload is the user-defined unit of work a job executes per thread on
//! each worker. The contract is a capability rather than a hierarchy: the
//! scheduling core stays agnostic to what work is done and what statistics
//! are emitted. Implementations are discovered through a registry keyed by
//! class name; the class name is what jobs persist, so definitions can be
//! replaced without touching stored jobs.
//!
//! A workload instance lives in one of two modes. In stub mode the server
//! uses it for metadata only: parameter schemas, statistic schemas, and
//! validation. In runner mode a worker drives one instance per thread
//! through `initialize_client` / `initialize_thread` / `run_job` /
//! `finalize_thread` against a shared `ThreadControl`.

pub mod log_replay;
pub mod null;
pub mod resource_monitor;

pub use log_replay::LogReplayWorkload;
pub use null::NullWorkload;
pub use resource_monitor::ResourceMonitorWorkload;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use crate::domain::entities::Job;
use crate::domain::error::{CoreError, CoreResult};
use crate::domain::stats::StatTracker;
use crate::domain::value_objects::{JobId, JobState, ParameterList};

/// Shared stop coordination for all runner threads of one job on one worker
///
/// Three independent triggers can stop a run: an external stop request, the
/// scheduled stop time, and the maximum duration. Runners must poll
/// `should_stop` often enough to honour a trigger within about a second.
/// The `destroy` hook is the forceful fallback for a wedged runner, for
/// example to close a network connection the runner is blocked on.
pub struct ThreadControl {
    job_id: JobId,
    stop_requested: AtomicBool,
    stop_state: Mutex<Option<JobState>>,
    stop_time: Option<DateTime<Utc>>,
    deadline: Mutex<Option<Instant>>,
    active_runners: Mutex<usize>,
    runners_cv: Condvar,
    destroyed: AtomicBool,
    destroy_hooks: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

impl ThreadControl {
    /// Creates the control block for one job run
    pub fn new(job_id: JobId, stop_time: Option<DateTime<Utc>>) -> Self {
        Self {
            job_id,
            stop_requested: AtomicBool::new(false),
            stop_state: Mutex::new(None),
            stop_time,
            deadline: Mutex::new(None),
            active_runners: Mutex::new(0),
            runners_cv: Condvar::new(),
            destroyed: AtomicBool::new(false),
            destroy_hooks: Mutex::new(Vec::new()),
        }
    }

    /// Job this control block belongs to
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Arms the duration trigger; called when execution actually begins
    pub fn arm_duration(&self, duration_secs: Option<u64>) {
        let mut deadline = self.lock(&self.deadline);
        *deadline = duration_secs
            .map(|secs| Instant::now() + std::time::Duration::from_secs(secs));
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records the first stop trigger that fired
    fn fire(&self, state: JobState) {
        let mut stop_state = self.lock(&self.stop_state);
        if stop_state.is_none() {
            *stop_state = Some(state);
        }
        drop(stop_state);
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// True once any stop trigger fired; runners poll this in their loop
    pub fn should_stop(&self) -> bool {
        if self.stop_requested.load(Ordering::SeqCst) {
            return true;
        }
        if let Some(stop_time) = self.stop_time {
            if Utc::now() >= stop_time {
                self.fire(JobState::StoppedDueToStopTime);
                return true;
            }
        }
        let deadline_hit = {
            let deadline = self.lock(&self.deadline);
            matches!(*deadline, Some(deadline) if Instant::now() >= deadline)
        };
        if deadline_hit {
            self.fire(JobState::StoppedDueToDuration);
            return true;
        }
        false
    }

    /// True once an external stop was requested
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Requests a cooperative stop with the given terminal state
    pub fn stop_job(&self, state: JobState) {
        self.fire(state);
    }

    /// Requests a cooperative stop and blocks until all runners exited
    pub fn stop_and_wait(&self, state: JobState) {
        self.fire(state);
        self.await_runners();
    }

    /// Terminal state recorded by the first trigger, if any fired
    pub fn stop_state(&self) -> Option<JobState> {
        *self.lock(&self.stop_state)
    }

    /// Registers one runner thread as active
    pub fn runner_started(&self) {
        let mut active = self.lock(&self.active_runners);
        *active += 1;
    }

    /// Deregisters one runner thread; wakes any stop-and-wait caller
    pub fn runner_finished(&self) {
        let mut active = self.lock(&self.active_runners);
        *active = active.saturating_sub(1);
        drop(active);
        self.runners_cv.notify_all();
    }

    /// Blocks until every registered runner has finished
    pub fn await_runners(&self) {
        let mut active = self.lock(&self.active_runners);
        while *active > 0 {
            let (guard, _timeout) = self
                .runners_cv
                .wait_timeout(active, std::time::Duration::from_millis(100))
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            active = guard;
        }
    }

    /// Registers a side-channel used to unblock a wedged runner
    pub fn register_destroy_hook(&self, hook: Box<dyn Fn() + Send + Sync>) {
        self.lock(&self.destroy_hooks).push(hook);
    }

    /// Forcefully unblocks runners through the registered hooks; idempotent
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.fire(JobState::StoppedDueToError);
        for hook in self.lock(&self.destroy_hooks).iter() {
            hook();
        }
    }
}

/// The contract every workload implementation exposes
pub trait Workload: Send {
    /// Registry key; what jobs persist to name this workload
    fn class_name(&self) -> &str;

    /// Human-readable workload name
    fn job_name(&self) -> &str;

    /// One-line description shown in listings
    fn short_description(&self) -> &str;

    /// Longer description shown on detail pages
    fn long_description(&self) -> String {
        self.short_description().to_string()
    }

    /// Category the workload is listed under
    fn category_name(&self) -> &str;

    /// Schema of the parameters the workload accepts
    fn parameter_stubs(&self) -> ParameterList;

    /// Schema of the parameters forwarded to workers
    ///
    /// May narrow the server-visible set when some parameters only matter
    /// server-side.
    fn client_side_parameter_stubs(&self) -> ParameterList {
        self.parameter_stubs()
    }

    /// Names and types of the trackers this workload will report
    fn stat_tracker_stubs(
        &self,
        client_id: &str,
        thread_id: &str,
        collection_interval_secs: u32,
    ) -> Vec<StatTracker>;

    /// Fixed worker count this workload requires, if any
    fn override_num_clients(&self) -> Option<u32> {
        None
    }

    /// Fixed threads-per-worker this workload requires, if any
    fn override_threads_per_client(&self) -> Option<u32> {
        None
    }

    /// Fixed collection interval this workload requires, if any
    fn override_collection_interval(&self) -> Option<u32> {
        None
    }

    /// Checks a job definition for inconsistent arguments
    ///
    /// The default verifies that required parameters carry values.
    fn validate_job_info(&self, job: &Job) -> CoreResult<()> {
        job.parameters
            .validate_required()
            .map_err(CoreError::InvalidValue)
    }

    /// True when the workload offers a pre-schedule parameter test
    fn provides_parameter_test(&self) -> bool {
        false
    }

    /// Dry-runs the parameters, appending human-readable findings
    ///
    /// Returns true when the parameters look usable. Failures here are
    /// warnings to the caller; they never change job state.
    fn test_job_parameters(
        &self,
        _parameters: &ParameterList,
        _output: &mut Vec<String>,
    ) -> CoreResult<bool> {
        Ok(false)
    }

    /// Server-side initialization, once per job before dispatch
    fn initialize_job(&mut self, _parameters: &ParameterList) -> CoreResult<()> {
        Ok(())
    }

    /// Worker-side initialization, once per runner instance
    fn initialize_client(&mut self, _client_id: &str, _parameters: &ParameterList) -> CoreResult<()> {
        Ok(())
    }

    /// Worker-side initialization, once per thread
    fn initialize_thread(
        &mut self,
        client_id: &str,
        thread_id: &str,
        collection_interval_secs: u32,
        parameters: &ParameterList,
    ) -> CoreResult<()>;

    /// The per-thread execution loop
    ///
    /// Implementations must poll `control.should_stop()` frequently enough
    /// to honour stop triggers within about a second. An error return marks
    /// the worker's run as stopped due to error.
    fn run_job(&mut self, control: &ThreadControl) -> CoreResult<()>;

    /// The trackers collected by this runner, after the run
    fn stat_trackers(&self) -> Vec<StatTracker>;

    /// Per-thread cleanup
    fn finalize_thread(&mut self) {}

    /// Per-worker cleanup
    fn finalize_client(&mut self) {}

    /// Server-side cleanup after the last completion report
    fn finalize_job(&mut self) {}
}

/// Factory producing fresh workload instances
pub type WorkloadFactory = Arc<dyn Fn() -> Box<dyn Workload> + Send + Sync>;

/// Registry mapping workload class names to factories
///
/// The registry is compiled in; jobs reference workloads by class-name
/// string, so the persistence model survives workload replacement.
#[derive(Clone, Default)]
pub struct WorkloadRegistry {
    factories: HashMap<String, WorkloadFactory>,
}

impl WorkloadRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the bundled workloads
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(|| Box::new(NullWorkload::new()) as Box<dyn Workload>));
        registry.register(Arc::new(|| {
            Box::new(LogReplayWorkload::new()) as Box<dyn Workload>
        }));
        registry.register(Arc::new(|| {
            Box::new(ResourceMonitorWorkload::new()) as Box<dyn Workload>
        }));
        registry
    }

    /// Registers a factory under the class name of the instances it builds
    pub fn register(&mut self, factory: WorkloadFactory) {
        let class_name = factory().class_name().to_string();
        self.factories.insert(class_name, factory);
    }

    /// Instantiates a workload by class name
    pub fn create(&self, class_name: &str) -> Option<Box<dyn Workload>> {
        self.factories.get(class_name).map(|factory| factory())
    }

    /// True when the class name is registered
    pub fn contains(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    /// All registered class names, sorted
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}
