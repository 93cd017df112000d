//! In-process worker module
//!
//! The reference transport: a worker hosted inside the server process. It
//! implements the worker protocol against a local workload registry, runs
//! one runner-mode workload instance per thread, and delivers completion
//! reports through a channel routed back into the scheduler. Remote
//! transports implement the same `WorkerConnection` capability; the
//! scheduling core never knows the difference.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::application::services::Scheduler;
use crate::domain::stats::StatTracker;
use crate::domain::value_objects::{
    CompletionReport, JobControlOp, JobId, JobRequest, JobState, ResponseCode, WorkerReply,
};
use crate::domain::workers::WorkerConnection;
use crate::workloads::{ThreadControl, WorkloadRegistry};

/// One job defined on the worker
struct WorkerJob {
    request: JobRequest,
    control: Arc<ThreadControl>,
    started: AtomicBool,
}

type JobTable = Arc<Mutex<HashMap<String, Arc<WorkerJob>>>>;

/// A worker living inside the server process
pub struct InProcessWorker {
    client_id: String,
    resource_monitor: bool,
    registry: Arc<WorkloadRegistry>,
    completions: mpsc::Sender<CompletionReport>,
    jobs: JobTable,
}

impl InProcessWorker {
    /// Creates a compute worker
    pub fn new(
        client_id: &str,
        registry: Arc<WorkloadRegistry>,
        completions: mpsc::Sender<CompletionReport>,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            resource_monitor: false,
            registry,
            completions,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates a resource-monitor worker
    ///
    /// Monitor workers ignore the requested workload class and run their
    /// own resource-monitor workload against the job's timing envelope.
    pub fn new_monitor(
        client_id: &str,
        registry: Arc<WorkloadRegistry>,
        completions: mpsc::Sender<CompletionReport>,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            resource_monitor: true,
            registry,
            completions,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<String, Arc<WorkerJob>>> {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The workload class this worker will actually run for a request
    fn effective_class(&self, request: &JobRequest) -> String {
        if self.resource_monitor {
            "ResourceMonitorWorkload".to_string()
        } else {
            request.workload_class.clone()
        }
    }

    /// Forcefully unblocks a wedged job through its destroy hooks
    pub fn destroy_job(&self, job_id: &JobId) {
        if let Some(job) = self.lock_jobs().get(job_id.as_str()) {
            warn!(client_id = %self.client_id, job_id = %job_id, "destroying job threads");
            job.control.destroy();
        }
    }

    fn runner(&self) -> JobRunner {
        JobRunner {
            client_id: self.client_id.clone(),
            resource_monitor: self.resource_monitor,
            registry: self.registry.clone(),
            completions: self.completions.clone(),
            jobs: self.jobs.clone(),
        }
    }
}

impl WorkerConnection for InProcessWorker {
    fn client_id(&self) -> String {
        self.client_id.clone()
    }

    fn send_job_request(&self, request: &JobRequest) -> WorkerReply {
        let class_name = self.effective_class(request);
        if self.registry.create(&class_name).is_none() {
            return WorkerReply::failure(
                ResponseCode::ClassNotFound,
                format!("unknown workload class '{}'", class_name),
            );
        }

        let control = Arc::new(ThreadControl::new(
            request.job_id.clone(),
            request.stop_time,
        ));
        self.lock_jobs().insert(
            request.job_id.as_str().to_string(),
            Arc::new(WorkerJob {
                request: request.clone(),
                control,
                started: AtomicBool::new(false),
            }),
        );
        debug!(client_id = %self.client_id, job_id = %request.job_id, "job defined");
        WorkerReply::success()
    }

    fn send_job_control(&self, job_id: &JobId, op: JobControlOp) -> WorkerReply {
        let Some(job) = self.lock_jobs().get(job_id.as_str()).cloned() else {
            return WorkerReply::failure(
                ResponseCode::NoSuchJob,
                format!("job '{}' is not defined on this worker", job_id),
            );
        };

        match op {
            JobControlOp::Start => {
                if job.started.swap(true, Ordering::SeqCst) {
                    return WorkerReply::failure(
                        ResponseCode::LocalError,
                        "job was already started".to_string(),
                    );
                }
                let runner = self.runner();
                let spawn_result = thread::Builder::new()
                    .name(format!("{}-{}", self.client_id, job_id))
                    .spawn(move || runner.run(job));
                match spawn_result {
                    Ok(_) => WorkerReply::success(),
                    Err(spawn_error) => WorkerReply::failure(
                        ResponseCode::LocalError,
                        format!("unable to spawn job coordinator: {}", spawn_error),
                    ),
                }
            }
            JobControlOp::Stop => {
                job.control.stop_job(JobState::StoppedByUser);
                WorkerReply::success()
            }
            JobControlOp::StopAndWait => {
                job.control.stop_and_wait(JobState::StoppedByUser);
                WorkerReply::success()
            }
        }
    }
}

/// Everything one job run needs, detached from the worker handle
///
/// The coordinator thread owns a runner so control replies never block on
/// workload execution.
struct JobRunner {
    client_id: String,
    resource_monitor: bool,
    registry: Arc<WorkloadRegistry>,
    completions: mpsc::Sender<CompletionReport>,
    jobs: JobTable,
}

impl JobRunner {
    /// Runs all threads of one job and reports the result
    fn run(self, job: Arc<WorkerJob>) {
        let class_name = if self.resource_monitor {
            "ResourceMonitorWorkload".to_string()
        } else {
            job.request.workload_class.clone()
        };
        let started_at = Utc::now();
        let started_instant = Instant::now();
        job.control.arm_duration(job.request.duration_secs);

        let mut handles = Vec::new();
        for thread_index in 0..job.request.num_threads.max(1) {
            if thread_index > 0 && job.request.thread_startup_delay_ms > 0 {
                thread::sleep(Duration::from_millis(job.request.thread_startup_delay_ms));
            }
            if job.control.should_stop() {
                break;
            }

            let registry = self.registry.clone();
            let control = job.control.clone();
            let request = job.request.clone();
            let client_id = self.client_id.clone();
            let class_name = class_name.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}-t{}", client_id, request.job_id, thread_index))
                .spawn(move || -> (Vec<StatTracker>, Vec<String>) {
                    let thread_id = thread_index.to_string();
                    let Some(mut workload) = registry.create(&class_name) else {
                        return (
                            Vec::new(),
                            vec![format!("workload class '{}' disappeared", class_name)],
                        );
                    };
                    let mut log_messages = Vec::new();

                    if let Err(init_error) =
                        workload.initialize_client(&client_id, &request.parameters)
                    {
                        return (
                            Vec::new(),
                            vec![format!("client initialization failed: {}", init_error)],
                        );
                    }
                    if let Err(init_error) = workload.initialize_thread(
                        &client_id,
                        &thread_id,
                        request.collection_interval_secs,
                        &request.parameters,
                    ) {
                        return (
                            Vec::new(),
                            vec![format!("thread initialization failed: {}", init_error)],
                        );
                    }

                    control.runner_started();
                    let run_result = workload.run_job(&control);
                    control.runner_finished();

                    if let Err(run_error) = run_result {
                        log_messages.push(format!(
                            "thread {} stopped with an error: {}",
                            thread_id, run_error
                        ));
                        control.stop_job(JobState::StoppedDueToError);
                    }
                    workload.finalize_thread();
                    workload.finalize_client();
                    (workload.stat_trackers(), log_messages)
                });
            match handle {
                Ok(handle) => handles.push(handle),
                Err(spawn_error) => {
                    error!(
                        client_id = %self.client_id,
                        job_id = %job.request.job_id,
                        "unable to spawn runner thread: {}",
                        spawn_error
                    );
                    job.control.stop_job(JobState::StoppedDueToError);
                    break;
                }
            }
        }

        let mut stat_trackers = Vec::new();
        let mut log_messages = Vec::new();
        let mut thread_failed = false;
        for handle in handles {
            match handle.join() {
                Ok((trackers, messages)) => {
                    thread_failed |= !messages.is_empty();
                    stat_trackers.extend(trackers);
                    log_messages.extend(messages);
                }
                Err(_) => {
                    thread_failed = true;
                    log_messages.push("a runner thread panicked".to_string());
                }
            }
        }

        let final_state = if thread_failed {
            JobState::StoppedDueToError
        } else {
            job.control
                .stop_state()
                .unwrap_or(JobState::CompletedSuccessfully)
        };

        let report = CompletionReport {
            job_id: job.request.job_id.clone(),
            client_id: self.client_id.clone(),
            resource_monitor: self.resource_monitor,
            final_state,
            actual_start: started_at,
            actual_stop: Utc::now(),
            actual_duration_secs: started_instant.elapsed().as_secs(),
            stat_trackers,
            log_messages,
        };

        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(job.request.job_id.as_str());
        info!(
            client_id = %self.client_id,
            job_id = %report.job_id,
            state = %report.final_state,
            "worker finished job"
        );
        if self.completions.send(report).is_err() {
            warn!(client_id = %self.client_id, "completion channel closed, report dropped");
        }
    }
}

/// Routes completion reports from workers into the scheduler
///
/// Runs until every worker's sender is dropped.
pub fn spawn_completion_router(
    scheduler: Arc<Scheduler>,
    receiver: mpsc::Receiver<CompletionReport>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("completion-router".to_string())
        .spawn(move || {
            for report in receiver {
                scheduler.route_completion(report);
            }
            debug!("completion router stopped");
        })
        .expect("failed to spawn the completion router")
}
