//! Optimizing-job controller module
//!
//! The iteration loop of an optimizing job: schedule the base workload at
//! the minimum thread count, and on every iteration's completion decide
//! whether to stop, re-run the best iteration for validation, or schedule
//! the next iteration with more threads. The decision runs on the
//! scheduler's completion path; all flags it consults are read under the
//! optimizing job's own lock, and the job is dropped from the scheduler's
//! cache exactly once, on the terminal paths.

use chrono::Utc;
use tracing::{info, warn};

use crate::application::services::notifier::optimizing_job_notification;
use crate::application::services::scheduler::{CachedOptimizingJob, Scheduler};
use crate::domain::entities::Job;
use crate::domain::error::CoreResult;
use crate::domain::value_objects::JobState;
use std::sync::Arc;

/// Stop reason used when the search hit the thread-count cap
pub const REASON_MAX_THREADS: &str = "maximum number of threads reached";
/// Stop reason used when the search stopped improving
pub const REASON_NON_IMPROVING: &str =
    "maximum consecutive non-improving iterations reached";
/// Stop reason used when the validation re-run finished
pub const REASON_RERUN_COMPLETE: &str = "completed after re-running the best iteration";

/// Schedules the first iteration at the minimum thread count
pub fn schedule_first_iteration(
    scheduler: &Scheduler,
    cached: &Arc<CachedOptimizingJob>,
) -> CoreResult<()> {
    let entity = &cached.entity;
    let threads = entity.min_threads.max(1);
    let child = entity.build_iteration_job(threads, Utc::now(), false);
    entity.append_child(child.job_id.clone());
    scheduler.persist_optimizing_job(entity);
    scheduler.submit_job(child)?;
    info!(
        optimizing_job_id = %entity.optimizing_job_id,
        threads,
        "first iteration scheduled"
    );
    Ok(())
}

/// Handles the completion of one iteration
///
/// Runs on the scheduler's completion thread. `iteration` is None when the
/// completion path lost track of the child job, which is itself a fatal
/// condition for the search.
pub fn job_iteration_complete(
    scheduler: &Scheduler,
    cached: &Arc<CachedOptimizingJob>,
    iteration: Option<&Arc<Job>>,
) {
    let entity = &cached.entity;

    // A lost child leaves the search without a result to evaluate.
    let Some(iteration) = iteration else {
        finish(
            scheduler,
            cached,
            JobState::StoppedDueToError,
            "a null iteration was reported",
        );
        return;
    };

    // Cancellation wins over everything else once the running child ended.
    if entity.cancel_requested() {
        finish(
            scheduler,
            cached,
            JobState::Cancelled,
            "cancelled by user request",
        );
        return;
    }

    let child_state = iteration.state();
    if !child_state.is_acceptable_iteration_stop() {
        finish(
            scheduler,
            cached,
            JobState::StoppedDueToError,
            &format!(
                "iteration {} ended in unacceptable state: {}",
                iteration.job_id, child_state
            ),
        );
        return;
    }

    // The validation re-run is terminal by definition.
    if entity.is_rerun_child(&iteration.job_id) {
        let rerun_value = cached
            .lock_algorithm()
            .get_iteration_optimization_value(iteration)
            .unwrap_or(f64::NAN);
        entity.set_rerun_value(rerun_value);
        finish(
            scheduler,
            cached,
            JobState::CompletedSuccessfully,
            REASON_RERUN_COMPLETE,
        );
        return;
    }

    // Consult the algorithm before deciding how to continue.
    let consult = {
        let mut algorithm = cached.lock_algorithm();
        algorithm
            .is_best_iteration_so_far(iteration)
            .map(|is_best| (is_best, algorithm.best_value()))
    };
    match consult {
        Ok((true, best_value)) => {
            entity.record_improvement(
                iteration.job_id.clone(),
                iteration.threads_per_client,
                best_value,
            );
            info!(
                optimizing_job_id = %entity.optimizing_job_id,
                iteration = %iteration.job_id,
                best_value,
                "new best iteration"
            );
        }
        Ok((false, _)) => {
            let non_improving = entity.record_non_improvement();
            info!(
                optimizing_job_id = %entity.optimizing_job_id,
                iteration = %iteration.job_id,
                non_improving,
                "iteration did not improve"
            );
        }
        Err(algorithm_error) => {
            finish(
                scheduler,
                cached,
                JobState::StoppedDueToError,
                &format!("optimization algorithm failed: {}", algorithm_error),
            );
            return;
        }
    }
    scheduler.persist_optimizing_job(entity);

    let (_, optimal_threads, _) = entity.current_optimal();

    if entity.reached_thread_cap(iteration.threads_per_client) {
        if entity.rerun_best && optimal_threads > 0 {
            schedule_rerun(scheduler, cached, optimal_threads);
        } else {
            finish(
                scheduler,
                cached,
                JobState::CompletedSuccessfully,
                REASON_MAX_THREADS,
            );
        }
        return;
    }

    if entity.current_non_improving() >= entity.max_non_improving {
        if entity.rerun_best && optimal_threads > 0 {
            schedule_rerun(scheduler, cached, optimal_threads);
        } else {
            finish(
                scheduler,
                cached,
                JobState::CompletedSuccessfully,
                REASON_NON_IMPROVING,
            );
        }
        return;
    }

    schedule_next_iteration(scheduler, cached, iteration.threads_per_client);
}

/// Schedules the iteration after the given one
///
/// The optimizing job stays cached: the search continues.
fn schedule_next_iteration(
    scheduler: &Scheduler,
    cached: &Arc<CachedOptimizingJob>,
    current_threads: u32,
) {
    let entity = &cached.entity;
    let next_threads = entity.next_thread_count(current_threads);
    let next_start = Utc::now()
        + chrono::Duration::seconds(entity.delay_between_iterations_secs as i64);
    let child = entity.build_iteration_job(next_threads, next_start, false);

    if entity.take_pause_request() {
        // A pause holds the next iteration in the disabled state until an
        // operator re-enables it.
        child.set_state(JobState::Disabled);
        info!(
            optimizing_job_id = %entity.optimizing_job_id,
            "pause requested, next iteration created disabled"
        );
    }

    entity.append_child(child.job_id.clone());
    scheduler.persist_optimizing_job(entity);
    match scheduler.submit_job(child) {
        Ok(_) => {
            info!(
                optimizing_job_id = %entity.optimizing_job_id,
                threads = next_threads,
                "next iteration scheduled"
            );
        }
        Err(submit_error) => {
            finish(
                scheduler,
                cached,
                JobState::StoppedDueToError,
                &format!("failed to schedule the next iteration: {}", submit_error),
            );
        }
    }
}

/// Schedules the validation re-run of the best iteration
fn schedule_rerun(scheduler: &Scheduler, cached: &Arc<CachedOptimizingJob>, threads: u32) {
    let entity = &cached.entity;
    let next_start = Utc::now()
        + chrono::Duration::seconds(entity.delay_between_iterations_secs as i64);
    let child = entity.build_iteration_job(threads, next_start, true);
    entity.set_rerun(child.job_id.clone());
    scheduler.persist_optimizing_job(entity);
    match scheduler.submit_job(child) {
        Ok(_) => {
            info!(
                optimizing_job_id = %entity.optimizing_job_id,
                threads,
                "re-running the best iteration"
            );
        }
        Err(submit_error) => {
            finish(
                scheduler,
                cached,
                JobState::StoppedDueToError,
                &format!("failed to schedule the re-run: {}", submit_error),
            );
        }
    }
}

/// Applies a terminal state, persists, decaches, and notifies
///
/// Every terminal path of the decision tree funnels through here, so the
/// decache happens exactly once and never on the continue path.
fn finish(
    scheduler: &Scheduler,
    cached: &Arc<CachedOptimizingJob>,
    state: JobState,
    reason: &str,
) {
    let entity = &cached.entity;
    if !entity.mark_terminal(state, reason) {
        warn!(
            optimizing_job_id = %entity.optimizing_job_id,
            "ignoring repeated terminal transition to {}",
            state
        );
        return;
    }
    scheduler.persist_optimizing_job(entity);
    scheduler.decache_optimizing_job(&entity.optimizing_job_id);

    if !entity.notify_addresses.is_empty() {
        let algorithm_parameters = cached.lock_algorithm().parameters();
        let (subject, body) = optimizing_job_notification(entity, &algorithm_parameters);
        scheduler
            .notifier()
            .notify(&entity.notify_addresses, &subject, &body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::algorithms::{
        AlgorithmRegistry, MIN_PCT_IMPROVEMENT_PARAMETER, OPTIMIZE_STATISTIC_PARAMETER,
        OPTIMIZE_TYPE_PARAMETER,
    };
    use crate::application::services::client_coordinator::ClientCoordinator;
    use crate::application::services::notifier::RecordingNotifier;
    use crate::domain::entities::OptimizingJob;
    use crate::domain::repositories::JobStore;
    use crate::domain::stats::{IncrementalTracker, StatTracker};
    use crate::domain::value_objects::{
        CompletionReport, JobControlOp, JobId, JobRequest, Parameter, ParameterValue,
        ResponseCode, WorkerReply,
    };
    use crate::domain::workers::WorkerConnection;
    use crate::infrastructure::repositories::InMemoryJobStore;
    use crate::workloads::WorkloadRegistry;
    use std::sync::Arc;
    use std::time::Duration;

    struct StubConnection {
        id: String,
        request_code: ResponseCode,
    }

    impl WorkerConnection for StubConnection {
        fn client_id(&self) -> String {
            self.id.clone()
        }

        fn send_job_request(&self, _request: &JobRequest) -> WorkerReply {
            match self.request_code {
                ResponseCode::Success => WorkerReply::success(),
                code => WorkerReply::failure(code, "scripted failure"),
            }
        }

        fn send_job_control(&self, _job_id: &JobId, _op: JobControlOp) -> WorkerReply {
            WorkerReply::success()
        }
    }

    struct Harness {
        scheduler: Arc<Scheduler>,
        notifier: Arc<RecordingNotifier>,
        store: Arc<InMemoryJobStore>,
    }

    fn harness() -> Harness {
        let coordinator = Arc::new(ClientCoordinator::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let store = Arc::new(InMemoryJobStore::new());
        let scheduler = Arc::new(Scheduler::new(
            coordinator,
            store.clone(),
            Arc::new(WorkloadRegistry::with_builtins()),
            Arc::new(AlgorithmRegistry::with_builtins()),
            notifier.clone(),
            Duration::from_millis(10),
        ));
        Harness {
            scheduler,
            notifier,
            store,
        }
    }

    fn optimizing_job(
        id: &str,
        min_threads: u32,
        max_threads: i64,
        increment: u32,
        max_non_improving: u32,
    ) -> OptimizingJob {
        let mut entity = OptimizingJob::new(JobId::from(id), "NullWorkload");
        entity.min_threads = min_threads;
        entity.max_threads = max_threads;
        entity.thread_increment = increment;
        entity.max_non_improving = max_non_improving;
        entity.algorithm_name = "SingleStatistic".to_string();
        entity.algorithm_parameters.set(Parameter::new(
            OPTIMIZE_STATISTIC_PARAMETER,
            "Statistic to Optimize",
            ParameterValue::Text("Iterations Completed".to_string()),
        ));
        entity.algorithm_parameters.set(Parameter::new(
            OPTIMIZE_TYPE_PARAMETER,
            "Optimization Type",
            ParameterValue::Text("maximize".to_string()),
        ));
        entity.algorithm_parameters.set(Parameter::new(
            MIN_PCT_IMPROVEMENT_PARAMETER,
            "Minimum Percent Improvement",
            ParameterValue::Float(0.0),
        ));
        entity
    }

    /// Completes pending iterations one at a time, reporting the summary
    /// value produced by `value_for` for each thread count. Returns the
    /// sequence of completed child ids.
    fn drive(scheduler: &Arc<Scheduler>, value_for: &dyn Fn(u32) -> f64) -> Vec<JobId> {
        let mut completed = Vec::new();
        for _ in 0..64 {
            let Some(child) = scheduler
                .pending_jobs()
                .into_iter()
                .find(|job| job.state() == JobState::NotYetStarted)
            else {
                break;
            };
            scheduler.take_pending(&child.job_id);
            child.set_state(JobState::Running);

            let mut tracker = IncrementalTracker::new("client-1", "0", "Iterations Completed", 1);
            tracker.push_interval(value_for(child.threads_per_client).round() as u64);
            child.client_done(&CompletionReport {
                job_id: child.job_id.clone(),
                client_id: "client-1".to_string(),
                resource_monitor: false,
                final_state: JobState::CompletedSuccessfully,
                actual_start: Utc::now(),
                actual_stop: Utc::now(),
                actual_duration_secs: 1,
                stat_trackers: vec![StatTracker::Incremental(tracker)],
                log_messages: Vec::new(),
            });
            child.complete();
            completed.push(child.job_id.clone());
            scheduler.job_done(&child);
        }
        completed
    }

    #[test]
    fn test_monotone_improvement_stops_on_non_improving_cap() {
        let harness = harness();
        let entity = optimizing_job("20260101000000-abc1231", 1, 8, 1, 2);
        let cached = harness.scheduler.submit_optimizing_job(entity).unwrap();

        // Rates 10..50 for threads 1..5, then a plateau at 50.
        let completed = drive(&harness.scheduler, &|threads| {
            f64::from(threads.min(5)) * 10.0
        });

        assert_eq!(completed.len(), 7);
        let entity = &cached.entity;
        assert_eq!(entity.job_state(), JobState::CompletedSuccessfully);
        assert_eq!(entity.stop_reason().as_deref(), Some(REASON_NON_IMPROVING));
        let (optimal_id, optimal_threads, optimal_value) = entity.current_optimal();
        assert_eq!(optimal_threads, 5);
        assert!((optimal_value - 50.0).abs() < f64::EPSILON);
        assert_eq!(
            optimal_id.unwrap(),
            entity.optimizing_job_id.iteration_child(5)
        );
        // currentNonImproving peaked exactly at the cap.
        assert_eq!(entity.current_non_improving(), 2);
    }

    #[test]
    fn test_iteration_sequence_is_deterministic() {
        let value_for = |threads: u32| f64::from(threads.min(5)) * 10.0;

        let mut sequences = Vec::new();
        for _ in 0..2 {
            let harness = harness();
            let entity = optimizing_job("20260101000000-abc1231", 1, 8, 1, 2);
            let cached = harness.scheduler.submit_optimizing_job(entity).unwrap();
            drive(&harness.scheduler, &value_for);
            let threads: Vec<u32> = cached
                .entity
                .child_ids()
                .iter()
                .map(|id| {
                    id.as_str()
                        .rsplit('-')
                        .next()
                        .unwrap()
                        .parse::<u32>()
                        .unwrap()
                })
                .collect();
            sequences.push((threads, cached.entity.job_state()));
        }
        assert_eq!(sequences[0], sequences[1]);
    }

    #[test]
    fn test_minimum_improvement_rejects_marginal_gains() {
        let harness = harness();
        let mut entity = optimizing_job("20260101000000-abc1231", 1, 16, 1, 2);
        entity.algorithm_parameters.set(Parameter::new(
            MIN_PCT_IMPROVEMENT_PARAMETER,
            "Minimum Percent Improvement",
            ParameterValue::Float(0.10),
        ));
        let cached = harness.scheduler.submit_optimizing_job(entity).unwrap();

        // 100, then 105 (within ten percent of 100, not an improvement),
        // then 120 (an improvement), then a plateau.
        drive(&harness.scheduler, &|threads| match threads {
            1 => 100.0,
            2 => 105.0,
            _ => 120.0,
        });

        let entity = &cached.entity;
        assert_eq!(entity.job_state(), JobState::CompletedSuccessfully);
        let (_, optimal_threads, optimal_value) = entity.current_optimal();
        assert_eq!(optimal_threads, 3);
        assert!((optimal_value - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rerun_of_best_iteration() {
        let harness = harness();
        let mut entity = optimizing_job("20260101000000-abc1231", 1, 4, 1, 8);
        entity.rerun_best = true;
        entity.rerun_duration_secs = Some(600);
        entity.duration_secs = Some(120);
        let cached = harness.scheduler.submit_optimizing_job(entity).unwrap();

        // Best at two threads; the cap at four threads triggers the re-run.
        let completed = drive(&harness.scheduler, &|threads| match threads {
            2 => 50.0,
            n => f64::from(n) * 5.0,
        });

        let entity = &cached.entity;
        assert_eq!(entity.job_state(), JobState::CompletedSuccessfully);
        assert_eq!(entity.stop_reason().as_deref(), Some(REASON_RERUN_COMPLETE));

        // Child sequence: -1, -2, -3, -4, then -2-rerun.
        let parent = &entity.optimizing_job_id;
        assert_eq!(
            entity.child_ids(),
            vec![
                parent.iteration_child(1),
                parent.iteration_child(2),
                parent.iteration_child(3),
                parent.iteration_child(4),
            ]
        );
        assert_eq!(entity.rerun_id(), Some(parent.rerun_child(2)));
        assert_eq!(completed.last(), Some(&parent.rerun_child(2)));

        // The re-run carried the validation duration and reported a value.
        let rerun_record = harness
            .store
            .load_job(&parent.rerun_child(2))
            .unwrap()
            .unwrap();
        assert_eq!(rerun_record.duration_secs, Some(600));
        assert!((entity.rerun_value() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_thread_cap_without_rerun() {
        let harness = harness();
        let entity = optimizing_job("20260101000000-abc1231", 1, 3, 1, 8);
        let cached = harness.scheduler.submit_optimizing_job(entity).unwrap();
        drive(&harness.scheduler, &|threads| f64::from(threads));
        let entity = &cached.entity;
        assert_eq!(entity.job_state(), JobState::CompletedSuccessfully);
        assert_eq!(entity.stop_reason().as_deref(), Some(REASON_MAX_THREADS));
        assert_eq!(entity.child_ids().len(), 3);
    }

    #[test]
    fn test_negative_max_threads_means_no_cap() {
        let harness = harness();
        let entity = optimizing_job("20260101000000-abc1231", 1, -1, 1, 1);
        let cached = harness.scheduler.submit_optimizing_job(entity).unwrap();
        // Improves for five iterations, then plateaus; only the
        // non-improving cap can end the search.
        drive(&harness.scheduler, &|threads| f64::from(threads.min(5)));
        let entity = &cached.entity;
        assert_eq!(entity.job_state(), JobState::CompletedSuccessfully);
        assert_eq!(entity.stop_reason().as_deref(), Some(REASON_NON_IMPROVING));
        assert_eq!(entity.child_ids().len(), 6);
    }

    #[test]
    fn test_cancellation_is_honoured_at_iteration_boundary() {
        let harness = harness();
        let entity = optimizing_job("20260101000000-abc1231", 1, 8, 1, 4);
        let cached = harness.scheduler.submit_optimizing_job(entity).unwrap();

        // Cancel while the first iteration is still pending.
        assert!(harness
            .scheduler
            .cancel_optimizing_job(&cached.entity.optimizing_job_id)
            .unwrap());
        assert_eq!(cached.entity.job_state(), JobState::Cancelled);
        assert!(harness.scheduler.is_idle());
    }

    #[test]
    fn test_pause_creates_next_iteration_disabled() {
        let harness = harness();
        let entity = optimizing_job("20260101000000-abc1231", 1, 8, 1, 4);
        let cached = harness.scheduler.submit_optimizing_job(entity).unwrap();
        cached.entity.request_pause();

        drive(&harness.scheduler, &|threads| f64::from(threads));

        // The second iteration was created disabled and never admitted.
        let pending = harness.scheduler.pending_jobs();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].state(), JobState::Disabled);
        assert_eq!(pending[0].threads_per_client, 2);
        // The flag was consumed.
        assert_eq!(cached.entity.job_state(), JobState::Running);
    }

    #[test]
    fn test_unacceptable_child_state_halts_the_search() {
        let harness = harness();
        let mut entity = optimizing_job("20260101000000-abc1231", 1, 8, 1, 4);
        entity.notify_addresses.push("ops@example.com".to_string());
        let cached = harness.scheduler.submit_optimizing_job(entity).unwrap();

        let child = harness.scheduler.pending_jobs().into_iter().next().unwrap();
        harness.scheduler.take_pending(&child.job_id);
        child.set_state(JobState::Running);
        child.mark_terminal(JobState::StoppedDueToError, "worker failure");
        harness.scheduler.job_done(&child);

        let entity = &cached.entity;
        assert_eq!(entity.job_state(), JobState::StoppedDueToError);
        assert!(entity
            .stop_reason()
            .unwrap()
            .contains("unacceptable state"));
        let messages = harness.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].body.contains("Stopped Due To Error"));
    }

    #[test]
    fn test_partial_worker_failure_terminates_parent() {
        let harness = harness();
        // Four workers; the second does not know the workload class.
        for (index, code) in [
            ResponseCode::Success,
            ResponseCode::ClassNotFound,
            ResponseCode::Success,
            ResponseCode::Success,
        ]
        .iter()
        .enumerate()
        {
            harness
                .scheduler
                .coordinator()
                .register_client(Arc::new(StubConnection {
                    id: format!("worker-{}:1", index + 1),
                    request_code: *code,
                }));
        }

        let mut entity = optimizing_job("20260101000000-abc1231", 1, 8, 1, 4);
        entity.num_clients = 4;
        let cached = harness.scheduler.submit_optimizing_job(entity).unwrap();

        harness.scheduler.admission_pass();

        // The child observed the class-not-found reply and died; every
        // assigned worker went back to the pool, and no completion report
        // was ever consumed.
        let child_id = cached.entity.child_ids()[0].clone();
        let child_record = harness.store.load_job(&child_id).unwrap().unwrap();
        assert_eq!(child_record.job_state, JobState::NoSuchJob);
        assert_eq!(harness.scheduler.coordinator().available_clients(), 4);

        // The parent observed the unacceptable state and terminated.
        assert_eq!(cached.entity.job_state(), JobState::StoppedDueToError);
        assert!(harness.scheduler.is_idle());
    }

    #[test]
    fn test_algorithm_error_halts_immediately() {
        let harness = harness();
        // The optimize statistic does not exist in the child's results.
        let mut entity = optimizing_job("20260101000000-abc1231", 1, 8, 1, 4);
        entity.algorithm_parameters.set(Parameter::new(
            OPTIMIZE_STATISTIC_PARAMETER,
            "Statistic to Optimize",
            ParameterValue::Text("No Such Statistic".to_string()),
        ));
        let cached = harness.scheduler.submit_optimizing_job(entity).unwrap();

        drive(&harness.scheduler, &|_| 10.0);

        let entity = &cached.entity;
        assert_eq!(entity.job_state(), JobState::StoppedDueToError);
        assert!(entity
            .stop_reason()
            .unwrap()
            .contains("optimization algorithm failed"));
        // No further iteration was scheduled.
        assert_eq!(entity.child_ids().len(), 1);
    }

    #[test]
    fn test_reload_without_snapshot_replays_children() {
        let harness = harness();
        let entity = optimizing_job("20260101000000-abc1231", 1, 8, 1, 2);
        let cached = harness.scheduler.submit_optimizing_job(entity).unwrap();
        drive(&harness.scheduler, &|threads| {
            f64::from(threads.min(5)) * 10.0
        });
        let optimizing_job_id = cached.entity.optimizing_job_id.clone();

        // Strip the snapshot from the persisted record, as a record written
        // before snapshots existed would look.
        let mut record = harness
            .store
            .load_optimizing_job(&optimizing_job_id)
            .unwrap()
            .unwrap();
        record.best_value_snapshot = None;
        harness.store.save_optimizing_job(&record).unwrap();
        harness.scheduler.decache_optimizing_job(&optimizing_job_id);

        let reloaded = harness
            .scheduler
            .get_or_load_optimizing_job(&optimizing_job_id)
            .unwrap();
        assert!((reloaded.lock_algorithm().best_value() - 50.0).abs() < f64::EPSILON);
    }
}
