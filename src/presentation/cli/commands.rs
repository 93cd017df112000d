//! CLI commands module
//!
//! Command implementations for the command-line interface: running a job on
//! in-process workers, driving an optimizing search, listing registries, and
//! inspecting persisted job records.

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::info;

use crate::application::algorithms::{
    AlgorithmRegistry, MIN_PCT_IMPROVEMENT_PARAMETER, OPTIMIZE_STATISTIC_PARAMETER,
    OPTIMIZE_TYPE_PARAMETER,
};
use crate::application::services::{ClientCoordinator, LoggingNotifier, Scheduler};
use crate::config::ServerConfig;
use crate::domain::entities::{Job, OptimizingJob};
use crate::domain::repositories::JobStore;
use crate::domain::value_objects::{
    JobIdGenerator, Parameter, ParameterList, ParameterValue,
};
use crate::infrastructure::repositories::{InMemoryJobStore, SqliteJobStore};
use crate::infrastructure::worker::{spawn_completion_router, InProcessWorker};
use crate::presentation::cli::OptimizeDirection;
use crate::workloads::WorkloadRegistry;

/// Parses `name=value` pairs into a typed parameter list
///
/// Values that parse as integers, floats, or booleans take the matching
/// type; everything else stays text.
fn parse_parameters(pairs: &[String]) -> Result<ParameterList> {
    let mut parameters = ParameterList::new();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("parameter '{}' is not of the form name=value", pair);
        };
        let value = if let Ok(integer) = value.parse::<i64>() {
            ParameterValue::Integer(integer)
        } else if let Ok(float) = value.parse::<f64>() {
            ParameterValue::Float(float)
        } else if let Ok(boolean) = value.parse::<bool>() {
            ParameterValue::Boolean(boolean)
        } else {
            ParameterValue::Text(value.to_string())
        };
        parameters.set(Parameter::new(name, name, value));
    }
    Ok(parameters)
}

/// A scheduler wired to in-process workers
struct LocalServer {
    scheduler: Arc<Scheduler>,
    store: Arc<dyn JobStore>,
}

impl LocalServer {
    /// Builds and starts a server hosting the given worker counts
    ///
    /// The environment configuration supplies the durable job store and a
    /// minimum fleet size; job records survive the run and are inspectable
    /// with the `show` command.
    fn start(num_workers: usize, num_monitor_workers: usize) -> Self {
        let config = ServerConfig::from_env();
        let num_workers = num_workers.max(config.num_workers);
        let num_monitor_workers = num_monitor_workers.max(config.num_monitor_workers);
        let registry = Arc::new(WorkloadRegistry::with_builtins());
        let coordinator = Arc::new(ClientCoordinator::new());
        let store: Arc<dyn JobStore> = match SqliteJobStore::new(&config.database_path) {
            Ok(store) => Arc::new(store),
            Err(open_error) => {
                tracing::warn!(
                    "falling back to the in-memory job store: {}",
                    open_error
                );
                Arc::new(InMemoryJobStore::new())
            }
        };
        let scheduler = Arc::new(Scheduler::new(
            coordinator.clone(),
            store.clone(),
            registry.clone(),
            Arc::new(AlgorithmRegistry::with_builtins()),
            Arc::new(LoggingNotifier),
            config.poll_interval(),
        ));

        let (sender, receiver) = mpsc::channel();
        for index in 0..num_workers.max(1) {
            coordinator.register_client(Arc::new(InProcessWorker::new(
                &format!("local-{}:worker", index + 1),
                registry.clone(),
                sender.clone(),
            )));
        }
        for index in 0..num_monitor_workers {
            coordinator.register_monitor_client(Arc::new(InProcessWorker::new_monitor(
                &format!("local-{}:monitor", index + 1),
                registry.clone(),
                sender.clone(),
            )));
        }
        drop(sender);
        spawn_completion_router(scheduler.clone(), receiver);
        scheduler.clone().start();
        Self { scheduler, store }
    }
}

fn progress_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .expect("valid progress template"),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn print_stats(job: &Job) {
    println!("\nStatistics:");
    println!("  {:<32} {:>14}", "Tracker", "Summary");
    println!("  {:-<32} {:->14}", "", "");
    for tracker in job.aggregated_stats() {
        println!(
            "  {:<32} {:>14.3}",
            tracker.display_name(),
            tracker.summary_value()
        );
    }
    for tracker in job.monitor_stats() {
        println!(
            "  {:<32} {:>14.3} (monitor {})",
            tracker.display_name(),
            tracker.summary_value(),
            tracker.client_id()
        );
    }
}

/// Command running one job on in-process workers
pub struct RunCommand;

impl RunCommand {
    pub fn execute(
        workload: &str,
        clients: u32,
        threads: u32,
        duration: u64,
        interval: u32,
        params: &[String],
    ) -> Result<()> {
        let server = LocalServer::start(clients as usize, 0);
        let generator = JobIdGenerator::new();

        let mut job = Job::new(generator.next_id(), workload, chrono::Utc::now());
        job.num_clients = clients;
        job.threads_per_client = threads;
        job.duration_secs = Some(duration);
        job.collection_interval_secs = interval;
        job.parameters = parse_parameters(params)?;

        // Some workloads offer a pre-schedule dry run of their parameters.
        if let Some(stub) = server.scheduler.workloads().create(workload) {
            if stub.provides_parameter_test() {
                let mut findings = Vec::new();
                match stub.test_job_parameters(&job.parameters, &mut findings) {
                    Ok(usable) => {
                        for line in &findings {
                            println!("parameter test: {}", line);
                        }
                        if !usable {
                            println!("parameter test reported problems; scheduling anyway");
                        }
                    }
                    Err(test_error) => println!("parameter test failed: {}", test_error),
                }
            }
        }

        let job = server
            .scheduler
            .submit_job(job)
            .context("job was rejected")?;
        info!(job_id = %job.job_id, "job submitted");

        let spinner = progress_spinner(format!("running {} on {} worker(s)", workload, clients));
        while !job.state().is_terminal() {
            std::thread::sleep(Duration::from_millis(100));
        }
        spinner.finish_and_clear();

        let (actual_start, actual_stop, actual_duration) = job.actual_times();
        println!("Job {} finished: {}", job.job_id, job.state());
        if let Some(reason) = job.stop_reason() {
            println!("Stop reason: {}", reason);
        }
        if let (Some(start), Some(stop)) = (actual_start, actual_stop) {
            println!(
                "Ran from {} to {} ({} seconds)",
                start.format("%H:%M:%S"),
                stop.format("%H:%M:%S"),
                actual_duration.unwrap_or(0)
            );
        }
        print_stats(&job);

        server.scheduler.shutdown();
        Ok(())
    }
}

/// Command running an optimizing search over thread counts
pub struct OptimizeCommand;

impl OptimizeCommand {
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        workload: &str,
        statistic: &str,
        direction: OptimizeDirection,
        min_threads: u32,
        max_threads: i64,
        increment: u32,
        max_non_improving: u32,
        min_pct_improvement: f64,
        duration: u64,
        clients: u32,
        rerun_best: bool,
        rerun_duration: Option<u64>,
        interval: u32,
        params: &[String],
    ) -> Result<()> {
        let server = LocalServer::start(clients as usize, 0);
        let generator = JobIdGenerator::new();

        let mut optimizing_job = OptimizingJob::new(generator.next_id(), workload);
        optimizing_job.parameters = parse_parameters(params)?;
        optimizing_job.num_clients = clients;
        optimizing_job.duration_secs = Some(duration);
        optimizing_job.collection_interval_secs = interval;
        optimizing_job.min_threads = min_threads;
        optimizing_job.max_threads = max_threads;
        optimizing_job.thread_increment = increment;
        optimizing_job.max_non_improving = max_non_improving;
        optimizing_job.rerun_best = rerun_best;
        optimizing_job.rerun_duration_secs = rerun_duration;
        optimizing_job.algorithm_name = "SingleStatistic".to_string();
        optimizing_job.algorithm_parameters.set(Parameter::new(
            OPTIMIZE_STATISTIC_PARAMETER,
            "Statistic to Optimize",
            ParameterValue::Text(statistic.to_string()),
        ));
        optimizing_job.algorithm_parameters.set(Parameter::new(
            OPTIMIZE_TYPE_PARAMETER,
            "Optimization Type",
            ParameterValue::Text(direction.as_parameter().to_string()),
        ));
        optimizing_job.algorithm_parameters.set(Parameter::new(
            MIN_PCT_IMPROVEMENT_PARAMETER,
            "Minimum Percent Improvement",
            ParameterValue::Float(min_pct_improvement),
        ));

        let cached = server
            .scheduler
            .submit_optimizing_job(optimizing_job)
            .context("optimizing job was rejected")?;
        let entity = cached.entity.clone();

        let spinner = progress_spinner(format!(
            "optimizing {} for {} ({})",
            workload,
            statistic,
            direction.as_parameter()
        ));
        while !entity.job_state().is_terminal() {
            let iterations = entity.child_ids().len();
            spinner.set_message(format!(
                "optimizing {}: iteration {}",
                workload,
                iterations.max(1)
            ));
            std::thread::sleep(Duration::from_millis(200));
        }
        spinner.finish_and_clear();

        println!(
            "Optimizing job {} finished: {}",
            entity.optimizing_job_id,
            entity.job_state()
        );
        if let Some(reason) = entity.stop_reason() {
            println!("Stop reason: {}", reason);
        }

        println!("\nIterations:");
        println!("  {:<42} {:>8} {:>14}", "Job", "Threads", statistic);
        println!("  {:-<42} {:->8} {:->14}", "", "", "");
        let mut children = entity.child_ids();
        if let Some(rerun_id) = entity.rerun_id() {
            children.push(rerun_id);
        }
        for child_id in children {
            if let Ok(Some(record)) = server.store.load_job(&child_id) {
                let value = record
                    .stat_trackers
                    .iter()
                    .find(|tracker| tracker.is_searchable() && tracker.display_name() == statistic)
                    .map(|tracker| tracker.summary_value())
                    .unwrap_or(f64::NAN);
                println!(
                    "  {:<42} {:>8} {:>14.3}",
                    record.job_id, record.threads_per_client, value
                );
            }
        }

        let (optimal_id, optimal_threads, optimal_value) = entity.current_optimal();
        match optimal_id {
            Some(optimal_id) => println!(
                "\nOptimal: {} threads ({:.3} from {})",
                optimal_threads, optimal_value, optimal_id
            ),
            None => println!("\nNo iteration qualified as optimal"),
        }
        let rerun_value = entity.rerun_value();
        if !rerun_value.is_nan() {
            println!("Re-run value: {:.3}", rerun_value);
        }

        server.scheduler.shutdown();
        Ok(())
    }
}

/// Command listing the registered workloads
pub struct ListWorkloadsCommand;

impl ListWorkloadsCommand {
    pub fn execute() -> Result<()> {
        let registry = WorkloadRegistry::with_builtins();
        println!("{:<28} {:<12} Description", "Class", "Category");
        println!("{:-<28} {:-<12} {:-<40}", "", "", "");
        for class_name in registry.class_names() {
            if let Some(workload) = registry.create(&class_name) {
                println!(
                    "{:<28} {:<12} {}",
                    workload.class_name(),
                    workload.category_name(),
                    workload.short_description()
                );
            }
        }
        Ok(())
    }
}

/// Command listing the registered optimization algorithms
pub struct ListAlgorithmsCommand;

impl ListAlgorithmsCommand {
    pub fn execute() -> Result<()> {
        let algorithms = AlgorithmRegistry::with_builtins();
        let workloads = WorkloadRegistry::with_builtins();
        println!("{:<46} Available with", "Algorithm");
        println!("{:-<46} {:-<30}", "", "");
        for name in algorithms.names() {
            let available: Vec<String> = workloads
                .class_names()
                .into_iter()
                .filter(|class_name| {
                    workloads
                        .create(class_name)
                        .zip(algorithms.create(&name))
                        .map(|(workload, algorithm)| {
                            algorithm.available_with_workload(workload.as_ref())
                        })
                        .unwrap_or(false)
                })
                .collect();
            println!("{:<46} {}", name, available.join(", "));
        }
        Ok(())
    }
}

/// Command showing persisted job records
pub struct ShowCommand;

impl ShowCommand {
    pub fn execute(database: &std::path::Path, job_id: Option<&str>) -> Result<()> {
        let store = SqliteJobStore::new(database)
            .with_context(|| format!("unable to open {}", database.display()))?;

        match job_id {
            Some(job_id) => {
                let record = store
                    .load_job(&job_id.into())?
                    .with_context(|| format!("no job '{}' in the store", job_id))?;
                let document = serde_json::to_string_pretty(&record)?;
                println!("{}", document);
            }
            None => {
                println!("{:<42} {:<26} {}", "Job", "State", "Workload");
                println!("{:-<42} {:-<26} {:-<24}", "", "", "");
                for record in store.list_jobs()? {
                    println!(
                        "{:<42} {:<26} {}",
                        record.job_id,
                        record.job_state.to_string(),
                        record.workload_class
                    );
                }
                for record in store.list_optimizing_jobs()? {
                    println!(
                        "{:<42} {:<26} {} (optimizing)",
                        record.optimizing_job_id,
                        record.job_state.to_string(),
                        record.workload_class
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parameters_infers_types() {
        let parameters = parse_parameters(&[
            "sleep_ms=25".to_string(),
            "ratio=0.5".to_string(),
            "replay_binds=true".to_string(),
            "log_file=access.log".to_string(),
        ])
        .unwrap();
        assert_eq!(parameters.get_integer("sleep_ms"), Some(25));
        assert_eq!(parameters.get_float("ratio"), Some(0.5));
        assert_eq!(parameters.get_boolean("replay_binds"), Some(true));
        assert_eq!(parameters.get_string("log_file"), Some("access.log"));
    }

    #[test]
    fn test_parse_parameters_rejects_bare_names() {
        assert!(parse_parameters(&["oops".to_string()]).is_err());
    }
}
