//! Null workload module
//!
//! Does no real work: each iteration sleeps for a configurable time and
//! counts itself. Useful for exercising the scheduling core, the stop
//! contract, and the statistics pipeline without external dependencies.

use std::thread;
use std::time::Duration;

use crate::domain::entities::Job;
use crate::domain::error::{CoreError, CoreResult};
use crate::domain::stats::{IncrementalTracker, StatTracker, TimeTracker};
use crate::domain::value_objects::{Parameter, ParameterList, ParameterValue};

use super::{ThreadControl, Workload};

/// Tracker holding the number of completed iterations
pub const ITERATIONS_TRACKER: &str = "Iterations Completed";
/// Tracker holding per-iteration durations
pub const ITERATION_TIME_TRACKER: &str = "Iteration Duration";

const SLEEP_MS_PARAMETER: &str = "sleep_ms";
const DEFAULT_SLEEP_MS: i64 = 10;
/// Sleeping longer than this would violate the one-second stop bound
const MAX_SLEEP_MS: i64 = 1000;

/// Workload that sleeps and counts
pub struct NullWorkload {
    sleep_ms: u64,
    iterations: Option<IncrementalTracker>,
    iteration_time: Option<TimeTracker>,
}

impl NullWorkload {
    /// Creates a stub-mode instance
    pub fn new() -> Self {
        Self {
            sleep_ms: DEFAULT_SLEEP_MS as u64,
            iterations: None,
            iteration_time: None,
        }
    }
}

impl Default for NullWorkload {
    fn default() -> Self {
        Self::new()
    }
}

impl Workload for NullWorkload {
    fn class_name(&self) -> &str {
        "NullWorkload"
    }

    fn job_name(&self) -> &str {
        "Null"
    }

    fn short_description(&self) -> &str {
        "Sleeps for a configurable time per iteration and counts iterations"
    }

    fn category_name(&self) -> &str {
        "Utility"
    }

    fn parameter_stubs(&self) -> ParameterList {
        ParameterList::from_parameters(vec![Parameter::new(
            SLEEP_MS_PARAMETER,
            "Sleep Time (ms)",
            ParameterValue::Integer(DEFAULT_SLEEP_MS),
        )])
    }

    fn stat_tracker_stubs(
        &self,
        client_id: &str,
        thread_id: &str,
        collection_interval_secs: u32,
    ) -> Vec<StatTracker> {
        vec![
            StatTracker::Incremental(IncrementalTracker::new(
                client_id,
                thread_id,
                ITERATIONS_TRACKER,
                collection_interval_secs,
            )),
            StatTracker::Time(TimeTracker::new(
                client_id,
                thread_id,
                ITERATION_TIME_TRACKER,
                collection_interval_secs,
            )),
        ]
    }

    fn validate_job_info(&self, job: &Job) -> CoreResult<()> {
        if let Some(sleep_ms) = job.parameters.get_integer(SLEEP_MS_PARAMETER) {
            if !(0..=MAX_SLEEP_MS).contains(&sleep_ms) {
                return Err(CoreError::InvalidValue(format!(
                    "sleep time must be between 0 and {} ms",
                    MAX_SLEEP_MS
                )));
            }
        }
        Ok(())
    }

    fn initialize_thread(
        &mut self,
        client_id: &str,
        thread_id: &str,
        collection_interval_secs: u32,
        parameters: &ParameterList,
    ) -> CoreResult<()> {
        self.sleep_ms = parameters
            .get_integer(SLEEP_MS_PARAMETER)
            .unwrap_or(DEFAULT_SLEEP_MS)
            .clamp(0, MAX_SLEEP_MS) as u64;
        self.iterations = Some(IncrementalTracker::new(
            client_id,
            thread_id,
            ITERATIONS_TRACKER,
            collection_interval_secs,
        ));
        self.iteration_time = Some(TimeTracker::new(
            client_id,
            thread_id,
            ITERATION_TIME_TRACKER,
            collection_interval_secs,
        ));
        Ok(())
    }

    fn run_job(&mut self, control: &ThreadControl) -> CoreResult<()> {
        let iterations = self
            .iterations
            .as_mut()
            .ok_or_else(|| CoreError::UnableToRun("thread was not initialized".to_string()))?;
        let iteration_time = self
            .iteration_time
            .as_mut()
            .ok_or_else(|| CoreError::UnableToRun("thread was not initialized".to_string()))?;

        iterations.start();
        iteration_time.start();
        while !control.should_stop() {
            iteration_time.begin_timing();
            thread::sleep(Duration::from_millis(self.sleep_ms));
            iteration_time.end_timing();
            iterations.increment();
        }
        iterations.stop();
        iteration_time.stop();
        Ok(())
    }

    fn stat_trackers(&self) -> Vec<StatTracker> {
        let mut trackers = Vec::new();
        if let Some(iterations) = &self.iterations {
            trackers.push(StatTracker::Incremental(iterations.clone()));
        }
        if let Some(iteration_time) = &self.iteration_time {
            trackers.push(StatTracker::Time(iteration_time.clone()));
        }
        trackers
    }

    fn finalize_thread(&mut self) {
        if let Some(iterations) = &mut self.iterations {
            iterations.stop();
        }
        if let Some(iteration_time) = &mut self.iteration_time {
            iteration_time.stop();
        }
    }
}
