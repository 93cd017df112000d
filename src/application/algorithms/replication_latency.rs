//! Replication latency bound algorithm module
//!
//! Optimizes a single statistic, but rejects iterations that pushed
//! replication too hard: either the average replication latency reported by
//! the latency monitors exceeded the configured bound, or latency grew from
//! the first quarter of the run to the last quarter by more than the
//! configured percentage, which indicates a replication backlog building up.

use crate::domain::entities::{Job, OptimizingJob};
use crate::domain::error::{CoreError, CoreResult};
use crate::domain::stats::{StatTracker, TimeTracker};
use crate::domain::value_objects::{Parameter, ParameterList, ParameterValue};
use crate::workloads::Workload;

use super::{
    core_parameter_stubs, searchable_statistics, OptimizationAlgorithm, SearchCore,
};

/// Tracker the replication-latency monitor reports
pub const REPLICATION_LATENCY_TRACKER: &str = "Replication Latency";

/// Maximum tolerated average latency in milliseconds
pub const MAX_LATENCY_PARAMETER: &str = "max_latency_ms";
/// Maximum tolerated first-to-last-quarter latency increase in percent
pub const MAX_INCREASE_PARAMETER: &str = "max_increase_pct";

/// Optimizes a single statistic subject to replication-latency bounds
pub struct ReplicationLatencyAlgorithm {
    core: Option<SearchCore>,
    max_latency_ms: f64,
    max_increase_pct: f64,
}

impl ReplicationLatencyAlgorithm {
    /// Creates an unconfigured instance
    pub fn new() -> Self {
        Self {
            core: None,
            max_latency_ms: f64::MAX,
            max_increase_pct: f64::MAX,
        }
    }

    fn core(&self) -> CoreResult<&SearchCore> {
        self.core
            .as_ref()
            .ok_or_else(|| CoreError::Algorithm("algorithm was not initialized".to_string()))
    }

    /// Merges every monitor's latency tracker into one view
    fn combined_latency(&self, iteration: &Job) -> CoreResult<TimeTracker> {
        let mut combined: Option<TimeTracker> = None;
        for tracker in iteration.monitor_stats() {
            if let StatTracker::Time(latency) = &tracker {
                if latency.display_name == REPLICATION_LATENCY_TRACKER {
                    match &mut combined {
                        Some(combined) => combined.aggregate(latency),
                        None => combined = Some(latency.clone()),
                    }
                }
            }
        }
        combined.ok_or_else(|| {
            CoreError::Algorithm(format!(
                "iteration {} carries no replication latency data to check",
                iteration.job_id
            ))
        })
    }

    /// Checks the latency bounds; false means the iteration is rejected
    fn within_latency_bounds(&self, iteration: &Job) -> CoreResult<bool> {
        let latency = self.combined_latency(iteration)?;

        let average = latency.average_duration_ms();
        if average.is_nan() {
            return Err(CoreError::Algorithm(format!(
                "iteration {} reported an empty replication latency tracker",
                iteration.job_id
            )));
        }
        if average > self.max_latency_ms {
            tracing::debug!(
                average,
                bound = self.max_latency_ms,
                "iteration rejected by average replication latency"
            );
            return Ok(false);
        }

        // Compare the first quarter of intervals against the last quarter;
        // a large increase means replication was falling behind even if the
        // average stayed acceptable.
        let intervals = latency.num_intervals();
        let quarter = (intervals / 4).max(1);
        if intervals >= 2 {
            let first = latency.average_duration_in_range(0, quarter);
            let last = latency.average_duration_in_range(intervals - quarter, intervals);
            if !first.is_nan() && !last.is_nan() && first > 0.0 {
                let increase_pct = (last - first) / first * 100.0;
                if increase_pct > self.max_increase_pct {
                    tracing::debug!(
                        increase_pct,
                        bound = self.max_increase_pct,
                        "iteration rejected by replication latency growth"
                    );
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

impl Default for ReplicationLatencyAlgorithm {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizationAlgorithm for ReplicationLatencyAlgorithm {
    fn name(&self) -> &str {
        "SingleStatisticWithReplicationLatencyBound"
    }

    fn new_instance(&self) -> Box<dyn OptimizationAlgorithm> {
        Box::new(ReplicationLatencyAlgorithm::new())
    }

    fn available_with_workload(&self, workload: &dyn Workload) -> bool {
        !searchable_statistics(workload).is_empty()
    }

    fn parameter_stubs(&self, workload: &dyn Workload) -> ParameterList {
        let mut stubs = core_parameter_stubs(workload);
        stubs.set(Parameter::new(
            MAX_LATENCY_PARAMETER,
            "Maximum Replication Latency (ms)",
            ParameterValue::Float(1000.0),
        ));
        stubs.set(Parameter::new(
            MAX_INCREASE_PARAMETER,
            "Maximum Latency Increase (%)",
            ParameterValue::Float(100.0),
        ));
        stubs
    }

    fn parameters(&self) -> ParameterList {
        let mut parameters = self
            .core
            .as_ref()
            .map(SearchCore::to_parameters)
            .unwrap_or_default();
        parameters.set(Parameter::new(
            MAX_LATENCY_PARAMETER,
            "Maximum Replication Latency (ms)",
            ParameterValue::Float(self.max_latency_ms),
        ));
        parameters.set(Parameter::new(
            MAX_INCREASE_PARAMETER,
            "Maximum Latency Increase (%)",
            ParameterValue::Float(self.max_increase_pct),
        ));
        parameters
    }

    fn initialize(
        &mut self,
        _optimizing_job: &OptimizingJob,
        parameters: &ParameterList,
    ) -> CoreResult<()> {
        let core = SearchCore::from_parameters(parameters)?;
        let max_latency_ms = parameters.get_float(MAX_LATENCY_PARAMETER).unwrap_or(f64::MAX);
        if max_latency_ms <= 0.0 {
            return Err(CoreError::InvalidValue(
                "maximum replication latency must be positive".to_string(),
            ));
        }
        let max_increase_pct = parameters
            .get_float(MAX_INCREASE_PARAMETER)
            .unwrap_or(f64::MAX);
        if max_increase_pct < 0.0 {
            return Err(CoreError::InvalidValue(
                "maximum latency increase must not be negative".to_string(),
            ));
        }
        self.max_latency_ms = max_latency_ms;
        self.max_increase_pct = max_increase_pct;
        self.core = Some(core);
        Ok(())
    }

    fn re_initialize(&mut self) {
        if let Some(core) = &mut self.core {
            core.best_value = f64::NAN;
        }
    }

    fn is_best_iteration_so_far(&mut self, iteration: &Job) -> CoreResult<bool> {
        self.core()?;
        if !self.within_latency_bounds(iteration)? {
            return Ok(false);
        }
        let value = self.core()?.iteration_value(iteration)?;
        let core = self
            .core
            .as_mut()
            .ok_or_else(|| CoreError::Algorithm("algorithm was not initialized".to_string()))?;
        Ok(core.observe(value))
    }

    fn get_iteration_optimization_value(&self, iteration: &Job) -> CoreResult<f64> {
        self.core()?.iteration_value(iteration)
    }

    fn best_value(&self) -> f64 {
        self.core.as_ref().map_or(f64::NAN, |core| core.best_value)
    }

    fn restore_best_value(&mut self, value: f64) {
        if let Some(core) = &mut self.core {
            core.best_value = value;
        }
    }
}
