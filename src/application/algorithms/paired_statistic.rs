//! Paired statistic algorithm module
//!
//! Optimizes one statistic while constraining another from the same
//! workload: an iteration only qualifies when the constraint statistic's
//! summary stays on the right side of a fixed threshold, for example
//! maximize operations per second while average latency stays below a
//! bound. The constraint statistic must differ from the optimize statistic.

use crate::domain::entities::{Job, OptimizingJob};
use crate::domain::error::{CoreError, CoreResult};
use crate::domain::value_objects::{Parameter, ParameterList, ParameterValue};
use crate::workloads::Workload;

use super::{
    core_parameter_stubs, searchable_statistics, summary_of, OptimizationAlgorithm, SearchCore,
};

/// Name of the constrained statistic
pub const CONSTRAINT_STATISTIC_PARAMETER: &str = "constraint_statistic";
/// Direction of the constraint predicate
pub const CONSTRAINT_TYPE_PARAMETER: &str = "constraint_type";
/// Threshold of the constraint predicate
pub const CONSTRAINT_VALUE_PARAMETER: &str = "constraint_value";

/// Direction of the constraint predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConstraintType {
    /// The constraint statistic must not exceed the threshold
    NoGreaterThan,
    /// The constraint statistic must not fall below the threshold
    NoLessThan,
}

impl ConstraintType {
    fn from_parameter(value: &str) -> CoreResult<Self> {
        match value {
            "no-greater-than" => Ok(ConstraintType::NoGreaterThan),
            "no-less-than" => Ok(ConstraintType::NoLessThan),
            other => Err(CoreError::InvalidValue(format!(
                "unknown constraint type '{}'",
                other
            ))),
        }
    }

    fn as_parameter(&self) -> &'static str {
        match self {
            ConstraintType::NoGreaterThan => "no-greater-than",
            ConstraintType::NoLessThan => "no-less-than",
        }
    }
}

/// Optimizes one statistic subject to a bound on a second statistic
pub struct PairedStatisticAlgorithm {
    core: Option<SearchCore>,
    constraint_statistic: String,
    constraint_type: ConstraintType,
    constraint_value: f64,
}

impl PairedStatisticAlgorithm {
    /// Creates an unconfigured instance
    pub fn new() -> Self {
        Self {
            core: None,
            constraint_statistic: String::new(),
            constraint_type: ConstraintType::NoGreaterThan,
            constraint_value: 0.0,
        }
    }

    fn core(&self) -> CoreResult<&SearchCore> {
        self.core
            .as_ref()
            .ok_or_else(|| CoreError::Algorithm("algorithm was not initialized".to_string()))
    }

    /// Checks the constraint; false means the iteration is rejected
    fn satisfies_constraint(&self, iteration: &Job) -> CoreResult<bool> {
        let value = summary_of(&iteration.aggregated_stats(), &self.constraint_statistic)
            .ok_or_else(|| {
                CoreError::Algorithm(format!(
                    "iteration {} reported no data for constraint statistic '{}'",
                    iteration.job_id, self.constraint_statistic
                ))
            })?;
        if value.is_nan() {
            return Err(CoreError::Algorithm(format!(
                "constraint statistic '{}' has no summary value",
                self.constraint_statistic
            )));
        }
        let satisfied = match self.constraint_type {
            ConstraintType::NoGreaterThan => value <= self.constraint_value,
            ConstraintType::NoLessThan => value >= self.constraint_value,
        };
        if !satisfied {
            tracing::debug!(
                statistic = %self.constraint_statistic,
                value,
                threshold = self.constraint_value,
                "iteration rejected by paired constraint"
            );
        }
        Ok(satisfied)
    }
}

impl Default for PairedStatisticAlgorithm {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizationAlgorithm for PairedStatisticAlgorithm {
    fn name(&self) -> &str {
        "PairedStatistic"
    }

    fn new_instance(&self) -> Box<dyn OptimizationAlgorithm> {
        Box::new(PairedStatisticAlgorithm::new())
    }

    fn available_with_workload(&self, workload: &dyn Workload) -> bool {
        // Two distinct searchable statistics: one to optimize, one to bound.
        searchable_statistics(workload).len() >= 2
    }

    fn parameter_stubs(&self, workload: &dyn Workload) -> ParameterList {
        let statistics = searchable_statistics(workload);
        let mut stubs = core_parameter_stubs(workload);
        stubs.set(
            Parameter::new(
                CONSTRAINT_STATISTIC_PARAMETER,
                "Statistic to Constrain",
                ParameterValue::Choice {
                    selected: statistics.get(1).cloned().unwrap_or_default(),
                    options: statistics,
                },
            )
            .required(),
        );
        stubs.set(Parameter::new(
            CONSTRAINT_TYPE_PARAMETER,
            "Constraint Type",
            ParameterValue::Choice {
                selected: "no-greater-than".to_string(),
                options: vec![
                    "no-greater-than".to_string(),
                    "no-less-than".to_string(),
                ],
            },
        ));
        stubs.set(Parameter::new(
            CONSTRAINT_VALUE_PARAMETER,
            "Constraint Threshold",
            ParameterValue::Float(0.0),
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
            CONSTRAINT_STATISTIC_PARAMETER,
            "Statistic to Constrain",
            ParameterValue::Text(self.constraint_statistic.clone()),
        ));
        parameters.set(Parameter::new(
            CONSTRAINT_TYPE_PARAMETER,
            "Constraint Type",
            ParameterValue::Text(self.constraint_type.as_parameter().to_string()),
        ));
        parameters.set(Parameter::new(
            CONSTRAINT_VALUE_PARAMETER,
            "Constraint Threshold",
            ParameterValue::Float(self.constraint_value),
        ));
        parameters
    }

    fn initialize(
        &mut self,
        _optimizing_job: &OptimizingJob,
        parameters: &ParameterList,
    ) -> CoreResult<()> {
        let core = SearchCore::from_parameters(parameters)?;
        let constraint_statistic = parameters
            .get_string(CONSTRAINT_STATISTIC_PARAMETER)
            .unwrap_or("")
            .to_string();
        if constraint_statistic.is_empty() {
            return Err(CoreError::InvalidValue(
                "no constraint statistic configured".to_string(),
            ));
        }
        if constraint_statistic == core.statistic {
            return Err(CoreError::InvalidValue(
                "the constraint statistic must differ from the optimize statistic".to_string(),
            ));
        }
        self.constraint_type = ConstraintType::from_parameter(
            parameters
                .get_string(CONSTRAINT_TYPE_PARAMETER)
                .unwrap_or("no-greater-than"),
        )?;
        self.constraint_value = parameters
            .get_float(CONSTRAINT_VALUE_PARAMETER)
            .ok_or_else(|| {
                CoreError::InvalidValue("no constraint threshold configured".to_string())
            })?;
        self.constraint_statistic = constraint_statistic;
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
        if !self.satisfies_constraint(iteration)? {
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

#[cfg(test)]
mod tests {
    use super::super::test_support::{
        incremental_with_rate, iteration_with_trackers, maximize_parameters, timer_with_average,
    };
    use super::*;
    use crate::domain::value_objects::JobId;

    fn initialized() -> PairedStatisticAlgorithm {
        let mut algorithm = PairedStatisticAlgorithm::new();
        let optimizing_job =
            OptimizingJob::new(JobId::from("20260101000000-abc1231"), "NullWorkload");
        let mut parameters = maximize_parameters("Operations");
        parameters.set(Parameter::new(
            CONSTRAINT_STATISTIC_PARAMETER,
            "Statistic to Constrain",
            ParameterValue::Text("Operation Duration".to_string()),
        ));
        parameters.set(Parameter::new(
            CONSTRAINT_TYPE_PARAMETER,
            "Constraint Type",
            ParameterValue::Text("no-greater-than".to_string()),
        ));
        parameters.set(Parameter::new(
            CONSTRAINT_VALUE_PARAMETER,
            "Constraint Threshold",
            ParameterValue::Float(50.0),
        ));
        algorithm.initialize(&optimizing_job, &parameters).unwrap();
        algorithm
    }

    fn iteration(id: &str, ops_per_sec: f64, latency_ms: f64) -> Job {
        iteration_with_trackers(
            id,
            vec![
                incremental_with_rate("client-1", "Operations", ops_per_sec),
                timer_with_average("client-1", "Operation Duration", latency_ms),
            ],
            Vec::new(),
        )
    }

    #[test]
    fn test_constraint_filters_fast_but_slow_iterations() {
        let mut algorithm = initialized();
        // ops=100 lat=20, ops=200 lat=45, ops=250 lat=60: the third is
        // filtered out by the latency bound, so the second stays best.
        assert!(algorithm
            .is_best_iteration_so_far(&iteration("20260101000000-abc1231-1", 100.0, 20.0))
            .unwrap());
        assert!(algorithm
            .is_best_iteration_so_far(&iteration("20260101000000-abc1231-2", 200.0, 45.0))
            .unwrap());
        assert!(!algorithm
            .is_best_iteration_so_far(&iteration("20260101000000-abc1231-3", 250.0, 60.0))
            .unwrap());
        assert!((algorithm.best_value() - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_less_than_constraint() {
        let mut algorithm = PairedStatisticAlgorithm::new();
        let optimizing_job =
            OptimizingJob::new(JobId::from("20260101000000-abc1231"), "NullWorkload");
        let mut parameters = maximize_parameters("Operations");
        parameters.set(Parameter::new(
            CONSTRAINT_STATISTIC_PARAMETER,
            "Statistic to Constrain",
            ParameterValue::Text("Operation Duration".to_string()),
        ));
        parameters.set(Parameter::new(
            CONSTRAINT_TYPE_PARAMETER,
            "Constraint Type",
            ParameterValue::Text("no-less-than".to_string()),
        ));
        parameters.set(Parameter::new(
            CONSTRAINT_VALUE_PARAMETER,
            "Constraint Threshold",
            ParameterValue::Float(10.0),
        ));
        algorithm.initialize(&optimizing_job, &parameters).unwrap();

        assert!(!algorithm
            .is_best_iteration_so_far(&iteration("20260101000000-abc1231-1", 100.0, 5.0))
            .unwrap());
        assert!(algorithm
            .is_best_iteration_so_far(&iteration("20260101000000-abc1231-2", 100.0, 15.0))
            .unwrap());
    }

    #[test]
    fn test_same_statistic_for_both_roles_is_invalid() {
        let mut algorithm = PairedStatisticAlgorithm::new();
        let optimizing_job =
            OptimizingJob::new(JobId::from("20260101000000-abc1231"), "NullWorkload");
        let mut parameters = maximize_parameters("Operations");
        parameters.set(Parameter::new(
            CONSTRAINT_STATISTIC_PARAMETER,
            "Statistic to Constrain",
            ParameterValue::Text("Operations".to_string()),
        ));
        parameters.set(Parameter::new(
            CONSTRAINT_VALUE_PARAMETER,
            "Constraint Threshold",
            ParameterValue::Float(50.0),
        ));
        assert!(algorithm.initialize(&optimizing_job, &parameters).is_err());
    }

    #[test]
    fn test_missing_constraint_data_raises() {
        let mut algorithm = initialized();
        let bare = iteration_with_trackers(
            "20260101000000-abc1231-1",
            vec![incremental_with_rate("client-1", "Operations", 100.0)],
            Vec::new(),
        );
        assert!(algorithm.is_best_iteration_so_far(&bare).is_err());
    }
}
