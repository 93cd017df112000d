//! Single statistic algorithm module
//!
//! The plain hill-climbing policy: an iteration is best when its value of
//! the optimize statistic beats the running best, with no admission filter.

use crate::domain::entities::{Job, OptimizingJob};
use crate::domain::error::{CoreError, CoreResult};
use crate::domain::value_objects::ParameterList;
use crate::workloads::Workload;

use super::{
    core_parameter_stubs, searchable_statistics, OptimizationAlgorithm, SearchCore,
};

/// Optimizes a single searchable statistic
pub struct SingleStatisticAlgorithm {
    core: Option<SearchCore>,
}

impl SingleStatisticAlgorithm {
    /// Creates an unconfigured instance
    pub fn new() -> Self {
        Self { core: None }
    }

    fn core(&self) -> CoreResult<&SearchCore> {
        self.core
            .as_ref()
            .ok_or_else(|| CoreError::Algorithm("algorithm was not initialized".to_string()))
    }
}

impl Default for SingleStatisticAlgorithm {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizationAlgorithm for SingleStatisticAlgorithm {
    fn name(&self) -> &str {
        "SingleStatistic"
    }

    fn new_instance(&self) -> Box<dyn OptimizationAlgorithm> {
        Box::new(SingleStatisticAlgorithm::new())
    }

    fn available_with_workload(&self, workload: &dyn Workload) -> bool {
        !searchable_statistics(workload).is_empty()
    }

    fn parameter_stubs(&self, workload: &dyn Workload) -> ParameterList {
        core_parameter_stubs(workload)
    }

    fn parameters(&self) -> ParameterList {
        self.core
            .as_ref()
            .map(SearchCore::to_parameters)
            .unwrap_or_default()
    }

    fn initialize(
        &mut self,
        _optimizing_job: &OptimizingJob,
        parameters: &ParameterList,
    ) -> CoreResult<()> {
        self.core = Some(SearchCore::from_parameters(parameters)?);
        Ok(())
    }

    fn re_initialize(&mut self) {
        if let Some(core) = &mut self.core {
            core.best_value = f64::NAN;
        }
    }

    fn is_best_iteration_so_far(&mut self, iteration: &Job) -> CoreResult<bool> {
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
    use super::super::test_support::{iteration_with_rate, maximize_parameters};
    use super::*;
    use crate::domain::value_objects::JobId;

    fn initialized() -> SingleStatisticAlgorithm {
        let mut algorithm = SingleStatisticAlgorithm::new();
        let optimizing_job =
            OptimizingJob::new(JobId::from("20260101000000-abc1231"), "NullWorkload");
        algorithm
            .initialize(&optimizing_job, &maximize_parameters("Operations"))
            .unwrap();
        algorithm
    }

    #[test]
    fn test_first_iteration_is_best() {
        let mut algorithm = initialized();
        let iteration = iteration_with_rate("20260101000000-abc1231-1", "Operations", 10.0);
        assert!(algorithm.is_best_iteration_so_far(&iteration).unwrap());
        assert!((algorithm.best_value() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_equal_value_is_not_best() {
        let mut algorithm = initialized();
        let first = iteration_with_rate("20260101000000-abc1231-1", "Operations", 50.0);
        let second = iteration_with_rate("20260101000000-abc1231-2", "Operations", 50.0);
        assert!(algorithm.is_best_iteration_so_far(&first).unwrap());
        assert!(!algorithm.is_best_iteration_so_far(&second).unwrap());
    }

    #[test]
    fn test_missing_statistic_raises() {
        let mut algorithm = initialized();
        let iteration = iteration_with_rate("20260101000000-abc1231-1", "Other", 10.0);
        assert!(algorithm.is_best_iteration_so_far(&iteration).is_err());
    }

    #[test]
    fn test_re_initialize_clears_best_but_keeps_parameters() {
        let mut algorithm = initialized();
        let iteration = iteration_with_rate("20260101000000-abc1231-1", "Operations", 10.0);
        algorithm.is_best_iteration_so_far(&iteration).unwrap();
        algorithm.re_initialize();
        assert!(algorithm.best_value().is_nan());
        // Still initialized: the same iteration wins again.
        assert!(algorithm.is_best_iteration_so_far(&iteration).unwrap());
    }

    #[test]
    fn test_missing_optimize_statistic_is_invalid() {
        let mut algorithm = SingleStatisticAlgorithm::new();
        let optimizing_job =
            OptimizingJob::new(JobId::from("20260101000000-abc1231"), "NullWorkload");
        assert!(algorithm
            .initialize(&optimizing_job, &ParameterList::new())
            .is_err());
    }
}
