//! CPU utilization bound algorithm module
//!
//! Optimizes a single statistic like the plain algorithm, but rejects any
//! iteration during which a monitored worker's CPU utilization exceeded the
//! configured bound. CPU data may arrive as the stacked user/system/idle
//! tracker of the bundled resource monitor or as integer-valued per-component
//! gauges; an iteration with no CPU data at all is an error, because the
//! constraint cannot be evaluated.

use std::collections::BTreeMap;

use crate::domain::entities::{Job, OptimizingJob};
use crate::domain::error::{CoreError, CoreResult};
use crate::domain::stats::StatTracker;
use crate::domain::value_objects::{Parameter, ParameterList, ParameterValue};
use crate::workloads::resource_monitor::{CPU_UTILIZATION_TRACKER, CPU_COMPONENTS};
use crate::workloads::Workload;

use super::{
    core_parameter_stubs, searchable_statistics, OptimizationAlgorithm, SearchCore,
};

/// Maximum tolerated utilization percentage on any monitored worker
pub const MAX_UTILIZATION_PARAMETER: &str = "max_utilization";
/// Which utilization component the bound applies to
pub const UTILIZATION_COMPONENT_PARAMETER: &str = "utilization_component";

/// Integer-valued gauge alternatives to the stacked CPU tracker
pub const USER_CPU_TRACKER: &str = "User CPU";
pub const SYSTEM_CPU_TRACKER: &str = "System CPU";
pub const BUSY_CPU_TRACKER: &str = "Busy CPU";

/// Utilization component the bound is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UtilizationComponent {
    Busy,
    User,
    System,
}

impl UtilizationComponent {
    fn from_parameter(value: &str) -> CoreResult<Self> {
        match value {
            "busy" => Ok(UtilizationComponent::Busy),
            "user" => Ok(UtilizationComponent::User),
            "system" => Ok(UtilizationComponent::System),
            other => Err(CoreError::InvalidValue(format!(
                "unknown utilization component '{}'",
                other
            ))),
        }
    }

    fn as_parameter(&self) -> &'static str {
        match self {
            UtilizationComponent::Busy => "busy",
            UtilizationComponent::User => "user",
            UtilizationComponent::System => "system",
        }
    }
}

/// Optimizes a single statistic subject to a CPU utilization bound
pub struct UtilizationBoundAlgorithm {
    core: Option<SearchCore>,
    max_utilization: f64,
    component: UtilizationComponent,
}

impl UtilizationBoundAlgorithm {
    /// Creates an unconfigured instance
    pub fn new() -> Self {
        Self {
            core: None,
            max_utilization: 100.0,
            component: UtilizationComponent::Busy,
        }
    }

    fn core(&self) -> CoreResult<&SearchCore> {
        self.core
            .as_ref()
            .ok_or_else(|| CoreError::Algorithm("algorithm was not initialized".to_string()))
    }

    /// The configured component's utilization for one worker's trackers
    ///
    /// Prefers the stacked tracker; falls back to the integer gauges.
    fn worker_utilization(&self, trackers: &[&StatTracker]) -> Option<f64> {
        for tracker in trackers {
            if let StatTracker::Stacked(stacked) = tracker {
                if stacked.display_name == CPU_UTILIZATION_TRACKER {
                    let value = match self.component {
                        UtilizationComponent::Busy => {
                            stacked.average_value(CPU_COMPONENTS[0])
                                + stacked.average_value(CPU_COMPONENTS[1])
                        }
                        UtilizationComponent::User => stacked.average_value(CPU_COMPONENTS[0]),
                        UtilizationComponent::System => stacked.average_value(CPU_COMPONENTS[1]),
                    };
                    if !value.is_nan() {
                        return Some(value);
                    }
                }
            }
        }

        let gauge = |name: &str| -> Option<f64> {
            trackers
                .iter()
                .find(|tracker| {
                    matches!(tracker, StatTracker::IntegerValue(_))
                        && tracker.display_name() == name
                })
                .map(|tracker| tracker.summary_value())
                .filter(|value| !value.is_nan())
        };
        match self.component {
            UtilizationComponent::Busy => gauge(BUSY_CPU_TRACKER).or_else(|| {
                match (gauge(USER_CPU_TRACKER), gauge(SYSTEM_CPU_TRACKER)) {
                    (Some(user), Some(system)) => Some(user + system),
                    _ => None,
                }
            }),
            UtilizationComponent::User => gauge(USER_CPU_TRACKER),
            UtilizationComponent::System => gauge(SYSTEM_CPU_TRACKER),
        }
    }

    /// Checks the utilization bound across all monitored workers
    ///
    /// Returns false when some worker exceeded the bound; raises when no
    /// worker reported CPU data at all.
    fn within_utilization_bound(&self, iteration: &Job) -> CoreResult<bool> {
        let monitor_stats = iteration.monitor_stats();
        let mut by_worker: BTreeMap<String, Vec<&StatTracker>> = BTreeMap::new();
        for tracker in &monitor_stats {
            by_worker
                .entry(tracker.client_id().to_string())
                .or_default()
                .push(tracker);
        }

        let mut cpu_data_seen = false;
        for (worker, trackers) in &by_worker {
            if let Some(utilization) = self.worker_utilization(trackers) {
                cpu_data_seen = true;
                if utilization > self.max_utilization {
                    tracing::debug!(
                        worker = %worker,
                        utilization,
                        bound = self.max_utilization,
                        "iteration rejected by utilization bound"
                    );
                    return Ok(false);
                }
            }
        }

        if !cpu_data_seen {
            return Err(CoreError::Algorithm(format!(
                "iteration {} carries no CPU utilization data to check",
                iteration.job_id
            )));
        }
        Ok(true)
    }
}

impl Default for UtilizationBoundAlgorithm {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizationAlgorithm for UtilizationBoundAlgorithm {
    fn name(&self) -> &str {
        "SingleStatisticWithCpuBound"
    }

    fn new_instance(&self) -> Box<dyn OptimizationAlgorithm> {
        Box::new(UtilizationBoundAlgorithm::new())
    }

    fn available_with_workload(&self, workload: &dyn Workload) -> bool {
        !searchable_statistics(workload).is_empty()
    }

    fn parameter_stubs(&self, workload: &dyn Workload) -> ParameterList {
        let mut stubs = core_parameter_stubs(workload);
        stubs.set(Parameter::new(
            MAX_UTILIZATION_PARAMETER,
            "Maximum CPU Utilization (%)",
            ParameterValue::Integer(100),
        ));
        stubs.set(Parameter::new(
            UTILIZATION_COMPONENT_PARAMETER,
            "Utilization Component",
            ParameterValue::Choice {
                selected: "busy".to_string(),
                options: vec![
                    "busy".to_string(),
                    "user".to_string(),
                    "system".to_string(),
                ],
            },
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
            MAX_UTILIZATION_PARAMETER,
            "Maximum CPU Utilization (%)",
            ParameterValue::Float(self.max_utilization),
        ));
        parameters.set(Parameter::new(
            UTILIZATION_COMPONENT_PARAMETER,
            "Utilization Component",
            ParameterValue::Text(self.component.as_parameter().to_string()),
        ));
        parameters
    }

    fn initialize(
        &mut self,
        _optimizing_job: &OptimizingJob,
        parameters: &ParameterList,
    ) -> CoreResult<()> {
        let core = SearchCore::from_parameters(parameters)?;
        let max_utilization = parameters
            .get_float(MAX_UTILIZATION_PARAMETER)
            .unwrap_or(100.0);
        if !(0.0..=100.0).contains(&max_utilization) {
            return Err(CoreError::InvalidValue(
                "maximum utilization must be between 0 and 100 percent".to_string(),
            ));
        }
        self.component = UtilizationComponent::from_parameter(
            parameters
                .get_string(UTILIZATION_COMPONENT_PARAMETER)
                .unwrap_or("busy"),
        )?;
        self.max_utilization = max_utilization;
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
        if !self.within_utilization_bound(iteration)? {
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
