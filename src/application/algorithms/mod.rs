//! Optimization algorithm capability module
//!
//! An optimization algorithm is the pluggable policy behind an optimizing
//! job: given the statistical output of one completed iteration, it decides
//! whether that iteration is the best seen so far. All bundled algorithms
//! share one comparison core (maximize or minimize a searchable statistic,
//! with an optional minimum percent improvement) and differ only in the
//! admission filter applied before the comparison.

pub mod paired_statistic;
pub mod replication_latency;
pub mod single_statistic;
pub mod utilization;

pub use paired_statistic::PairedStatisticAlgorithm;
pub use replication_latency::ReplicationLatencyAlgorithm;
pub use single_statistic::SingleStatisticAlgorithm;
pub use utilization::UtilizationBoundAlgorithm;

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::entities::{Job, OptimizingJob};
use crate::domain::error::{CoreError, CoreResult};
use crate::domain::value_objects::{Parameter, ParameterList, ParameterValue};
use crate::workloads::Workload;

/// Name of the statistic being optimized
pub const OPTIMIZE_STATISTIC_PARAMETER: &str = "optimize_statistic";
/// Direction of the optimization
pub const OPTIMIZE_TYPE_PARAMETER: &str = "optimize_type";
/// Minimum fractional improvement over the best before a value counts
pub const MIN_PCT_IMPROVEMENT_PARAMETER: &str = "min_pct_improvement";

/// Direction of the optimization comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeType {
    Maximize,
    Minimize,
}

impl OptimizeType {
    /// Parses the parameter value; unknown strings are invalid
    pub fn from_parameter(value: &str) -> CoreResult<Self> {
        match value {
            "maximize" => Ok(OptimizeType::Maximize),
            "minimize" => Ok(OptimizeType::Minimize),
            other => Err(CoreError::InvalidValue(format!(
                "unknown optimize type '{}'",
                other
            ))),
        }
    }

    /// The parameter value naming this direction
    pub fn as_parameter(&self) -> &'static str {
        match self {
            OptimizeType::Maximize => "maximize",
            OptimizeType::Minimize => "minimize",
        }
    }
}

/// The comparison core shared by all bundled algorithms
///
/// Holds the optimize statistic, the direction, the improvement floor, and
/// the running best value. The best starts as NaN; the first real value
/// always wins, and NaN values never win.
#[derive(Debug, Clone)]
pub struct SearchCore {
    pub statistic: String,
    pub optimize_type: OptimizeType,
    pub min_pct_improvement: f64,
    pub best_value: f64,
}

impl SearchCore {
    /// Builds the core from algorithm parameters
    pub fn from_parameters(parameters: &ParameterList) -> CoreResult<Self> {
        let statistic = parameters
            .get_string(OPTIMIZE_STATISTIC_PARAMETER)
            .unwrap_or("")
            .to_string();
        if statistic.is_empty() {
            return Err(CoreError::InvalidValue(
                "no optimize statistic configured".to_string(),
            ));
        }
        let optimize_type = OptimizeType::from_parameter(
            parameters
                .get_string(OPTIMIZE_TYPE_PARAMETER)
                .unwrap_or("maximize"),
        )?;
        let min_pct_improvement = parameters
            .get_float(MIN_PCT_IMPROVEMENT_PARAMETER)
            .unwrap_or(0.0);
        if min_pct_improvement < 0.0 {
            return Err(CoreError::InvalidValue(
                "minimum percent improvement must not be negative".to_string(),
            ));
        }
        Ok(Self {
            statistic,
            optimize_type,
            min_pct_improvement,
            best_value: f64::NAN,
        })
    }

    /// True when the value beats the current best
    pub fn beats_best(&self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        if self.best_value.is_nan() {
            return true;
        }
        let margin = self.best_value * self.min_pct_improvement;
        match self.optimize_type {
            OptimizeType::Maximize => {
                value > self.best_value && value > self.best_value + margin
            }
            OptimizeType::Minimize => {
                value < self.best_value && value < self.best_value - margin
            }
        }
    }

    /// Records the value, returning true when it became the new best
    pub fn observe(&mut self, value: f64) -> bool {
        if self.beats_best(value) {
            self.best_value = value;
            true
        } else {
            false
        }
    }

    /// The summary value of the optimize statistic for one iteration
    pub fn iteration_value(&self, iteration: &Job) -> CoreResult<f64> {
        summary_of(&iteration.aggregated_stats(), &self.statistic).ok_or_else(|| {
            CoreError::Algorithm(format!(
                "iteration {} reported no data for statistic '{}'",
                iteration.job_id, self.statistic
            ))
        })
    }

    /// Renders the core back into parameter form
    pub fn to_parameters(&self) -> ParameterList {
        ParameterList::from_parameters(vec![
            Parameter::new(
                OPTIMIZE_STATISTIC_PARAMETER,
                "Statistic to Optimize",
                ParameterValue::Text(self.statistic.clone()),
            ),
            Parameter::new(
                OPTIMIZE_TYPE_PARAMETER,
                "Optimization Type",
                ParameterValue::Choice {
                    selected: self.optimize_type.as_parameter().to_string(),
                    options: vec!["maximize".to_string(), "minimize".to_string()],
                },
            ),
            Parameter::new(
                MIN_PCT_IMPROVEMENT_PARAMETER,
                "Minimum Percent Improvement",
                ParameterValue::Float(self.min_pct_improvement),
            ),
        ])
    }
}

/// Summary value of the named searchable statistic, if present
pub fn summary_of(trackers: &[crate::domain::stats::StatTracker], statistic: &str) -> Option<f64> {
    trackers
        .iter()
        .find(|tracker| tracker.is_searchable() && tracker.display_name() == statistic)
        .map(|tracker| tracker.summary_value())
}

/// Names of the searchable statistics a workload will report
pub fn searchable_statistics(workload: &dyn Workload) -> Vec<String> {
    workload
        .stat_tracker_stubs("stub", "0", 1)
        .iter()
        .filter(|stub| stub.is_searchable())
        .map(|stub| stub.display_name().to_string())
        .collect()
}

/// Shared parameter stubs for the comparison core
pub fn core_parameter_stubs(workload: &dyn Workload) -> ParameterList {
    let statistics = searchable_statistics(workload);
    let selected = statistics.first().cloned().unwrap_or_default();
    ParameterList::from_parameters(vec![
        Parameter::new(
            OPTIMIZE_STATISTIC_PARAMETER,
            "Statistic to Optimize",
            ParameterValue::Choice {
                selected,
                options: statistics,
            },
        )
        .required(),
        Parameter::new(
            OPTIMIZE_TYPE_PARAMETER,
            "Optimization Type",
            ParameterValue::Choice {
                selected: "maximize".to_string(),
                options: vec!["maximize".to_string(), "minimize".to_string()],
            },
        ),
        Parameter::new(
            MIN_PCT_IMPROVEMENT_PARAMETER,
            "Minimum Percent Improvement",
            ParameterValue::Float(0.0),
        ),
    ])
}

/// The contract every optimization algorithm implements
pub trait OptimizationAlgorithm: Send {
    /// Registry key and display name
    fn name(&self) -> &str;

    /// Creates a fresh, uninitialized instance of the same algorithm
    fn new_instance(&self) -> Box<dyn OptimizationAlgorithm>;

    /// True when the workload reports enough searchable statistics
    fn available_with_workload(&self, workload: &dyn Workload) -> bool;

    /// Schema of the parameters this algorithm accepts for a workload
    fn parameter_stubs(&self, workload: &dyn Workload) -> ParameterList;

    /// The configured parameter values, for notifications and persistence
    fn parameters(&self) -> ParameterList;

    /// Configures the algorithm for one optimizing job
    ///
    /// Fails with an invalid-value error on inconsistent parameters. The
    /// caller replays any already-completed iterations afterwards to restore
    /// the running best.
    fn initialize(
        &mut self,
        optimizing_job: &OptimizingJob,
        parameters: &ParameterList,
    ) -> CoreResult<()>;

    /// Clears the running best while keeping the parameters
    fn re_initialize(&mut self);

    /// Decides whether the iteration is the best seen so far
    ///
    /// May fail when required data is missing, which halts the optimizing
    /// job immediately.
    fn is_best_iteration_so_far(&mut self, iteration: &Job) -> CoreResult<bool>;

    /// The iteration's value of the optimize statistic
    fn get_iteration_optimization_value(&self, iteration: &Job) -> CoreResult<f64>;

    /// The running best value; NaN before any iteration won
    fn best_value(&self) -> f64;

    /// Restores the running best from a persisted snapshot
    fn restore_best_value(&mut self, value: f64);
}

/// Factory producing fresh algorithm instances
pub type AlgorithmFactory = Arc<dyn Fn() -> Box<dyn OptimizationAlgorithm> + Send + Sync>;

/// Registry mapping algorithm names to factories
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    factories: HashMap<String, AlgorithmFactory>,
}

impl AlgorithmRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the bundled algorithms
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(|| {
            Box::new(SingleStatisticAlgorithm::new()) as Box<dyn OptimizationAlgorithm>
        }));
        registry.register(Arc::new(|| {
            Box::new(UtilizationBoundAlgorithm::new()) as Box<dyn OptimizationAlgorithm>
        }));
        registry.register(Arc::new(|| {
            Box::new(ReplicationLatencyAlgorithm::new()) as Box<dyn OptimizationAlgorithm>
        }));
        registry.register(Arc::new(|| {
            Box::new(PairedStatisticAlgorithm::new()) as Box<dyn OptimizationAlgorithm>
        }));
        registry
    }

    /// Registers a factory under the name of the instances it builds
    pub fn register(&mut self, factory: AlgorithmFactory) {
        let name = factory().name().to_string();
        self.factories.insert(name, factory);
    }

    /// Instantiates an algorithm by name
    pub fn create(&self, name: &str) -> Option<Box<dyn OptimizationAlgorithm>> {
        self.factories.get(name).map(|factory| factory())
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of the algorithms available for a workload
    pub fn available_for(&self, workload: &dyn Workload) -> Vec<String> {
        self.names()
            .into_iter()
            .filter(|name| {
                self.create(name)
                    .map(|algorithm| algorithm.available_with_workload(workload))
                    .unwrap_or(false)
            })
            .collect()
    }
}
