//! Stacked value tracker module
//!
//! Tracks several named components that share the same interval boundaries,
//! such as user/system/idle CPU time. Each interval records one sample sum
//! per component plus the shared sample count, so per-component averages
//! stay meaningful after aggregation across workers.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Named components sampled against shared interval buckets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackedValueTracker {
    /// Worker that collected the data
    pub client_id: String,
    /// Thread that collected the data
    pub thread_id: String,
    /// Statistic name shown to users and used for aggregation matching
    pub display_name: String,
    /// Width of one collection interval in seconds
    pub collection_interval_secs: u32,
    /// Component names, fixed at construction
    components: Vec<String>,
    /// Per interval, one sample sum per component
    sums: Vec<Vec<f64>>,
    /// Number of samples per interval, shared by all components
    counts: Vec<u64>,
    /// Live-collection start instant; never persisted
    #[serde(skip)]
    started: Option<Instant>,
}

impl StackedValueTracker {
    /// Creates an empty tracker with the given component names
    pub fn new(
        client_id: &str,
        thread_id: &str,
        display_name: &str,
        collection_interval_secs: u32,
        components: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            thread_id: thread_id.to_string(),
            display_name: display_name.to_string(),
            collection_interval_secs: collection_interval_secs.max(1),
            components,
            sums: Vec::new(),
            counts: Vec::new(),
            started: None,
        }
    }

    /// Begins live collection
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        if self.sums.is_empty() {
            self.sums.push(vec![0.0; self.components.len()]);
            self.counts.push(0);
        }
    }

    /// Ends live collection
    pub fn stop(&mut self) {
        self.started = None;
    }

    fn current_index(&self) -> usize {
        match self.started {
            Some(started) => {
                (started.elapsed().as_secs() / u64::from(self.collection_interval_secs)) as usize
            }
            None => self.sums.len().saturating_sub(1),
        }
    }

    /// Component names in declaration order
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Records one sample with a value for every component
    ///
    /// Samples with the wrong number of values are dropped.
    pub fn add_sample(&mut self, values: &[f64]) {
        if values.len() != self.components.len() {
            return;
        }
        let index = self.current_index();
        if self.sums.len() <= index {
            self.sums
                .resize(index + 1, vec![0.0; self.components.len()]);
            self.counts.resize(index + 1, 0);
        }
        for (component_index, value) in values.iter().enumerate() {
            self.sums[index][component_index] += value;
        }
        self.counts[index] += 1;
    }

    /// Appends one interval with the given component sums and sample count
    pub fn push_interval(&mut self, sums: Vec<f64>, count: u64) {
        self.sums.push(sums);
        self.counts.push(count);
    }

    /// Number of recorded intervals
    pub fn num_intervals(&self) -> usize {
        self.sums.len()
    }

    /// Average value of one component across all intervals
    ///
    /// NaN when the component is unknown or no samples exist.
    pub fn average_value(&self, component: &str) -> f64 {
        let Some(component_index) = self.components.iter().position(|c| c == component) else {
            return f64::NAN;
        };
        let count: u64 = self.counts.iter().sum();
        if count == 0 {
            return f64::NAN;
        }
        let total: f64 = self.sums.iter().map(|interval| interval[component_index]).sum();
        total / count as f64
    }

    /// The summary value is the sum of all component averages
    pub fn summary_value(&self) -> f64 {
        self.components
            .iter()
            .map(|component| self.average_value(component))
            .sum()
    }

    /// Merges a peer tracker element-wise
    ///
    /// The caller guarantees the peer shares this tracker's component list.
    pub fn aggregate(&mut self, peer: &StackedValueTracker) {
        if self.sums.len() < peer.sums.len() {
            self.sums
                .resize(peer.sums.len(), vec![0.0; self.components.len()]);
            self.counts.resize(peer.counts.len(), 0);
        }
        for (index, interval) in peer.sums.iter().enumerate() {
            for (component_index, value) in interval.iter().enumerate() {
                if component_index < self.sums[index].len() {
                    self.sums[index][component_index] += value;
                }
            }
        }
        for (index, count) in peer.counts.iter().enumerate() {
            self.counts[index] += count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_components() -> Vec<String> {
        vec!["user".to_string(), "system".to_string(), "idle".to_string()]
    }

    #[test]
    fn test_component_averages() {
        let mut tracker =
            StackedValueTracker::new("monitor-1", "0", "CPU Utilization", 5, cpu_components());
        tracker.push_interval(vec![50.0, 30.0, 20.0], 1);
        tracker.push_interval(vec![30.0, 10.0, 60.0], 1);
        assert!((tracker.average_value("user") - 40.0).abs() < f64::EPSILON);
        assert!((tracker.average_value("system") - 20.0).abs() < f64::EPSILON);
        assert!((tracker.average_value("idle") - 40.0).abs() < f64::EPSILON);
        assert!(tracker.average_value("missing").is_nan());
    }

    #[test]
    fn test_aggregate_averages_across_workers() {
        let mut left =
            StackedValueTracker::new("monitor-1", "0", "CPU Utilization", 5, cpu_components());
        left.push_interval(vec![80.0, 10.0, 10.0], 1);
        let mut right =
            StackedValueTracker::new("monitor-2", "0", "CPU Utilization", 5, cpu_components());
        right.push_interval(vec![40.0, 10.0, 50.0], 1);
        left.aggregate(&right);
        assert!((left.average_value("user") - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mismatched_sample_is_dropped() {
        let mut tracker =
            StackedValueTracker::new("monitor-1", "0", "CPU Utilization", 5, cpu_components());
        tracker.start();
        tracker.add_sample(&[1.0, 2.0]);
        tracker.stop();
        assert!(tracker.average_value("user").is_nan());
    }
}
