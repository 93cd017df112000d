//! Integer value tracker module
//!
//! Records integer samples per collection interval, for gauges such as CPU
//! percentages or queue depths. Each interval keeps the sample sum and the
//! sample count; the summary value is the average sample.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Per-interval integer samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegerValueTracker {
    /// Worker that collected the data
    pub client_id: String,
    /// Thread that collected the data
    pub thread_id: String,
    /// Statistic name shown to users and used for aggregation matching
    pub display_name: String,
    /// Width of one collection interval in seconds
    pub collection_interval_secs: u32,
    /// Sum of samples per interval
    totals: Vec<i64>,
    /// Number of samples per interval
    counts: Vec<u64>,
    /// Live-collection start instant; never persisted
    #[serde(skip)]
    started: Option<Instant>,
}

impl IntegerValueTracker {
    /// Creates an empty tracker
    pub fn new(
        client_id: &str,
        thread_id: &str,
        display_name: &str,
        collection_interval_secs: u32,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            thread_id: thread_id.to_string(),
            display_name: display_name.to_string(),
            collection_interval_secs: collection_interval_secs.max(1),
            totals: Vec::new(),
            counts: Vec::new(),
            started: None,
        }
    }

    /// Begins live collection
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        if self.totals.is_empty() {
            self.totals.push(0);
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
            None => self.totals.len().saturating_sub(1),
        }
    }

    /// Records one sample in the current interval
    pub fn add_value(&mut self, value: i64) {
        let index = self.current_index();
        if self.totals.len() <= index {
            self.totals.resize(index + 1, 0);
            self.counts.resize(index + 1, 0);
        }
        self.totals[index] += value;
        self.counts[index] += 1;
    }

    /// Appends one interval with the given sample sum and count
    pub fn push_interval(&mut self, total: i64, count: u64) {
        self.totals.push(total);
        self.counts.push(count);
    }

    /// Number of recorded intervals
    pub fn num_intervals(&self) -> usize {
        self.totals.len()
    }

    /// Average sample per interval, oldest first; NaN for empty intervals
    pub fn interval_averages(&self) -> Vec<f64> {
        self.totals
            .iter()
            .zip(self.counts.iter())
            .map(|(total, count)| {
                if *count == 0 {
                    f64::NAN
                } else {
                    *total as f64 / *count as f64
                }
            })
            .collect()
    }

    /// Average sample across all intervals; NaN when no samples exist
    pub fn average_value(&self) -> f64 {
        let count: u64 = self.counts.iter().sum();
        if count == 0 {
            return f64::NAN;
        }
        let total: i64 = self.totals.iter().sum();
        total as f64 / count as f64
    }

    /// The summary value is the average sample
    pub fn summary_value(&self) -> f64 {
        self.average_value()
    }

    /// Merges a peer tracker element-wise
    pub fn aggregate(&mut self, peer: &IntegerValueTracker) {
        if self.totals.len() < peer.totals.len() {
            self.totals.resize(peer.totals.len(), 0);
            self.counts.resize(peer.counts.len(), 0);
        }
        for (index, total) in peer.totals.iter().enumerate() {
            self.totals[index] += total;
        }
        for (index, count) in peer.counts.iter().enumerate() {
            self.counts[index] += count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_value() {
        let mut tracker = IntegerValueTracker::new("monitor-1", "0", "Busy CPU", 5);
        tracker.push_interval(80, 1);
        tracker.push_interval(60, 1);
        assert!((tracker.average_value() - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_average_is_nan() {
        let tracker = IntegerValueTracker::new("monitor-1", "0", "Busy CPU", 5);
        assert!(tracker.average_value().is_nan());
    }

    #[test]
    fn test_aggregate_preserves_average_semantics() {
        // Two monitors each averaging 50 must aggregate to 50, not 100.
        let mut left = IntegerValueTracker::new("monitor-1", "0", "Busy CPU", 5);
        left.push_interval(50, 1);
        let mut right = IntegerValueTracker::new("monitor-2", "0", "Busy CPU", 5);
        right.push_interval(50, 1);
        left.aggregate(&right);
        assert!((left.average_value() - 50.0).abs() < f64::EPSILON);
    }
}
