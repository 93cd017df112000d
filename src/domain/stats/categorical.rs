//! Categorical tracker module
//!
//! Counts string-keyed occurrences per collection interval, for statistics
//! such as operation types or result codes. Categorical data has no scalar
//! summary that is meaningful to optimize over, so the tracker is not
//! searchable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// String-keyed occurrence counts per interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalTracker {
    /// Worker that collected the data
    pub client_id: String,
    /// Thread that collected the data
    pub thread_id: String,
    /// Statistic name shown to users and used for aggregation matching
    pub display_name: String,
    /// Width of one collection interval in seconds
    pub collection_interval_secs: u32,
    /// Category counts per interval, oldest first
    intervals: Vec<HashMap<String, u64>>,
    /// Live-collection start instant; never persisted
    #[serde(skip)]
    started: Option<Instant>,
}

impl CategoricalTracker {
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
            intervals: Vec::new(),
            started: None,
        }
    }

    /// Begins live collection
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        if self.intervals.is_empty() {
            self.intervals.push(HashMap::new());
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
            None => self.intervals.len().saturating_sub(1),
        }
    }

    /// Increments a category in the current interval
    pub fn increment(&mut self, category: &str) {
        let index = self.current_index();
        if self.intervals.len() <= index {
            self.intervals.resize_with(index + 1, HashMap::new);
        }
        *self.intervals[index]
            .entry(category.to_string())
            .or_insert(0) += 1;
    }

    /// Appends one interval with the given category counts
    pub fn push_interval(&mut self, counts: HashMap<String, u64>) {
        self.intervals.push(counts);
    }

    /// Total occurrences of one category across all intervals
    pub fn count_for(&self, category: &str) -> u64 {
        self.intervals
            .iter()
            .filter_map(|interval| interval.get(category))
            .sum()
    }

    /// Total occurrences across all categories and intervals
    pub fn total_count(&self) -> u64 {
        self.intervals
            .iter()
            .flat_map(|interval| interval.values())
            .sum()
    }

    /// All category names seen, sorted
    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .intervals
            .iter()
            .flat_map(|interval| interval.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Number of recorded intervals
    pub fn num_intervals(&self) -> usize {
        self.intervals.len()
    }

    /// The summary value is the total occurrence count
    pub fn summary_value(&self) -> f64 {
        self.total_count() as f64
    }

    /// Merges a peer tracker element-wise
    pub fn aggregate(&mut self, peer: &CategoricalTracker) {
        if self.intervals.len() < peer.intervals.len() {
            self.intervals.resize_with(peer.intervals.len(), HashMap::new);
        }
        for (index, counts) in peer.intervals.iter().enumerate() {
            for (category, count) in counts {
                *self.intervals[index].entry(category.clone()).or_insert(0) += count;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_category() {
        let mut tracker = CategoricalTracker::new("client-1", "0", "Operation Types", 5);
        tracker.start();
        tracker.increment("SRCH");
        tracker.increment("SRCH");
        tracker.increment("MOD");
        tracker.stop();
        assert_eq!(tracker.count_for("SRCH"), 2);
        assert_eq!(tracker.count_for("MOD"), 1);
        assert_eq!(tracker.count_for("DEL"), 0);
        assert_eq!(tracker.total_count(), 3);
    }

    #[test]
    fn test_aggregate_merges_categories() {
        let mut left = CategoricalTracker::new("client-1", "0", "Result Codes", 5);
        left.push_interval(HashMap::from([("success".to_string(), 3)]));
        let mut right = CategoricalTracker::new("client-2", "0", "Result Codes", 5);
        right.push_interval(HashMap::from([
            ("success".to_string(), 2),
            ("error".to_string(), 1),
        ]));
        right.push_interval(HashMap::from([("success".to_string(), 4)]));
        left.aggregate(&right);
        assert_eq!(left.count_for("success"), 9);
        assert_eq!(left.count_for("error"), 1);
        assert_eq!(left.num_intervals(), 2);
    }
}
