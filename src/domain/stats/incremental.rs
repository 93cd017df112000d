//! Incremental tracker module
//!
//! A monotone counter bucketed into fixed-width collection intervals. The
//! summary value is the per-second rate across all intervals, which makes
//! this the usual optimization statistic for throughput-style workloads.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Monotone per-interval counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalTracker {
    /// Worker that collected the data
    pub client_id: String,
    /// Thread that collected the data
    pub thread_id: String,
    /// Statistic name shown to users and used for aggregation matching
    pub display_name: String,
    /// Width of one collection interval in seconds
    pub collection_interval_secs: u32,
    /// Count per interval, oldest first
    intervals: Vec<u64>,
    /// Live-collection start instant; never persisted
    #[serde(skip)]
    started: Option<Instant>,
}

impl IncrementalTracker {
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
            self.intervals.push(0);
        }
    }

    /// Ends live collection
    pub fn stop(&mut self) {
        self.started = None;
    }

    /// Index of the interval the wall clock currently falls in
    fn current_index(&self) -> usize {
        match self.started {
            Some(started) => {
                (started.elapsed().as_secs() / u64::from(self.collection_interval_secs)) as usize
            }
            None => self.intervals.len().saturating_sub(1),
        }
    }

    /// Increments the counter in the current interval
    pub fn increment(&mut self) {
        self.add(1);
    }

    /// Adds an amount to the counter in the current interval
    pub fn add(&mut self, amount: u64) {
        let index = self.current_index();
        if self.intervals.len() <= index {
            self.intervals.resize(index + 1, 0);
        }
        self.intervals[index] += amount;
    }

    /// Appends one interval with the given count; used when replaying
    /// recorded data into a tracker
    pub fn push_interval(&mut self, count: u64) {
        self.intervals.push(count);
    }

    /// Total count across all intervals
    pub fn total_count(&self) -> u64 {
        self.intervals.iter().sum()
    }

    /// Number of recorded intervals
    pub fn num_intervals(&self) -> usize {
        self.intervals.len()
    }

    /// Count per interval, oldest first
    pub fn interval_counts(&self) -> &[u64] {
        &self.intervals
    }

    /// Per-second rate across all intervals; NaN when no data was recorded
    pub fn summary_value(&self) -> f64 {
        if self.intervals.is_empty() {
            return f64::NAN;
        }
        let seconds = self.intervals.len() as f64 * f64::from(self.collection_interval_secs);
        self.total_count() as f64 / seconds
    }

    /// Merges a peer tracker element-wise
    ///
    /// The caller guarantees the peer shares this tracker's display name and
    /// collection interval. Missing tail intervals count as zero.
    pub fn aggregate(&mut self, peer: &IncrementalTracker) {
        if self.intervals.len() < peer.intervals.len() {
            self.intervals.resize(peer.intervals.len(), 0);
        }
        for (index, count) in peer.intervals.iter().enumerate() {
            self.intervals[index] += count;
        }
    }
}
