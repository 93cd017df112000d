//! Time tracker module
//!
//! Accumulates operation durations bucketed into collection intervals. Each
//! interval records the sum of durations in milliseconds and the number of
//! timed operations; the summary value is the average duration.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Per-interval duration sums and operation counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeTracker {
    /// Worker that collected the data
    pub client_id: String,
    /// Thread that collected the data
    pub thread_id: String,
    /// Statistic name shown to users and used for aggregation matching
    pub display_name: String,
    /// Width of one collection interval in seconds
    pub collection_interval_secs: u32,
    /// Sum of durations per interval, in milliseconds
    durations: Vec<u64>,
    /// Number of timed operations per interval
    counts: Vec<u64>,
    /// Live-collection start instant; never persisted
    #[serde(skip)]
    started: Option<Instant>,
    /// Start instant of the operation currently being timed
    #[serde(skip)]
    timing_started: Option<Instant>,
}

impl TimeTracker {
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
            durations: Vec::new(),
            counts: Vec::new(),
            started: None,
            timing_started: None,
        }
    }

    /// Begins live collection
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        if self.durations.is_empty() {
            self.durations.push(0);
            self.counts.push(0);
        }
    }

    /// Ends live collection
    pub fn stop(&mut self) {
        self.started = None;
        self.timing_started = None;
    }

    fn current_index(&self) -> usize {
        match self.started {
            Some(started) => {
                (started.elapsed().as_secs() / u64::from(self.collection_interval_secs)) as usize
            }
            None => self.durations.len().saturating_sub(1),
        }
    }

    /// Marks the start of one timed operation
    pub fn begin_timing(&mut self) {
        self.timing_started = Some(Instant::now());
    }

    /// Marks the end of one timed operation and records its duration
    ///
    /// Unpaired calls are ignored, so the record happens exactly once per
    /// begin/end pair.
    pub fn end_timing(&mut self) {
        if let Some(timing_started) = self.timing_started.take() {
            self.add_duration_ms(timing_started.elapsed().as_millis() as u64);
        }
    }

    /// Records one operation with a known duration in the current interval
    pub fn add_duration_ms(&mut self, duration_ms: u64) {
        let index = self.current_index();
        if self.durations.len() <= index {
            self.durations.resize(index + 1, 0);
            self.counts.resize(index + 1, 0);
        }
        self.durations[index] += duration_ms;
        self.counts[index] += 1;
    }

    /// Appends one interval with the given duration sum and count
    pub fn push_interval(&mut self, duration_ms: u64, count: u64) {
        self.durations.push(duration_ms);
        self.counts.push(count);
    }

    /// Sum of durations per interval, in milliseconds
    pub fn interval_durations(&self) -> &[u64] {
        &self.durations
    }

    /// Number of timed operations per interval
    pub fn interval_counts(&self) -> &[u64] {
        &self.counts
    }

    /// Number of recorded intervals
    pub fn num_intervals(&self) -> usize {
        self.durations.len()
    }

    /// Average duration in milliseconds across all intervals
    ///
    /// NaN when no operations were timed.
    pub fn average_duration_ms(&self) -> f64 {
        let count: u64 = self.counts.iter().sum();
        if count == 0 {
            return f64::NAN;
        }
        let total: u64 = self.durations.iter().sum();
        total as f64 / count as f64
    }

    /// Average duration over a contiguous range of intervals
    ///
    /// NaN when the range holds no timed operations. Used by constraint
    /// checks that compare the start of a run against its end.
    pub fn average_duration_in_range(&self, start: usize, end: usize) -> f64 {
        let end = end.min(self.durations.len());
        if start >= end {
            return f64::NAN;
        }
        let count: u64 = self.counts[start..end].iter().sum();
        if count == 0 {
            return f64::NAN;
        }
        let total: u64 = self.durations[start..end].iter().sum();
        total as f64 / count as f64
    }

    /// The summary value is the average duration
    pub fn summary_value(&self) -> f64 {
        self.average_duration_ms()
    }

    /// Merges a peer tracker element-wise
    pub fn aggregate(&mut self, peer: &TimeTracker) {
        if self.durations.len() < peer.durations.len() {
            self.durations.resize(peer.durations.len(), 0);
            self.counts.resize(peer.counts.len(), 0);
        }
        for (index, duration) in peer.durations.iter().enumerate() {
            self.durations[index] += duration;
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
    fn test_average_duration() {
        let mut tracker = TimeTracker::new("client-1", "0", "Operation Duration", 5);
        tracker.push_interval(100, 4);
        tracker.push_interval(300, 4);
        assert!((tracker.average_duration_ms() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_average_of_empty_is_nan() {
        let tracker = TimeTracker::new("client-1", "0", "Operation Duration", 5);
        assert!(tracker.average_duration_ms().is_nan());
    }

    #[test]
    fn test_range_average() {
        let mut tracker = TimeTracker::new("client-1", "0", "Latency", 5);
        tracker.push_interval(100, 10);
        tracker.push_interval(100, 10);
        tracker.push_interval(400, 10);
        tracker.push_interval(400, 10);
        assert!((tracker.average_duration_in_range(0, 2) - 10.0).abs() < f64::EPSILON);
        assert!((tracker.average_duration_in_range(2, 4) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregate_merges_durations_and_counts() {
        let mut left = TimeTracker::new("client-1", "0", "Latency", 5);
        left.push_interval(100, 2);
        let mut right = TimeTracker::new("client-2", "0", "Latency", 5);
        right.push_interval(200, 2);
        right.push_interval(100, 1);
        left.aggregate(&right);
        assert_eq!(left.interval_durations(), &[300, 100]);
        assert_eq!(left.interval_counts(), &[4, 1]);
    }

    #[test]
    fn test_unpaired_end_timing_is_ignored() {
        let mut tracker = TimeTracker::new("client-1", "0", "Latency", 5);
        tracker.end_timing();
        assert_eq!(tracker.num_intervals(), 0);
    }
}
