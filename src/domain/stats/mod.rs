//! Statistic tracker model
//!
//! Workloads report their results through stat trackers: named time series
//! bucketed into fixed-width collection intervals. Five tracker variants
//! cover counters, durations, categorical counts, integer gauges, and
//! stacked multi-component gauges. Trackers aggregate element-wise across
//! threads and workers within one (display name, collection interval)
//! class; aggregation is associative and commutative, so the merged view is
//! independent of report arrival order.

pub mod categorical;
pub mod incremental;
pub mod integer_value;
pub mod stacked;
pub mod time_tracker;

pub use categorical::CategoricalTracker;
pub use incremental::IncrementalTracker;
pub use integer_value::IntegerValueTracker;
pub use stacked::StackedValueTracker;
pub use time_tracker::TimeTracker;

use serde::{Deserialize, Serialize};

use crate::domain::error::{CoreError, CoreResult};

/// A statistic tracker of any variant
///
/// The tagged form keeps the capability surface uniform for the scheduling
/// core while letting each variant own its representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatTracker {
    Incremental(IncrementalTracker),
    Time(TimeTracker),
    Categorical(CategoricalTracker),
    IntegerValue(IntegerValueTracker),
    Stacked(StackedValueTracker),
}

impl StatTracker {
    /// Worker that collected the data
    pub fn client_id(&self) -> &str {
        match self {
            StatTracker::Incremental(t) => &t.client_id,
            StatTracker::Time(t) => &t.client_id,
            StatTracker::Categorical(t) => &t.client_id,
            StatTracker::IntegerValue(t) => &t.client_id,
            StatTracker::Stacked(t) => &t.client_id,
        }
    }

    /// Thread that collected the data
    pub fn thread_id(&self) -> &str {
        match self {
            StatTracker::Incremental(t) => &t.thread_id,
            StatTracker::Time(t) => &t.thread_id,
            StatTracker::Categorical(t) => &t.thread_id,
            StatTracker::IntegerValue(t) => &t.thread_id,
            StatTracker::Stacked(t) => &t.thread_id,
        }
    }

    /// Statistic name used for display and aggregation matching
    pub fn display_name(&self) -> &str {
        match self {
            StatTracker::Incremental(t) => &t.display_name,
            StatTracker::Time(t) => &t.display_name,
            StatTracker::Categorical(t) => &t.display_name,
            StatTracker::IntegerValue(t) => &t.display_name,
            StatTracker::Stacked(t) => &t.display_name,
        }
    }

    /// Width of one collection interval in seconds
    pub fn collection_interval_secs(&self) -> u32 {
        match self {
            StatTracker::Incremental(t) => t.collection_interval_secs,
            StatTracker::Time(t) => t.collection_interval_secs,
            StatTracker::Categorical(t) => t.collection_interval_secs,
            StatTracker::IntegerValue(t) => t.collection_interval_secs,
            StatTracker::Stacked(t) => t.collection_interval_secs,
        }
    }

    /// Number of recorded intervals
    pub fn num_intervals(&self) -> usize {
        match self {
            StatTracker::Incremental(t) => t.num_intervals(),
            StatTracker::Time(t) => t.num_intervals(),
            StatTracker::Categorical(t) => t.num_intervals(),
            StatTracker::IntegerValue(t) => t.num_intervals(),
            StatTracker::Stacked(t) => t.num_intervals(),
        }
    }

    /// True when the scalar summary value is meaningful to optimize over
    pub fn is_searchable(&self) -> bool {
        matches!(
            self,
            StatTracker::Incremental(_) | StatTracker::Time(_) | StatTracker::IntegerValue(_)
        )
    }

    /// Scalar summary derived from the per-interval data
    pub fn summary_value(&self) -> f64 {
        match self {
            StatTracker::Incremental(t) => t.summary_value(),
            StatTracker::Time(t) => t.summary_value(),
            StatTracker::Categorical(t) => t.summary_value(),
            StatTracker::IntegerValue(t) => t.summary_value(),
            StatTracker::Stacked(t) => t.summary_value(),
        }
    }

    /// Begins live collection
    pub fn start(&mut self) {
        match self {
            StatTracker::Incremental(t) => t.start(),
            StatTracker::Time(t) => t.start(),
            StatTracker::Categorical(t) => t.start(),
            StatTracker::IntegerValue(t) => t.start(),
            StatTracker::Stacked(t) => t.start(),
        }
    }

    /// Ends live collection
    pub fn stop(&mut self) {
        match self {
            StatTracker::Incremental(t) => t.stop(),
            StatTracker::Time(t) => t.stop(),
            StatTracker::Categorical(t) => t.stop(),
            StatTracker::IntegerValue(t) => t.stop(),
            StatTracker::Stacked(t) => t.stop(),
        }
    }

    /// True when two trackers belong to the same aggregation class
    ///
    /// Aggregation is only legal within one class: same variant, same
    /// display name, same collection interval.
    pub fn same_class(&self, other: &StatTracker) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
            && self.display_name() == other.display_name()
            && self.collection_interval_secs() == other.collection_interval_secs()
    }

    /// Merges a peer tracker of the same class element-wise
    ///
    /// The aggregate's interval count becomes the maximum across peers, with
    /// missing tails treated as zero.
    pub fn aggregate(&mut self, peer: &StatTracker) -> CoreResult<()> {
        if !self.same_class(peer) {
            return Err(CoreError::InvalidValue(format!(
                "cannot aggregate tracker '{}' ({}s) with tracker '{}' ({}s)",
                self.display_name(),
                self.collection_interval_secs(),
                peer.display_name(),
                peer.collection_interval_secs()
            )));
        }
        match (self, peer) {
            (StatTracker::Incremental(a), StatTracker::Incremental(b)) => a.aggregate(b),
            (StatTracker::Time(a), StatTracker::Time(b)) => a.aggregate(b),
            (StatTracker::Categorical(a), StatTracker::Categorical(b)) => a.aggregate(b),
            (StatTracker::IntegerValue(a), StatTracker::IntegerValue(b)) => a.aggregate(b),
            (StatTracker::Stacked(a), StatTracker::Stacked(b)) => a.aggregate(b),
            _ => unreachable!("same_class guarantees matching variants"),
        }
        Ok(())
    }
}

/// Merges a batch of trackers into an aggregate list by class
///
/// Each incoming tracker is folded into the existing aggregate of its class,
/// or appended as the seed of a new class. Trackers that fail to merge are
/// skipped with a warning rather than poisoning the whole batch.
pub fn aggregate_into(aggregate: &mut Vec<StatTracker>, incoming: &[StatTracker]) {
    for tracker in incoming {
        match aggregate.iter_mut().find(|existing| existing.same_class(tracker)) {
            Some(existing) => {
                if let Err(error) = existing.aggregate(tracker) {
                    tracing::warn!("dropping unmergeable stat tracker: {}", error);
                }
            }
            None => aggregate.push(tracker.clone()),
        }
    }
}
