//! Job ID value object module
//!
//! This module defines the job identifier, its grammar, and the total
//! ordering used everywhere jobs are sorted. The grammar is
//! `<date14>-<rand6><counter>[-<iterThreads>[-rerun]]` where `date14` is
//! `yyyyMMddHHmmss`, `rand6` is six random alphanumerics, and `counter` is a
//! decimal integer. Child jobs of an optimizing job append the iteration
//! thread count, and a validation rerun appends a `rerun` tag.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// The rerun suffix appended to the id of a best-iteration validation run
pub const RERUN_TAG: &str = "rerun";

/// Unique identifier of a job or optimizing job
///
/// The id doubles as the total-ordering key: ids sort by creation date, then
/// by creation counter, with an optimizing job's children sorting after the
/// parent in iteration order and a rerun child sorting after all numeric
/// iterations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

/// Parsed form of a job id, used only for ordering comparisons
#[derive(Debug, Clone, PartialEq, Eq)]
struct JobIdTokens {
    date: String,
    counter: u64,
    iteration: Option<u64>,
    rerun: bool,
}

impl JobId {
    /// Wraps an existing id string
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the id of an optimizing-job iteration at the given thread count
    pub fn iteration_child(&self, threads: u32) -> JobId {
        JobId(format!("{}-{}", self.0, threads))
    }

    /// Derives the id of the rerun-best child at the given thread count
    pub fn rerun_child(&self, threads: u32) -> JobId {
        JobId(format!("{}-{}-{}", self.0, threads, RERUN_TAG))
    }

    /// Returns true if this id names a child of the given optimizing job
    pub fn is_child_of(&self, optimizing_job_id: &JobId) -> bool {
        self.0.len() > optimizing_job_id.0.len() + 1
            && self.0.starts_with(optimizing_job_id.as_str())
            && self.0.as_bytes()[optimizing_job_id.0.len()] == b'-'
    }

    /// Parses the id into its ordering tokens
    ///
    /// Returns None when the id does not follow the grammar; such ids fall
    /// back to plain lexicographic ordering.
    fn tokens(&self) -> Option<JobIdTokens> {
        let mut parts = self.0.split('-');

        let date = parts.next()?;
        if date.len() != 14 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        // The second token is six random alphanumerics followed by a decimal
        // counter; the random prefix is discarded for ordering.
        let tagged_counter = parts.next()?;
        if tagged_counter.len() <= 6 {
            return None;
        }
        let (prefix, counter_digits) = tagged_counter.split_at(6);
        if !prefix.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        let counter: u64 = counter_digits.parse().ok()?;

        let iteration = match parts.next() {
            None => None,
            Some(text) => Some(text.parse::<u64>().ok()?),
        };

        let rerun = match parts.next() {
            None => false,
            Some(RERUN_TAG) if iteration.is_some() => true,
            Some(_) => return None,
        };

        if parts.next().is_some() {
            return None;
        }

        Some(JobIdTokens {
            date: date.to_string(),
            counter,
            iteration,
            rerun,
        })
    }
}

impl Ord for JobId {
    /// Total ordering over job ids
    ///
    /// Dates compare lexicographically and counters numerically. An
    /// iteration-less id orders before ids with iterations, numeric
    /// iterations order by value, and a rerun-tagged iteration orders after
    /// all numeric iterations of the same optimizing job. Ids outside the
    /// grammar compare as plain strings.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.tokens(), other.tokens()) {
            (Some(a), Some(b)) => {
                // Class ranks: no iteration, then numeric iterations, then rerun.
                let class = |t: &JobIdTokens| match (t.iteration, t.rerun) {
                    (None, _) => 0u8,
                    (Some(_), false) => 1,
                    (Some(_), true) => 2,
                };
                a.date
                    .cmp(&b.date)
                    .then_with(|| a.counter.cmp(&b.counter))
                    .then_with(|| class(&a).cmp(&class(&b)))
                    .then_with(|| a.iteration.unwrap_or(0).cmp(&b.iteration.unwrap_or(0)))
                    .then_with(|| self.0.cmp(&other.0))
            }
            _ => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for JobId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        JobId(value.to_string())
    }
}

/// Generator of unique base job ids
///
/// Each generator samples one six-character random tag and appends a
/// strictly increasing counter, so ids from one generator never collide.
/// There is no process-global generator; the owning context creates one and
/// passes it where ids are minted.
pub struct JobIdGenerator {
    random_tag: String,
    counter: AtomicU64,
}

impl JobIdGenerator {
    /// Creates a generator with a fresh random tag
    pub fn new() -> Self {
        let random_tag: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();
        Self {
            random_tag,
            counter: AtomicU64::new(1),
        }
    }

    /// Mints the next id using the current wall-clock time
    pub fn next_id(&self) -> JobId {
        self.next_id_at(Utc::now())
    }

    /// Mints the next id with an explicit creation timestamp
    pub fn next_id_at(&self, when: DateTime<Utc>) -> JobId {
        let counter = self.counter.fetch_add(1, AtomicOrdering::Relaxed);
        JobId(format!(
            "{}-{}{}",
            when.format("%Y%m%d%H%M%S"),
            self.random_tag,
            counter
        ))
    }
}

impl Default for JobIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generated_ids_parse() {
        let generator = JobIdGenerator::new();
        let id = generator.next_id();
        assert!(id.tokens().is_some());
    }

    #[test]
    fn test_generated_ids_increase() {
        let generator = JobIdGenerator::new();
        let a = generator.next_id();
        let b = generator.next_id();
        assert!(a < b);
    }

    #[test]
    fn test_date_orders_before_counter() {
        let a = JobId::from("20260101000000-abc1239");
        let b = JobId::from("20260102000000-abc1231");
        assert!(a < b);
    }

    #[test]
    fn test_counter_compares_numerically() {
        // Lexicographically "10" < "9"; numerically the opposite.
        let a = JobId::from("20260101000000-abc1239");
        let b = JobId::from("20260101000000-abc12310");
        assert!(a < b);
    }

    #[test]
    fn test_random_tag_is_discarded() {
        let a = JobId::from("20260101000000-zzzzzz1");
        let b = JobId::from("20260101000000-aaaaaa2");
        assert!(a < b);
    }

    #[test]
    fn test_parent_orders_before_iterations() {
        let parent = JobId::from("20260101000000-abc1231");
        let first = parent.iteration_child(1);
        let tenth = parent.iteration_child(10);
        assert!(parent < first);
        assert!(first < tenth);
    }

    #[test]
    fn test_rerun_orders_after_numeric_iterations() {
        let parent = JobId::from("20260101000000-abc1231");
        let rerun = parent.rerun_child(2);
        let last = parent.iteration_child(64);
        assert!(last < rerun);
        assert!(parent.iteration_child(2) < rerun);
    }

    #[test]
    fn test_child_prefix_detection() {
        let parent = JobId::from("20260101000000-abc1231");
        assert!(parent.iteration_child(4).is_child_of(&parent));
        assert!(parent.rerun_child(4).is_child_of(&parent));
        assert!(!parent.is_child_of(&parent));
        assert!(!JobId::from("20260101000000-abc12312").is_child_of(&parent));
    }

    #[test]
    fn test_unparseable_ids_fall_back_to_lexicographic() {
        let a = JobId::from("alpha");
        let b = JobId::from("beta");
        assert!(a < b);
        assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
    }

    fn arbitrary_id() -> impl Strategy<Value = JobId> {
        (
            0u32..3,
            1u64..4,
            proptest::option::of(1u64..5),
            proptest::bool::ANY,
        )
            .prop_map(|(day, counter, iteration, rerun)| {
                let base = format!("202601{:02}000000-abcDE{}{}", day + 1, "f", counter);
                let id = match iteration {
                    None => base,
                    Some(n) if rerun => format!("{}-{}-{}", base, n, RERUN_TAG),
                    Some(n) => format!("{}-{}", base, n),
                };
                JobId::new(id)
            })
    }

    proptest! {
        #[test]
        fn prop_total_order(a in arbitrary_id(), b in arbitrary_id(), c in arbitrary_id()) {
            // Reflexive and antisymmetric
            prop_assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
            if a.cmp(&b) == std::cmp::Ordering::Less {
                prop_assert_eq!(b.cmp(&a), std::cmp::Ordering::Greater);
            }
            // Transitive
            if a.cmp(&b) != std::cmp::Ordering::Greater
                && b.cmp(&c) != std::cmp::Ordering::Greater
            {
                prop_assert!(a.cmp(&c) != std::cmp::Ordering::Greater);
            }
        }
    }
}
