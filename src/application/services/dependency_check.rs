//! Dependency check service module
//!
//! Builds a directed graph over the pending jobs' dependency edges and
//! rejects submissions that would close a cycle. A dependency cycle can
//! never become admissible: each job in the cycle waits for another member
//! to terminate, so the whole group would sit in the pending set forever.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::value_objects::JobId;

/// Directed graph of job dependencies
///
/// Edges point from a dependency to the job that waits on it.
pub struct DependencyGraph {
    graph: DiGraph<JobId, ()>,
    job_indices: HashMap<JobId, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            job_indices: HashMap::new(),
        }
    }

    /// Adds a job node; a no-op when the job is already present
    pub fn add_job(&mut self, job_id: &JobId) {
        if !self.job_indices.contains_key(job_id) {
            let index = self.graph.add_node(job_id.clone());
            self.job_indices.insert(job_id.clone(), index);
        }
    }

    /// Adds a dependency edge, creating missing nodes
    pub fn add_dependency(&mut self, dependency: &JobId, dependent: &JobId) {
        self.add_job(dependency);
        self.add_job(dependent);
        let from = self.job_indices[dependency];
        let to = self.job_indices[dependent];
        self.graph.add_edge(from, to, ());
    }

    /// True when the graph holds at least one cycle
    pub fn has_cycle(&self) -> bool {
        toposort(&self.graph, None).is_err()
    }

    /// Verifies that adding a job keeps the pending graph acyclic
    ///
    /// `pending` supplies the dependency edges of every job the scheduler
    /// still holds; the candidate's edges are added on top.
    pub fn validate_submission(
        pending: impl Iterator<Item = (JobId, Vec<JobId>)>,
        candidate_id: &JobId,
        candidate_dependencies: &[JobId],
    ) -> CoreResult<()> {
        let mut graph = DependencyGraph::new();
        for (job_id, dependencies) in pending {
            for dependency in dependencies {
                graph.add_dependency(&dependency, &job_id);
            }
        }
        for dependency in candidate_dependencies {
            graph.add_dependency(dependency, candidate_id);
        }
        if graph.has_cycle() {
            return Err(CoreError::InvalidValue(format!(
                "job {} would create a dependency cycle",
                candidate_id
            )));
        }
        Ok(())
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(counter: u32) -> JobId {
        JobId::new(format!("20260101000000-abcdef{}", counter))
    }

    #[test]
    fn test_acyclic_chain_is_accepted() {
        let pending = vec![(id(2), vec![id(1)]), (id(3), vec![id(2)])];
        assert!(DependencyGraph::validate_submission(
            pending.into_iter(),
            &id(4),
            &[id(3)],
        )
        .is_ok());
    }

    #[test]
    fn test_direct_cycle_is_rejected() {
        let pending = vec![(id(1), vec![id(2)])];
        let error =
            DependencyGraph::validate_submission(pending.into_iter(), &id(2), &[id(1)])
                .unwrap_err();
        assert!(error.to_string().contains("dependency cycle"));
    }

    #[test]
    fn test_transitive_cycle_is_rejected() {
        let pending = vec![(id(2), vec![id(1)]), (id(3), vec![id(2)])];
        assert!(DependencyGraph::validate_submission(
            pending.into_iter(),
            &id(1),
            &[id(3)],
        )
        .is_err());
    }

    #[test]
    fn test_dependency_on_terminated_job_is_fine() {
        // Terminated jobs are not in the pending set, so their edges never
        // participate in a cycle.
        assert!(DependencyGraph::validate_submission(
            std::iter::empty(),
            &id(5),
            &[id(1)],
        )
        .is_ok());
    }
}
