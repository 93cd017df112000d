//! In-memory job store module
//!
//! Keeps job and optimizing-job records in maps behind one lock. Nothing
//! survives a restart; used by tests and by in-process runs where durable
//! checkpoints are not wanted.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::domain::entities::{JobRecord, OptimizingJobRecord};
use crate::domain::error::CoreResult;
use crate::domain::repositories::JobStore;
use crate::domain::value_objects::JobId;

/// Store state guarded by one lock
#[derive(Default)]
struct Records {
    jobs: BTreeMap<JobId, JobRecord>,
    optimizing_jobs: BTreeMap<JobId, OptimizingJobRecord>,
}

/// Map-backed implementation of the job store
#[derive(Default)]
pub struct InMemoryJobStore {
    records: Mutex<Records>,
}

impl InMemoryJobStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_records(&self) -> MutexGuard<'_, Records> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JobStore for InMemoryJobStore {
    fn save_job(&self, record: &JobRecord) -> CoreResult<()> {
        self.lock_records()
            .jobs
            .insert(record.job_id.clone(), record.clone());
        Ok(())
    }

    fn load_job(&self, job_id: &JobId) -> CoreResult<Option<JobRecord>> {
        Ok(self.lock_records().jobs.get(job_id).cloned())
    }

    fn list_jobs(&self) -> CoreResult<Vec<JobRecord>> {
        Ok(self.lock_records().jobs.values().cloned().collect())
    }

    fn delete_job(&self, job_id: &JobId) -> CoreResult<()> {
        self.lock_records().jobs.remove(job_id);
        Ok(())
    }

    fn save_optimizing_job(&self, record: &OptimizingJobRecord) -> CoreResult<()> {
        self.lock_records()
            .optimizing_jobs
            .insert(record.optimizing_job_id.clone(), record.clone());
        Ok(())
    }

    fn load_optimizing_job(&self, job_id: &JobId) -> CoreResult<Option<OptimizingJobRecord>> {
        Ok(self.lock_records().optimizing_jobs.get(job_id).cloned())
    }

    fn list_optimizing_jobs(&self) -> CoreResult<Vec<OptimizingJobRecord>> {
        Ok(self
            .lock_records()
            .optimizing_jobs
            .values()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Job;
    use chrono::Utc;

    #[test]
    fn test_save_load_delete() {
        let store = InMemoryJobStore::new();
        let job = Job::new(
            JobId::from("20260101000000-abc1231"),
            "NullWorkload",
            Utc::now(),
        );
        let record = job.to_record();
        store.save_job(&record).unwrap();
        assert_eq!(store.load_job(&record.job_id).unwrap(), Some(record.clone()));
        assert_eq!(store.list_jobs().unwrap().len(), 1);
        store.delete_job(&record.job_id).unwrap();
        assert!(store.load_job(&record.job_id).unwrap().is_none());
    }

    #[test]
    fn test_jobs_list_in_id_order() {
        let store = InMemoryJobStore::new();
        for counter in [3, 1, 2] {
            let job = Job::new(
                JobId::new(format!("20260101000000-abcdef{}", counter)),
                "NullWorkload",
                Utc::now(),
            );
            store.save_job(&job.to_record()).unwrap();
        }
        let ids: Vec<String> = store
            .list_jobs()
            .unwrap()
            .into_iter()
            .map(|record| record.job_id.as_str().to_string())
            .collect();
        assert_eq!(
            ids,
            vec![
                "20260101000000-abcdef1",
                "20260101000000-abcdef2",
                "20260101000000-abcdef3"
            ]
        );
    }
}
