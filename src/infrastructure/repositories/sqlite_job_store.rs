//! SQLite job store module
//!
//! Durable implementation of the job store. Each record is stored as one
//! row with queryable identity and state columns plus the full record as a
//! JSON document, so schema evolution stays in the record type. The
//! connection uses WAL mode and is optimized for frequent small writes,
//! since jobs are persisted after every state-relevant mutation.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::domain::entities::{JobRecord, OptimizingJobRecord};
use crate::domain::error::{CoreError, CoreResult};
use crate::domain::repositories::JobStore;
use crate::domain::value_objects::JobId;

/// SQLite-backed implementation of the job store
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Opens or creates the database at the given path
    pub fn new<P: AsRef<Path>>(db_path: P) -> CoreResult<Self> {
        let conn = Connection::open(db_path)
            .map_err(|error| CoreError::Persistence(format!("unable to open database: {}", error)))?;
        Self::with_connection(conn)
    }

    /// Creates a store over an in-memory database
    pub fn in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|error| {
            CoreError::Persistence(format!("unable to open in-memory database: {}", error))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> CoreResult<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;        -- concurrent readers during writes
            PRAGMA synchronous = NORMAL;      -- durability/speed balance
            PRAGMA temp_store = MEMORY;
            "#,
        )
        .map_err(|error| CoreError::Persistence(format!("unable to configure database: {}", error)))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create_schema(&self) -> CoreResult<()> {
        self.lock_conn()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS jobs (
                    job_id              TEXT PRIMARY KEY,
                    optimizing_job_id   TEXT,
                    job_state           TEXT NOT NULL,
                    record              TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_jobs_optimizing
                    ON jobs(optimizing_job_id);

                CREATE TABLE IF NOT EXISTS optimizing_jobs (
                    optimizing_job_id   TEXT PRIMARY KEY,
                    job_state           TEXT NOT NULL,
                    record              TEXT NOT NULL
                );
                "#,
            )
            .map_err(|error| {
                CoreError::Persistence(format!("unable to create schema: {}", error))
            })?;
        debug!("job store schema ready");
        Ok(())
    }

    fn encode<T: serde::Serialize>(record: &T) -> CoreResult<String> {
        serde_json::to_string(record)
            .map_err(|error| CoreError::Persistence(format!("unable to encode record: {}", error)))
    }

    fn decode<T: serde::de::DeserializeOwned>(document: &str) -> CoreResult<T> {
        serde_json::from_str(document)
            .map_err(|error| CoreError::Persistence(format!("unable to decode record: {}", error)))
    }
}

impl JobStore for SqliteJobStore {
    fn save_job(&self, record: &JobRecord) -> CoreResult<()> {
        let document = Self::encode(record)?;
        self.lock_conn()
            .execute(
                "INSERT OR REPLACE INTO jobs (job_id, optimizing_job_id, job_state, record)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.job_id.as_str(),
                    record.optimizing_job_id.as_ref().map(|id| id.as_str()),
                    record.job_state.to_string(),
                    document,
                ],
            )
            .map_err(|error| CoreError::Persistence(format!("unable to save job: {}", error)))?;
        Ok(())
    }

    fn load_job(&self, job_id: &JobId) -> CoreResult<Option<JobRecord>> {
        let document: Option<String> = self
            .lock_conn()
            .query_row(
                "SELECT record FROM jobs WHERE job_id = ?1",
                params![job_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|error| CoreError::Persistence(format!("unable to load job: {}", error)))?;
        document.map(|document| Self::decode(&document)).transpose()
    }

    fn list_jobs(&self) -> CoreResult<Vec<JobRecord>> {
        let conn = self.lock_conn();
        let mut statement = conn
            .prepare("SELECT record FROM jobs ORDER BY job_id")
            .map_err(|error| CoreError::Persistence(format!("unable to list jobs: {}", error)))?;
        let documents = statement
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|error| CoreError::Persistence(format!("unable to list jobs: {}", error)))?;
        let mut records = Vec::new();
        for document in documents {
            let document = document.map_err(|error| {
                CoreError::Persistence(format!("unable to read job row: {}", error))
            })?;
            records.push(Self::decode(&document)?);
        }
        Ok(records)
    }

    fn delete_job(&self, job_id: &JobId) -> CoreResult<()> {
        self.lock_conn()
            .execute("DELETE FROM jobs WHERE job_id = ?1", params![job_id.as_str()])
            .map_err(|error| CoreError::Persistence(format!("unable to delete job: {}", error)))?;
        Ok(())
    }

    fn save_optimizing_job(&self, record: &OptimizingJobRecord) -> CoreResult<()> {
        let document = Self::encode(record)?;
        self.lock_conn()
            .execute(
                "INSERT OR REPLACE INTO optimizing_jobs (optimizing_job_id, job_state, record)
                 VALUES (?1, ?2, ?3)",
                params![
                    record.optimizing_job_id.as_str(),
                    record.job_state.to_string(),
                    document,
                ],
            )
            .map_err(|error| {
                CoreError::Persistence(format!("unable to save optimizing job: {}", error))
            })?;
        Ok(())
    }

    fn load_optimizing_job(&self, job_id: &JobId) -> CoreResult<Option<OptimizingJobRecord>> {
        let document: Option<String> = self
            .lock_conn()
            .query_row(
                "SELECT record FROM optimizing_jobs WHERE optimizing_job_id = ?1",
                params![job_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|error| {
                CoreError::Persistence(format!("unable to load optimizing job: {}", error))
            })?;
        document.map(|document| Self::decode(&document)).transpose()
    }

    fn list_optimizing_jobs(&self) -> CoreResult<Vec<OptimizingJobRecord>> {
        let conn = self.lock_conn();
        let mut statement = conn
            .prepare("SELECT record FROM optimizing_jobs ORDER BY optimizing_job_id")
            .map_err(|error| {
                CoreError::Persistence(format!("unable to list optimizing jobs: {}", error))
            })?;
        let documents = statement
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|error| {
                CoreError::Persistence(format!("unable to list optimizing jobs: {}", error))
            })?;
        let mut records = Vec::new();
        for document in documents {
            let document = document.map_err(|error| {
                CoreError::Persistence(format!("unable to read optimizing job row: {}", error))
            })?;
            records.push(Self::decode(&document)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Job, OptimizingJob};
    use crate::domain::value_objects::JobState;
    use chrono::Utc;

    #[test]
    fn test_job_round_trip() {
        let store = SqliteJobStore::in_memory().unwrap();
        let mut job = Job::new(
            JobId::from("20260101000000-abc1231"),
            "LogReplayWorkload",
            Utc::now(),
        );
        job.num_clients = 3;
        job.notify_addresses.push("ops@example.com".to_string());
        job.set_state(JobState::Running);
        job.mark_terminal(JobState::CompletedSuccessfully, "all workers done");
        let record = job.to_record();

        store.save_job(&record).unwrap();
        let loaded = store.load_job(&record.job_id).unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_save_is_an_upsert() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = Job::new(
            JobId::from("20260101000000-abc1231"),
            "NullWorkload",
            Utc::now(),
        );
        store.save_job(&job.to_record()).unwrap();
        job.set_state(JobState::Running);
        store.save_job(&job.to_record()).unwrap();

        assert_eq!(store.list_jobs().unwrap().len(), 1);
        let loaded = store.load_job(&job.job_id).unwrap().unwrap();
        assert_eq!(loaded.job_state, JobState::Running);
    }

    #[test]
    fn test_optimizing_job_round_trip() {
        let store = SqliteJobStore::in_memory().unwrap();
        let optimizing_job =
            OptimizingJob::new(JobId::from("20260101000000-abc1231"), "NullWorkload");
        optimizing_job.append_child(JobId::from("20260101000000-abc1231-1"));
        optimizing_job.record_improvement(JobId::from("20260101000000-abc1231-1"), 1, 12.5);
        let record = optimizing_job.to_record();

        store.save_optimizing_job(&record).unwrap();
        let loaded = store
            .load_optimizing_job(&record.optimizing_job_id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.best_value_snapshot, Some(12.5));
    }

    #[test]
    fn test_missing_records_load_as_none() {
        let store = SqliteJobStore::in_memory().unwrap();
        assert!(store
            .load_job(&JobId::from("20260101000000-abc1231"))
            .unwrap()
            .is_none());
        assert!(store
            .load_optimizing_job(&JobId::from("20260101000000-abc1231"))
            .unwrap()
            .is_none());
    }
}
