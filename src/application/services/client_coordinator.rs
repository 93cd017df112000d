//! Client coordinator service module
//!
//! Owns the pool of currently connected worker and monitor-worker handles.
//! Jobs acquire their worker sets through the pool capability and release
//! them on completion; selection and release are mutually exclusive on one
//! pool lock, and a handle belongs to at most one job at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::domain::entities::Job;
use crate::domain::error::{CoreError, CoreResult};
use crate::domain::workers::{WorkerConnection, WorkerPool};

/// Host component of a client id of the form `host:instance`
fn host_of(client_id: &str) -> &str {
    client_id.split(':').next().unwrap_or(client_id)
}

/// Pool state guarded by the coordinator's lock
#[derive(Default)]
struct Pool {
    available: Vec<Arc<dyn WorkerConnection>>,
    available_monitors: Vec<Arc<dyn WorkerConnection>>,
    in_use: HashSet<String>,
    in_use_monitors: HashSet<String>,
}

/// Coordinator of the connected worker fleet
#[derive(Default)]
pub struct ClientCoordinator {
    pool: Mutex<Pool>,
}

impl ClientCoordinator {
    /// Creates a coordinator with an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_pool(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a newly connected compute worker to the idle pool
    pub fn register_client(&self, connection: Arc<dyn WorkerConnection>) {
        info!(client_id = %connection.client_id(), "worker connected");
        self.lock_pool().available.push(connection);
    }

    /// Adds a newly connected resource-monitor worker to the idle pool
    pub fn register_monitor_client(&self, connection: Arc<dyn WorkerConnection>) {
        info!(client_id = %connection.client_id(), "monitor worker connected");
        self.lock_pool().available_monitors.push(connection);
    }

    /// Number of idle compute workers
    pub fn available_clients(&self) -> usize {
        self.lock_pool().available.len()
    }

    /// Number of idle monitor workers
    pub fn available_monitor_clients(&self) -> usize {
        self.lock_pool().available_monitors.len()
    }

    /// Takes one idle worker by name from the given list
    fn take_named(
        list: &mut Vec<Arc<dyn WorkerConnection>>,
        name: &str,
    ) -> Option<Arc<dyn WorkerConnection>> {
        list.iter()
            .position(|connection| connection.client_id() == name)
            .map(|index| list.remove(index))
    }
}

impl WorkerPool for ClientCoordinator {
    /// Selects the compute workers for a job
    ///
    /// With an explicit worker list, every name must resolve to an idle
    /// worker; otherwise the requested number is drawn from the idle pool.
    /// Selection is all-or-nothing: on failure nothing stays checked out.
    fn get_client_connections(&self, job: &Job) -> CoreResult<Vec<Arc<dyn WorkerConnection>>> {
        let mut pool = self.lock_pool();

        let selected = if job.requested_clients.is_empty() {
            let wanted = job.num_clients as usize;
            if pool.available.len() < wanted {
                return Err(CoreError::UnableToRun(format!(
                    "job {} needs {} workers but only {} are available",
                    job.job_id,
                    wanted,
                    pool.available.len()
                )));
            }
            pool.available.drain(..wanted).collect::<Vec<_>>()
        } else {
            let mut selected = Vec::with_capacity(job.requested_clients.len());
            for name in &job.requested_clients {
                match Self::take_named(&mut pool.available, name) {
                    Some(connection) => selected.push(connection),
                    None => {
                        // Undo the partial selection before failing.
                        pool.available.extend(selected);
                        return Err(CoreError::UnableToRun(format!(
                            "requested worker '{}' is not available",
                            name
                        )));
                    }
                }
            }
            selected
        };

        for connection in &selected {
            pool.in_use.insert(connection.client_id());
        }
        debug!(job_id = %job.job_id, count = selected.len(), "workers assigned");
        Ok(selected)
    }

    /// Selects the resource-monitor workers for a job
    ///
    /// Every explicitly requested monitor must resolve. When the job also
    /// wants opportunistic monitoring, any idle monitor co-resident with a
    /// selected compute worker is added.
    fn get_monitor_client_connections(
        &self,
        job: &Job,
        selected: &[Arc<dyn WorkerConnection>],
    ) -> CoreResult<Vec<Arc<dyn WorkerConnection>>> {
        let mut pool = self.lock_pool();
        let mut monitors = Vec::new();

        for name in &job.monitor_clients {
            match Self::take_named(&mut pool.available_monitors, name) {
                Some(connection) => monitors.push(connection),
                None => {
                    pool.available_monitors.extend(monitors);
                    return Err(CoreError::UnableToRun(format!(
                        "requested monitor worker '{}' is not available",
                        name
                    )));
                }
            }
        }

        if job.monitor_clients_if_available {
            let selected_hosts: HashSet<String> = selected
                .iter()
                .map(|connection| host_of(&connection.client_id()).to_string())
                .collect();
            let mut index = 0;
            while index < pool.available_monitors.len() {
                let monitor_host =
                    host_of(&pool.available_monitors[index].client_id()).to_string();
                let co_resident = selected_hosts.contains(&monitor_host)
                    && !monitors
                        .iter()
                        .any(|monitor| host_of(&monitor.client_id()) == monitor_host);
                if co_resident {
                    monitors.push(pool.available_monitors.remove(index));
                } else {
                    index += 1;
                }
            }
        }

        for monitor in &monitors {
            pool.in_use_monitors.insert(monitor.client_id());
        }
        debug!(job_id = %job.job_id, count = monitors.len(), "monitor workers assigned");
        Ok(monitors)
    }

    /// Returns a handle to the idle pool after a job releases it
    fn set_available_for_processing(&self, connection: Arc<dyn WorkerConnection>) {
        let mut pool = self.lock_pool();
        let client_id = connection.client_id();
        if pool.in_use_monitors.remove(&client_id) {
            pool.available_monitors.push(connection);
        } else {
            pool.in_use.remove(&client_id);
            pool.available.push(connection);
        }
        debug!(client_id = %client_id, "worker returned to pool");
    }
}
