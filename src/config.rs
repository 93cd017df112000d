//! Server configuration module
//!
//! Configuration for the scheduling core and its ambient services. Values
//! come from environment variables (with `.env` support) or fall back to
//! defaults; the persistent configuration store of a full deployment is an
//! external collaborator that would populate the same structure.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn env_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Configuration of the scheduling server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Cadence of the scheduler's admission loop, in milliseconds
    pub scheduler_poll_interval_ms: u64,
    /// Path of the SQLite job store
    pub database_path: String,
    /// Number of in-process compute workers to host
    pub num_workers: usize,
    /// Number of in-process resource-monitor workers to host
    pub num_monitor_workers: usize,
    /// SMTP relay for notifications; None logs notifications instead
    pub smtp_host: Option<String>,
    /// Sender address used for notifications
    pub smtp_from_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            scheduler_poll_interval_ms: 250,
            database_path: "gridload.db".to_string(),
            num_workers: 2,
            num_monitor_workers: 0,
            smtp_host: None,
            smtp_from_address: "gridload@localhost".to_string(),
        }
    }
}

impl ServerConfig {
    /// Loads the configuration from the environment
    ///
    /// Reads a `.env` file when present, then the `GRIDLOAD_*` variables;
    /// anything unset keeps its default.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();
        Self {
            scheduler_poll_interval_ms: env_var(
                "GRIDLOAD_POLL_INTERVAL_MS",
                defaults.scheduler_poll_interval_ms,
            ),
            database_path: env_var("GRIDLOAD_DATABASE", defaults.database_path),
            num_workers: env_var("GRIDLOAD_WORKERS", defaults.num_workers),
            num_monitor_workers: env_var(
                "GRIDLOAD_MONITOR_WORKERS",
                defaults.num_monitor_workers,
            ),
            smtp_host: std::env::var("GRIDLOAD_SMTP_HOST").ok(),
            smtp_from_address: env_var("GRIDLOAD_SMTP_FROM", defaults.smtp_from_address),
        }
    }

    /// The admission-loop cadence as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_poll_interval_ms.max(10))
    }
}
