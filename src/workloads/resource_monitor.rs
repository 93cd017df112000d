//! Resource monitor workload module
//!
//! The workload run by monitor workers: it samples CPU utilization once per
//! second for the lifetime of the monitored job and reports a stacked
//! user/system/idle tracker. Constraint-checking optimization algorithms
//! consume this data per monitored worker.
//!
//! Sampling reads `/proc/stat` where available; on other platforms the
//! monitor reports an idle machine rather than failing the job.

use std::fs;
use std::thread;
use std::time::Duration;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::stats::{StackedValueTracker, StatTracker};
use crate::domain::value_objects::ParameterList;

use super::{ThreadControl, Workload};

/// Tracker holding stacked CPU utilization percentages
pub const CPU_UTILIZATION_TRACKER: &str = "CPU Utilization";
/// Component names of the stacked CPU tracker
pub const CPU_COMPONENTS: [&str; 3] = ["user", "system", "idle"];

/// Cumulative CPU tick counts from one `/proc/stat` sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTicks {
    user: u64,
    system: u64,
    idle: u64,
    total: u64,
}

/// Parses the aggregate `cpu` line of `/proc/stat`
fn parse_cpu_line(content: &str) -> Option<CpuTicks> {
    let line = content.lines().find(|line| line.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|field| field.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    // user, nice, system, idle, [iowait, irq, softirq, ...]
    let user = fields[0] + fields[1];
    let system = fields[2];
    let idle = fields[3];
    let total: u64 = fields.iter().sum();
    Some(CpuTicks {
        user,
        system,
        idle,
        total,
    })
}

fn read_cpu_ticks() -> Option<CpuTicks> {
    fs::read_to_string("/proc/stat")
        .ok()
        .and_then(|content| parse_cpu_line(&content))
}

/// Percentage split of the delta between two samples
fn utilization_between(previous: CpuTicks, current: CpuTicks) -> Option<[f64; 3]> {
    let total = current.total.checked_sub(previous.total)?;
    if total == 0 {
        return None;
    }
    let pct = |delta: u64| delta as f64 * 100.0 / total as f64;
    Some([
        pct(current.user.saturating_sub(previous.user)),
        pct(current.system.saturating_sub(previous.system)),
        pct(current.idle.saturating_sub(previous.idle)),
    ])
}

/// Workload sampling CPU utilization on a monitor worker
pub struct ResourceMonitorWorkload {
    utilization: Option<StackedValueTracker>,
}

impl ResourceMonitorWorkload {
    /// Creates a stub-mode instance
    pub fn new() -> Self {
        Self { utilization: None }
    }
}

impl Default for ResourceMonitorWorkload {
    fn default() -> Self {
        Self::new()
    }
}

impl Workload for ResourceMonitorWorkload {
    fn class_name(&self) -> &str {
        "ResourceMonitorWorkload"
    }

    fn job_name(&self) -> &str {
        "Resource Monitor"
    }

    fn short_description(&self) -> &str {
        "Samples CPU utilization on a monitor worker"
    }

    fn category_name(&self) -> &str {
        "Monitoring"
    }

    fn parameter_stubs(&self) -> ParameterList {
        ParameterList::new()
    }

    fn stat_tracker_stubs(
        &self,
        client_id: &str,
        thread_id: &str,
        collection_interval_secs: u32,
    ) -> Vec<StatTracker> {
        vec![StatTracker::Stacked(StackedValueTracker::new(
            client_id,
            thread_id,
            CPU_UTILIZATION_TRACKER,
            collection_interval_secs,
            CPU_COMPONENTS.iter().map(|c| c.to_string()).collect(),
        ))]
    }

    fn override_threads_per_client(&self) -> Option<u32> {
        Some(1)
    }

    fn initialize_thread(
        &mut self,
        client_id: &str,
        thread_id: &str,
        collection_interval_secs: u32,
        _parameters: &ParameterList,
    ) -> CoreResult<()> {
        self.utilization = Some(StackedValueTracker::new(
            client_id,
            thread_id,
            CPU_UTILIZATION_TRACKER,
            collection_interval_secs,
            CPU_COMPONENTS.iter().map(|c| c.to_string()).collect(),
        ));
        Ok(())
    }

    fn run_job(&mut self, control: &ThreadControl) -> CoreResult<()> {
        let mut utilization = self
            .utilization
            .take()
            .ok_or_else(|| CoreError::UnableToRun("thread was not initialized".to_string()))?;
        utilization.start();

        let mut previous = read_cpu_ticks();
        while !control.should_stop() {
            thread::sleep(Duration::from_millis(250));
            if control.should_stop() {
                break;
            }
            let current = read_cpu_ticks();
            match (previous, current) {
                (Some(before), Some(after)) => {
                    if let Some(sample) = utilization_between(before, after) {
                        utilization.add_sample(&sample);
                    }
                    previous = Some(after);
                }
                _ => {
                    // No /proc/stat on this platform: report an idle machine.
                    utilization.add_sample(&[0.0, 0.0, 100.0]);
                }
            }
        }

        utilization.stop();
        self.utilization = Some(utilization);
        Ok(())
    }

    fn stat_trackers(&self) -> Vec<StatTracker> {
        self.utilization
            .as_ref()
            .map(|utilization| vec![StatTracker::Stacked(utilization.clone())])
            .unwrap_or_default()
    }
}
