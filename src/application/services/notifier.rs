//! Notification service module
//!
//! Builds and delivers the terminal-transition notifications for jobs and
//! optimizing jobs. Delivery goes through the `Notifier` capability; the
//! SMTP mailer is an external collaborator behind that interface, and the
//! bundled implementations log the message or record it for tests. An empty
//! address list produces no side effect at all.

use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::domain::entities::{Job, OptimizingJob};
use crate::domain::value_objects::ParameterList;

/// Delivery capability for terminal-transition notifications
pub trait Notifier: Send + Sync {
    /// Delivers one message to every address
    fn notify(&self, addresses: &[String], subject: &str, body: &str);
}

/// Notifier that writes messages to the log instead of a mail relay
#[derive(Default)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify(&self, addresses: &[String], subject: &str, body: &str) {
        for address in addresses {
            info!(to = %address, subject = %subject, "notification:\n{}", body);
        }
    }
}

/// A notification captured by the recording notifier
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub address: String,
    pub subject: String,
    pub body: String,
}

/// Notifier that records messages for inspection in tests
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_sent(&self) -> MutexGuard<'_, Vec<SentMessage>> {
        self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All messages recorded so far
    pub fn messages(&self) -> Vec<SentMessage> {
        self.lock_sent().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, addresses: &[String], subject: &str, body: &str) {
        let mut sent = self.lock_sent();
        for address in addresses {
            sent.push(SentMessage {
                address: address.clone(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        }
    }
}

fn push_field(body: &mut String, label: &str, value: &str) {
    body.push_str(label);
    body.push_str(": ");
    body.push_str(value);
    body.push('\n');
}

fn format_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map(|time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Builds the subject and body for a completed job
pub fn job_notification(job: &Job) -> (String, String) {
    let state = job.state();
    let subject = format!("Job {} finished: {}", job.job_id, state);
    let (actual_start, actual_stop, actual_duration) = job.actual_times();

    let mut body = String::new();
    push_field(&mut body, "Job ID", job.job_id.as_str());
    if let Some(description) = &job.description {
        push_field(&mut body, "Description", description);
    }
    push_field(&mut body, "Workload", &job.workload_class);
    push_field(&mut body, "Final State", &state.to_string());
    if let Some(reason) = job.stop_reason() {
        push_field(&mut body, "Stop Reason", &reason);
    }
    push_field(&mut body, "Actual Start", &format_time(actual_start));
    push_field(&mut body, "Actual Stop", &format_time(actual_stop));
    if let Some(duration) = actual_duration {
        push_field(&mut body, "Actual Duration", &format!("{} seconds", duration));
    }
    (subject, body)
}

/// Builds the subject and body for a completed optimizing job
///
/// Carries the algorithm's parameters with display values (passwords
/// masked), the optimal thread count, the optimal value formatted to three
/// decimals, and the re-run value when a validation run happened.
pub fn optimizing_job_notification(
    optimizing_job: &OptimizingJob,
    algorithm_parameters: &ParameterList,
) -> (String, String) {
    let state = optimizing_job.job_state();
    let subject = format!(
        "Optimizing job {} finished: {}",
        optimizing_job.optimizing_job_id, state
    );
    let (actual_start, actual_stop) = optimizing_job.actual_times();
    let (optimal_id, optimal_threads, optimal_value) = optimizing_job.current_optimal();

    let mut body = String::new();
    push_field(
        &mut body,
        "Optimizing Job ID",
        optimizing_job.optimizing_job_id.as_str(),
    );
    if let Some(description) = &optimizing_job.description {
        push_field(&mut body, "Description", description);
    }
    push_field(&mut body, "Workload", &optimizing_job.workload_class);
    push_field(&mut body, "Final State", &state.to_string());
    if let Some(reason) = optimizing_job.stop_reason() {
        push_field(&mut body, "Stop Reason", &reason);
    }
    push_field(&mut body, "Actual Start", &format_time(actual_start));
    push_field(&mut body, "Actual Stop", &format_time(actual_stop));
    push_field(&mut body, "Algorithm", &optimizing_job.algorithm_name);
    for (name, value) in algorithm_parameters.display_values() {
        push_field(&mut body, &format!("  {}", name), &value);
    }
    if let Some(optimal_id) = optimal_id {
        push_field(&mut body, "Optimal Iteration", optimal_id.as_str());
        push_field(
            &mut body,
            "Optimal Thread Count",
            &optimal_threads.to_string(),
        );
        push_field(&mut body, "Optimal Value", &format!("{:.3}", optimal_value));
    }
    let rerun_value = optimizing_job.rerun_value();
    if !rerun_value.is_nan() {
        push_field(&mut body, "Re-Run Value", &format!("{:.3}", rerun_value));
    }
    (subject, body)
}
