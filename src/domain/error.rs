//! Core error taxonomy module
//!
//! This module defines the error types raised by the scheduling core.
//! Validation errors are surfaced synchronously to the caller and never
//! persisted; unable-to-run errors drive a job into a terminal error state.

use thiserror::Error;

/// Errors raised by the scheduling core
///
/// The variants follow the failure taxonomy of the framework: validation
/// failures before a job is accepted, admission failures when a job cannot
/// be started, lookup failures, optimization-algorithm failures, and
/// persistence failures (which are logged but never block a state
/// transition).
#[derive(Debug, Error)]
pub enum CoreError {
    /// A parameter combination or configuration value is invalid.
    /// Raised before a job is scheduled; never persisted.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A job could not be started at admission time, for example because
    /// not enough workers were available or workload initialization failed.
    #[error("unable to run job: {0}")]
    UnableToRun(String),

    /// A referenced job or optimizing job does not exist.
    #[error("no such job: {0}")]
    NoSuchJob(String),

    /// An optimization algorithm could not evaluate an iteration, for
    /// example because required statistics were not collected.
    #[error("optimization algorithm error: {0}")]
    Algorithm(String),

    /// A persistence operation failed. The in-memory state remains
    /// authoritative until the next successful persist.
    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Result alias used throughout the scheduling core
pub type CoreResult<T> = Result<T, CoreError>;
