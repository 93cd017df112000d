//! Log replay workload module
//!
//! Replays operations parsed from a directory-server access log. Each
//! thread walks the parsed operation list at its own offset, timing every
//! operation and recording per-type categorical counts. The replay is a
//! dry run against the parsed profile; the directory server itself stays an
//! external collaborator.

use std::fs;
use std::thread;
use std::time::Duration;

use crate::domain::entities::Job;
use crate::domain::error::{CoreError, CoreResult};
use crate::domain::stats::{CategoricalTracker, IncrementalTracker, StatTracker, TimeTracker};
use crate::domain::value_objects::{Parameter, ParameterList, ParameterValue};

use super::{ThreadControl, Workload};

/// Tracker holding the number of attempted operations
pub const OPERATIONS_TRACKER: &str = "Operations Attempted";
/// Tracker holding per-operation durations
pub const OPERATION_TIME_TRACKER: &str = "Operation Duration";
/// Tracker holding per-type operation counts
pub const OPERATION_TYPES_TRACKER: &str = "Operation Types";

const LOG_FILE_PARAMETER: &str = "log_file";
const REPLAY_BINDS_PARAMETER: &str = "replay_binds";
const BIND_PASSWORD_PARAMETER: &str = "bind_password";
const OPERATION_DELAY_PARAMETER: &str = "operation_delay_ms";
const DEFAULT_OPERATION_DELAY_MS: i64 = 1;

/// Search scope parsed from an access-log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

impl SearchScope {
    /// Maps a scope character to a scope, tolerating unknown characters
    ///
    /// `0`, `1`, and `2` map to base, one-level, and subtree; anything else
    /// falls back to base.
    pub fn from_scope_char(scope: char) -> Self {
        match scope {
            '1' => SearchScope::OneLevel,
            '2' => SearchScope::Subtree,
            _ => SearchScope::Base,
        }
    }
}

/// One operation parsed from an access-log line
#[derive(Debug, Clone, PartialEq)]
pub enum LogOperation {
    Bind {
        dn: String,
    },
    Compare {
        dn: String,
        attribute: String,
    },
    Modify {
        dn: String,
    },
    Delete {
        dn: String,
    },
    Search {
        base: String,
        scope: SearchScope,
        filter: String,
        attributes: Vec<String>,
    },
}

impl LogOperation {
    /// Short type tag used for categorical stats
    pub fn type_tag(&self) -> &'static str {
        match self {
            LogOperation::Bind { .. } => "BIND",
            LogOperation::Compare { .. } => "CMP",
            LogOperation::Modify { .. } => "MOD",
            LogOperation::Delete { .. } => "DEL",
            LogOperation::Search { .. } => "SRCH",
        }
    }
}

/// Extracts the quoted value following `key="` in a log line
fn quoted_value(line: &str, key: &str) -> Option<String> {
    let marker = format!("{}=\"", key);
    let start = line.find(&marker)? + marker.len();
    let rest = &line[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Parses one access-log line into an operation
///
/// Lines that carry none of the known operation markers, or that are
/// missing required fields, yield None and are skipped by the reader.
pub fn parse_log_line(line: &str) -> Option<LogOperation> {
    if line.contains(" BIND ") {
        return Some(LogOperation::Bind {
            dn: quoted_value(line, "dn")?,
        });
    }
    if line.contains(" CMP ") {
        return Some(LogOperation::Compare {
            dn: quoted_value(line, "dn")?,
            attribute: quoted_value(line, "attr")?,
        });
    }
    if line.contains(" MOD ") {
        return Some(LogOperation::Modify {
            dn: quoted_value(line, "dn")?,
        });
    }
    if line.contains(" DEL ") {
        return Some(LogOperation::Delete {
            dn: quoted_value(line, "dn")?,
        });
    }
    if line.contains(" SRCH ") {
        let base = quoted_value(line, "base")?;
        // The scope is the single character following "scope="; it is
        // parsed as a character, never string-concatenated into a search
        // pattern. Unknown characters degrade to a base search.
        let scope_start = line.find("scope=")? + "scope=".len();
        let scope_char = line[scope_start..].chars().next()?;
        let scope = SearchScope::from_scope_char(scope_char);
        let filter = quoted_value(line, "filter")?;
        let attributes = quoted_value(line, "attrs")
            .map(|attrs| {
                attrs
                    .split_whitespace()
                    .map(|attr| attr.to_string())
                    .collect()
            })
            .unwrap_or_default();
        return Some(LogOperation::Search {
            base,
            scope,
            filter,
            attributes,
        });
    }
    None
}

/// Parses a whole access log, skipping unparseable lines
pub fn parse_log(content: &str) -> Vec<LogOperation> {
    content.lines().filter_map(parse_log_line).collect()
}

/// Workload replaying a parsed access-log profile
pub struct LogReplayWorkload {
    operations: Vec<LogOperation>,
    replay_binds: bool,
    operation_delay_ms: u64,
    thread_offset: usize,
    attempted: Option<IncrementalTracker>,
    operation_time: Option<TimeTracker>,
    operation_types: Option<CategoricalTracker>,
}

impl LogReplayWorkload {
    /// Creates a stub-mode instance
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
            replay_binds: false,
            operation_delay_ms: DEFAULT_OPERATION_DELAY_MS as u64,
            thread_offset: 0,
            attempted: None,
            operation_time: None,
            operation_types: None,
        }
    }

    /// Applies one operation against the replay target
    ///
    /// The bundled replay is a dry run: the cost model is the configured
    /// per-operation delay.
    fn apply(&self, _operation: &LogOperation) {
        if self.operation_delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.operation_delay_ms));
        }
    }
}

impl Default for LogReplayWorkload {
    fn default() -> Self {
        Self::new()
    }
}

impl Workload for LogReplayWorkload {
    fn class_name(&self) -> &str {
        "LogReplayWorkload"
    }

    fn job_name(&self) -> &str {
        "Access Log Replay"
    }

    fn short_description(&self) -> &str {
        "Replays operations parsed from a directory-server access log"
    }

    fn long_description(&self) -> String {
        "Parses BIND, CMP, MOD, DEL, and SRCH lines from an access log and \
         replays the resulting operation profile per thread, recording \
         operation rates, durations, and per-type counts."
            .to_string()
    }

    fn category_name(&self) -> &str {
        "Replay"
    }

    fn parameter_stubs(&self) -> ParameterList {
        ParameterList::from_parameters(vec![
            Parameter::new(
                LOG_FILE_PARAMETER,
                "Access Log File",
                ParameterValue::Text(String::new()),
            )
            .required(),
            Parameter::new(
                REPLAY_BINDS_PARAMETER,
                "Replay Bind Operations",
                ParameterValue::Boolean(false),
            ),
            Parameter::new(
                BIND_PASSWORD_PARAMETER,
                "Bind Password",
                ParameterValue::Password(String::new()),
            ),
            Parameter::new(
                OPERATION_DELAY_PARAMETER,
                "Delay Between Operations (ms)",
                ParameterValue::Integer(DEFAULT_OPERATION_DELAY_MS),
            ),
        ])
    }

    fn stat_tracker_stubs(
        &self,
        client_id: &str,
        thread_id: &str,
        collection_interval_secs: u32,
    ) -> Vec<StatTracker> {
        vec![
            StatTracker::Incremental(IncrementalTracker::new(
                client_id,
                thread_id,
                OPERATIONS_TRACKER,
                collection_interval_secs,
            )),
            StatTracker::Time(TimeTracker::new(
                client_id,
                thread_id,
                OPERATION_TIME_TRACKER,
                collection_interval_secs,
            )),
            StatTracker::Categorical(CategoricalTracker::new(
                client_id,
                thread_id,
                OPERATION_TYPES_TRACKER,
                collection_interval_secs,
            )),
        ]
    }

    fn validate_job_info(&self, job: &Job) -> CoreResult<()> {
        job.parameters
            .validate_required()
            .map_err(CoreError::InvalidValue)?;
        if job
            .parameters
            .get_string(LOG_FILE_PARAMETER)
            .unwrap_or("")
            .is_empty()
        {
            return Err(CoreError::InvalidValue(
                "no access log file configured".to_string(),
            ));
        }
        let replay_binds = job
            .parameters
            .get_boolean(REPLAY_BINDS_PARAMETER)
            .unwrap_or(false);
        let bind_password = job
            .parameters
            .get_string(BIND_PASSWORD_PARAMETER)
            .unwrap_or("");
        if replay_binds && bind_password.is_empty() {
            return Err(CoreError::InvalidValue(
                "bind operations enabled but no bind password".to_string(),
            ));
        }
        Ok(())
    }

    fn provides_parameter_test(&self) -> bool {
        true
    }

    fn test_job_parameters(
        &self,
        parameters: &ParameterList,
        output: &mut Vec<String>,
    ) -> CoreResult<bool> {
        let Some(path) = parameters.get_string(LOG_FILE_PARAMETER) else {
            output.push("no access log file configured".to_string());
            return Ok(false);
        };
        match fs::read_to_string(path) {
            Ok(content) => {
                let operations = parse_log(&content);
                output.push(format!(
                    "parsed {} operations from {}",
                    operations.len(),
                    path
                ));
                Ok(!operations.is_empty())
            }
            Err(error) => {
                output.push(format!("unable to read {}: {}", path, error));
                Ok(false)
            }
        }
    }

    fn initialize_client(&mut self, _client_id: &str, parameters: &ParameterList) -> CoreResult<()> {
        let path = parameters.get_string(LOG_FILE_PARAMETER).ok_or_else(|| {
            CoreError::UnableToRun("no access log file configured".to_string())
        })?;
        let content = fs::read_to_string(path).map_err(|error| {
            CoreError::UnableToRun(format!("unable to read access log {}: {}", path, error))
        })?;
        self.operations = parse_log(&content);
        if self.operations.is_empty() {
            return Err(CoreError::UnableToRun(format!(
                "access log {} holds no replayable operations",
                path
            )));
        }
        self.replay_binds = parameters
            .get_boolean(REPLAY_BINDS_PARAMETER)
            .unwrap_or(false);
        self.operation_delay_ms = parameters
            .get_integer(OPERATION_DELAY_PARAMETER)
            .unwrap_or(DEFAULT_OPERATION_DELAY_MS)
            .max(0) as u64;
        Ok(())
    }

    fn initialize_thread(
        &mut self,
        client_id: &str,
        thread_id: &str,
        collection_interval_secs: u32,
        _parameters: &ParameterList,
    ) -> CoreResult<()> {
        if self.operations.is_empty() {
            return Err(CoreError::UnableToRun(
                "client was not initialized before its threads".to_string(),
            ));
        }
        // Stagger thread starting points across the operation list.
        self.thread_offset = thread_id
            .parse::<usize>()
            .map(|thread_index| {
                thread_index.wrapping_mul(self.operations.len() / 16 + 1) % self.operations.len()
            })
            .unwrap_or(0);
        self.attempted = Some(IncrementalTracker::new(
            client_id,
            thread_id,
            OPERATIONS_TRACKER,
            collection_interval_secs,
        ));
        self.operation_time = Some(TimeTracker::new(
            client_id,
            thread_id,
            OPERATION_TIME_TRACKER,
            collection_interval_secs,
        ));
        self.operation_types = Some(CategoricalTracker::new(
            client_id,
            thread_id,
            OPERATION_TYPES_TRACKER,
            collection_interval_secs,
        ));
        Ok(())
    }

    fn run_job(&mut self, control: &ThreadControl) -> CoreResult<()> {
        if self.operations.is_empty() {
            return Err(CoreError::UnableToRun(
                "no operations available to replay".to_string(),
            ));
        }
        let mut attempted = self.attempted.take().ok_or_else(|| {
            CoreError::UnableToRun("thread was not initialized".to_string())
        })?;
        let mut operation_time = self.operation_time.take().ok_or_else(|| {
            CoreError::UnableToRun("thread was not initialized".to_string())
        })?;
        let mut operation_types = self.operation_types.take().ok_or_else(|| {
            CoreError::UnableToRun("thread was not initialized".to_string())
        })?;

        attempted.start();
        operation_time.start();
        operation_types.start();

        let mut index = self.thread_offset;
        while !control.should_stop() {
            let operation = &self.operations[index % self.operations.len()];
            index += 1;

            if matches!(operation, LogOperation::Bind { .. }) && !self.replay_binds {
                continue;
            }

            operation_time.begin_timing();
            self.apply(operation);
            operation_time.end_timing();
            attempted.increment();
            operation_types.increment(operation.type_tag());
        }

        attempted.stop();
        operation_time.stop();
        operation_types.stop();
        self.attempted = Some(attempted);
        self.operation_time = Some(operation_time);
        self.operation_types = Some(operation_types);
        Ok(())
    }

    fn stat_trackers(&self) -> Vec<StatTracker> {
        let mut trackers = Vec::new();
        if let Some(attempted) = &self.attempted {
            trackers.push(StatTracker::Incremental(attempted.clone()));
        }
        if let Some(operation_time) = &self.operation_time {
            trackers.push(StatTracker::Time(operation_time.clone()));
        }
        if let Some(operation_types) = &self.operation_types {
            trackers.push(StatTracker::Categorical(operation_types.clone()));
        }
        trackers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::JobId;
    use chrono::Utc;

    #[test]
    fn test_parse_bind_line() {
        let operation =
            parse_log_line("[01/Jan/2026:00:00:00] conn=1 op=0 BIND dn=\"cn=Directory Manager\" method=128")
                .unwrap();
        assert_eq!(
            operation,
            LogOperation::Bind {
                dn: "cn=Directory Manager".to_string()
            }
        );
    }

    #[test]
    fn test_parse_compare_line() {
        let operation = parse_log_line(
            "conn=2 op=4 CMP dn=\"uid=user.1,ou=People,dc=example,dc=com\" attr=\"mail\" value=x",
        )
        .unwrap();
        assert_eq!(
            operation,
            LogOperation::Compare {
                dn: "uid=user.1,ou=People,dc=example,dc=com".to_string(),
                attribute: "mail".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_modify_and_delete_lines() {
        assert_eq!(
            parse_log_line("conn=3 op=1 MOD dn=\"uid=user.2,dc=example,dc=com\"").unwrap(),
            LogOperation::Modify {
                dn: "uid=user.2,dc=example,dc=com".to_string()
            }
        );
        assert_eq!(
            parse_log_line("conn=3 op=2 DEL dn=\"uid=user.3,dc=example,dc=com\"").unwrap(),
            LogOperation::Delete {
                dn: "uid=user.3,dc=example,dc=com".to_string()
            }
        );
    }

    #[test]
    fn test_parse_search_line_with_attributes() {
        let operation = parse_log_line(
            "conn=4 op=7 SRCH base=\"dc=example,dc=com\" scope=2 filter=\"(uid=user.4)\" attrs=\"cn mail\"",
        )
        .unwrap();
        assert_eq!(
            operation,
            LogOperation::Search {
                base: "dc=example,dc=com".to_string(),
                scope: SearchScope::Subtree,
                filter: "(uid=user.4)".to_string(),
                attributes: vec!["cn".to_string(), "mail".to_string()],
            }
        );
    }

    #[test]
    fn test_search_scope_characters() {
        assert_eq!(SearchScope::from_scope_char('0'), SearchScope::Base);
        assert_eq!(SearchScope::from_scope_char('1'), SearchScope::OneLevel);
        assert_eq!(SearchScope::from_scope_char('2'), SearchScope::Subtree);
        // Tolerant: anything else degrades to a base search.
        assert_eq!(SearchScope::from_scope_char('7'), SearchScope::Base);
        assert_eq!(SearchScope::from_scope_char('x'), SearchScope::Base);
    }

    #[test]
    fn test_unparseable_lines_are_skipped() {
        let log = "garbage line\n\
                   conn=1 op=0 SRCH base=\"dc=example,dc=com\" scope=0 filter=\"(cn=a)\"\n\
                   conn=1 op=1 UNBIND\n";
        let operations = parse_log(log);
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].type_tag(), "SRCH");
    }

    #[test]
    fn test_validation_requires_bind_password_for_bind_replay() {
        let workload = LogReplayWorkload::new();
        let mut job = Job::new(
            JobId::from("20260101000000-abc1231"),
            "LogReplayWorkload",
            Utc::now(),
        );
        job.parameters.set(Parameter::new(
            LOG_FILE_PARAMETER,
            "Access Log File",
            ParameterValue::Text("access.log".to_string()),
        ));
        job.parameters.set(Parameter::new(
            REPLAY_BINDS_PARAMETER,
            "Replay Bind Operations",
            ParameterValue::Boolean(true),
        ));
        let error = workload.validate_job_info(&job).unwrap_err();
        assert!(error.to_string().contains("no bind password"));

        job.parameters.set(Parameter::new(
            BIND_PASSWORD_PARAMETER,
            "Bind Password",
            ParameterValue::Password("secret".to_string()),
        ));
        assert!(workload.validate_job_info(&job).is_ok());
    }
}
