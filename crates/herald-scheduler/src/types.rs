use std::time::Duration;

use chrono::{DateTime, Utc};
use herald_core::JobOption;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Default queue a task lands on when no `queue` option is given.
pub const DEFAULT_QUEUE: &str = "default";
/// Default handler retry budget when no `max-retry` option is given.
pub const DEFAULT_TASK_MAX_RETRY: u32 = 25;

/// A unit of work handed to the task queue on every cron fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    /// JSON-encoded payload; empty when the job carries none.
    pub payload: Vec<u8>,
}

impl Task {
    pub fn new(name: &str, payload: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            payload,
        }
    }
}

/// Typed scheduling option understood by the task queue runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOption {
    Queue(String),
    Timeout(Duration),
    Deadline(DateTime<Utc>),
    Unique(Duration),
    ProcessAt(DateTime<Utc>),
    ProcessIn(Duration),
    TaskId(String),
    Retention(Duration),
    Group(String),
    MaxRetry(u32),
}

impl TryFrom<&JobOption> for TaskOption {
    type Error = SchedulerError;

    fn try_from(opt: &JobOption) -> Result<Self> {
        let kind = opt.kind.as_str();
        let value = &opt.value;
        Ok(match kind {
            "queue" => TaskOption::Queue(string_value(kind, value)?),
            "timeout" => TaskOption::Timeout(duration_value(kind, value)?),
            "deadline" => TaskOption::Deadline(timestamp_value(kind, value)?),
            "unique" => TaskOption::Unique(duration_value(kind, value)?),
            "process-at" => TaskOption::ProcessAt(timestamp_value(kind, value)?),
            "process-in" => TaskOption::ProcessIn(duration_value(kind, value)?),
            "task-id" => TaskOption::TaskId(string_value(kind, value)?),
            "retention" => TaskOption::Retention(duration_value(kind, value)?),
            "group" => TaskOption::Group(string_value(kind, value)?),
            // Anything unrecognised is a retry budget.
            _ => {
                let n = integer_value(kind, value)?;
                let n = u32::try_from(n).map_err(|_| invalid(kind, "retry count out of range"))?;
                TaskOption::MaxRetry(n)
            }
        })
    }
}

/// Translate a job's stored options, preserving their order.
pub fn options_from(options: &[JobOption]) -> Result<Vec<TaskOption>> {
    options.iter().map(TaskOption::try_from).collect()
}

/// Live cron registration held by the scheduler for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Runtime entry ID returned by `register`.
    pub entry_id: String,
    /// The job's `updated_at` at registration time; later syncs diff against it.
    pub updated_at: DateTime<Utc>,
}

/// A fired task as seen by the consumer of the local cron runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    /// Caller-supplied `task-id`, or a fresh UUID.
    pub id: String,
    /// Cron entry that produced this task.
    pub entry_id: String,
    pub name: String,
    pub payload: Vec<u8>,
    pub queue: String,
    pub max_retry: u32,
    pub timeout: Option<Duration>,
    pub deadline: Option<DateTime<Utc>>,
    /// Earliest instant the handler may run.
    pub process_at: DateTime<Utc>,
    pub retention: Option<Duration>,
    pub group: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

fn invalid(kind: &str, reason: &str) -> SchedulerError {
    SchedulerError::InvalidOption {
        kind: kind.to_string(),
        reason: reason.to_string(),
    }
}

fn string_value(kind: &str, value: &serde_json::Value) -> Result<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Ok(s.clone()),
        _ => Err(invalid(kind, "expected a non-empty string")),
    }
}

fn integer_value(kind: &str, value: &serde_json::Value) -> Result<u64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| invalid(kind, "expected a non-negative integer")),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| invalid(kind, "expected a non-negative integer")),
        _ => Err(invalid(kind, "expected a non-negative integer")),
    }
}

/// Durations are whole seconds.
fn duration_value(kind: &str, value: &serde_json::Value) -> Result<Duration> {
    integer_value(kind, value).map(Duration::from_secs)
}

/// Timestamps are RFC 3339 strings or unix seconds.
fn timestamp_value(kind: &str, value: &serde_json::Value) -> Result<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| invalid(kind, &e.to_string())),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| invalid(kind, "timestamp out of range")),
        _ => Err(invalid(kind, "expected an RFC 3339 timestamp")),
    }
}
