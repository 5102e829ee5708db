use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{Result, SchedulerError};

/// Parse a cron expression into a [`cron::Schedule`].
///
/// Accepts the classic five-field form (`min hour dom mon dow`), which is
/// widened with a leading `0` seconds field, as well as six/seven-field
/// expressions and `@daily`-style shorthands understood by the `cron` crate.
pub fn parse_cron(expr: &str) -> Result<cron::Schedule> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Err(SchedulerError::InvalidCron {
            expr: expr.to_string(),
            reason: "empty expression".to_string(),
        });
    }

    let normalized = if !trimmed.starts_with('@') && trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };

    cron::Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Compute the next UTC fire time strictly after `from`.
///
/// Returns `None` when the schedule has no future occurrence (e.g. a year field in the past).
pub fn compute_next_run(schedule: &cron::Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&from).next()
}
