use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HeraldError, Result};

/// A persisted cron job definition.
///
/// Owned by the job store; the scheduler only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// UUIDv7 string, primary key.
    pub id: String,
    /// Task name handed to the task queue when the job fires.
    pub name: String,
    /// Five- or six-field cron expression. Empty means "never scheduled".
    pub cron_expr: String,
    /// Arbitrary JSON payload forwarded with every fired task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Ordered task queue options.
    #[serde(default)]
    pub options: Vec<JobOption>,
    pub enabled: bool,
    /// Bumped on every edit; the scheduler re-registers a job when it moves forward.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(name: &str, cron_expr: &str) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            cron_expr: cron_expr.to_string(),
            payload: None,
            options: Vec::new(),
            enabled: true,
            updated_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_option(mut self, option: JobOption) -> Self {
        self.options.push(option);
        self
    }

    /// Only enabled jobs with a cron expression may hold a live registration.
    pub fn is_schedulable(&self) -> bool {
        self.enabled && !self.cron_expr.trim().is_empty()
    }
}

/// One typed key/value scheduling option, stored as `{"type": ..., "value": ...}`.
///
/// Durations are whole seconds and timestamps RFC 3339 strings. The typed
/// translation lives next to the task queue that consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOption {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: serde_json::Value,
}

impl JobOption {
    pub fn new(kind: &str, value: serde_json::Value) -> Self {
        Self {
            kind: kind.to_string(),
            value,
        }
    }

    /// Parse the `type=value` form used on the command line.
    ///
    /// The value is read as JSON when possible (`timeout=30` is a number),
    /// and kept as a plain string otherwise (`queue=critical`).
    pub fn parse(s: &str) -> Result<Self> {
        let (kind, raw) = s
            .split_once('=')
            .ok_or_else(|| HeraldError::InvalidOption(format!("expected type=value, got '{s}'")))?;
        let kind = kind.trim();
        if kind.is_empty() {
            return Err(HeraldError::InvalidOption(format!("missing option type in '{s}'")));
        }
        let raw = raw.trim();
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        Ok(Self::new(kind, value))
    }
}

/// Outbound notification envelope carried on the message bus.
///
/// `view` selects the renderer; its shape decides how `data` is decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Telegram chat that receives the notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    /// Optional image; the first rendered chunk becomes its caption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub view: String,
    #[serde(default)]
    pub data: serde_json::Value,
    /// Delayed messages are throttled per recipient; immediate ones are sent right away.
    #[serde(default)]
    pub delay: bool,
}

impl Message {
    pub fn new(chat_id: i64, view: &str, data: serde_json::Value) -> Self {
        Self {
            chat_id: Some(chat_id),
            image_url: None,
            view: view.to_string(),
            data,
            delay: false,
        }
    }

    pub fn with_image(mut self, url: &str) -> Self {
        self.image_url = Some(url.to_string());
        self
    }

    pub fn delayed(mut self) -> Self {
        self.delay = true;
        self
    }
}
