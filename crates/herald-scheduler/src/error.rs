use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored job row could not be decoded.
    #[error("Invalid job record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    /// The cron expression was rejected by the runtime.
    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    /// A job option could not be translated into a task option.
    #[error("Invalid option '{kind}': {reason}")]
    InvalidOption { kind: String, reason: String },

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// The runtime has no cron entry with the given ID.
    #[error("Cron entry not found: {id}")]
    EntryNotFound { id: String },

    #[error("Failed to register job {id}: {source}")]
    Register {
        id: String,
        #[source]
        source: Box<SchedulerError>,
    },

    #[error("Failed to remove job {id}: {source}")]
    Remove {
        id: String,
        #[source]
        source: Box<SchedulerError>,
    },

    /// Shutdown was requested while the operation was in flight.
    #[error("Operation cancelled")]
    Cancelled,

    /// Reading the catalog exceeded the sync deadline.
    #[error("Operation timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The task queue runtime failed outside a specific entry.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl SchedulerError {
    /// Cancellation and deadline errors are not user-facing failures.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SchedulerError::Cancelled | SchedulerError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
