use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Task, TaskOption};

/// Cron + queue runtime the scheduler registers jobs with.
///
/// The runtime owns its own cron loop; `start` / `shutdown` drive that loop
/// independently of individual registrations.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Register `task` to be enqueued on every `cron_expr` occurrence.
    /// Returns the runtime's entry ID.
    async fn register(&self, cron_expr: &str, task: Task, options: Vec<TaskOption>)
        -> Result<String>;

    /// Drop a previously registered entry.
    async fn unregister(&self, entry_id: &str) -> Result<()>;

    /// Start firing registered entries.
    async fn start(&self) -> Result<()>;

    /// Stop the cron loop and wait for it to exit.
    async fn shutdown(&self);
}
