//! Routes tasks fired by the cron runtime to their handlers.
//!
//! Only `notify:send` is handled here: its payload is a message envelope
//! that goes straight onto the bus.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use herald_core::{Message, MessageBus};
use herald_scheduler::QueuedTask;

pub(crate) const NOTIFY_TASK: &str = "notify:send";

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Route {
    Published { chat_id: i64 },
    Deferred { chat_id: i64, wait: Duration },
    Expired,
    Unhandled,
}

pub(crate) struct TaskRouter {
    bus: MessageBus,
    shutdown: watch::Receiver<bool>,
}

impl TaskRouter {
    /// Deferred publications are abandoned once `shutdown` broadcasts `true`.
    pub(crate) fn new(bus: MessageBus, shutdown: watch::Receiver<bool>) -> Self {
        Self { bus, shutdown }
    }

    pub(crate) async fn run(self, mut rx: mpsc::Receiver<QueuedTask>) {
        let mut shutdown = self.shutdown.clone();
        info!("task router started");
        loop {
            tokio::select! {
                task = rx.recv() => {
                    let Some(task) = task else { break };
                    match self.route(&task, Utc::now()) {
                        Ok(route) => debug!(task = %task.name, task_id = %task.id, ?route, "task routed"),
                        Err(e) => warn!(task = %task.name, task_id = %task.id, error = %e, "task dropped"),
                    }
                }
                _ = herald_core::shutdown::signalled(&mut shutdown) => break,
            }
        }
        info!("task router stopped");
    }

    /// Handle one fired task as of `now`.
    pub(crate) fn route(&self, task: &QueuedTask, now: DateTime<Utc>) -> anyhow::Result<Route> {
        if task.name != NOTIFY_TASK {
            debug!(task = %task.name, queue = %task.queue, "no handler for task");
            return Ok(Route::Unhandled);
        }
        // Due at the later of now and process_at; expired if the deadline comes first.
        let due = task.process_at.max(now);
        if task.deadline.is_some_and(|deadline| deadline <= due) {
            return Ok(Route::Expired);
        }

        let msg: Message = serde_json::from_slice(&task.payload)
            .with_context(|| format!("{NOTIFY_TASK} payload is not a message"))?;
        let chat_id = msg
            .chat_id
            .with_context(|| format!("{NOTIFY_TASK} payload has no chat_id"))?;

        if task.process_at > now {
            let wait = (task.process_at - now).to_std().unwrap_or_default();
            let bus = self.bus.clone();
            let mut shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        if let Err(e) = bus.publish(&msg) {
                            warn!(chat_id, error = %e, "deferred notification not published");
                        }
                    }
                    _ = herald_core::shutdown::signalled(&mut shutdown) => {
                        debug!(chat_id, "deferred notification dropped by shutdown");
                    }
                }
            });
            return Ok(Route::Deferred { chat_id, wait });
        }

        self.bus.publish(&msg)?;
        Ok(Route::Published { chat_id })
    }
}
