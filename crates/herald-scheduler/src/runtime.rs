//! `LocalCron`: in-process cron + queue runtime.
//!
//! Registered entries are checked once per tick; every entry whose next fire
//! time has arrived produces a [`QueuedTask`] on the fired-task channel. The
//! send is non-blocking (`try_send`) so a slow consumer never stalls the tick.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::queue::TaskQueue;
use crate::schedule::{compute_next_run, parse_cron};
use crate::types::{QueuedTask, Task, TaskOption, DEFAULT_QUEUE, DEFAULT_TASK_MAX_RETRY};

const DEFAULT_TICK: Duration = Duration::from_secs(1);
const MIN_TICK: Duration = Duration::from_millis(10);

struct CronEntry {
    schedule: cron::Schedule,
    task: Task,
    options: Vec<TaskOption>,
    next_run: Option<DateTime<Utc>>,
}

struct CronState {
    entries: Mutex<HashMap<String, CronEntry>>,
    /// Uniqueness key -> lock expiry, for the `unique` option.
    unique_locks: Mutex<HashMap<String, DateTime<Utc>>>,
    fired_tx: mpsc::Sender<QueuedTask>,
}

/// In-process implementation of [`TaskQueue`] backed by the `cron` crate.
pub struct LocalCron {
    state: Arc<CronState>,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    tick: Duration,
}

impl LocalCron {
    /// Fired tasks are delivered to `fired_tx`.
    pub fn new(fired_tx: mpsc::Sender<QueuedTask>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: Arc::new(CronState {
                entries: Mutex::new(HashMap::new()),
                unique_locks: Mutex::new(HashMap::new()),
                fired_tx,
            }),
            shutdown_tx,
            handle: tokio::sync::Mutex::new(None),
            tick: DEFAULT_TICK,
        }
    }

    /// Check cadence; anything under 10 ms is raised to 10 ms.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(MIN_TICK);
        self
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        lock(&self.state.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next fire time of `entry_id`, if registered and not exhausted.
    pub fn next_run(&self, entry_id: &str) -> Option<DateTime<Utc>> {
        lock(&self.state.entries)
            .get(entry_id)
            .and_then(|e| e.next_run)
    }

    /// Enqueue every entry due at `now`. Returns the number of tasks sent.
    pub fn fire_due(&self, now: DateTime<Utc>) -> usize {
        self.state.fire_due(now)
    }
}

#[async_trait]
impl TaskQueue for LocalCron {
    async fn register(
        &self,
        cron_expr: &str,
        task: Task,
        options: Vec<TaskOption>,
    ) -> Result<String> {
        let schedule = parse_cron(cron_expr)?;
        let next_run = compute_next_run(&schedule, Utc::now());
        if next_run.is_none() {
            return Err(SchedulerError::InvalidCron {
                expr: cron_expr.to_string(),
                reason: "no future occurrence".to_string(),
            });
        }

        let entry_id = Uuid::new_v4().to_string();
        info!(entry_id = %entry_id, task = %task.name, cron = %cron_expr, "cron entry registered");
        lock(&self.state.entries).insert(
            entry_id.clone(),
            CronEntry {
                schedule,
                task,
                options,
                next_run,
            },
        );
        Ok(entry_id)
    }

    async fn unregister(&self, entry_id: &str) -> Result<()> {
        match lock(&self.state.entries).remove(entry_id) {
            Some(entry) => {
                info!(entry_id = %entry_id, task = %entry.task.name, "cron entry unregistered");
                Ok(())
            }
            None => Err(SchedulerError::EntryNotFound {
                id: entry_id.to_string(),
            }),
        }
    }

    async fn start(&self) -> Result<()> {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return Err(SchedulerError::Runtime("cron runtime already started".to_string()));
        }

        let state = Arc::clone(&self.state);
        let mut shutdown = self.shutdown_tx.subscribe();
        let tick = self.tick;

        *handle = Some(tokio::spawn(async move {
            info!(tick_ms = tick.as_millis() as u64, "cron runtime started");
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        state.fire_due(Utc::now());
                    }
                    _ = herald_core::shutdown::signalled(&mut shutdown) => break,
                }
            }
            info!("cron runtime stopped");
        }));
        Ok(())
    }

    async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "cron runtime task ended abnormally");
            }
        }
    }
}

impl CronState {
    fn fire_due(&self, now: DateTime<Utc>) -> usize {
        // Collect under the lock, send after releasing it.
        let mut due = Vec::new();
        {
            let mut entries = lock(&self.entries);
            for (entry_id, entry) in entries.iter_mut() {
                if entry.next_run.is_some_and(|next| next <= now) {
                    due.push(build_task(entry_id, entry, now));
                    entry.next_run = compute_next_run(&entry.schedule, now);
                }
            }
        }

        let mut sent = 0;
        for (task, unique) in due {
            if let Some(ttl) = unique {
                if !self.claim_unique(&task, ttl, now) {
                    debug!(task = %task.name, queue = %task.queue, "duplicate of a unique task, skipped");
                    continue;
                }
            }
            let name = task.name.clone();
            match self.fired_tx.try_send(task) {
                Ok(()) => {
                    debug!(task = %name, "task enqueued");
                    sent += 1;
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(task = %name, "fired-task channel full, task dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(task = %name, "fired-task channel closed, task dropped");
                }
            }
        }
        sent
    }

    /// Take the uniqueness lock for `task`; false while an earlier copy still holds it.
    fn claim_unique(&self, task: &QueuedTask, ttl: Duration, now: DateTime<Utc>) -> bool {
        let key = format!(
            "{}:{}:{}",
            task.queue,
            task.name,
            String::from_utf8_lossy(&task.payload)
        );
        let mut locks = lock(&self.unique_locks);
        locks.retain(|_, expiry| *expiry > now);
        if locks.contains_key(&key) {
            return false;
        }
        locks.insert(key, add_std(now, ttl));
        true
    }
}

/// Apply options in order; a later option overrides an earlier one of the same kind.
fn build_task(
    entry_id: &str,
    entry: &CronEntry,
    now: DateTime<Utc>,
) -> (QueuedTask, Option<Duration>) {
    let mut task = QueuedTask {
        id: Uuid::new_v4().to_string(),
        entry_id: entry_id.to_string(),
        name: entry.task.name.clone(),
        payload: entry.task.payload.clone(),
        queue: DEFAULT_QUEUE.to_string(),
        max_retry: DEFAULT_TASK_MAX_RETRY,
        timeout: None,
        deadline: None,
        process_at: now,
        retention: None,
        group: None,
        enqueued_at: now,
    };
    let mut unique = None;

    for option in &entry.options {
        match option {
            TaskOption::Queue(q) => task.queue = q.clone(),
            TaskOption::Timeout(d) => task.timeout = Some(*d),
            TaskOption::Deadline(at) => task.deadline = Some(*at),
            TaskOption::Unique(ttl) => unique = Some(*ttl),
            TaskOption::ProcessAt(at) => task.process_at = *at,
            TaskOption::ProcessIn(d) => task.process_at = add_std(now, *d),
            TaskOption::TaskId(id) => task.id = id.clone(),
            TaskOption::Retention(d) => task.retention = Some(*d),
            TaskOption::Group(g) => task.group = Some(g.clone()),
            TaskOption::MaxRetry(n) => task.max_retry = *n,
        }
    }

    (task, unique)
}

/// Saturating `at + d`.
fn add_std(at: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock leaves the maps structurally intact.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
