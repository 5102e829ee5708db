use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use herald_core::Job;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, SchedulerError},
    queue::TaskQueue,
    store::JobStore,
    types::{options_from, Registration, Task},
};

/// Default cadence of the catalog resync.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);
/// Default bound on reading the whole catalog in one pass.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(60);
/// Shortest accepted resync cadence.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Payload field that receives the owning job's ID when present.
const JOB_ID_FIELD: &str = "job_id";

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Jobs registered (new or re-registered after an update).
    pub added: usize,
    /// Registrations dropped because their job vanished, was disabled or changed.
    pub removed: usize,
    /// Stale registrations whose removal failed; their fresh copies were not added.
    pub failed_removals: usize,
    /// Jobs the runtime refused to register.
    pub failed_adds: usize,
    /// Jobs left out because their old registration could not be cleaned up
    /// or they carry no cron expression.
    pub skipped: usize,
}

/// Keeps the task queue's cron entries in step with the persisted job catalog.
///
/// All mutation of the registration table (`add`, `remove`, `sync`) happens
/// under one async mutex, so reconciliations never interleave.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    registrations: Mutex<HashMap<String, Registration>>,
    interval: Duration,
    sync_timeout: Duration,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            store,
            queue,
            registrations: Mutex::new(HashMap::new()),
            interval: DEFAULT_SYNC_INTERVAL,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }

    /// Resync cadence, raised to [`MIN_SYNC_INTERVAL`] when shorter.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_SYNC_INTERVAL);
        self
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Initial sync, then start the runtime and resync on every interval
    /// until `shutdown` broadcasts `true`.
    ///
    /// Cancellation or a timeout during the initial sync ends the run quietly;
    /// any other initial failure, or a failure to start the runtime, is returned.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let first = tokio::select! {
            res = self.sync() => res,
            _ = herald_core::shutdown::signalled(&mut shutdown) => Err(SchedulerError::Cancelled),
        };
        match first {
            Ok(report) => info!(?report, "initial job sync complete"),
            Err(e) if e.is_cancellation() => {
                info!(error = %e, "initial job sync interrupted, scheduler not started");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        self.queue.start().await?;
        info!(interval_secs = self.interval.as_secs(), "scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; the initial sync already covered it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sync().await {
                        Ok(report) => debug!(?report, "job sync complete"),
                        Err(e) => error!(error = %e, "job sync failed"),
                    }
                }
                _ = herald_core::shutdown::signalled(&mut shutdown) => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }

        self.queue.shutdown().await;
        info!("scheduler stopped");
        Ok(())
    }

    /// Register `job`, replacing any existing registration for its ID.
    ///
    /// Jobs that are disabled or have no cron expression only lose their
    /// previous registration.
    pub async fn add(&self, job: &Job) -> Result<()> {
        let mut table = self.registrations.lock().await;

        if table.contains_key(&job.id) {
            self.remove_locked(&mut table, &job.id)
                .await
                .map_err(|e| SchedulerError::Remove {
                    id: job.id.clone(),
                    source: Box::new(e),
                })?;
        }

        if !job.is_schedulable() {
            debug!(job_id = %job.id, "job not schedulable, left unregistered");
            return Ok(());
        }

        self.add_locked(&mut table, job)
            .await
            .map_err(|e| SchedulerError::Register {
                id: job.id.clone(),
                source: Box::new(e),
            })
    }

    /// Unregister the job with `id`. No-op when it has no registration.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut table = self.registrations.lock().await;
        self.remove_locked(&mut table, id)
            .await
            .map_err(|e| SchedulerError::Remove {
                id: id.to_string(),
                source: Box::new(e),
            })
    }

    /// Reconcile the registration table with the enabled jobs in the store.
    ///
    /// Stale registrations are removed before fresh ones are added. A job
    /// whose stale registration could not be removed is not re-added in the
    /// same pass; it is picked up again when a later pass still finds it stale.
    pub async fn sync(&self) -> Result<SyncReport> {
        let mut table = self.registrations.lock().await;
        let mut report = SyncReport::default();

        let (pending, current) = self.diff(&table).await?;

        let stale: Vec<String> = table
            .keys()
            .filter(|id| !current.contains(*id))
            .cloned()
            .collect();

        let mut failed: HashSet<String> = HashSet::new();
        for id in stale {
            match self.remove_locked(&mut table, &id).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!(job_id = %id, error = %e, "failed to remove stale registration");
                    report.failed_removals += 1;
                    failed.insert(id);
                }
            }
        }

        for job in pending {
            if failed.contains(&job.id) {
                warn!(job_id = %job.id, "previous registration still live, skipping re-add");
                report.skipped += 1;
                continue;
            }
            if job.cron_expr.trim().is_empty() {
                debug!(job_id = %job.id, "job has no cron expression, skipping");
                report.skipped += 1;
                continue;
            }
            match self.add_locked(&mut table, &job).await {
                Ok(()) => report.added += 1,
                Err(e) => {
                    error!(job_id = %job.id, name = %job.name, error = %e, "failed to register job");
                    report.failed_adds += 1;
                }
            }
        }

        Ok(report)
    }

    /// Snapshot of the registration held for `id`.
    pub async fn registration(&self, id: &str) -> Option<Registration> {
        self.registrations.lock().await.get(id).cloned()
    }

    /// Number of live registrations.
    pub async fn len(&self) -> usize {
        self.registrations.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // --- private helpers ---------------------------------------------------

    /// Stream the enabled catalog and split it into jobs to (re-)add and IDs
    /// whose registration is still current.
    async fn diff(
        &self,
        table: &HashMap<String, Registration>,
    ) -> Result<(Vec<Job>, HashSet<String>)> {
        let deadline = tokio::time::Instant::now() + self.sync_timeout;
        let mut stream = self.store.find_enabled();
        let mut pending = Vec::new();
        let mut current = HashSet::new();

        loop {
            let next = tokio::time::timeout_at(deadline, stream.next())
                .await
                .map_err(|_| SchedulerError::Timeout {
                    secs: self.sync_timeout.as_secs(),
                })?;
            let Some(job) = next else { break };
            let job = job?;

            match table.get(&job.id) {
                Some(reg) if reg.updated_at >= job.updated_at => {
                    current.insert(job.id);
                }
                _ => pending.push(job),
            }
        }

        Ok((pending, current))
    }

    async fn add_locked(&self, table: &mut HashMap<String, Registration>, job: &Job) -> Result<()> {
        let task = task_for(job)?;
        let options = options_from(&job.options)?;
        let entry_id = self.queue.register(&job.cron_expr, task, options).await?;

        info!(job_id = %job.id, name = %job.name, entry_id = %entry_id, "job registered");
        table.insert(
            job.id.clone(),
            Registration {
                entry_id,
                updated_at: job.updated_at,
            },
        );
        Ok(())
    }

    async fn remove_locked(&self, table: &mut HashMap<String, Registration>, id: &str) -> Result<()> {
        let Some(reg) = table.get(id) else {
            return Ok(());
        };
        self.queue.unregister(&reg.entry_id).await?;
        info!(job_id = %id, entry_id = %reg.entry_id, "job unregistered");
        table.remove(id);
        Ok(())
    }
}

/// Build the task handed to the runtime.
///
/// An object payload that declares a `job_id` field gets the owning job's ID
/// written into it, so handlers can trace a fired task back to its job.
pub fn task_for(job: &Job) -> Result<Task> {
    let payload = match &job.payload {
        Some(value) => {
            let mut value = value.clone();
            if let Some(obj) = value.as_object_mut() {
                if obj.contains_key(JOB_ID_FIELD) {
                    obj.insert(
                        JOB_ID_FIELD.to_string(),
                        serde_json::Value::String(job.id.clone()),
                    );
                }
            }
            serde_json::to_vec(&value)?
        }
        None => Vec::new(),
    };
    Ok(Task::new(&job.name, payload))
}
