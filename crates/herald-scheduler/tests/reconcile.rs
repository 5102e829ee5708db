// Reconciliation behaviour of the scheduler against in-memory fakes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;

use herald_core::Job;
use herald_scheduler::{
    schedule::parse_cron, JobStore, Result, Scheduler, SchedulerError, Task, TaskOption, TaskQueue,
};

#[derive(Default)]
struct MemoryStore {
    jobs: Mutex<Vec<Job>>,
    broken: AtomicBool,
    stalled: AtomicBool,
}

impl MemoryStore {
    fn put(&self, job: Job) {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.retain(|j| j.id != job.id);
        jobs.push(job);
    }

    fn delete(&self, id: &str) {
        self.jobs.lock().unwrap().retain(|j| j.id != id);
    }

    /// Simulate a CRUD edit: bump `updated_at` and apply `f`.
    fn edit(&self, id: &str, f: impl FnOnce(&mut Job)) -> Job {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.iter_mut().find(|j| j.id == id).unwrap();
        f(job);
        job.updated_at = job.updated_at + chrono::Duration::seconds(1);
        job.clone()
    }
}

impl JobStore for MemoryStore {
    fn find_enabled(&self) -> BoxStream<'static, Result<Job>> {
        if self.stalled.load(Ordering::SeqCst) {
            return stream::pending().boxed();
        }
        if self.broken.load(Ordering::SeqCst) {
            return stream::iter(vec![Err(SchedulerError::Runtime("store offline".into()))]).boxed();
        }
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.enabled)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        stream::iter(jobs.into_iter().map(Ok)).boxed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Register(String),
    Unregister(String),
}

#[derive(Default)]
struct RecordingQueue {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicUsize,
    live: Mutex<HashMap<String, String>>,
    refuse_unregister: Mutex<HashSet<String>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl RecordingQueue {
    fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn live_tasks(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn register(&self, cron_expr: &str, task: Task, _options: Vec<TaskOption>) -> Result<String> {
        self.calls.lock().unwrap().push(Call::Register(task.name.clone()));
        parse_cron(cron_expr)?;
        let id = format!("entry-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.live.lock().unwrap().insert(id.clone(), task.name);
        Ok(id)
    }

    async fn unregister(&self, entry_id: &str) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Unregister(entry_id.to_string()));
        if self.refuse_unregister.lock().unwrap().contains(entry_id) {
            return Err(SchedulerError::Runtime("runtime unavailable".into()));
        }
        self.live
            .lock()
            .unwrap()
            .remove(entry_id)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::EntryNotFound { id: entry_id.to_string() })
    }

    async fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

fn setup() -> (Arc<MemoryStore>, Arc<RecordingQueue>, Scheduler) {
    let store = Arc::new(MemoryStore::default());
    let queue = Arc::new(RecordingQueue::default());
    let scheduler = Scheduler::new(store.clone(), queue.clone());
    (store, queue, scheduler)
}

#[tokio::test]
async fn sync_registers_every_enabled_job_with_its_timestamp() {
    let (store, queue, scheduler) = setup();
    let a = Job::new("feed:fetch", "*/5 * * * *");
    let b = Job::new("sitemap:fetch", "0 * * * *");
    let mut off = Job::new("digest:send", "0 9 * * *");
    off.enabled = false;
    for job in [&a, &b, &off] {
        store.put(job.clone());
    }

    let report = scheduler.sync().await.unwrap();
    assert_eq!(report.added, 2);
    assert_eq!(queue.live_tasks(), 2);

    for job in [&a, &b] {
        let reg = scheduler.registration(&job.id).await.unwrap();
        assert_eq!(reg.updated_at, job.updated_at);
    }
    assert!(scheduler.registration(&off.id).await.is_none());
}

#[tokio::test]
async fn bad_cron_does_not_block_the_rest_of_the_catalog() {
    let (store, _queue, scheduler) = setup();
    let bad = Job::new("broken", "every now and then");
    let good = Job::new("feed:fetch", "*/5 * * * *");
    store.put(bad.clone());
    store.put(good.clone());

    let report = scheduler.sync().await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.failed_adds, 1);
    assert!(scheduler.registration(&good.id).await.is_some());
    assert!(scheduler.registration(&bad.id).await.is_none());
}

#[tokio::test]
async fn second_sync_of_unchanged_catalog_is_a_no_op() {
    let (store, queue, scheduler) = setup();
    store.put(Job::new("feed:fetch", "*/5 * * * *"));
    store.put(Job::new("sitemap:fetch", "0 * * * *"));

    scheduler.sync().await.unwrap();
    queue.take_calls();

    let report = scheduler.sync().await.unwrap();
    assert_eq!(report, Default::default());
    assert!(queue.take_calls().is_empty());
}

#[tokio::test]
async fn disabled_and_deleted_jobs_lose_their_registration() {
    let (store, queue, scheduler) = setup();
    let keep = Job::new("keep", "* * * * *");
    let disable = Job::new("disable", "* * * * *");
    let delete = Job::new("delete", "* * * * *");
    for job in [&keep, &disable, &delete] {
        store.put(job.clone());
    }
    scheduler.sync().await.unwrap();
    assert_eq!(queue.live_tasks(), 3);

    store.edit(&disable.id, |j| j.enabled = false);
    store.delete(&delete.id);

    let report = scheduler.sync().await.unwrap();
    assert_eq!(report.removed, 2);
    assert_eq!(report.added, 0);
    assert_eq!(scheduler.len().await, 1);
    assert!(scheduler.registration(&keep.id).await.is_some());
    assert_eq!(queue.live_tasks(), 1);
}

#[tokio::test]
async fn updated_job_is_unregistered_then_registered_once() {
    let (store, queue, scheduler) = setup();
    let job = Job::new("feed:fetch", "*/5 * * * *");
    store.put(job.clone());
    scheduler.sync().await.unwrap();
    let old = scheduler.registration(&job.id).await.unwrap();
    queue.take_calls();

    let edited = store.edit(&job.id, |_| {});
    scheduler.sync().await.unwrap();

    assert_eq!(
        queue.take_calls(),
        vec![
            Call::Unregister(old.entry_id.clone()),
            Call::Register("feed:fetch".into())
        ]
    );
    let new = scheduler.registration(&job.id).await.unwrap();
    assert_ne!(new.entry_id, old.entry_id);
    assert_eq!(new.updated_at, edited.updated_at);
}

#[tokio::test]
async fn cleared_cron_expression_drops_the_registration() {
    let (store, queue, scheduler) = setup();
    let job = Job::new("feed:fetch", "*/5 * * * *");
    store.put(job.clone());
    scheduler.sync().await.unwrap();

    store.edit(&job.id, |j| j.cron_expr.clear());
    let report = scheduler.sync().await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.skipped, 1);
    assert!(scheduler.is_empty().await);
    assert_eq!(queue.live_tasks(), 0);
}

#[tokio::test]
async fn failed_removal_skips_re_add_until_a_later_pass() {
    let (store, queue, scheduler) = setup();
    let job = Job::new("feed:fetch", "*/5 * * * *");
    store.put(job.clone());
    scheduler.sync().await.unwrap();
    let old = scheduler.registration(&job.id).await.unwrap();

    queue.refuse_unregister.lock().unwrap().insert(old.entry_id.clone());
    store.edit(&job.id, |_| {});
    queue.take_calls();

    let report = scheduler.sync().await.unwrap();
    assert_eq!(report.failed_removals, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.added, 0);
    assert_eq!(queue.take_calls(), vec![Call::Unregister(old.entry_id.clone())]);
    // The old registration stays on record; no duplicate was created.
    assert_eq!(scheduler.registration(&job.id).await.unwrap(), old);
    assert_eq!(queue.live_tasks(), 1);

    queue.refuse_unregister.lock().unwrap().clear();
    let report = scheduler.sync().await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.added, 1);
    assert_eq!(queue.live_tasks(), 1);
}

#[tokio::test]
async fn store_error_aborts_the_pass_before_any_removal() {
    let (store, queue, scheduler) = setup();
    store.put(Job::new("feed:fetch", "*/5 * * * *"));
    scheduler.sync().await.unwrap();
    queue.take_calls();

    store.broken.store(true, Ordering::SeqCst);
    assert!(scheduler.sync().await.is_err());
    assert!(queue.take_calls().is_empty());
    assert_eq!(scheduler.len().await, 1);
}

#[tokio::test]
async fn add_replaces_and_remove_unregisters() {
    let (_store, queue, scheduler) = setup();
    let mut job = Job::new("feed:fetch", "*/5 * * * *");

    scheduler.add(&job).await.unwrap();
    let first = scheduler.registration(&job.id).await.unwrap();

    job.updated_at = Utc::now();
    scheduler.add(&job).await.unwrap();
    let second = scheduler.registration(&job.id).await.unwrap();
    assert_ne!(first.entry_id, second.entry_id);
    assert_eq!(queue.live_tasks(), 1);

    scheduler.remove(&job.id).await.unwrap();
    assert!(scheduler.is_empty().await);
    assert_eq!(queue.live_tasks(), 0);

    // Removing an unknown job is a no-op.
    scheduler.remove("unknown").await.unwrap();
}

#[tokio::test]
async fn add_of_disabled_job_only_removes() {
    let (_store, queue, scheduler) = setup();
    let mut job = Job::new("feed:fetch", "*/5 * * * *");
    scheduler.add(&job).await.unwrap();

    job.enabled = false;
    scheduler.add(&job).await.unwrap();
    assert!(scheduler.is_empty().await);
    assert_eq!(queue.live_tasks(), 0);
}

#[tokio::test]
async fn add_wraps_runtime_errors() {
    let (_store, _queue, scheduler) = setup();
    let job = Job::new("broken", "not cron");
    let err = scheduler.add(&job).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Register { .. }));
    assert!(err.to_string().contains(&job.id));
}

#[tokio::test(start_paused = true)]
async fn run_syncs_periodically_and_shuts_the_runtime_down() {
    let (store, queue, scheduler) = setup();
    let scheduler = Arc::new(scheduler.with_interval(Duration::from_secs(300)));
    let first = Job::new("feed:fetch", "*/5 * * * *");
    store.put(first.clone());

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run(rx).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(queue.started.load(Ordering::SeqCst));
    assert!(scheduler.registration(&first.id).await.is_some());

    let later = Job::new("sitemap:fetch", "0 * * * *");
    store.put(later.clone());
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(scheduler.registration(&later.id).await.is_some());

    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
    assert!(queue.stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn run_returns_initial_store_failure() {
    let (store, queue, scheduler) = setup();
    store.broken.store(true, Ordering::SeqCst);

    let (_tx, rx) = watch::channel(false);
    assert!(scheduler.run(rx).await.is_err());
    assert!(!queue.started.load(Ordering::SeqCst));
}

#[tokio::test]
async fn shutdown_during_initial_sync_is_not_an_error() {
    let (store, queue, scheduler) = setup();
    store.stalled.store(true, Ordering::SeqCst);

    let (tx, rx) = watch::channel(false);
    let run = scheduler.run(rx);
    tx.send(true).unwrap();
    run.await.unwrap();
    assert!(!queue.started.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn initial_sync_deadline_is_not_an_error() {
    let (store, queue, scheduler) = setup();
    let scheduler = scheduler.with_sync_timeout(Duration::from_secs(5));
    store.stalled.store(true, Ordering::SeqCst);

    assert!(matches!(
        scheduler.sync().await,
        Err(SchedulerError::Timeout { secs: 5 })
    ));

    let (_tx, rx) = watch::channel(false);
    scheduler.run(rx).await.unwrap();
    assert!(!queue.started.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn zero_interval_falls_back_to_the_minimum_cadence() {
    let (store, queue, scheduler) = setup();
    let scheduler = Arc::new(scheduler.with_interval(Duration::ZERO));

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run(rx).await }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(queue.started.load(Ordering::SeqCst));

    let job = Job::new("feed:fetch", "*/5 * * * *");
    store.put(job.clone());
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(scheduler.registration(&job.id).await.is_some());

    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}
