use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::sender::Sender;
use crate::unit::Entry;
use crate::worker::{Worker, DEFAULT_WORKER_PERIOD, MIN_PERIOD};

/// Default cap on concurrently live workers.
pub const DEFAULT_MAX_WORKERS: usize = 25;
/// Default reconcile cadence.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Buffers entries per recipient and hands them to a bounded set of workers.
///
/// `add` only buffers; assignment happens on the pool's own tick, which is
/// also where closed workers are reclaimed.
pub struct Pool {
    sender: Arc<dyn Sender>,
    waiting: DashMap<i64, Vec<Entry>>,
    workers: DashMap<i64, Arc<Worker>>,
    max: usize,
    tick: Duration,
    worker_period: Duration,
}

impl Pool {
    pub fn new(sender: Arc<dyn Sender>) -> Self {
        Self {
            sender,
            waiting: DashMap::new(),
            workers: DashMap::new(),
            max: DEFAULT_MAX_WORKERS,
            tick: DEFAULT_TICK,
            worker_period: DEFAULT_WORKER_PERIOD,
        }
    }

    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    /// Reconcile cadence, raised to [`MIN_PERIOD`] when shorter.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(MIN_PERIOD);
        self
    }

    pub fn with_worker_period(mut self, period: Duration) -> Self {
        self.worker_period = period.max(MIN_PERIOD);
        self
    }

    /// Buffer `entry` for `recipient`. Never blocks on delivery.
    pub fn add(&self, recipient: i64, entry: Entry) {
        self.waiting.entry(recipient).or_default().push(entry);
    }

    /// Reconcile once per tick until `shutdown` broadcasts `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(max_workers = self.max, tick_ms = self.tick.as_millis() as u64, "dispatcher pool started");
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let worker_shutdown = shutdown.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => self.reconcile(&worker_shutdown),
                _ = herald_core::shutdown::signalled(&mut shutdown) => break,
            }
        }

        let buffered: usize = self.waiting.iter().map(|slot| slot.value().len()).sum();
        self.waiting.clear();
        info!(dropped = buffered, "dispatcher pool stopped");
    }

    /// One assignment pass: sweep closed workers, then give every recipient
    /// with waiting entries to a live worker while capacity allows.
    pub fn reconcile(&self, shutdown: &watch::Receiver<bool>) {
        self.workers.retain(|_, worker| !worker.is_closed());
        let mut need = self.max.saturating_sub(self.workers.len());

        let recipients: Vec<i64> = self
            .waiting
            .iter()
            .filter(|slot| !slot.value().is_empty())
            .map(|slot| *slot.key())
            .collect();

        for recipient in recipients {
            let Some((_, entries)) = self.waiting.remove(&recipient) else {
                continue;
            };
            if entries.is_empty() {
                continue;
            }

            let existing = self.workers.get(&recipient).map(|w| Arc::clone(w.value()));
            let live = match existing {
                Some(worker) if !worker.is_closed() => Some(worker),
                Some(_) => {
                    self.workers.remove(&recipient);
                    need += 1;
                    None
                }
                None => None,
            };

            let worker = match live {
                Some(worker) => worker,
                None if need > 0 => {
                    need -= 1;
                    let worker = Worker::new(recipient, Arc::clone(&self.sender), self.worker_period);
                    worker.spawn(shutdown.clone());
                    self.workers.insert(recipient, Arc::clone(&worker));
                    debug!(chat_id = recipient, live = self.workers.len(), "worker spawned");
                    worker
                }
                None => {
                    self.requeue(recipient, entries);
                    continue;
                }
            };

            if let Err(rejected) = worker.put(entries) {
                debug!(chat_id = recipient, "worker closed during hand-off, entries re-buffered");
                self.requeue(recipient, rejected);
            }
        }
    }

    /// Number of workers not yet closed.
    pub fn live_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| !w.value().is_closed())
            .count()
    }

    /// Entries buffered for `recipient` and not yet handed to a worker.
    pub fn waiting_len(&self, recipient: i64) -> usize {
        self.waiting.get(&recipient).map(|slot| slot.len()).unwrap_or(0)
    }

    /// Put `entries` back in front of anything added meanwhile.
    fn requeue(&self, recipient: i64, mut entries: Vec<Entry>) {
        let mut slot = self.waiting.entry(recipient).or_default();
        entries.append(&mut *slot);
        *slot = entries;
    }
}
