//! Per-recipient serial delivery actor.
//!
//! A worker owns two queues. Delayed entries wait in a FIFO that is drained
//! one entry per ticker period; non-delayed entries are sent as soon as the
//! worker task picks them up. The worker closes itself when a tick finds
//! nothing left to deliver, and a closed worker accepts no more entries.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::sender::Sender;
use crate::unit::Entry;

/// Default spacing between delayed entries for one recipient.
pub const DEFAULT_WORKER_PERIOD: Duration = Duration::from_secs(3);
/// Shortest period a worker or pool ticker accepts; zero would stall the timer.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Default)]
struct WorkerState {
    queue: VecDeque<Entry>,
    immediate: VecDeque<Entry>,
    closed: bool,
}

pub struct Worker {
    recipient: i64,
    sender: Arc<dyn Sender>,
    period: Duration,
    state: Mutex<WorkerState>,
    notify: Notify,
}

enum Step {
    Close,
    Idle,
    Deliver(Entry),
}

impl Worker {
    /// `period` is raised to [`MIN_PERIOD`] when shorter.
    pub fn new(recipient: i64, sender: Arc<dyn Sender>, period: Duration) -> Arc<Self> {
        Arc::new(Self {
            recipient,
            sender,
            period: period.max(MIN_PERIOD),
            state: Mutex::new(WorkerState::default()),
            notify: Notify::new(),
        })
    }

    pub fn recipient(&self) -> i64 {
        self.recipient
    }

    /// Spawn the worker loop. It runs until the worker closes or `shutdown` fires.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.run(shutdown).await })
    }

    /// Hand entries to the worker.
    ///
    /// A closed worker hands them straight back.
    pub fn put(&self, entries: Vec<Entry>) -> Result<(), Vec<Entry>> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(entries);
            }
            for entry in entries {
                if entry.delay {
                    state.queue.push_back(entry);
                } else {
                    state.immediate.push_back(entry);
                }
            }
        }
        self.notify.notify_one();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Entries not yet picked up, both delayed and immediate.
    pub fn pending(&self) -> usize {
        let state = self.lock();
        state.queue.len() + state.immediate.len()
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        debug!(chat_id = self.recipient, "worker started");
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            while let Some(entry) = self.pop_immediate() {
                self.deliver(&mut ticker, entry).await;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    match self.next_step() {
                        Step::Close => break,
                        Step::Idle => {}
                        Step::Deliver(entry) => self.deliver(&mut ticker, entry).await,
                    }
                }
                _ = self.notify.notified() => {}
                _ = herald_core::shutdown::signalled(&mut shutdown) => {
                    let dropped = {
                        let mut state = self.lock();
                        state.closed = true;
                        state.queue.len() + state.immediate.len()
                    };
                    info!(chat_id = self.recipient, dropped, "worker stopped by shutdown");
                    return;
                }
            }
        }

        debug!(chat_id = self.recipient, "worker idle, closed");
    }

    /// Send `entry`; on a rate limit it goes back to the head of the delayed
    /// queue and the next tick waits out the server's backoff.
    async fn deliver(&self, ticker: &mut Interval, mut entry: Entry) {
        let retry_after = entry.process(self.recipient, self.sender.as_ref()).await;
        if !retry_after.is_zero() {
            self.lock().queue.push_front(entry);
            ticker.reset_after(retry_after);
        }
    }

    fn pop_immediate(&self) -> Option<Entry> {
        self.lock().immediate.pop_front()
    }

    /// Decide what a tick does; closing and the emptiness check share one lock.
    fn next_step(&self) -> Step {
        let mut state = self.lock();
        if let Some(entry) = state.queue.pop_front() {
            return Step::Deliver(entry);
        }
        if state.immediate.is_empty() {
            state.closed = true;
            Step::Close
        } else {
            Step::Idle
        }
    }

    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
