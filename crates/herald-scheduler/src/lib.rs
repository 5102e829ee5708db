//! `herald-scheduler`: keeps a cron task runtime in step with a persisted
//! job catalog.
//!
//! # Overview
//!
//! Jobs live in a SQLite `jobs` table ([`store::SqliteJobStore`]). The
//! [`engine::Scheduler`] streams the enabled jobs on a fixed interval and
//! reconciles them against the entries it registered with a
//! [`queue::TaskQueue`]: stale registrations are dropped, new or updated jobs
//! are (re-)registered. [`runtime::LocalCron`] is the in-process queue
//! runtime; it fires [`types::QueuedTask`]s into an mpsc channel.
//!
//! # Job options
//!
//! | Type         | Value                                  |
//! |--------------|----------------------------------------|
//! | `queue`      | queue name                             |
//! | `timeout`    | seconds                                |
//! | `deadline`   | RFC 3339 timestamp or unix seconds     |
//! | `unique`     | seconds                                |
//! | `process-at` | RFC 3339 timestamp or unix seconds     |
//! | `process-in` | seconds                                |
//! | `task-id`    | string                                 |
//! | `retention`  | seconds                                |
//! | `group`      | group name                             |
//! | anything else| max retry count                        |

pub mod db;
pub mod engine;
pub mod error;
pub mod queue;
pub mod runtime;
pub mod schedule;
pub mod store;
pub mod types;

pub use engine::{Scheduler, SyncReport};
pub use error::{Result, SchedulerError};
pub use queue::TaskQueue;
pub use runtime::LocalCron;
pub use store::{JobStore, SqliteJobStore};
pub use types::{QueuedTask, Registration, Task, TaskOption};
