//! `herald-dispatch`: per-recipient delivery of outbound notifications.
//!
//! Messages arrive on the bus, the [`Subscriber`] renders them into
//! [`Entry`]s of [`Unit`]s and buffers them on the [`Pool`]. The pool assigns
//! each recipient to one serial [`Worker`] at a time, bounded by a maximum
//! worker count, and workers deliver through a [`Sender`] while honouring
//! the remote API's retry-after.

pub mod chunk;
pub mod error;
pub mod pool;
pub mod sender;
pub mod subscriber;
pub mod unit;
pub mod views;
pub mod worker;

pub use error::{DispatchError, Result, SendError};
pub use pool::Pool;
pub use sender::{LogSender, Sender};
pub use subscriber::Subscriber;
pub use unit::{Entry, Unit, UnitPayload};
pub use worker::Worker;
