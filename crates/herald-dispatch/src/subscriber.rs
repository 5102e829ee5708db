//! Bridge from the message bus to the dispatcher pool.

use std::sync::Arc;

use herald_core::Message;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{DispatchError, Result};
use crate::pool::Pool;
use crate::unit::{Entry, DEFAULT_MAX_RETRY};

/// Decodes bus envelopes, renders them and buffers the resulting entries.
pub struct Subscriber {
    pool: Arc<Pool>,
    max_retry: u32,
}

impl Subscriber {
    pub fn new(pool: Arc<Pool>) -> Self {
        Self {
            pool,
            max_retry: DEFAULT_MAX_RETRY,
        }
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    /// Consume `rx` until the bus closes or `shutdown` fires.
    pub async fn run(&self, mut rx: broadcast::Receiver<String>, mut shutdown: watch::Receiver<bool>) {
        info!("bus subscriber started");
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(raw) => {
                        if let Err(e) = self.handle(&raw) {
                            warn!(error = %e, "bus message dropped");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "bus subscriber lagged, messages lost");
                    }
                    Err(RecvError::Closed) => {
                        info!("message bus closed");
                        break;
                    }
                },
                _ = herald_core::shutdown::signalled(&mut shutdown) => break,
            }
        }
        info!("bus subscriber stopped");
    }

    /// Turn one raw envelope into an entry on the pool.
    pub fn handle(&self, raw: &str) -> Result<()> {
        let msg: Message = serde_json::from_str(raw)?;
        let chat_id = msg.chat_id.ok_or(DispatchError::MissingRecipient)?;
        let entry = Entry::from_message(&msg, self.max_retry)?;
        debug!(chat_id, view = %msg.view, units = entry.len(), delay = entry.delay, "message buffered");
        self.pool.add(chat_id, entry);
        Ok(())
    }
}
