use async_trait::async_trait;
use tracing::info;

use crate::error::SendError;
use crate::unit::UnitPayload;

/// Outbound notification API the workers deliver through.
///
/// Implementations must be `Send + Sync`; one sender is shared by every worker.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Deliver one unit to `chat_id`.
    ///
    /// Return [`SendError::RateLimited`] when the remote side reports a
    /// retry-after so the worker can back off and retry the same unit.
    async fn send(&self, chat_id: i64, payload: &UnitPayload) -> Result<(), SendError>;
}

/// Sender used when no bot is configured: logs every unit and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl Sender for LogSender {
    async fn send(&self, chat_id: i64, payload: &UnitPayload) -> Result<(), SendError> {
        match payload {
            UnitPayload::Text(text) => {
                info!(chat_id, chars = text.chars().count(), "no sender configured, text dropped")
            }
            UnitPayload::Photo { url, .. } => {
                info!(chat_id, url = %url, "no sender configured, photo dropped")
            }
        }
        Ok(())
    }
}
