use std::time::Duration;

use thiserror::Error;

/// Errors raised while turning a bus message into deliverable units.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The bus payload is not a valid message envelope.
    #[error("Malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    /// No renderer is registered under the requested view name.
    #[error("Unknown view: {0}")]
    UnknownView(String),

    /// The message data does not match the shape the view expects.
    #[error("Invalid data for view {view}: {reason}")]
    InvalidData { view: String, reason: String },

    /// The message carries no `chat_id`.
    #[error("Message has no recipient")]
    MissingRecipient,

    /// The rendered message produced nothing to send.
    #[error("Message rendered empty")]
    Empty,
}

/// Failure reported by a [`Sender`](crate::sender::Sender).
#[derive(Debug, Error)]
pub enum SendError {
    /// The remote API asked us to back off.
    #[error("Rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// Any other delivery failure; not retried.
    #[error("Send failed: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
