pub mod adapter;
pub mod commands;
pub mod error;
pub mod sender;

pub use adapter::TelegramAdapter;
pub use error::TelegramError;
pub use sender::TelegramSender;
