pub mod bus;
pub mod config;
pub mod error;
pub mod shutdown;
pub mod types;

pub use bus::MessageBus;
pub use config::HeraldConfig;
pub use error::{HeraldError, Result};
pub use types::{Job, JobOption, Message};
