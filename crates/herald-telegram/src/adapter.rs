//! Telegram channel adapter.
//!
//! Owns the teloxide `Bot`. Outbound delivery goes through [`TelegramSender`]
//! driven by the dispatcher pool; inbound commands run on a long-polling
//! `Dispatcher` until shutdown.

use teloxide::prelude::*;
use tokio::sync::watch;
use tracing::{debug, info};

use herald_core::config::TelegramConfig;
use herald_core::MessageBus;

use crate::commands::handle_command;
use crate::error::TelegramError;
use crate::sender::TelegramSender;

pub struct TelegramAdapter {
    bot: Bot,
    bus: MessageBus,
}

impl TelegramAdapter {
    pub fn new(config: &TelegramConfig, bus: MessageBus) -> Result<Self, TelegramError> {
        if config.bot_token.trim().is_empty() {
            return Err(TelegramError::NoToken);
        }
        Ok(Self {
            bot: Bot::new(&config.bot_token),
            bus,
        })
    }

    /// Sender for the dispatcher pool, sharing this adapter's bot.
    pub fn sender(&self) -> TelegramSender {
        TelegramSender::new(self.bot.clone())
    }

    /// Check the token against the Bot API. Returns the bot's username.
    pub async fn verify(&self) -> Result<String, TelegramError> {
        let me = self.bot.get_me().await?;
        let username = me.user.username.clone().unwrap_or_default();
        info!(bot = %username, "Telegram: token verified");
        Ok(username)
    }

    /// Drive the long-polling loop until `shutdown` fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Telegram: starting long-polling dispatcher");

        let handler = Update::filter_message().endpoint(handle_command);
        let mut dispatcher = Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.bus])
            .default_handler(|_upd| async {})
            .build();

        let token = dispatcher.shutdown_token();
        tokio::spawn(async move {
            herald_core::shutdown::signalled(&mut shutdown).await;
            match token.shutdown() {
                Ok(stopped) => stopped.await,
                Err(e) => debug!(error = %e, "Telegram: dispatcher was not running"),
            }
        });

        dispatcher.dispatch().await;
        info!("Telegram: dispatcher stopped");
    }
}
