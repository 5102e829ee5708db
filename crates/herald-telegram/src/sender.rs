//! Delivery of rendered units through the Bot API.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use teloxide::RequestError;
use tracing::debug;

use herald_dispatch::{SendError, Sender, UnitPayload};

/// [`Sender`] backed by a teloxide `Bot`. Units are HTML.
#[derive(Clone)]
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Sender for TelegramSender {
    async fn send(&self, chat_id: i64, payload: &UnitPayload) -> Result<(), SendError> {
        let chat = ChatId(chat_id);
        let sent = match payload {
            UnitPayload::Text(text) => self
                .bot
                .send_message(chat, text)
                .parse_mode(ParseMode::Html)
                .await
                .map(|_| ()),
            UnitPayload::Photo { url, caption } => {
                let parsed = reqwest::Url::parse(url)
                    .map_err(|e| SendError::Failed(format!("invalid image url {url}: {e}")))?;
                let mut req = self.bot.send_photo(chat, InputFile::url(parsed));
                if let Some(caption) = caption {
                    req = req.caption(caption).parse_mode(ParseMode::Html);
                }
                req.await.map(|_| ())
            }
        };

        sent.map_err(classify)?;
        debug!(chat_id, "telegram: unit sent");
        Ok(())
    }
}

/// Flood control becomes a retryable rate limit; everything else is final.
fn classify(err: RequestError) -> SendError {
    match err {
        RequestError::RetryAfter(secs) => SendError::RateLimited {
            retry_after: secs.duration(),
        },
        other => SendError::Failed(other.to_string()),
    }
}
