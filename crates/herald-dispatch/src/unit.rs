//! Deliverable units and the entries that group them.

use std::collections::VecDeque;
use std::time::Duration;

use herald_core::Message;
use tracing::{debug, warn};

use crate::chunk::{split_chunks, CAPTION_MAX, MESSAGE_MAX};
use crate::error::{DispatchError, Result, SendError};
use crate::sender::Sender;
use crate::views;

/// Default send attempts per unit.
pub const DEFAULT_MAX_RETRY: u32 = 3;

/// What a single API call delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitPayload {
    /// HTML text, at most [`MESSAGE_MAX`] characters.
    Text(String),
    /// Photo by URL with an optional HTML caption of at most [`CAPTION_MAX`] characters.
    Photo { url: String, caption: Option<String> },
}

/// One API call plus its retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub payload: UnitPayload,
    pub retry_count: u32,
    pub max_retry: u32,
}

impl Unit {
    pub fn new(payload: UnitPayload, max_retry: u32) -> Self {
        Self {
            payload,
            retry_count: 0,
            max_retry,
        }
    }
}

/// Ordered units derived from one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub units: VecDeque<Unit>,
    /// Delayed entries wait for the worker's ticker; others go out at once.
    pub delay: bool,
}

impl Entry {
    pub fn new(units: impl IntoIterator<Item = Unit>, delay: bool) -> Self {
        Self {
            units: units.into_iter().collect(),
            delay,
        }
    }

    /// Render `msg` and split it into units.
    ///
    /// With an image, the first text chunk becomes the photo caption when it
    /// fits; otherwise the photo goes out uncaptioned ahead of the text.
    pub fn from_message(msg: &Message, max_retry: u32) -> Result<Self> {
        let html = views::render(&msg.view, &msg.data)?;
        let mut chunks: VecDeque<String> = if html.trim().is_empty() {
            VecDeque::new()
        } else {
            split_chunks(&html, MESSAGE_MAX).into()
        };

        let mut units = Vec::with_capacity(chunks.len() + 1);
        if let Some(url) = msg.image_url.as_deref().filter(|u| !u.is_empty()) {
            let caption = match chunks.front() {
                Some(first) if first.chars().count() <= CAPTION_MAX => chunks.pop_front(),
                _ => None,
            };
            units.push(Unit::new(
                UnitPayload::Photo {
                    url: url.to_string(),
                    caption,
                },
                max_retry,
            ));
        }
        units.extend(
            chunks
                .into_iter()
                .map(|text| Unit::new(UnitPayload::Text(text), max_retry)),
        );

        if units.is_empty() {
            return Err(DispatchError::Empty);
        }
        Ok(Entry::new(units, msg.delay))
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Send units in order until done, rate limited, or failed.
    ///
    /// Returns the server's `retry_after` when a unit was rate limited and
    /// still has attempts left; that unit is back at the front. Otherwise
    /// returns zero and the entry is empty.
    pub async fn process(&mut self, chat_id: i64, sender: &dyn Sender) -> Duration {
        while let Some(mut unit) = self.units.pop_front() {
            match sender.send(chat_id, &unit.payload).await {
                Ok(()) => {
                    debug!(chat_id, remaining = self.units.len(), "unit delivered");
                }
                Err(SendError::RateLimited { retry_after }) if !retry_after.is_zero() => {
                    unit.retry_count += 1;
                    if unit.retry_count < unit.max_retry {
                        warn!(
                            chat_id,
                            attempt = unit.retry_count,
                            retry_after_secs = retry_after.as_secs(),
                            "rate limited, will retry"
                        );
                        self.units.push_front(unit);
                        return retry_after;
                    }
                    warn!(
                        chat_id,
                        attempts = unit.retry_count,
                        dropped = self.units.len() + 1,
                        "rate limited past retry budget, abandoning entry"
                    );
                    self.units.clear();
                    return Duration::ZERO;
                }
                Err(e) => {
                    warn!(
                        chat_id,
                        error = %e,
                        dropped = self.units.len() + 1,
                        "delivery failed, abandoning entry"
                    );
                    self.units.clear();
                    return Duration::ZERO;
                }
            }
        }
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_of(unit: &Unit) -> &str {
        match &unit.payload {
            UnitPayload::Text(t) => t,
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn plain_message_becomes_one_text_unit() {
        let msg = Message::new(42, "success.html", json!("ok"));
        let entry = Entry::from_message(&msg, DEFAULT_MAX_RETRY).unwrap();
        assert_eq!(entry.len(), 1);
        assert!(!entry.delay);
        assert_eq!(text_of(&entry.units[0]), "✅ ok");
        assert_eq!(entry.units[0].max_retry, 3);
    }

    #[test]
    fn short_text_with_image_becomes_caption() {
        let msg = Message::new(1, "info.html", json!("look"))
            .with_image("https://img/x.png")
            .delayed();
        let entry = Entry::from_message(&msg, 3).unwrap();
        assert_eq!(entry.len(), 1);
        assert!(entry.delay);
        assert_eq!(
            entry.units[0].payload,
            UnitPayload::Photo {
                url: "https://img/x.png".into(),
                caption: Some("ℹ️ look".into())
            }
        );
    }

    #[test]
    fn long_text_with_image_sends_bare_photo_first() {
        let long = "z".repeat(2000);
        let msg = Message::new(1, "info.html", json!(long)).with_image("https://img/y.png");
        let entry = Entry::from_message(&msg, 3).unwrap();
        assert_eq!(entry.len(), 2);
        assert_eq!(
            entry.units[0].payload,
            UnitPayload::Photo {
                url: "https://img/y.png".into(),
                caption: None
            }
        );
        assert!(text_of(&entry.units[1]).ends_with(&long));
    }

    #[test]
    fn oversized_render_is_chunked() {
        let items: Vec<String> = (0..500).map(|i| format!("item number {i:04}")).collect();
        let msg = Message::new(1, "list.html", json!(items));
        let entry = Entry::from_message(&msg, 3).unwrap();
        assert!(entry.len() >= 2);
        assert!(entry
            .units
            .iter()
            .all(|u| text_of(u).chars().count() <= MESSAGE_MAX));
    }

    #[test]
    fn empty_render_is_rejected() {
        let msg = Message::new(1, "list.html", json!([]));
        assert!(matches!(
            Entry::from_message(&msg, 3),
            Err(DispatchError::Empty)
        ));
    }
}
