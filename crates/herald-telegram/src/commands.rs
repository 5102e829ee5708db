//! Bot commands. Replies are published on the message bus as immediate
//! messages so they share the dispatcher's per-chat ordering and rate limits.

use teloxide::prelude::*;
use tracing::{debug, warn};

use herald_core::{Message as Envelope, MessageBus};

const HELP: &[&str] = &[
    "/start: check that the bot is running",
    "/id: show this chat's ID for job payloads",
    "/help: list commands",
];

/// teloxide endpoint for incoming messages.
pub async fn handle_command(msg: Message, bus: MessageBus) -> ResponseResult<()> {
    if msg.from.as_ref().map(|u| u.is_bot).unwrap_or(false) {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(reply) = reply_for(text, msg.chat.id.0) else {
        return Ok(());
    };

    debug!(chat_id = msg.chat.id.0, command = %text, "telegram: command received");
    if let Err(e) = bus.publish(&reply) {
        warn!(chat_id = msg.chat.id.0, error = %e, "telegram: failed to publish reply");
    }
    Ok(())
}

/// Build the reply for a command, or `None` for anything else.
///
/// Accepts the `/cmd@botname` form used in groups.
pub fn reply_for(text: &str, chat_id: i64) -> Option<Envelope> {
    let command = text.split_whitespace().next()?.strip_prefix('/')?;
    let command = command.split('@').next().unwrap_or(command);

    let reply = match command {
        "start" => Envelope::new(
            chat_id,
            "success.html",
            serde_json::json!("Herald is running. Send /id to get this chat's ID."),
        ),
        "id" => Envelope::new(chat_id, "info.html", serde_json::json!(format!("Chat ID: {chat_id}"))),
        "help" => Envelope::new(chat_id, "list.html", serde_json::json!(HELP)),
        _ => return None,
    };
    Some(reply)
}
