use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::payloads::{GetUpdatesSetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{
    AllowedUpdate, ButtonRequest, KeyboardButton, KeyboardMarkup, ParseMode, UpdateKind,
};
use tracing::debug;

use crate::platform::{InboundMessage, Messenger};
use crate::weather::Coordinate;

const LOCATION_BUTTON: &str = "Enviar ubicación 📍";

/// Replies use legacy `*bold*` markup; dynamic values go through
/// `format::escape`.
#[allow(deprecated)]
const PARSE_MODE: ParseMode = ParseMode::Markdown;

/// Telegram Bot API adapter. Polls `getUpdates` without long-polling so the
/// caller's timer decides the cadence.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(token: &str, timeout: Duration) -> Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(timeout)
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self {
            bot: Bot::with_client(token, client),
        })
    }
}

/// Flatten a Telegram update into the platform-neutral message. Anything
/// other than a plain message comes back without a chat id.
pub(crate) fn inbound_from_update(update: &Update) -> InboundMessage {
    let update_id = u64::from(update.id.0);
    match &update.kind {
        UpdateKind::Message(msg) => InboundMessage {
            update_id,
            chat_id: Some(msg.chat.id.0),
            text: msg.text().map(str::to_string),
            voice: msg.voice().is_some(),
            location: msg
                .location()
                .map(|l| Coordinate::new(l.latitude, l.longitude)),
        },
        _ => InboundMessage {
            update_id,
            chat_id: None,
            text: None,
            voice: false,
            location: None,
        },
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn fetch_updates(&self, after: u64) -> Result<Vec<InboundMessage>> {
        let offset = i32::try_from(after + 1).context("Update offset out of range")?;
        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .timeout(0)
            .allowed_updates(vec![AllowedUpdate::Message])
            .await
            .context("Failed to fetch Telegram updates")?;

        let mut messages: Vec<InboundMessage> = updates.iter().map(inbound_from_update).collect();
        messages.sort_by_key(|m| m.update_id);
        debug!("Fetched {} update(s) after {}", messages.len(), after);
        Ok(messages)
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(PARSE_MODE)
            .await
            .with_context(|| format!("Failed to send message to chat {}", chat_id))?;
        Ok(())
    }

    async fn request_location(&self, chat_id: i64, text: &str) -> Result<()> {
        let keyboard = KeyboardMarkup::new(vec![vec![
            KeyboardButton::new(LOCATION_BUTTON).request(ButtonRequest::Location)
        ]])
        .resize_keyboard()
        .one_time_keyboard();

        self.bot
            .send_message(ChatId(chat_id), text)
            .reply_markup(keyboard)
            .await
            .with_context(|| format!("Failed to send location request to chat {}", chat_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(raw: &str) -> Update {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_text_message_is_flattened() {
        let upd = update(
            r#"{
                "update_id": 10,
                "message": {
                    "message_id": 1,
                    "date": 1700000000,
                    "chat": { "id": 42, "type": "private", "first_name": "Ana" },
                    "from": { "id": 42, "is_bot": false, "first_name": "Ana" },
                    "text": "/ahora"
                }
            }"#,
        );

        let msg = inbound_from_update(&upd);
        assert_eq!(msg.update_id, 10);
        assert_eq!(msg.chat_id, Some(42));
        assert_eq!(msg.text.as_deref(), Some("/ahora"));
        assert!(!msg.voice);
        assert!(msg.location.is_none());
    }

    #[test]
    fn test_location_message_carries_coordinate() {
        let upd = update(
            r#"{
                "update_id": 11,
                "message": {
                    "message_id": 2,
                    "date": 1700000000,
                    "chat": { "id": 42, "type": "private", "first_name": "Ana" },
                    "from": { "id": 42, "is_bot": false, "first_name": "Ana" },
                    "location": { "latitude": -34.6, "longitude": -58.4 }
                }
            }"#,
        );

        let msg = inbound_from_update(&upd);
        assert_eq!(msg.chat_id, Some(42));
        assert_eq!(msg.location, Some(Coordinate::new(-34.6, -58.4)));
        assert!(msg.text.is_none());
    }
}
