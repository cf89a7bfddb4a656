pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

use crate::weather::Coordinate;

/// A message received from the messaging platform
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Platform-assigned update identifier, monotonic per bot
    pub update_id: u64,
    /// Originating chat. `None` marks an update the bot cannot answer.
    pub chat_id: Option<i64>,
    pub text: Option<String>,
    /// True when the message carries a voice note
    pub voice: bool,
    pub location: Option<Coordinate>,
}

#[cfg(test)]
impl InboundMessage {
    /// Plain text message
    pub fn text(update_id: u64, chat_id: i64, text: &str) -> Self {
        Self {
            update_id,
            chat_id: Some(chat_id),
            text: Some(text.to_string()),
            voice: false,
            location: None,
        }
    }
}

/// Outbound side of the messaging platform plus the update feed.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Fetch every update with an identifier strictly greater than `after`,
    /// in ascending identifier order.
    async fn fetch_updates(&self, after: u64) -> Result<Vec<InboundMessage>>;

    /// Send Markdown text. Empty text is a no-op.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Send text together with a one-time keyboard asking for the location.
    async fn request_location(&self, chat_id: i64, text: &str) -> Result<()>;
}
