//! Per-chat state the router needs between messages: the remembered
//! location, the fingerprint of the last reply per category and the ambient
//! throttle bucket.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use sha2::{Digest, Sha256};

use crate::weather::Coordinate;

/// Replies that take part in deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyCategory {
    Later,
    Tomorrow,
}

/// SHA-256 hex digest of a rendered reply
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn location(&self, chat_id: i64) -> Option<Coordinate>;
    async fn set_location(&self, chat_id: i64, coord: Coordinate);

    async fn last_reply(&self, chat_id: i64, category: ReplyCategory) -> Option<String>;
    async fn set_last_reply(&self, chat_id: i64, category: ReplyCategory, fingerprint: String);

    async fn ambient_bucket(&self, chat_id: i64) -> Option<String>;
    async fn set_ambient_bucket(&self, chat_id: i64, bucket: String);
}

/// In-process store. Every map is bounded by capacity and idle time so a
/// long-running bot does not grow without limit.
#[derive(Clone)]
pub struct MemorySessionStore {
    locations: Cache<i64, Coordinate>,
    replies: Cache<(i64, ReplyCategory), String>,
    buckets: Cache<i64, String>,
}

impl MemorySessionStore {
    pub fn new(max_chats: u64, idle: Duration) -> Self {
        Self {
            locations: Cache::builder()
                .max_capacity(max_chats)
                .time_to_idle(idle)
                .build(),
            // one entry per deduplicated category
            replies: Cache::builder()
                .max_capacity(max_chats.saturating_mul(2))
                .time_to_idle(idle)
                .build(),
            buckets: Cache::builder()
                .max_capacity(max_chats)
                .time_to_idle(idle)
                .build(),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn location(&self, chat_id: i64) -> Option<Coordinate> {
        self.locations.get(&chat_id).await
    }

    async fn set_location(&self, chat_id: i64, coord: Coordinate) {
        self.locations.insert(chat_id, coord).await;
    }

    async fn last_reply(&self, chat_id: i64, category: ReplyCategory) -> Option<String> {
        self.replies.get(&(chat_id, category)).await
    }

    async fn set_last_reply(&self, chat_id: i64, category: ReplyCategory, fingerprint: String) {
        self.replies.insert((chat_id, category), fingerprint).await;
    }

    async fn ambient_bucket(&self, chat_id: i64) -> Option<String> {
        self.buckets.get(&chat_id).await
    }

    async fn set_ambient_bucket(&self, chat_id: i64, bucket: String) {
        self.buckets.insert(chat_id, bucket).await;
    }
}
