//! Durable state: feeds, recorded messages and per-feed published sets.
//!
//! Every mutating call is durable before it returns `Ok`. A value appears in a
//! feed's published set only if a message with that identity was recorded,
//! and published sets never shrink.

pub mod keys;
pub mod sqlite;

use crate::feed::Feed;
use crate::relay::types::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sqlite::SqliteRecordStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    Open(#[source] sqlx::Error),

    /// The write could not be durably committed.
    #[error("storage write failed for {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("storage read failed: {0}")]
    Read(#[source] sqlx::Error),

    #[error("corrupt record at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode record for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no recorded message for {identity} in feed {feed}")]
    NotRecorded { feed: String, identity: String },

    #[error("key {key} already holds {identity} of feed {feed}")]
    KeyTaken {
        key: String,
        feed: String,
        identity: String,
    },
}

/// Identities confirmed delivered to a feed's relay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedSet {
    pub feed: String,
    pub links: Vec<String>,
}

impl PublishedSet {
    pub fn contains(&self, identity: &str) -> bool {
        self.links.iter().any(|l| l == identity)
    }
}

/// Message record as persisted: the message plus the keys it was recorded under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub feed: String,
    pub identity: String,
    pub message: Message,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace a feed by name.
    async fn put_feed(&self, feed: &Feed) -> Result<(), StoreError>;

    async fn list_feeds(&self) -> Result<Vec<Feed>, StoreError>;

    async fn feed_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Overwrites a message previously recorded for the same (feed, identity);
    /// fails with [`StoreError::KeyTaken`] if the key holds another pair's
    /// message. Callers check `message_exists` first under the feed's
    /// processing lock.
    async fn record_message(
        &self,
        feed: &str,
        identity: &str,
        message: &Message,
    ) -> Result<(), StoreError>;

    async fn message_exists(&self, feed: &str, identity: &str) -> Result<bool, StoreError>;

    /// Recorded messages of `feed` not yet in its published set, in recording order.
    async fn list_unpublished(&self, feed: &str) -> Result<Vec<(String, Message)>, StoreError>;

    /// Add `identity` to the feed's published set. Fails with
    /// [`StoreError::NotRecorded`] if no message was recorded for it.
    async fn mark_published(&self, feed: &str, identity: &str) -> Result<(), StoreError>;

    async fn published_set(&self, feed: &str) -> Result<PublishedSet, StoreError>;

    async fn list_all_messages(&self) -> Result<Vec<Message>, StoreError>;
}
