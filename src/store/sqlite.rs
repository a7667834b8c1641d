//! SQLite-backed [`RecordStore`], used as an ordered key-value table.
//!
//! `seq` records insertion order and survives upserts, so message scans come
//! back in recording order. Writes are serialized behind `writer`; reads take
//! its shared half so they never interleave with a read-modify-write.

use super::keys::{self, EVENT_PREFIX, FEED_PREFIX};
use super::{PublishedSet, RecordStore, StoreError, StoredMessage};
use crate::feed::Feed;
use crate::relay::types::Message;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS kv (
    seq   INTEGER PRIMARY KEY AUTOINCREMENT,
    key   TEXT NOT NULL UNIQUE,
    value TEXT NOT NULL
)";

const UPSERT_SQL: &str = "INSERT INTO kv (key, value) VALUES (?, ?)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value";

const GET_SQL: &str = "SELECT value FROM kv WHERE key = ?";

const EXISTS_SQL: &str = "SELECT 1 FROM kv WHERE key = ?";

// `[prefix, upper)` range so the scan stays on the `key` index
const SCAN_BY_KEY_SQL: &str =
    "SELECT key, value FROM kv WHERE key >= ? AND key < ? ORDER BY key";

const SCAN_BY_SEQ_SQL: &str =
    "SELECT key, value FROM kv WHERE key >= ? AND key < ? ORDER BY seq";

// only for prefixes without a representable upper bound
const SCAN_OPEN_BY_KEY_SQL: &str =
    "SELECT key, value FROM kv WHERE substr(key, 1, ?) = ? ORDER BY key";

const SCAN_OPEN_BY_SEQ_SQL: &str =
    "SELECT key, value FROM kv WHERE substr(key, 1, ?) = ? ORDER BY seq";

#[derive(Debug, Clone, Copy)]
enum ScanOrder {
    Key,
    Recorded,
}

pub struct SqliteRecordStore {
    pool: SqlitePool,
    writer: RwLock<()>,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the store at `path`.
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(StoreError::Open)?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .map_err(StoreError::Open)?;

        tracing::info!(path = %path.display(), "record store opened");
        Ok(Self {
            pool,
            writer: RwLock::new(()),
        })
    }

    /// Close all connections. Later calls fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let raw: Option<String> = sqlx::query_scalar(GET_SQL)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Read)?;

        raw.map(|value| {
            serde_json::from_str(&value).map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar(EXISTS_SQL)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Read)?;
        Ok(found.is_some())
    }

    async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;

        sqlx::query(UPSERT_SQL)
            .bind(key)
            .bind(encoded)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Write {
                key: key.to_string(),
                source,
            })?;
        Ok(())
    }

    /// All records under `prefix`. Undecodable records are logged and skipped
    /// so one bad value can't hide the rest.
    async fn scan<T: DeserializeOwned>(
        &self,
        prefix: &str,
        order: ScanOrder,
    ) -> Result<Vec<(String, T)>, StoreError> {
        let query = match (prefix_upper_bound(prefix), order) {
            (Some(upper), ScanOrder::Key) => sqlx::query_as::<Sqlite, (String, String)>(SCAN_BY_KEY_SQL)
                .bind(prefix)
                .bind(upper),
            (Some(upper), ScanOrder::Recorded) => {
                sqlx::query_as::<Sqlite, (String, String)>(SCAN_BY_SEQ_SQL)
                    .bind(prefix)
                    .bind(upper)
            }
            (None, ScanOrder::Key) => sqlx::query_as::<Sqlite, (String, String)>(SCAN_OPEN_BY_KEY_SQL)
                .bind(prefix.chars().count() as i64)
                .bind(prefix),
            (None, ScanOrder::Recorded) => {
                sqlx::query_as::<Sqlite, (String, String)>(SCAN_OPEN_BY_SEQ_SQL)
                    .bind(prefix.chars().count() as i64)
                    .bind(prefix)
            }
        };
        let rows: Vec<(String, String)> = query
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Read)?;

        let mut out = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            match serde_json::from_str(&value) {
                Ok(decoded) => out.push((key, decoded)),
                Err(e) => tracing::error!(key = %key, error = %e, "skipping corrupt record"),
            }
        }
        Ok(out)
    }

    /// The message recorded for exactly this (feed, identity). Feed names may
    /// contain `_`, so a row under the same key can belong to another pair;
    /// the envelope decides.
    async fn load_message(
        &self,
        feed: &str,
        identity: &str,
    ) -> Result<Option<StoredMessage>, StoreError> {
        Ok(self
            .get::<StoredMessage>(&keys::event_key(feed, identity))
            .await?
            .filter(|record| record.feed == feed && record.identity == identity))
    }

    async fn load_published(&self, feed: &str) -> Result<PublishedSet, StoreError> {
        Ok(self
            .get::<PublishedSet>(&keys::published_key(feed))
            .await?
            .unwrap_or_else(|| PublishedSet {
                feed: feed.to_string(),
                links: Vec::new(),
            }))
    }
}

/// Smallest string above every string starting with `prefix`: the prefix with
/// its last character bumped by one. Byte order of UTF-8 follows code point
/// order, which is how SQLite compares TEXT by default.
fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut chars = prefix.chars();
    let last = chars.next_back()?;
    let bumped = char::from_u32(u32::from(last) + 1)?;
    let mut upper = chars.as_str().to_string();
    upper.push(bumped);
    Some(upper)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn put_feed(&self, feed: &Feed) -> Result<(), StoreError> {
        let _guard = self.writer.write().await;
        self.put(&keys::feed_key(&feed.name), feed).await
    }

    async fn list_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        let _guard = self.writer.read().await;
        let feeds = self.scan::<Feed>(FEED_PREFIX, ScanOrder::Key).await?;
        Ok(feeds.into_iter().map(|(_, feed)| feed).collect())
    }

    async fn feed_exists(&self, name: &str) -> Result<bool, StoreError> {
        let _guard = self.writer.read().await;
        self.exists(&keys::feed_key(name)).await
    }

    async fn record_message(
        &self,
        feed: &str,
        identity: &str,
        message: &Message,
    ) -> Result<(), StoreError> {
        let record = StoredMessage {
            feed: feed.to_string(),
            identity: identity.to_string(),
            message: message.clone(),
        };
        let key = keys::event_key(feed, identity);
        let _guard = self.writer.write().await;

        if let Some(existing) = self.get::<StoredMessage>(&key).await? {
            if existing.feed != feed || existing.identity != identity {
                return Err(StoreError::KeyTaken {
                    key,
                    feed: existing.feed,
                    identity: existing.identity,
                });
            }
        }
        self.put(&key, &record).await
    }

    async fn message_exists(&self, feed: &str, identity: &str) -> Result<bool, StoreError> {
        let _guard = self.writer.read().await;
        Ok(self.load_message(feed, identity).await?.is_some())
    }

    async fn list_unpublished(&self, feed: &str) -> Result<Vec<(String, Message)>, StoreError> {
        let _guard = self.writer.read().await;
        let published = self.load_published(feed).await?;
        let records = self
            .scan::<StoredMessage>(&keys::event_prefix(feed), ScanOrder::Recorded)
            .await?;

        Ok(records
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| record.feed == feed && !published.contains(&record.identity))
            .map(|record| (record.identity, record.message))
            .collect())
    }

    async fn mark_published(&self, feed: &str, identity: &str) -> Result<(), StoreError> {
        let _guard = self.writer.write().await;

        if self.load_message(feed, identity).await?.is_none() {
            return Err(StoreError::NotRecorded {
                feed: feed.to_string(),
                identity: identity.to_string(),
            });
        }

        let mut published = self.load_published(feed).await?;
        if published.contains(identity) {
            return Ok(());
        }
        published.feed = feed.to_string();
        published.links.push(identity.to_string());
        self.put(&keys::published_key(feed), &published).await
    }

    async fn published_set(&self, feed: &str) -> Result<PublishedSet, StoreError> {
        let _guard = self.writer.read().await;
        self.load_published(feed).await
    }

    async fn list_all_messages(&self) -> Result<Vec<Message>, StoreError> {
        let _guard = self.writer.read().await;
        let records = self
            .scan::<StoredMessage>(EVENT_PREFIX, ScanOrder::Recorded)
            .await?;
        Ok(records.into_iter().map(|(_, r)| r.message).collect())
    }
}
