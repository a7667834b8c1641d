// Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use feed_relay::config::SchedulerConfig;
use feed_relay::engine::{ItemProcessor, PublishWorker};
use feed_relay::feed::{Feed, FeedSource, FetchError, RawItem};
use feed_relay::pipeline::Scheduler;
use feed_relay::relay::types::Message;
use feed_relay::relay::{RelayConnection, RelayConnector, RelayError, SchnorrSigner};
use feed_relay::render::{HtmlRenderer, RenderError, Renderer};
use feed_relay::store::{PublishedSet, RecordStore, SqliteRecordStore, StoreError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub fn secret_key() -> String {
    "33".repeat(32)
}

pub fn pub_key() -> String {
    SchnorrSigner::new().public_key_for(&secret_key()).unwrap()
}

pub fn feed(name: &str) -> Feed {
    Feed {
        name: name.to_string(),
        url: format!("https://{}.example/rss", name),
        relay: "wss://relay.example".to_string(),
        pub_key: pub_key(),
        priv_key: secret_key(),
    }
}

pub fn item(n: u32) -> RawItem {
    RawItem {
        link: format!("https://blog.example/post-{}", n),
        guid: format!("guid-{}", n),
        title: format!("Post {}", n),
        categories: vec!["Rust".to_string()],
        content: format!("<p>Body {}</p>", n),
        ..RawItem::default()
    }
}

pub fn identity(n: u32) -> String {
    format!("https://blog.example/post-{}", n)
}

// ---------------------------------------------------------------------------
// Feed source
// ---------------------------------------------------------------------------

/// Serves canned items per URL. Unknown URLs yield no items.
#[derive(Default)]
pub struct StaticSource {
    items: Mutex<HashMap<String, Result<Vec<RawItem>, String>>>,
    delay: Mutex<Option<Duration>>,
    pub fetches: AtomicUsize,
}

impl StaticSource {
    pub fn set_items(&self, url: &str, items: Vec<RawItem>) {
        self.items.lock().unwrap().insert(url.to_string(), Ok(items));
    }

    pub fn set_failure(&self, url: &str, reason: &str) {
        self.items
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(reason.to_string()));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl FeedSource for StaticSource {
    async fn fetch(&self, url: &str) -> Result<Vec<RawItem>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let entry = self.items.lock().unwrap().get(url).cloned();
        match entry {
            Some(Ok(items)) => Ok(items),
            Some(Err(reason)) => Err(FetchError::Parse(reason)),
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Fails on any input containing `trigger`, renders normally otherwise.
pub struct FailingRenderer {
    pub trigger: &'static str,
}

impl Renderer for FailingRenderer {
    fn render(&self, html: &str) -> Result<String, RenderError> {
        if html.contains(self.trigger) {
            return Err(RenderError(format!("cannot render {}", self.trigger)));
        }
        HtmlRenderer.render(html)
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Accept,
    Reject,
    Disconnect,
}

/// What the fake relay saw. Publishes follow `script`; once it runs out
/// every publish is accepted.
#[derive(Default)]
pub struct RelayLog {
    script: Mutex<VecDeque<Step>>,
    /// Identities (proxy tag) of accepted messages, in delivery order.
    delivered: Mutex<Vec<String>>,
    pub refuse_connect: AtomicBool,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
}

impl RelayLog {
    pub fn script(&self, steps: &[Step]) {
        let mut script = self.script.lock().unwrap();
        script.clear();
        script.extend(steps.iter().copied());
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

pub struct ScriptedConnector {
    pub log: Arc<RelayLog>,
}

#[async_trait]
impl RelayConnector for ScriptedConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn RelayConnection>, RelayError> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        if self.log.refuse_connect.load(Ordering::SeqCst) {
            return Err(RelayError::Connect {
                address: address.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(Box::new(ScriptedConnection {
            log: self.log.clone(),
            dropped: false,
        }))
    }
}

struct ScriptedConnection {
    log: Arc<RelayLog>,
    dropped: bool,
}

#[async_trait]
impl RelayConnection for ScriptedConnection {
    async fn publish(&mut self, message: &Message) -> Result<(), RelayError> {
        if self.dropped {
            return Err(RelayError::Disconnected("already closed".to_string()));
        }
        let step = self
            .log
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Accept);
        match step {
            Step::Accept => {
                let identity = message
                    .tag("proxy")
                    .map(|t| t.value().to_string())
                    .unwrap_or_default();
                self.log.delivered.lock().unwrap().push(identity);
                Ok(())
            }
            Step::Reject => Err(RelayError::Rejected("blocked: test".to_string())),
            Step::Disconnect => {
                self.dropped = true;
                Err(RelayError::Disconnected("stream ended".to_string()))
            }
        }
    }

    async fn close(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Real store with switchable write failures.
pub struct FlakyStore {
    pub inner: SqliteRecordStore,
    pub fail_marks: AtomicBool,
    pub fail_records: AtomicBool,
}

fn write_failure(key: String) -> StoreError {
    StoreError::Write {
        key,
        source: sqlx::Error::PoolClosed,
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn put_feed(&self, feed: &Feed) -> Result<(), StoreError> {
        self.inner.put_feed(feed).await
    }

    async fn list_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        self.inner.list_feeds().await
    }

    async fn feed_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.feed_exists(name).await
    }

    async fn record_message(
        &self,
        feed: &str,
        identity: &str,
        message: &Message,
    ) -> Result<(), StoreError> {
        if self.fail_records.load(Ordering::SeqCst) {
            return Err(write_failure(format!("event_{}_{}", feed, identity)));
        }
        self.inner.record_message(feed, identity, message).await
    }

    async fn message_exists(&self, feed: &str, identity: &str) -> Result<bool, StoreError> {
        self.inner.message_exists(feed, identity).await
    }

    async fn list_unpublished(&self, feed: &str) -> Result<Vec<(String, Message)>, StoreError> {
        self.inner.list_unpublished(feed).await
    }

    async fn mark_published(&self, feed: &str, identity: &str) -> Result<(), StoreError> {
        if self.fail_marks.load(Ordering::SeqCst) {
            return Err(write_failure(format!("published_{}", feed)));
        }
        self.inner.mark_published(feed, identity).await
    }

    async fn published_set(&self, feed: &str) -> Result<PublishedSet, StoreError> {
        self.inner.published_set(feed).await
    }

    async fn list_all_messages(&self) -> Result<Vec<Message>, StoreError> {
        self.inner.list_all_messages().await
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<FlakyStore>,
    pub source: Arc<StaticSource>,
    pub relay: Arc<RelayLog>,
    pub processor: Arc<ItemProcessor>,
    pub publisher: Arc<PublishWorker>,
    pub scheduler: Scheduler,
}

pub async fn harness() -> Harness {
    harness_with(Arc::new(HtmlRenderer), Duration::from_secs(5)).await
}

pub async fn harness_with(renderer: Arc<dyn Renderer>, fetch_timeout: Duration) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let inner = SqliteRecordStore::open(dir.path().join("relay.db"), 2)
        .await
        .unwrap();
    let store = Arc::new(FlakyStore {
        inner,
        fail_marks: AtomicBool::new(false),
        fail_records: AtomicBool::new(false),
    });
    let records: Arc<dyn RecordStore> = store.clone();

    let source = Arc::new(StaticSource::default());
    let relay = Arc::new(RelayLog::default());
    let processor = Arc::new(ItemProcessor::new(
        records.clone(),
        renderer,
        Arc::new(SchnorrSigner::new()),
    ));
    let publisher = Arc::new(PublishWorker::new(
        records.clone(),
        Arc::new(ScriptedConnector { log: relay.clone() }),
        Duration::ZERO,
    ));
    let scheduler = Scheduler::new(
        records,
        source.clone(),
        processor.clone(),
        publisher.clone(),
        SchedulerConfig {
            process_interval_s: 3600,
            publish_interval_s: 3600,
            max_concurrent_feeds: 4,
        },
        fetch_timeout,
    );

    Harness {
        dir,
        store,
        source,
        relay,
        processor,
        publisher,
        scheduler,
    }
}

/// A second scheduler over the harness parts, capped at `max_concurrent_feeds`.
pub fn scheduler_with_limit(h: &Harness, max_concurrent_feeds: usize) -> Scheduler {
    Scheduler::new(
        h.store.clone(),
        h.source.clone(),
        h.processor.clone(),
        h.publisher.clone(),
        SchedulerConfig {
            process_interval_s: 3600,
            publish_interval_s: 3600,
            max_concurrent_feeds,
        },
        Duration::from_secs(5),
    )
}

/// Every published identity of `feed` also has a recorded message.
pub async fn assert_published_subset(store: &dyn RecordStore, feed: &str) {
    let published = store.published_set(feed).await.unwrap();
    for identity in &published.links {
        assert!(
            store.message_exists(feed, identity).await.unwrap(),
            "{} published without a recorded message",
            identity
        );
    }
}
