//! Raw feed item -> recorded, signed message. At most once per (feed, identity).

use super::slug::slug;
use crate::feed::{Feed, RawItem};
use crate::relay::types::{Message, Tag, UnsignedMessage, KIND_TEXT_NOTE};
use crate::relay::{MessageSigner, SignError, VerifyError};
use crate::render::{RenderError, Renderer};
use crate::store::{RecordStore, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Failure confined to a single item. The item is skipped for this cycle and
/// retried from scratch on the next one.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("signing failed: {0}")]
    Signing(#[from] SignError),

    #[error("verification failed: {0}")]
    Verification(#[from] VerifyError),
}

#[derive(Debug)]
pub enum ProcessOutcome {
    /// A new message was recorded under this identity.
    Recorded(String),
    AlreadyRecorded(String),
    /// Neither link nor GUID; the item is dropped for good.
    NoIdentity,
    Aborted { identity: String, error: ItemError },
}

pub struct ItemProcessor {
    store: Arc<dyn RecordStore>,
    renderer: Arc<dyn Renderer>,
    signer: Arc<dyn MessageSigner>,
}

impl ItemProcessor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        renderer: Arc<dyn Renderer>,
        signer: Arc<dyn MessageSigner>,
    ) -> Self {
        Self {
            store,
            renderer,
            signer,
        }
    }

    /// Convert and record one item.
    ///
    /// Item-local failures come back as [`ProcessOutcome::Aborted`]; only store
    /// failures are returned as errors. Callers hold the feed's processing lock
    /// so the existence check and the write cannot race.
    pub async fn process(&self, feed: &Feed, item: &RawItem) -> Result<ProcessOutcome, StoreError> {
        let Some(identity) = item.identity() else {
            tracing::debug!(feed = %feed.name, title = %item.title, "dropping item without link or guid");
            return Ok(ProcessOutcome::NoIdentity);
        };

        if self.store.message_exists(&feed.name, identity).await? {
            return Ok(ProcessOutcome::AlreadyRecorded(identity.to_string()));
        }

        let message = match self.build(feed, item, identity) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(
                    feed = %feed.name,
                    identity,
                    error = %error,
                    "skipping item"
                );
                return Ok(ProcessOutcome::Aborted {
                    identity: identity.to_string(),
                    error,
                });
            }
        };

        self.store
            .record_message(&feed.name, identity, &message)
            .await?;
        tracing::debug!(feed = %feed.name, identity, id = %message.id, "message recorded");
        Ok(ProcessOutcome::Recorded(identity.to_string()))
    }

    fn build(&self, feed: &Feed, item: &RawItem, identity: &str) -> Result<Message, ItemError> {
        let body = self.renderer.render(item.body())?;
        let summary = if item.custom_summary.trim().is_empty() {
            None
        } else {
            Some(self.renderer.render(&item.custom_summary)?)
        };

        let unsigned = UnsignedMessage {
            kind: KIND_TEXT_NOTE,
            content: compose_content(&body, &item.categories),
            tags: build_tags(item, identity, summary),
            created_at: chrono::Utc::now().timestamp(),
        };

        let message = self.signer.sign(unsigned, &feed.priv_key)?;
        self.signer.verify_binding(&message, &feed.pub_key)?;
        Ok(message)
    }
}

/// Rendered body, a blank line, then one `#tag ` per category.
fn compose_content(body: &str, categories: &[String]) -> String {
    let hashtags: String = category_slugs(categories)
        .map(|c| format!("#{} ", c))
        .collect();
    format!("{}\n\n{}", body, hashtags)
}

fn category_slugs(categories: &[String]) -> impl Iterator<Item = String> + '_ {
    categories
        .iter()
        .map(|c| slug(c))
        .filter(|c| !c.is_empty())
}

/// Fixed tag order: title, proxy, d, t..., then the optional summary, image,
/// author and published_at.
fn build_tags(item: &RawItem, identity: &str, summary: Option<String>) -> Vec<Tag> {
    let mut tags = vec![
        Tag::new("title", item.title.trim()),
        Tag::with_extra("proxy", identity, "activitypub"),
        Tag::new("d", slug(&item.title)),
    ];
    tags.extend(category_slugs(&item.categories).map(|c| Tag::new("t", c)));

    if let Some(summary) = summary.filter(|s| !s.is_empty()) {
        tags.push(Tag::new("summary", summary));
    }
    if let Some(image) = item.image.as_deref().map(str::trim).filter(|i| !i.is_empty()) {
        tags.push(Tag::new("image", image));
    }
    if let Some(author) = item.authors.iter().map(|a| a.trim()).find(|a| !a.is_empty()) {
        tags.push(Tag::new("author", author));
    }
    if let Some(published) = item.published_at {
        tags.push(Tag::new("published_at", published.timestamp().to_string()));
    }
    tags
}
