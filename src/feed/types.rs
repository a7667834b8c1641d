use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parser-agnostic view of one syndication item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    pub link: String,
    pub guid: String,
    pub title: String,
    pub categories: Vec<String>,
    pub content: String,
    pub description: String,
    pub custom_summary: String,
    pub image: Option<String>,
    pub authors: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl RawItem {
    /// Stable identity used for dedup: the link, else the GUID.
    /// `None` means the item can never be processed.
    pub fn identity(&self) -> Option<&str> {
        [self.link.trim(), self.guid.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
    }

    /// HTML body to render: full content, falling back to the description.
    pub fn body(&self) -> &str {
        if self.content.trim().is_empty() {
            &self.description
        } else {
            &self.content
        }
    }
}

/// A configured source: where to fetch from, who signs, and where to deliver.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub name: String,
    pub url: String,
    pub relay: String,
    pub pub_key: String,
    pub priv_key: String,
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("relay", &self.relay)
            .field("pub_key", &self.pub_key)
            .field("priv_key", &"<redacted>")
            .finish()
    }
}

impl Feed {
    /// A stored feed missing any field is skipped by the scheduler.
    pub fn is_complete(&self) -> bool {
        ![&self.name, &self.url, &self.relay, &self.pub_key, &self.priv_key]
            .iter()
            .any(|s| s.trim().is_empty())
    }
}
