pub mod http;
pub mod parse;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpFeedSource;
pub use types::{Feed, RawItem};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("feed returned HTTP {status}: {url}")]
    Status { status: u16, url: String },

    #[error("failed to parse feed: {0}")]
    Parse(String),

    #[error("feed fetch timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Fetches a feed document and returns its items.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<RawItem>, FetchError>;
}
