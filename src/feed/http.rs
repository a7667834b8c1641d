use super::parse::parse_feed;
use super::types::RawItem;
use super::{FeedSource, FetchError};
use crate::config::FetchConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Fetches feeds over HTTP(S).
pub struct HttpFeedSource {
    client: Client,
    timeout: Duration,
}

impl HttpFeedSource {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(config.timeout_s);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.as_str())
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self { client, timeout })
    }

    /// The client deadline covers headers and body alike.
    fn request_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Request(e)
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<Vec<RawItem>, FetchError> {
        tracing::debug!(url, "fetching feed");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| self.request_error(e))?;
        let items = parse_feed(&bytes)?;

        tracing::debug!(url, count = items.len(), "parsed feed items");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one response: `head` right away, then holds the socket open.
    async fn serve_once(head: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        format!("http://{}/rss", addr)
    }

    fn source() -> HttpFeedSource {
        HttpFeedSource::new(&FetchConfig {
            timeout_s: 1,
            ..FetchConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_stalled_body_is_timeout() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/rss+xml\r\nContent-Length: 4096\r\n\r\n<rss version=\"2.0\"><channel>",
        )
        .await;

        let err = source().fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(t) if t == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let url = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n").await;

        let err = source().fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }
}
