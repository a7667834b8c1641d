//! Delivers a feed's pending messages to its relay.

use crate::feed::Feed;
use crate::relay::{RelayConnection, RelayConnector, RelayError};
use crate::store::{RecordStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    /// Relay unreachable; nothing was attempted.
    #[error(transparent)]
    Connect(RelayError),

    #[error("could not read pending messages: {0}")]
    Store(#[from] StoreError),
}

/// What one publish run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub pending: usize,
    /// Accepted by the relay and marked published.
    pub published: Vec<String>,
    pub failed: Vec<String>,
    /// Accepted by the relay but the mark did not commit; redelivered next run.
    pub unmarked: Vec<String>,
    /// The connection dropped before the queue was finished.
    pub disconnected: bool,
}

pub struct PublishWorker {
    store: Arc<dyn RecordStore>,
    connector: Arc<dyn RelayConnector>,
    delay: Duration,
}

impl PublishWorker {
    /// `delay` is the pause before each delivery.
    pub fn new(
        store: Arc<dyn RecordStore>,
        connector: Arc<dyn RelayConnector>,
        delay: Duration,
    ) -> Self {
        Self {
            store,
            connector,
            delay,
        }
    }

    /// Deliver every unpublished message of `feed`, in recording order.
    ///
    /// The published set only advances after the relay confirms a message.
    /// Callers hold the feed's publishing lock.
    pub async fn run(&self, feed: &Feed) -> Result<PublishReport, PublishError> {
        let mut conn = match self.connector.connect(&feed.relay).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(feed = %feed.name, relay = %feed.relay, error = %e, "relay connect failed");
                return Err(PublishError::Connect(e));
            }
        };

        let result = self.deliver(feed, conn.as_mut()).await;
        conn.close().await;
        result
    }

    async fn deliver(
        &self,
        feed: &Feed,
        conn: &mut dyn RelayConnection,
    ) -> Result<PublishReport, PublishError> {
        let pending = self.store.list_unpublished(&feed.name).await?;
        let mut report = PublishReport {
            pending: pending.len(),
            ..PublishReport::default()
        };

        for (identity, message) in pending {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match conn.publish(&message).await {
                Ok(()) => match self.store.mark_published(&feed.name, &identity).await {
                    Ok(()) => {
                        tracing::info!(feed = %feed.name, identity = %identity, "published");
                        report.published.push(identity);
                    }
                    Err(e) => {
                        tracing::error!(
                            feed = %feed.name,
                            identity = %identity,
                            error = %e,
                            "delivered but mark failed, will redeliver"
                        );
                        report.unmarked.push(identity);
                    }
                },
                Err(RelayError::Disconnected(reason)) => {
                    tracing::warn!(
                        feed = %feed.name,
                        identity = %identity,
                        reason = %reason,
                        "relay disconnected, stopping run"
                    );
                    report.failed.push(identity);
                    report.disconnected = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(feed = %feed.name, identity = %identity, error = %e, "delivery failed");
                    report.failed.push(identity);
                }
            }
        }

        Ok(report)
    }
}
