//! The two periodic triggers: record new items, deliver pending messages.
//!
//! Every cycle fans out one task per feed and joins them all before that
//! trigger can fire again, so a trigger never overlaps itself. Per-feed locks
//! keep runs of the same kind on the same feed serialized regardless.

use crate::config::SchedulerConfig;
use crate::engine::{
    FeedLocks, ItemProcessor, ProcessOutcome, PublishError, PublishReport, PublishWorker,
};
use crate::feed::{Feed, FeedSource, FetchError};
use crate::store::RecordStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Per-feed tally of one processing run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    pub fetched: usize,
    pub recorded: usize,
    pub already_recorded: usize,
    pub dropped: usize,
    pub aborted: usize,
    /// Items whose record write failed; retried next cycle.
    pub store_failures: usize,
}

/// How many feeds a cycle dispatched and how many of them failed outright.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub feeds: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn RecordStore>,
    source: Arc<dyn FeedSource>,
    processor: Arc<ItemProcessor>,
    publisher: Arc<PublishWorker>,
    process_locks: Arc<FeedLocks>,
    publish_locks: Arc<FeedLocks>,
    /// Concurrency caps, one per trigger so a slow fetch never holds up
    /// delivery.
    process_limit: Arc<Semaphore>,
    publish_limit: Arc<Semaphore>,
    config: SchedulerConfig,
    fetch_timeout: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        source: Arc<dyn FeedSource>,
        processor: Arc<ItemProcessor>,
        publisher: Arc<PublishWorker>,
        config: SchedulerConfig,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            source,
            processor,
            publisher,
            process_locks: Arc::new(FeedLocks::new()),
            publish_locks: Arc::new(FeedLocks::new()),
            process_limit: Arc::new(Semaphore::new(config.max_concurrent_feeds.max(1))),
            publish_limit: Arc::new(Semaphore::new(config.max_concurrent_feeds.max(1))),
            config,
            fetch_timeout,
        }
    }

    /// Drive both triggers until `shutdown` flips to true (or its sender is
    /// dropped). Each fires once right away. A cycle in flight is allowed to
    /// finish.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        tracing::info!(
            process_every_s = self.config.process_interval_s,
            publish_every_s = self.config.publish_interval_s,
            "scheduler started"
        );

        let processing = trigger_loop(
            "process",
            self.config.process_interval(),
            shutdown.clone(),
            || self.run_process_cycle(),
        );
        let publishing = trigger_loop(
            "publish",
            self.config.publish_interval(),
            shutdown,
            || self.run_publish_cycle(),
        );
        tokio::join!(processing, publishing);

        tracing::info!("scheduler stopped");
    }

    /// Fetch and record new items for every complete feed.
    pub async fn run_process_cycle(&self) -> CycleReport {
        let this = self.clone();
        self.for_each_feed("process", &self.process_limit, move |feed| {
            let this = this.clone();
            async move { this.process_feed(&feed).await.map(|_| ()).map_err(|e| e.to_string()) }
        })
        .await
    }

    /// Deliver pending messages for every complete feed.
    pub async fn run_publish_cycle(&self) -> CycleReport {
        let this = self.clone();
        self.for_each_feed("publish", &self.publish_limit, move |feed| {
            let this = this.clone();
            async move { this.publish_feed(&feed).await.map(|_| ()).map_err(|e| e.to_string()) }
        })
        .await
    }

    /// One processing run for one feed, under its processing lock.
    pub async fn process_feed(&self, feed: &Feed) -> Result<ProcessSummary, FetchError> {
        let _guard = self.process_locks.lock(&feed.name).await;

        let items = match tokio::time::timeout(self.fetch_timeout, self.source.fetch(&feed.url)).await
        {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                tracing::warn!(feed = %feed.name, url = %feed.url, error = %e, "feed fetch failed");
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(feed = %feed.name, url = %feed.url, "feed fetch timed out");
                return Err(FetchError::Timeout(self.fetch_timeout));
            }
        };

        let mut summary = ProcessSummary {
            fetched: items.len(),
            ..ProcessSummary::default()
        };
        for item in &items {
            match self.processor.process(feed, item).await {
                Ok(ProcessOutcome::Recorded(_)) => summary.recorded += 1,
                Ok(ProcessOutcome::AlreadyRecorded(_)) => summary.already_recorded += 1,
                Ok(ProcessOutcome::NoIdentity) => summary.dropped += 1,
                Ok(ProcessOutcome::Aborted { .. }) => summary.aborted += 1,
                Err(e) => {
                    tracing::error!(
                        feed = %feed.name,
                        identity = item.identity().unwrap_or_default(),
                        error = %e,
                        "failed to record message"
                    );
                    summary.store_failures += 1;
                }
            }
        }

        tracing::debug!(
            feed = %feed.name,
            fetched = summary.fetched,
            recorded = summary.recorded,
            aborted = summary.aborted,
            store_failures = summary.store_failures,
            "processing run done"
        );
        Ok(summary)
    }

    /// One publish run for one feed, under its publishing lock.
    pub async fn publish_feed(&self, feed: &Feed) -> Result<PublishReport, PublishError> {
        let _guard = self.publish_locks.lock(&feed.name).await;
        let report = self.publisher.run(feed).await?;
        if report.pending > 0 {
            tracing::info!(
                feed = %feed.name,
                pending = report.pending,
                published = report.published.len(),
                failed = report.failed.len(),
                unmarked = report.unmarked.len(),
                "publish run done"
            );
        }
        Ok(report)
    }

    async fn for_each_feed<F, Fut>(
        &self,
        kind: &'static str,
        limit: &Arc<Semaphore>,
        work: F,
    ) -> CycleReport
    where
        F: Fn(Feed) -> Fut,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let feeds = match self.store.list_feeds().await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::error!(cycle = kind, error = %e, "could not list feeds");
                return CycleReport::default();
            }
        };

        let mut tasks = JoinSet::new();
        for feed in feeds {
            if !feed.is_complete() {
                tracing::warn!(cycle = kind, feed = %feed.name, "skipping incomplete feed");
                continue;
            }
            let limit = limit.clone();
            let job = work(feed);
            tasks.spawn(async move {
                // the semaphore is never closed
                let _permit = limit.acquire_owned().await.ok();
                job.await
            });
        }

        let mut report = CycleReport {
            feeds: tasks.len(),
            failed: 0,
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(_)) => report.failed += 1,
                Err(e) => {
                    tracing::error!(cycle = kind, error = %e, "feed task panicked");
                    report.failed += 1;
                }
            }
        }
        tracing::debug!(cycle = kind, feeds = report.feeds, failed = report.failed, "cycle done");
        report
    }
}

async fn trigger_loop<F, Fut>(
    kind: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    cycle: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = CycleReport>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                cycle().await;
            }
        }
    }
    tracing::debug!(trigger = kind, "trigger stopped");
}
