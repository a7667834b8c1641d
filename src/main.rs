use anyhow::{Context, Result};
use feed_relay::admin::{self, AdminState};
use feed_relay::config::{Config, LoggingConfig};
use feed_relay::engine::{ItemProcessor, PublishWorker};
use feed_relay::feed::HttpFeedSource;
use feed_relay::pipeline::Scheduler;
use feed_relay::relay::{SchnorrSigner, WsRelayConnector};
use feed_relay::render::HtmlRenderer;
use feed_relay::store::{RecordStore, SqliteRecordStore};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .context("Invalid log filter")?;

    match &logging.file {
        Some(path) => {
            let log_file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(log_file)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = Config::resolve_path(std::env::args().nth(1));
    let (config, found) = Config::load_or_default(&config_path)?;

    init_tracing(&config.logging)?;
    if found {
        tracing::info!(path = %config_path.display(), "config loaded");
    } else {
        tracing::warn!(path = %config_path.display(), "config file not found, using defaults");
    }

    let store = Arc::new(
        SqliteRecordStore::open(&config.storage.path, config.storage.max_connections)
            .await
            .with_context(|| format!("Failed to open store at {}", config.storage.path.display()))?,
    );
    let records: Arc<dyn RecordStore> = store.clone();
    let signer = Arc::new(SchnorrSigner::new());

    let source = Arc::new(HttpFeedSource::new(&config.fetch).context("Failed to build HTTP client")?);
    let processor = Arc::new(ItemProcessor::new(
        records.clone(),
        Arc::new(HtmlRenderer),
        signer.clone(),
    ));
    let connector = Arc::new(WsRelayConnector::new(
        config.relay.connect_timeout(),
        config.relay.publish_timeout(),
    ));
    let publisher = Arc::new(PublishWorker::new(
        records.clone(),
        connector,
        config.relay.publish_delay(),
    ));

    let scheduler = Scheduler::new(
        records.clone(),
        source,
        processor,
        publisher,
        config.scheduler.clone(),
        config.fetch.timeout(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    };

    let admin_task = if config.admin.enabled {
        let listener = tokio::net::TcpListener::bind(&config.admin.bind)
            .await
            .with_context(|| format!("Failed to bind admin server on {}", config.admin.bind))?;
        let state = AdminState::new(records.clone(), signer.clone());
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, shutdown).await {
                tracing::error!(error = %e, "admin server failed");
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    if let Err(e) = scheduler_task.await {
        tracing::error!(error = %e, "scheduler task failed");
    }
    if let Some(task) = admin_task {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "admin task failed");
        }
    }

    store.close().await;
    tracing::debug!("shutting down");
    Ok(())
}
