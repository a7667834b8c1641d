//! Administrative HTTP surface.
//!
//! - `GET /` - banner
//! - `POST /rss` - add a feed
//! - `GET /rss` - feeds with their published identities (no signing keys)
//! - `GET /events` - every recorded message whose signature verifies

use crate::engine::slug::slug;
use crate::feed::Feed;
use crate::relay::types::Message;
use crate::relay::MessageSigner;
use crate::store::{RecordStore, StoreError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AdminState {
    store: Arc<dyn RecordStore>,
    signer: Arc<dyn MessageSigner>,
}

impl AdminState {
    pub fn new(store: Arc<dyn RecordStore>, signer: Arc<dyn MessageSigner>) -> Self {
        Self { store, signer }
    }
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("feed name has no letters or digits")]
    InvalidName,

    #[error("feed {0} already exists")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::MissingField(_) | AdminError::InvalidName => StatusCode::BAD_REQUEST,
            AdminError::Conflict(_) => StatusCode::CONFLICT,
            AdminError::Store(e) => {
                tracing::error!(error = %e, "admin request failed on store");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            AdminError::Store(_) => "storage failure",
            AdminError::Conflict(_) => "rss feed already exists",
            _ => "invalid request",
        };
        let body = ApiResponse {
            success: false,
            message: message.to_string(),
            error: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /rss`. Absent fields deserialize empty and are rejected by
/// the handler with 400.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AddFeedRequest {
    pub url: String,
    pub name: String,
    pub pub_key: String,
    pub priv_key: String,
    pub relay: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedView {
    pub name: String,
    pub url: String,
    pub relay: String,
    pub pub_key: String,
    pub links: Vec<String>,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/rss", get(list_feeds).post(add_feed))
        .route("/events", get(list_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` flips to true.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "admin server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}

pub async fn index() -> &'static str {
    "feed-relay: POST /rss to add a feed, GET /rss to list feeds, GET /events to list messages"
}

pub async fn add_feed(
    State(state): State<AdminState>,
    Json(req): Json<AddFeedRequest>,
) -> Result<(StatusCode, Json<ApiResponse>), AdminError> {
    let feed = validate(req)?;
    if state.store.feed_exists(&feed.name).await? {
        return Err(AdminError::Conflict(feed.name));
    }
    state.store.put_feed(&feed).await?;
    tracing::info!(feed = %feed.name, url = %feed.url, relay = %feed.relay, "feed added");

    Ok((
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            message: "rss feed added".to_string(),
            error: None,
        }),
    ))
}

fn validate(req: AddFeedRequest) -> Result<Feed, AdminError> {
    let fields = [
        ("url", &req.url),
        ("name", &req.name),
        ("pub_key", &req.pub_key),
        ("priv_key", &req.priv_key),
        ("relay", &req.relay),
    ];
    if let Some((field, _)) = fields.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(AdminError::MissingField(*field));
    }

    let name = slug(&req.name);
    if name.is_empty() {
        return Err(AdminError::InvalidName);
    }
    Ok(Feed {
        name,
        url: req.url.trim().to_string(),
        relay: req.relay.trim().to_string(),
        pub_key: req.pub_key.trim().to_string(),
        priv_key: req.priv_key.trim().to_string(),
    })
}

pub async fn list_feeds(State(state): State<AdminState>) -> Result<Json<Vec<FeedView>>, AdminError> {
    let feeds = state.store.list_feeds().await?;
    let mut views = Vec::with_capacity(feeds.len());
    for feed in feeds {
        let links = state.store.published_set(&feed.name).await?.links;
        views.push(FeedView {
            name: feed.name,
            url: feed.url,
            relay: feed.relay,
            pub_key: feed.pub_key,
            links,
        });
    }
    Ok(Json(views))
}

pub async fn list_events(State(state): State<AdminState>) -> Result<Json<Vec<Message>>, AdminError> {
    let messages = state.store.list_all_messages().await?;
    let verified = messages
        .into_iter()
        .filter(|m| match state.signer.verify(m) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(id = %m.id, error = %e, "hiding unverifiable message");
                false
            }
        })
        .collect();
    Ok(Json(verified))
}
