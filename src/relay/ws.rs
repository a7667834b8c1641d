use super::types::Message;
use super::{RelayConnection, RelayConnector, RelayError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reason prefix a relay uses when it already stores the message.
const DUPLICATE_PREFIX: &str = "duplicate:";

/// Connects to relays over WebSocket and speaks the `EVENT` / `OK` exchange.
pub struct WsRelayConnector {
    connect_timeout: Duration,
    publish_timeout: Duration,
}

impl WsRelayConnector {
    pub fn new(connect_timeout: Duration, publish_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            publish_timeout,
        }
    }
}

#[async_trait]
impl RelayConnector for WsRelayConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn RelayConnection>, RelayError> {
        let (stream, _) =
            match tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(address))
                .await
            {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    return Err(RelayError::Connect {
                        address: address.to_string(),
                        reason: e.to_string(),
                    })
                }
                Err(_) => {
                    return Err(RelayError::Connect {
                        address: address.to_string(),
                        reason: format!("timed out after {:?}", self.connect_timeout),
                    })
                }
            };

        tracing::debug!(relay = address, "relay connected");
        Ok(Box::new(WsRelayConnection {
            address: address.to_string(),
            stream,
            publish_timeout: self.publish_timeout,
        }))
    }
}

pub struct WsRelayConnection {
    address: String,
    stream: WsStream,
    publish_timeout: Duration,
}

impl WsRelayConnection {
    /// Read frames until the relay answers `OK` for `id`.
    async fn await_ok(&mut self, id: &str) -> Result<(), RelayError> {
        while let Some(frame) = self.stream.next().await {
            let frame = frame.map_err(|e| RelayError::Disconnected(e.to_string()))?;
            match frame {
                Frame::Text(text) => match parse_reply(&text)? {
                    RelayReply::Ok {
                        id: ref reply_id,
                        accepted,
                        ref reason,
                    } if reply_id == id => return ok_outcome(accepted, reason),
                    RelayReply::Notice(notice) => {
                        tracing::warn!(relay = %self.address, notice = %notice, "relay notice");
                    }
                    _ => {
                        tracing::trace!(relay = %self.address, "ignoring relay frame");
                    }
                },
                Frame::Ping(data) => {
                    self.stream
                        .send(Frame::Pong(data))
                        .await
                        .map_err(|e| RelayError::Disconnected(e.to_string()))?;
                }
                Frame::Close(_) => {
                    return Err(RelayError::Disconnected("relay sent close frame".to_string()));
                }
                _ => {}
            }
        }
        Err(RelayError::Disconnected("stream ended".to_string()))
    }
}

#[async_trait]
impl RelayConnection for WsRelayConnection {
    async fn publish(&mut self, message: &Message) -> Result<(), RelayError> {
        let frame = serde_json::to_string(&("EVENT", message))
            .map_err(|e| RelayError::Protocol(e.to_string()))?;
        self.stream
            .send(Frame::Text(frame))
            .await
            .map_err(|e| RelayError::Disconnected(e.to_string()))?;

        let limit = self.publish_timeout;
        match tokio::time::timeout(limit, self.await_ok(&message.id)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout(limit)),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(relay = %self.address, error = %e, "relay close failed");
        }
    }
}

#[derive(Debug, PartialEq)]
enum RelayReply {
    Ok {
        id: String,
        accepted: bool,
        reason: String,
    },
    Notice(String),
    Other,
}

fn parse_reply(text: &str) -> Result<RelayReply, RelayError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| RelayError::Protocol(e.to_string()))?;
    let Some(items) = value.as_array() else {
        return Err(RelayError::Protocol(format!("expected array frame, got {}", text)));
    };

    match items.first().and_then(|v| v.as_str()) {
        Some("OK") => Ok(RelayReply::Ok {
            id: items
                .get(1)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            accepted: items.get(2).and_then(|v| v.as_bool()).unwrap_or(false),
            reason: items
                .get(3)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        }),
        Some("NOTICE") => Ok(RelayReply::Notice(
            items
                .get(1)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        )),
        _ => Ok(RelayReply::Other),
    }
}

fn ok_outcome(accepted: bool, reason: &str) -> Result<(), RelayError> {
    if accepted || reason.starts_with(DUPLICATE_PREFIX) {
        Ok(())
    } else {
        Err(RelayError::Rejected(reason.to_string()))
    }
}
