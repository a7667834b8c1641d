pub mod keys;
pub mod sign;
pub mod types;
pub mod ws;

use async_trait::async_trait;
use thiserror::Error;
use types::Message;

pub use sign::{MessageSigner, SchnorrSigner};
pub use types::{Tag, UnsignedMessage};
pub use ws::WsRelayConnector;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("failed to encode message for signing: {0}")]
    Encode(String),
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("message id does not match its content")]
    IdMismatch,

    #[error("signature does not verify")]
    BadSignature,

    #[error("signed by {actual}, expected {expected}")]
    IdentityMismatch { expected: String, actual: String },

    #[error("malformed message: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("relay did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("relay rejected message: {0}")]
    Rejected(String),

    #[error("relay connection lost: {0}")]
    Disconnected(String),

    #[error("relay protocol error: {0}")]
    Protocol(String),
}

/// Opens connections to relays.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn RelayConnection>, RelayError>;
}

/// One open relay connection. `publish` returns once the relay has accepted
/// the message; `close` is always called by the owner before dropping.
#[async_trait]
pub trait RelayConnection: Send {
    async fn publish(&mut self, message: &Message) -> Result<(), RelayError>;
    async fn close(&mut self);
}
