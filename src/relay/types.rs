use serde::{Deserialize, Serialize};

/// Kind used for every message built from a feed item (plain text note).
pub const KIND_TEXT_NOTE: u16 = 1;

/// One `(name, value, extra)` tag triple. Serializes as a 3-element JSON array,
/// which is the shape relays expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag(pub String, pub String, pub String);

impl Tag {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self(name.to_string(), value.into(), String::new())
    }

    pub fn with_extra(name: &str, value: impl Into<String>, extra: &str) -> Self {
        Self(name.to_string(), value.into(), extra.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> &str {
        &self.1
    }

    pub fn extra(&self) -> &str {
        &self.2
    }
}

/// Message content before the signer assigns id, identity and signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedMessage {
    pub kind: u16,
    pub content: String,
    pub tags: Vec<Tag>,
    pub created_at: i64,
}

/// A signed, recorded message. Never mutated after it is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "pubkey")]
    pub signer: String,
    pub created_at: i64,
    pub kind: u16,
    pub tags: Vec<Tag>,
    pub content: String,
    #[serde(rename = "sig")]
    pub signature: String,
}

impl Message {
    /// First tag with the given name.
    pub fn tag(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name() == name)
    }
}
