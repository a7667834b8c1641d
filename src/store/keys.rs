//! Flat keyspace layout.
//!
//! | prefix       | suffix                     | value            |
//! |--------------|----------------------------|------------------|
//! | `feed_`      | feed name                  | `Feed`           |
//! | `event_`     | `<feed>_<item identity>`   | `StoredMessage`  |
//! | `published_` | feed name                  | `PublishedSet`   |

pub const FEED_PREFIX: &str = "feed_";
pub const EVENT_PREFIX: &str = "event_";
pub const PUBLISHED_PREFIX: &str = "published_";

pub fn feed_key(name: &str) -> String {
    format!("{}{}", FEED_PREFIX, name)
}

pub fn event_key(feed: &str, identity: &str) -> String {
    format!("{}{}_{}", EVENT_PREFIX, feed, identity)
}

/// Prefix covering every message of `feed`. Also matches feeds whose name
/// extends `feed` with `_...`, so scans must check the stored feed name.
pub fn event_prefix(feed: &str) -> String {
    format!("{}{}_", EVENT_PREFIX, feed)
}

pub fn published_key(feed: &str) -> String {
    format!("{}{}", PUBLISHED_PREFIX, feed)
}
