pub mod locks;
pub mod processor;
pub mod publisher;
pub mod slug;

pub use locks::FeedLocks;
pub use processor::{ItemError, ItemProcessor, ProcessOutcome};
pub use publisher::{PublishError, PublishReport, PublishWorker};
