//! Market and account feed aggregation.
//!
//! Decodes session messages into [`FeedEvent`]s and merges the market and
//! account parts into the shared [`SnapshotStore`] read by each quoting tick.

pub mod error;
pub mod event;
pub mod parser;
pub mod snapshot;

pub use error::{FeedError, FeedResult};
pub use event::FeedEvent;
pub use parser::ThalexParser;
pub use snapshot::SnapshotStore;
