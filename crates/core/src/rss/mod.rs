//! RSS ingestion: poll feeds, filter item titles, acquire matches.

mod fetcher;
mod filter;
mod pipeline;
mod types;

pub use fetcher::{parse_feed, FeedFetcher, HttpFeedFetcher};
pub use filter::FilterPolicy;
pub use pipeline::RssPipeline;
pub use types::*;
