pub mod cache;
pub mod fetcher;
pub mod parser;
pub mod types;

pub use cache::{CacheError, FeedCache};
pub use fetcher::{FeedFetcher, FetchError};
pub use parser::{parse_feed_bytes, FeedParseError};
