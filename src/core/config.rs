use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FEED_URL: &str = "https://lifehacker.com/rss";
pub const DEFAULT_CACHE_DIR: &str = "storage/rss";
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(3600);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Everything the ingestor needs to know about its single feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub url: String,
    pub cache_dir: PathBuf,
    /// A cached body younger than this is used without touching the network.
    pub cache_duration: Duration,
    pub fetch_timeout: Duration,
    /// Extra attempts after a network error or 5xx. Zero means single attempt.
    pub max_retries: usize,
}

impl FeedConfig {
    pub fn new(url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            cache_dir: cache_dir.into(),
            cache_duration: DEFAULT_CACHE_DURATION,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_retries: 0,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_URL, DEFAULT_CACHE_DIR)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Bearer token every API request must present.
    pub api_token: String,
    /// Background ingestion period; `None` disables the loop.
    pub ingest_interval: Option<Duration>,
}
