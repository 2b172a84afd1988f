use chrono::{DateTime, Utc};

use super::config::FeedConfig;
use super::dates::format_timestamp;
use super::feed::types::ParsedEntry;
use super::feed::{parse_feed_bytes, CacheError, FeedCache, FeedFetcher, FeedParseError, FetchError};
use super::storage::{NewPost, PostRepository, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("feed client setup failed: {0}")]
    Client(#[from] FetchError),
    #[error("feed unavailable: {0}")]
    Source(#[from] CacheError),
    #[error("feed could not be parsed: {0}")]
    Parse(#[from] FeedParseError),
    #[error("storing posts failed: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Entries in the feed that carried a link.
    pub entries: usize,
    pub inserted: usize,
    pub already_stored: usize,
    pub skipped_without_link: usize,
    pub from_cache: bool,
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    config: FeedConfig,
    fetcher: FeedFetcher,
    cache: FeedCache,
    repository: PostRepository,
}

impl Ingestor {
    pub fn new(config: FeedConfig, repository: PostRepository) -> Result<Self, IngestError> {
        let fetcher = FeedFetcher::new(config.fetch_timeout, config.max_retries)?;
        let cache = FeedCache::new(config.cache_dir.clone(), config.cache_duration);
        Ok(Self {
            config,
            fetcher,
            cache,
            repository,
        })
    }

    pub async fn run(&self) -> Result<IngestReport, IngestError> {
        self.run_at(Utc::now()).await
    }

    /// Either every new entry of the run is stored or none is.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<IngestReport, IngestError> {
        let url = self.config.url.as_str();
        let cached = self
            .cache
            .get_or_fetch(&self.fetcher, url, now, |bytes| {
                parse_feed_bytes(bytes).map_err(IngestError::from)
            })
            .await?;
        let feed = cached.value;
        tracing::debug!(url, title = %feed.title, format = ?feed.format, "feed parsed");
        if feed.skipped > 0 {
            tracing::warn!(url, skipped = feed.skipped, "feed entries without a link were ignored");
        }

        let posts: Vec<NewPost> = feed
            .entries
            .into_iter()
            .map(|entry| to_new_post(entry, now))
            .collect();
        let inserted = self.repository.insert_new(&posts).await?;

        let report = IngestReport {
            entries: posts.len(),
            inserted,
            already_stored: posts.len() - inserted,
            skipped_without_link: feed.skipped,
            from_cache: cached.from_cache,
        };
        tracing::info!(
            url,
            entries = report.entries,
            inserted = report.inserted,
            from_cache = report.from_cache,
            "feed ingested"
        );
        Ok(report)
    }
}

fn to_new_post(entry: ParsedEntry, fetched_at: DateTime<Utc>) -> NewPost {
    NewPost {
        title: entry.title,
        link: entry.link,
        description: entry.description,
        pub_date: format_timestamp(entry.published_at.unwrap_or(fetched_at)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::PostFilter;
    use axum::extract::State;
    use axum::http::{header, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Router;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const FIXTURE: &str = include_str!("../../../fixtures/sample.rss.xml");

    #[derive(Clone)]
    struct FeedState {
        hits: Arc<AtomicUsize>,
        status: StatusCode,
        body: Arc<Mutex<&'static str>>,
    }

    async fn feed_handler(State(state): State<FeedState>) -> Response {
        state.hits.fetch_add(1, Ordering::SeqCst);
        let body = *state.body.lock().expect("body lock");
        (
            state.status,
            [(header::CONTENT_TYPE, "application/rss+xml")],
            body,
        )
            .into_response()
    }

    struct FeedServer {
        url: String,
        hits: Arc<AtomicUsize>,
        body: Arc<Mutex<&'static str>>,
        task: tokio::task::JoinHandle<()>,
    }

    async fn spawn_feed_server(status: StatusCode, body: &'static str) -> FeedServer {
        let hits = Arc::new(AtomicUsize::new(0));
        let body = Arc::new(Mutex::new(body));
        let state = FeedState {
            hits: hits.clone(),
            status,
            body: body.clone(),
        };
        let app = Router::new()
            .route("/rss", get(feed_handler))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("local addr should exist");
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server should run");
        });
        FeedServer {
            url: format!("http://{address}/rss"),
            hits,
            body,
            task,
        }
    }

    async fn ingestor_for(
        server: &FeedServer,
        cache_dir: &std::path::Path,
        cache_duration: Duration,
    ) -> (Ingestor, PostRepository) {
        let repository = PostRepository::connect("sqlite::memory:")
            .await
            .expect("connect must succeed");
        let mut config = FeedConfig::new(server.url.clone(), cache_dir);
        config.cache_duration = cache_duration;
        config.fetch_timeout = Duration::from_secs(5);
        let ingestor = Ingestor::new(config, repository.clone()).expect("ingestor should build");
        (ingestor, repository)
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
    }

    #[tokio::test]
    async fn second_run_inside_cache_window_adds_nothing_and_skips_network() {
        let server = spawn_feed_server(StatusCode::OK, FIXTURE).await;
        let cache_dir = tempfile::tempdir().expect("tempdir");
        let (ingestor, repository) =
            ingestor_for(&server, cache_dir.path(), Duration::from_secs(3600)).await;

        let first = ingestor.run_at(at(1_000_000)).await.expect("first run");
        let second = ingestor.run_at(at(1_000_060)).await.expect("second run");
        let stored = repository
            .list(&PostFilter::default())
            .await
            .expect("list must succeed");

        assert_eq!(first.entries, 3);
        assert_eq!(first.inserted, 3);
        assert!(!first.from_cache);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.already_stored, 3);
        assert!(second.from_cache);
        assert_eq!(server.hits.load(Ordering::SeqCst), 1);
        assert_eq!(stored.total, 3);
        assert_eq!(stored.data[0].pub_date, "2024-02-18 12:30:00");
        assert_eq!(stored.data[2].pub_date, "2024-02-16 22:05:00");

        server.task.abort();
    }

    #[tokio::test]
    async fn stale_cache_refetches_but_still_deduplicates() {
        let server = spawn_feed_server(StatusCode::OK, FIXTURE).await;
        let cache_dir = tempfile::tempdir().expect("tempdir");
        let (ingestor, _) = ingestor_for(&server, cache_dir.path(), Duration::from_secs(3600)).await;

        ingestor.run_at(at(1_000_000)).await.expect("first run");
        let later = ingestor.run_at(at(1_003_600)).await.expect("later run");

        assert!(!later.from_cache);
        assert_eq!(later.inserted, 0);
        assert_eq!(server.hits.load(Ordering::SeqCst), 2);

        server.task.abort();
    }

    #[tokio::test]
    async fn only_entries_with_unknown_links_are_inserted() {
        let server = spawn_feed_server(StatusCode::OK, FIXTURE).await;
        let cache_dir = tempfile::tempdir().expect("tempdir");
        let (ingestor, repository) =
            ingestor_for(&server, cache_dir.path(), Duration::from_secs(3600)).await;
        let existing = repository
            .create(&NewPost {
                title: "Stored earlier".to_string(),
                link: "https://lifehacker.com/how-to-clean-your-keyboard".to_string(),
                description: None,
                pub_date: "2024-02-01 00:00:00".to_string(),
            })
            .await
            .expect("seed create");

        let report = ingestor.run().await.expect("run");
        let untouched = repository
            .find(existing.id)
            .await
            .expect("find")
            .expect("existing post should remain");

        assert_eq!(report.entries, 3);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.already_stored, 1);
        assert_eq!(untouched, existing);

        server.task.abort();
    }

    #[tokio::test]
    async fn fetch_failure_fails_the_run_without_storing() {
        let server = spawn_feed_server(StatusCode::SERVICE_UNAVAILABLE, "down").await;
        let cache_dir = tempfile::tempdir().expect("tempdir");
        let (ingestor, repository) =
            ingestor_for(&server, cache_dir.path(), Duration::from_secs(3600)).await;

        let result = ingestor.run().await;
        let stored = repository.list(&PostFilter::default()).await.expect("list");

        assert!(matches!(
            result,
            Err(IngestError::Source(CacheError::Fetch(FetchError::HttpStatus(503))))
        ));
        assert_eq!(stored.total, 0);

        server.task.abort();
    }

    #[tokio::test]
    async fn unparsable_feed_fails_the_run() {
        let server = spawn_feed_server(StatusCode::OK, "<html><body>maintenance</body></html>").await;
        let cache_dir = tempfile::tempdir().expect("tempdir");
        let (ingestor, repository) =
            ingestor_for(&server, cache_dir.path(), Duration::from_secs(3600)).await;

        let result = ingestor.run().await;
        let stored = repository.list(&PostFilter::default()).await.expect("list");

        assert!(matches!(result, Err(IngestError::Parse(_))));
        assert_eq!(stored.total, 0);

        server.task.abort();
    }

    #[tokio::test]
    async fn unparsable_body_is_not_reused_once_the_feed_recovers() {
        let server = spawn_feed_server(StatusCode::OK, "<html><body>maintenance</body></html>").await;
        let cache_dir = tempfile::tempdir().expect("tempdir");
        let (ingestor, repository) =
            ingestor_for(&server, cache_dir.path(), Duration::from_secs(3600)).await;

        let failed = ingestor.run_at(at(1_000_000)).await;
        *server.body.lock().expect("body lock") = FIXTURE;
        let recovered = ingestor.run_at(at(1_000_060)).await.expect("recovered run");
        let stored = repository.list(&PostFilter::default()).await.expect("list");

        assert!(matches!(failed, Err(IngestError::Parse(_))));
        assert!(!recovered.from_cache);
        assert_eq!(recovered.inserted, 3);
        assert_eq!(server.hits.load(Ordering::SeqCst), 2);
        assert_eq!(stored.total, 3);

        server.task.abort();
    }

    #[test]
    fn missing_publication_date_falls_back_to_fetch_time() {
        let post = to_new_post(
            ParsedEntry {
                title: "Undated".to_string(),
                link: "https://example.com/undated".to_string(),
                description: None,
                published_at: None,
            },
            at(1_708_259_400),
        );
        assert_eq!(post.pub_date, "2024-02-18 12:30:00");
    }
}
