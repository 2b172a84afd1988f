use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::fetcher::{FeedFetcher, FetchError, FetchStatus, FetchedFeed, Validators};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cache metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("server answered not modified but no cached body exists for {0}")]
    MissingBody(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub url: String,
    /// Unix seconds of the last successful fetch or revalidation.
    pub fetched_at: i64,
    pub content_type: Option<String>,
    pub validators: Validators,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub meta: CacheMeta,
    pub body: Vec<u8>,
}

/// Parsed feed content plus whether it came from disk.
#[derive(Debug, Clone)]
pub struct CachedFeed<T> {
    pub value: T,
    pub from_cache: bool,
}

#[derive(Debug, Clone)]
pub struct FeedCache {
    dir: PathBuf,
    max_age: Duration,
}

impl FeedCache {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        let age = now.timestamp() - entry.meta.fetched_at;
        age >= 0 && (age as u64) < self.max_age.as_secs()
    }

    /// Reads the feed from disk while the entry is fresh, otherwise from the
    /// network with conditional revalidation. A newly fetched body is only
    /// written once `parse` accepts it.
    pub async fn get_or_fetch<T, E>(
        &self,
        fetcher: &FeedFetcher,
        url: &str,
        now: DateTime<Utc>,
        parse: impl FnOnce(&[u8]) -> Result<T, E>,
    ) -> Result<CachedFeed<T>, E>
    where
        E: From<CacheError>,
    {
        let cached = self.load(url).await?;
        if let Some(entry) = &cached {
            if self.is_fresh(entry, now) {
                tracing::debug!(
                    url,
                    fetched_at = entry.meta.fetched_at,
                    content_type = entry.meta.content_type.as_deref(),
                    "feed cache hit"
                );
                return Ok(CachedFeed {
                    value: parse(&entry.body)?,
                    from_cache: true,
                });
            }
        }

        let validators = cached
            .as_ref()
            .map(|entry| entry.meta.validators.clone())
            .unwrap_or_default();
        tracing::debug!(url, revalidate = cached.is_some(), "fetching feed");
        let status = fetcher.fetch(url, &validators).await.map_err(CacheError::from)?;
        match status {
            FetchStatus::NotModified => {
                let mut entry = cached.ok_or_else(|| CacheError::MissingBody(url.to_string()))?;
                let value = parse(&entry.body)?;
                entry.meta.fetched_at = now.timestamp();
                self.write_meta(&entry.meta).await?;
                Ok(CachedFeed {
                    value,
                    from_cache: true,
                })
            }
            FetchStatus::Updated(fetched) => {
                let value = parse(&fetched.body)?;
                self.store(url, fetched, now).await?;
                Ok(CachedFeed {
                    value,
                    from_cache: false,
                })
            }
        }
    }

    pub async fn load(&self, url: &str) -> Result<Option<CacheEntry>, CacheError> {
        let (meta_path, body_path) = self.paths(url);
        let Some(raw_meta) = read_optional(&meta_path).await? else {
            return Ok(None);
        };
        let meta: CacheMeta = match serde_json::from_slice(&raw_meta) {
            Ok(meta) => meta,
            Err(error) => {
                tracing::warn!(path = %meta_path.display(), %error, "ignoring unreadable cache metadata");
                return Ok(None);
            }
        };
        if meta.url != url {
            return Ok(None);
        }
        let Some(body) = read_optional(&body_path).await? else {
            return Ok(None);
        };
        Ok(Some(CacheEntry { meta, body }))
    }

    pub async fn store(
        &self,
        url: &str,
        fetched: FetchedFeed,
        now: DateTime<Utc>,
    ) -> Result<CacheEntry, CacheError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| io_error(&self.dir, source))?;
        let (_, body_path) = self.paths(url);
        tokio::fs::write(&body_path, &fetched.body)
            .await
            .map_err(|source| io_error(&body_path, source))?;

        let meta = CacheMeta {
            url: url.to_string(),
            fetched_at: now.timestamp(),
            content_type: fetched.content_type,
            validators: fetched.validators,
        };
        self.write_meta(&meta).await?;
        Ok(CacheEntry {
            meta,
            body: fetched.body,
        })
    }

    async fn write_meta(&self, meta: &CacheMeta) -> Result<(), CacheError> {
        let (meta_path, _) = self.paths(&meta.url);
        let encoded = serde_json::to_vec_pretty(meta)?;
        tokio::fs::write(&meta_path, encoded)
            .await
            .map_err(|source| io_error(&meta_path, source))
    }

    fn paths(&self, url: &str) -> (PathBuf, PathBuf) {
        let key = cache_key(url);
        (
            self.dir.join(format!("{key}.json")),
            self.dir.join(format!("{key}.body")),
        )
    }
}

fn cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{digest:x}")
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(io_error(path, source)),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}
