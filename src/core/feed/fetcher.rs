use reqwest::header::{CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP cache validators remembered from a previous response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub validators: Validators,
}

#[derive(Debug, Clone)]
pub enum FetchStatus {
    Updated(FetchedFeed),
    NotModified,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status code: {0}")]
    HttpStatus(u16),
}

impl FetchError {
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(_) => true,
            FetchError::HttpStatus(code) => *code >= 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    max_retries: usize,
}

impl FeedFetcher {
    pub fn new(timeout: Duration, max_retries: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            max_retries,
        })
    }

    /// Fetches `url`, retrying network errors and 5xx responses up to
    /// `max_retries` times.
    pub async fn fetch(&self, url: &str, validators: &Validators) -> Result<FetchStatus, FetchError> {
        let mut attempt = 0_usize;
        loop {
            match self.fetch_once(url, validators).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_transient() || attempt >= self.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    tracing::warn!(url, attempt, error = %err, "feed fetch failed, retrying");
                    tokio::time::sleep(Duration::from_millis(40 * attempt as u64)).await;
                }
            }
        }
    }

    async fn fetch_once(&self, url: &str, validators: &Validators) -> Result<FetchStatus, FetchError> {
        let mut request = self.client.get(url);
        if let Some(value) = &validators.etag {
            request = request.header(IF_NONE_MATCH, value);
        }
        if let Some(value) = &validators.last_modified {
            request = request.header(IF_MODIFIED_SINCE, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchStatus::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(ToString::to_string)
        };
        let validators = Validators {
            etag: header(ETAG),
            last_modified: header(LAST_MODIFIED),
        };
        let content_type = header(CONTENT_TYPE);
        let body = response.bytes().await?.to_vec();

        Ok(FetchStatus::Updated(FetchedFeed {
            body,
            content_type,
            validators,
        }))
    }
}
