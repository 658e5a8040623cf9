//! Path-style HTTP access to an S3-compatible object store.

use std::time::Duration;

use async_trait::async_trait;
use chapterquiz_shared::{AppConfig, QuizError, Result, S3Locator, StorageResolver};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

/// User-Agent string for object fetches.
const USER_AGENT: &str = concat!("chapterquiz/", env!("CARGO_PKG_VERSION"));

/// Settings for [`HttpObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectStoreOptions {
    /// Base URL; objects are fetched from `{endpoint}/{bucket}/{key}`.
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl From<&AppConfig> for ObjectStoreOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            endpoint: config.object_store.endpoint.clone(),
            timeout_secs: config.object_store.timeout_secs,
        }
    }
}

/// [`StorageResolver`] backed by plain HTTP GETs.
pub struct HttpObjectStore {
    client: Client,
    endpoint: Url,
}

impl HttpObjectStore {
    pub fn new(opts: &ObjectStoreOptions) -> Result<Self> {
        let endpoint = Url::parse(&opts.endpoint).map_err(|e| {
            QuizError::config(format!("invalid object store endpoint {}: {e}", opts.endpoint))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| QuizError::Storage(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, endpoint })
    }

    /// URL an object is served from.
    pub fn object_url(&self, locator: &S3Locator) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                QuizError::Storage(format!("object store endpoint cannot be a base: {}", self.endpoint))
            })?
            .pop_if_empty()
            .push(&locator.bucket)
            .extend(locator.key.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl StorageResolver for HttpObjectStore {
    #[instrument(skip_all, fields(locator = %locator))]
    async fn fetch(&self, locator: &S3Locator) -> Result<Vec<u8>> {
        let url = self.object_url(locator)?;
        debug!(%url, "fetching object");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| QuizError::Storage(format!("{locator}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuizError::Storage(format!("{locator}: HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| QuizError::Storage(format!("{locator}: failed to read body: {e}")))?;

        debug!(bytes = bytes.len(), "object fetched");
        Ok(bytes.to_vec())
    }
}
