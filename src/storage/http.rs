use super::{flat_key, StorageManager};
use anyhow::{Context, Result};
use reqwest::header::IF_NONE_MATCH;
use reqwest::{Client, StatusCode, Url};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Blob metadata key holding the hash tag of a cached output
pub const HASH_METADATA_NAME: &str = "memoflow_hash";

const METADATA_HEADER_PREFIX: &str = "x-ms-meta-";

/// Remote object-store backend
///
/// Speaks the block-blob REST dialect: `PUT` with `x-ms-blob-type: BlockBlob`
/// stores a blob, `HEAD` returns its metadata headers, `GET` its body. The hash
/// tag travels as `x-ms-meta-memoflow_hash`, so `get_hash` never downloads the
/// blob. The container URL may carry a query string (e.g. a SAS token); the
/// entry path is appended to the URL path and the query is kept.
pub struct HttpStorage {
    client: Client,
    container_url: Url,
    runtime: Runtime,
}

impl HttpStorage {
    pub fn new(container_url: &str) -> Result<Self> {
        let container_url = Url::parse(container_url)
            .with_context(|| format!("Invalid cache storage url: {}", container_url))?;
        if container_url.cannot_be_a_base() {
            anyhow::bail!("Cache storage url cannot be a base: {}", container_url);
        }

        info!(
            "Initializing remote cache storage at {}://{}{}",
            container_url.scheme(),
            container_url.host_str().unwrap_or_default(),
            container_url.path()
        );

        // Calls arrive from synchronous code, so the backend owns its runtime
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start storage runtime")?;

        Ok(Self {
            client: Client::new(),
            container_url,
            runtime,
        })
    }

    fn blob_url(&self, path: &[String]) -> Result<Url> {
        let key = flat_key(path)?;
        let mut url = self.container_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("Cache storage url cannot be a base"))?;
            segments.pop_if_empty();
            segments.extend(key.split('/'));
        }
        Ok(url)
    }

    fn metadata_header() -> String {
        format!("{}{}", METADATA_HEADER_PREFIX, HASH_METADATA_NAME)
    }

    async fn head_blob(&self, url: Url) -> Result<Option<String>> {
        debug!("HEAD {}", url.path());

        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .context("Failed to query remote cache")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("Remote cache query failed: {}", response.status());
        }

        match response.headers().get(Self::metadata_header()) {
            Some(value) => Ok(Some(
                value
                    .to_str()
                    .context("Hash metadata is not valid ASCII")?
                    .to_string(),
            )),
            None => {
                warn!("Blob {} has no {} metadata", url.path(), HASH_METADATA_NAME);
                Ok(None)
            }
        }
    }

    async fn get_blob(&self, url: Url) -> Result<Option<Vec<u8>>> {
        debug!("GET {}", url.path());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to download cache blob")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Remote cache download failed: {} - {}", status, body);
        }

        let data = response
            .bytes()
            .await
            .context("Failed to read cache blob")?
            .to_vec();
        Ok(Some(data))
    }

    async fn put_blob(&self, url: Url, contents: &[u8], hash: &str) -> Result<()> {
        debug!("PUT {} ({} bytes)", url.path(), contents.len());

        let response = self
            .client
            .put(url.clone())
            .header("x-ms-blob-type", "BlockBlob")
            .header(Self::metadata_header(), hash)
            .header(IF_NONE_MATCH, "*")
            .header("Content-Type", "application/octet-stream")
            .body(contents.to_vec())
            .send()
            .await
            .context("Failed to upload cache blob")?;

        let status = response.status();
        if status == StatusCode::CONFLICT || status == StatusCode::PRECONDITION_FAILED {
            warn!("Cache entry {} already exists, skipping write", url.path());
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Remote cache upload failed: {} - {}", status, body);
        }

        Ok(())
    }
}

impl StorageManager for HttpStorage {
    fn get_hash(&self, path: &[String]) -> Result<Option<String>> {
        let url = self.blob_url(path)?;
        self.runtime.block_on(self.head_blob(url))
    }

    fn get_contents(&self, path: &[String]) -> Result<Option<Vec<u8>>> {
        let url = self.blob_url(path)?;
        self.runtime.block_on(self.get_blob(url))
    }

    fn put_contents(&self, path: &[String], contents: &[u8], hash: &str) -> Result<()> {
        let url = self.blob_url(path)?;
        self.runtime.block_on(self.put_blob(url, contents, hash))
    }
}
