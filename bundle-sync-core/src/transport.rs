//! reqwest implementation of [`Transport`].

use std::path::PathBuf;

use async_trait::async_trait;
use futures::StreamExt;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};
use url::Url;

use crate::contract::{ProgressHandler, Transport};
use crate::error::TransportError;

/// HTTP transport rooted at the publishing service's API base address.
///
/// Metadata paths are resolved against the base address; downloads take
/// absolute URLs. Redirects are followed by reqwest's default policy.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    download_dir: Option<PathBuf>,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, TransportError> {
        // Without the trailing slash `join` would drop the last base segment.
        let normalised = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalised)
            .map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            client,
            base_url,
            download_dir: None,
        })
    }

    /// Create temporary download files in `dir` instead of the system temp dir.
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn new_temp_file(&self) -> std::io::Result<tempfile::NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("bundle-sync-download-");
        match &self.download_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempfile_in(dir)
            }
            None => builder.tempfile(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<serde_json::Value, TransportError> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::InvalidUrl(format!("{path}: {e}")))?;
        debug!(url = %url, "GET");

        let resp = self.client.get(url.clone()).query(&query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            error!(status = %status, url = %url, "GET returned error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn download_file(
        &self,
        url: &Url,
        progress: Option<ProgressHandler>,
    ) -> Result<TempPath, TransportError> {
        info!(url = %url, "Starting file download");
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            error!(status = %status, url = %url, "Download returned error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let total = resp.content_length();
        let (file, path) = self.new_temp_file()?.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut done: u64 = 0;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            done += chunk.len() as u64;
            if let Some(progress) = &progress {
                progress(done, total);
            }
        }
        file.flush().await?;
        drop(file);

        info!(url = %url, bytes = done, path = %path.display(), "Download complete");
        Ok(path)
    }
}
