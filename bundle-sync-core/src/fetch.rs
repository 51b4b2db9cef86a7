use std::sync::Arc;

use tempfile::TempPath;
use tracing::{error, info};
use url::Url;

use crate::contract::{ProgressHandler, Transport};
use crate::error::FetchError;

/// Downloads bundle archives to temporary files.
pub struct ArchiveFetcher<T: ?Sized> {
    transport: Arc<T>,
}

impl<T: Transport + ?Sized> ArchiveFetcher<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Download the archive at `url`. The returned file is complete and closed;
    /// it is deleted when the [`TempPath`] is dropped.
    pub async fn download_archive(
        &self,
        url: &Url,
        progress: Option<ProgressHandler>,
    ) -> Result<TempPath, FetchError> {
        info!(url = %url, "[FETCH] Downloading bundle archive");
        match self.transport.download_file(url, progress).await {
            Ok(path) => {
                info!(path = %path.display(), "[FETCH] Bundle archive downloaded");
                Ok(path)
            }
            Err(e) => {
                error!(error = %e, url = %url, "[FETCH][ERROR] Bundle archive download failed");
                Err(e.into())
            }
        }
    }
}
