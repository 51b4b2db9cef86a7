//! # contract: the seams between the bundle pipeline and the outside world
//!
//! This module defines the traits the pipeline depends on instead of concrete
//! clients or global state:
//!
//! - [`Transport`]: the HTTP collaborator (`get` a JSON document, download a
//!   file to a temporary location with progress reporting).
//! - [`CacheStore`]: the persisted key/value state describing which bundle is
//!   installed.
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall`, so tests (in this crate and in
//! dependents enabling `test-export-mocks`) get `MockTransport` and
//! `MockCacheStore`.
//!
//! ## Implementations
//! - [`crate::transport::HttpTransport`] for [`Transport`]
//! - [`crate::cache_store::FileCacheStore`] and
//!   [`crate::cache_store::MemoryCacheStore`] for [`CacheStore`]

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use tempfile::TempPath;
use url::Url;

use crate::error::{StoreError, TransportError};

/// Download progress callback: `(bytes_done, bytes_total)`.
///
/// `bytes_total` is `None` when the server sent no content length.
pub type ProgressHandler = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// The HTTP transport used for metadata calls and file downloads.
///
/// Redirect handling belongs to the implementor.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET a path relative to the transport's base address and parse the body
    /// as JSON.
    async fn get_json(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<serde_json::Value, TransportError>;

    /// Download an absolute URL into a temporary file.
    ///
    /// On success the returned file is complete and closed. Dropping the
    /// [`TempPath`] deletes it.
    async fn download_file(
        &self,
        url: &Url,
        progress: Option<ProgressHandler>,
    ) -> Result<TempPath, TransportError>;
}

/// Keys of the persisted bundle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Publish timestamp (seconds since epoch) of the installed bundle.
    CurrentBundleTimestamp,
    /// Serialized [`crate::metadata::BundleInfo`] of the installed bundle.
    CachedBundleInfo,
}

impl CacheKey {
    pub const ALL: [CacheKey; 2] = [CacheKey::CurrentBundleTimestamp, CacheKey::CachedBundleInfo];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::CurrentBundleTimestamp => "CurrentBundleTimestamp",
            CacheKey::CachedBundleInfo => "CachedBundleInfo",
        }
    }
}

/// Persisted key/value state. No logic beyond get/set/clear.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait CacheStore: Send + Sync {
    fn get(&self, key: CacheKey) -> Option<serde_json::Value>;

    fn set(&self, key: CacheKey, value: serde_json::Value) -> Result<(), StoreError>;

    fn remove(&self, key: CacheKey) -> Result<(), StoreError>;

    /// Remove every key.
    fn clear(&self) -> Result<(), StoreError>;
}
