//! Error types for every stage of the bundle pipeline.
//!
//! Each component owns one enum. The synchroniser wraps them in [`SyncError`],
//! which is what a failed `sync` resolves to.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a [`crate::contract::Transport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("unexpected status {status} for {url}")]
    Status { status: u16, url: String },

    /// Writing the downloaded body to disk failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The request path or URL could not be turned into an absolute URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The response body was not valid JSON.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The response body was not JSON or did not carry a `data` object.
    #[error("the server returned an invalid response that could not be parsed")]
    InvalidDataReturned,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("archive download failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The archive bytes are not a valid gzip stream.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// The decompressed payload is not a valid tar archive.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The archive unpacked but its manifest is unusable.
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    /// The blocking extraction worker panicked or was cancelled.
    #[error("extraction worker failed: {0}")]
    Join(String),
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] io::Error),

    #[error("manifest is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("manifest root must be a JSON array")]
    NotAnArray,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("document download failed: {0}")]
    Transport(#[from] TransportError),

    /// The remote URL has no final path segment to name the local copy after.
    #[error("url has no file name: {0}")]
    NoFileName(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file IO error: {0}")]
    Io(#[from] io::Error),

    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The reason a synchronisation run ended in the `Failed` outcome.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("metadata lookup failed: {0}")]
    Metadata(#[from] MetadataError),

    #[error("latest publish has no download url")]
    MissingDownloadUrl,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("bundle replace failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("failed to persist bundle state: {0}")]
    Store(#[from] StoreError),

    #[error("failed to load bundle tree: {0}")]
    Tree(#[from] TreeError),
}
