//! Mapping bundle-relative paths and remote document URLs to local files.
//!
//! Every lookup is existence-checked: a path is only returned when the file is
//! on disk.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error, info, warn};
use url::Url;

use crate::contract::{ProgressHandler, Transport};
use crate::error::ResolveError;

#[derive(Debug, Clone)]
pub struct PathResolver {
    bundle_root: PathBuf,
    documents_root: PathBuf,
}

impl PathResolver {
    pub fn new(bundle_root: impl Into<PathBuf>, documents_root: impl Into<PathBuf>) -> Self {
        Self {
            bundle_root: bundle_root.into(),
            documents_root: documents_root.into(),
        }
    }

    pub fn bundle_root(&self) -> &Path {
        &self.bundle_root
    }

    pub fn documents_root(&self) -> &Path {
        &self.documents_root
    }

    /// Resolve a node's content path (e.g. `content/intro.md`) inside the bundle.
    pub fn resolve_bundle_path(&self, relative: &str) -> Option<PathBuf> {
        existing(join_within(&self.bundle_root, relative)?)
    }

    /// Resolve `<subdirectory>/<name>.<extension>` inside the bundle.
    pub fn resolve_resource(
        &self,
        name: &str,
        extension: &str,
        subdirectory: Option<&str>,
    ) -> Option<PathBuf> {
        let file_name = if extension.is_empty() {
            name.to_string()
        } else {
            format!("{name}.{extension}")
        };
        let relative = match subdirectory {
            Some(dir) => format!("{}/{file_name}", dir.trim_end_matches('/')),
            None => file_name,
        };
        self.resolve_bundle_path(&relative)
    }

    /// Where the local copy of `remote_url` lives, whether or not it exists yet.
    pub fn document_path(&self, remote_url: &Url) -> Option<PathBuf> {
        let file_name = last_path_segment(remote_url)?;
        join_within(&self.documents_root, file_name)
    }

    /// The previously downloaded copy of `remote_url`, if there is one.
    pub fn resolve_document(&self, remote_url: &Url) -> Option<PathBuf> {
        existing(self.document_path(remote_url)?)
    }

    /// Download `remote_url` into the documents cache, replacing an earlier
    /// copy with the same file name.
    pub async fn download_document<T: Transport + ?Sized>(
        &self,
        transport: &T,
        remote_url: &Url,
        progress: Option<ProgressHandler>,
    ) -> Result<PathBuf, ResolveError> {
        let destination = self
            .document_path(remote_url)
            .ok_or_else(|| ResolveError::NoFileName(remote_url.to_string()))?;

        let downloaded = transport.download_file(remote_url, progress).await.map_err(|e| {
            error!(error = %e, url = %remote_url, "Document download failed");
            ResolveError::Transport(e)
        })?;

        fs::create_dir_all(&self.documents_root).map_err(|e| ResolveError::Io {
            path: self.documents_root.clone(),
            source: e,
        })?;
        if destination.exists() {
            debug!(path = %destination.display(), "Replacing existing document");
            fs::remove_file(&destination).map_err(|e| ResolveError::Io {
                path: destination.clone(),
                source: e,
            })?;
        }

        if let Err(persist) = downloaded.persist(&destination) {
            // Rename fails across filesystems; fall back to a copy.
            warn!(error = %persist.error, "Moving document failed, copying instead");
            fs::copy(&persist.path, &destination).map_err(|e| ResolveError::Io {
                path: destination.clone(),
                source: e,
            })?;
        }

        info!(url = %remote_url, path = %destination.display(), "Document stored");
        Ok(destination)
    }
}

/// Final non-empty path segment of a URL.
pub fn last_path_segment(url: &Url) -> Option<&str> {
    url.path_segments()?.filter(|s| !s.is_empty()).last()
}

/// Join `relative` under `root`, refusing anything that could leave `root`.
fn join_within(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative.trim_start_matches('/'));
    let mut joined = root.to_path_buf();
    let mut pushed = false;
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                debug!(relative = %relative.display(), "Refusing path outside root");
                return None;
            }
        }
    }
    pushed.then_some(joined)
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.exists().then_some(path)
}
