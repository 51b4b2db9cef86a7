//! Shared read access to the installed bundle.
//!
//! Lookups take the read side of a lock around the current [`ContentTree`];
//! a bundle replace holds the write side through a [`ReplaceGuard`] for as long
//! as the bundle directory is being swapped, so readers never see a half
//! replaced bundle. [`ContentLibrary::is_available`] reports the same thing
//! without waiting.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::TreeError;
use crate::resolver::PathResolver;
use crate::tree::{ContentTree, DirectoryNode};

pub struct ContentLibrary {
    resolver: PathResolver,
    manifest_name: String,
    tree: RwLock<Option<Arc<ContentTree>>>,
    available: AtomicBool,
}

impl ContentLibrary {
    /// A library with no tree loaded yet.
    pub fn new(resolver: PathResolver, manifest_name: impl Into<String>) -> Self {
        Self {
            resolver,
            manifest_name: manifest_name.into(),
            tree: RwLock::new(None),
            available: AtomicBool::new(true),
        }
    }

    /// A library over whatever bundle is already installed. A missing or
    /// unreadable manifest leaves the library empty.
    pub fn open(resolver: PathResolver, manifest_name: impl Into<String>) -> Self {
        let mut library = Self::new(resolver, manifest_name);
        let manifest = library.manifest_path();
        if manifest.is_file() {
            match ContentTree::load(&manifest) {
                Ok(tree) => *library.tree.get_mut() = Some(Arc::new(tree)),
                Err(e) => warn!(error = %e, path = %manifest.display(), "Installed manifest is unreadable"),
            }
        } else {
            debug!(path = %manifest.display(), "No installed manifest");
        }
        library
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolver.bundle_root().join(&self.manifest_name)
    }

    /// False while a bundle replace is in progress.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// The current tree, waiting for an in-progress replace to finish.
    pub async fn tree(&self) -> Option<Arc<ContentTree>> {
        self.tree.read().await.clone()
    }

    pub async fn find(&self, identifier: i64) -> Option<DirectoryNode> {
        let tree = self.tree.read().await;
        tree.as_ref()?.find(identifier).cloned()
    }

    pub async fn resolve_bundle_path(&self, relative: &str) -> Option<PathBuf> {
        let _tree = self.tree.read().await;
        self.resolver.resolve_bundle_path(relative)
    }

    pub async fn resolve_resource(
        &self,
        name: &str,
        extension: &str,
        subdirectory: Option<&str>,
    ) -> Option<PathBuf> {
        let _tree = self.tree.read().await;
        self.resolver.resolve_resource(name, extension, subdirectory)
    }

    /// Local file behind a node's `content`, when the content is a bundle path.
    pub async fn resolve_content(&self, node: &DirectoryNode) -> Option<PathBuf> {
        let content = node.content.as_deref()?;
        self.resolve_bundle_path(content).await
    }

    /// Document cache lookups do not touch the bundle and never wait.
    pub fn resolve_document(&self, remote_url: &Url) -> Option<PathBuf> {
        self.resolver.resolve_document(remote_url)
    }

    /// Re-read the manifest from disk.
    pub async fn reload(&self) -> Result<Arc<ContentTree>, TreeError> {
        let mut guard = self.begin_replace().await;
        let tree = ContentTree::load(&self.manifest_path())?;
        Ok(guard.install(tree))
    }

    /// Block readers until the returned guard is dropped.
    pub async fn begin_replace(&self) -> ReplaceGuard<'_> {
        let slot = self.tree.write().await;
        self.available.store(false, Ordering::Release);
        debug!("Bundle reads suspended for replace");
        ReplaceGuard {
            slot,
            available: &self.available,
        }
    }
}

/// Exclusive access to the library for the duration of a replace.
pub struct ReplaceGuard<'a> {
    slot: RwLockWriteGuard<'a, Option<Arc<ContentTree>>>,
    available: &'a AtomicBool,
}

impl ReplaceGuard<'_> {
    pub fn install(&mut self, tree: ContentTree) -> Arc<ContentTree> {
        let tree = Arc::new(tree);
        info!(nodes = tree.len(), "Installed content tree");
        *self.slot = Some(tree.clone());
        tree
    }

    /// Forget the current tree, e.g. after the bundle directory was cleared.
    pub fn clear(&mut self) {
        *self.slot = None;
    }
}

impl Drop for ReplaceGuard<'_> {
    fn drop(&mut self) {
        self.available.store(true, Ordering::Release);
        debug!("Bundle reads resumed");
    }
}
