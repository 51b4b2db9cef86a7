//! High-level pipeline: metadata → compare → download → replace → rebuild.
//!
//! This module provides [`BundleSynchronizer`], which keeps the local bundle
//! directory in step with the latest publish of a project:
//!   - Asks the publishing service for the latest [`BundleInfo`]
//!   - Compares its publish timestamp with the persisted [`CacheState`]
//!   - Downloads the archive when the publish is strictly newer
//!   - Replaces the bundle directory on a blocking worker (see [`crate::archive`])
//!   - Records the new state and swaps a freshly built tree into the [`ContentLibrary`]
//!
//! # States
//! `Idle → CheckingMetadata → Downloading → Replacing → Idle`, observable through
//! [`BundleSynchronizer::subscribe`]. Every run ends in `Idle`.
//!
//! # Outcomes
//! `Ok(SyncOutcome::UpToDate)`, `Ok(SyncOutcome::Updated { .. })`, or
//! `Err(SyncError)` for the failed outcome. Once the new bundle is live the run
//! reports `Updated`, even if its state could not be saved. There is no retry;
//! callers decide.
//!
//! # Concurrency
//! Runs are serialized per synchroniser. The replace step holds the library's
//! write gate, so lookups wait for the new tree instead of reading a bundle
//! directory mid-swap.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::archive::{self, ArchiveCodec, ReplaceReport};
use crate::cache_store::CacheState;
use crate::contract::{CacheStore, ProgressHandler, Transport};
use crate::error::{ArchiveError, SyncError};
use crate::fetch::ArchiveFetcher;
use crate::library::ContentLibrary;
use crate::metadata::{BundleInfo, BundleMetadataClient};
use crate::tree::ContentTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    CheckingMetadata,
    Downloading,
    Replacing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The installed bundle is at least as new as the latest publish.
    UpToDate,
    /// A newer bundle was downloaded and installed.
    Updated {
        bundle_info: BundleInfo,
        report: ReplaceReport,
        /// False when the bundle is live but its publish timestamp could not be
        /// saved; the next run will download it again.
        state_persisted: bool,
    },
}

pub struct BundleSynchronizer<T: ?Sized, S: ?Sized> {
    metadata: BundleMetadataClient<T>,
    fetcher: ArchiveFetcher<T>,
    codec: ArchiveCodec,
    store: Arc<S>,
    library: Arc<ContentLibrary>,
    progress: Option<ProgressHandler>,
    state: watch::Sender<SyncState>,
    run_lock: Mutex<()>,
}

impl<T, S> BundleSynchronizer<T, S>
where
    T: Transport + ?Sized,
    S: CacheStore + ?Sized,
{
    pub fn new(transport: Arc<T>, store: Arc<S>, library: Arc<ContentLibrary>) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            metadata: BundleMetadataClient::new(transport.clone()),
            fetcher: ArchiveFetcher::new(transport),
            codec: ArchiveCodec::new(),
            store,
            library,
            progress: None,
            state,
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_codec(mut self, codec: ArchiveCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Report archive download progress to `progress`.
    pub fn with_progress(mut self, progress: ProgressHandler) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn cache_state(&self) -> CacheState {
        CacheState::load(self.store.as_ref())
    }

    pub fn library(&self) -> &Arc<ContentLibrary> {
        &self.library
    }

    /// Bring the local bundle up to date with the latest publish of `project_id`.
    pub async fn sync(
        &self,
        project_id: &str,
        language: Option<&str>,
    ) -> Result<SyncOutcome, SyncError> {
        let _run = self.run_lock.lock().await;
        let _idle = IdleOnExit(&self.state);

        info!(project_id, language = language.unwrap_or("<default>"), "[SYNC] Starting bundle synchronisation");

        // --- Step 1: Latest publish ---
        self.state.send_replace(SyncState::CheckingMetadata);
        let bundle_info = match self.metadata.get_latest_bundle_info(project_id, language).await {
            Ok(info) => info,
            Err(e) => {
                error!(error = %e, "[SYNC][ERROR] Metadata lookup failed");
                return Err(e.into());
            }
        };

        // --- Step 2: Compare with the installed bundle ---
        let cache = self.cache_state();
        let Some(remote_timestamp) = bundle_info
            .publish_timestamp()
            .filter(|remote| *remote > cache.current_bundle_timestamp)
        else {
            info!(
                remote = ?bundle_info.publish_timestamp(),
                local = cache.current_bundle_timestamp,
                "[SYNC] Bundle is up to date"
            );
            return Ok(SyncOutcome::UpToDate);
        };
        info!(
            remote = remote_timestamp,
            local = cache.current_bundle_timestamp,
            "[SYNC] Newer bundle published"
        );

        let Some(download_url) = bundle_info.download_url.clone() else {
            error!(identifier = ?bundle_info.identifier, "[SYNC][ERROR] Latest publish has no download url");
            return Err(SyncError::MissingDownloadUrl);
        };

        // --- Step 3: Download ---
        self.state.send_replace(SyncState::Downloading);
        let archive_file = self
            .fetcher
            .download_archive(&download_url, self.progress.clone())
            .await?;

        // --- Step 4: Replace, with readers held off ---
        self.state.send_replace(SyncState::Replacing);
        let mut gate = self.library.begin_replace().await;

        let codec = self.codec.clone();
        let archive_path = archive_file.to_path_buf();
        let destination = self.library.resolver().bundle_root().to_path_buf();
        let replaced = tokio::task::spawn_blocking(move || {
            codec.replace_bundle_directory(&archive_path, &destination)
        })
        .await
        .map_err(|e| ArchiveError::Join(e.to_string()))
        .and_then(|result| result);
        drop(archive_file);

        let report = match replaced {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "[SYNC][ERROR] Bundle replace failed");
                return Err(e.into());
            }
        };
        if !report.is_clean() {
            warn!(stale_entries = report.stale_entries, "[SYNC] Bundle replaced with leftovers");
        }

        // --- Step 5: Rebuild and record ---
        let manifest = self.library.manifest_path();
        if manifest.is_file() {
            let tree = ContentTree::load(&manifest).map_err(|e| {
                error!(error = %e, path = %manifest.display(), "[SYNC][ERROR] Failed to rebuild content tree");
                e
            })?;
            gate.install(tree);
        } else {
            debug!(path = %manifest.display(), "[SYNC] Installed bundle has no manifest");
            gate.clear();
        }
        drop(gate);

        let state_persisted =
            match CacheState::record(self.store.as_ref(), remote_timestamp, &bundle_info) {
                Ok(()) => true,
                Err(e) => {
                    error!(error = %e, "[SYNC][ERROR] Failed to persist bundle state, bundle stays installed");
                    false
                }
            };

        info!(
            identifier = ?bundle_info.identifier,
            files = report.files_extracted,
            state_persisted,
            "[SYNC] Bundle updated"
        );
        Ok(SyncOutcome::Updated {
            bundle_info,
            report,
            state_persisted,
        })
    }

    /// Remove the installed bundle and forget its state.
    ///
    /// Returns how many bundle entries could not be deleted.
    pub async fn reset(&self) -> Result<usize, SyncError> {
        let _run = self.run_lock.lock().await;
        let mut gate = self.library.begin_replace().await;

        let bundle_root: PathBuf = self.library.resolver().bundle_root().to_path_buf();
        let failures = archive::clear_directory(&bundle_root);
        gate.clear();
        self.store.clear()?;

        info!(path = %bundle_root.display(), failures, "[SYNC] Bundle reset");
        Ok(failures)
    }
}

/// Puts the state back to `Idle` on every exit path of a run.
struct IdleOnExit<'a>(&'a watch::Sender<SyncState>);

impl Drop for IdleOnExit<'_> {
    fn drop(&mut self) {
        self.0.send_replace(SyncState::Idle);
    }
}
