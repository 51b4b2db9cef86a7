//! Gzip + tar handling and the bundle directory replace.
//!
//! A replace never touches the live bundle directory until the new bundle is
//! fully extracted and its manifest parses:
//!
//! 1. gunzip the archive in memory
//! 2. write the tar stream to a temp file next to the bundle directory
//! 3. unpack it into a fresh staging directory (also a sibling)
//! 4. validate the staged manifest
//! 5. rename the live directory aside, rename staging into place, delete the
//!    old one
//!
//! Any failure before step 5 leaves the live bundle as it was.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ArchiveError;
use crate::tree::ContentTree;

/// Manifest file name at the root of every bundle.
pub const DEFAULT_MANIFEST_NAME: &str = "structure.json";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// What a successful replace did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceReport {
    /// Regular files written into the new bundle directory.
    pub files_extracted: usize,
    /// Whether an earlier bundle directory was swapped out.
    pub replaced_previous: bool,
    /// Leftovers (temp tar, old bundle entries) that could not be removed.
    pub stale_entries: usize,
}

impl ReplaceReport {
    /// True when every temporary and outdated entry was cleaned up.
    pub fn is_clean(&self) -> bool {
        self.stale_entries == 0
    }
}

/// Decompresses and extracts bundle archives.
#[derive(Debug, Clone)]
pub struct ArchiveCodec {
    manifest_name: Option<String>,
}

impl Default for ArchiveCodec {
    fn default() -> Self {
        Self {
            manifest_name: Some(DEFAULT_MANIFEST_NAME.to_string()),
        }
    }
}

impl ArchiveCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate staged bundles against a manifest with a different file name.
    pub fn with_manifest_name(name: impl Into<String>) -> Self {
        Self {
            manifest_name: Some(name.into()),
        }
    }

    /// Accept any archive that extracts, with or without a manifest.
    pub fn without_validation() -> Self {
        Self {
            manifest_name: None,
        }
    }

    /// Replace `destination_dir` with the contents of the gzip+tar `archive_file`.
    ///
    /// Blocking; callers on an async runtime should use `spawn_blocking`.
    pub fn replace_bundle_directory(
        &self,
        archive_file: &Path,
        destination_dir: &Path,
    ) -> Result<ReplaceReport, ArchiveError> {
        let parent = parent_dir(destination_dir);
        fs::create_dir_all(&parent).map_err(|e| ArchiveError::io(&parent, e))?;

        let staging = sibling_path(destination_dir, "staging");
        fs::create_dir(&staging).map_err(|e| ArchiveError::io(&staging, e))?;
        debug!(staging = %staging.display(), "Created staging directory");

        let mut report = ReplaceReport::default();
        if let Err(e) = self.stage(archive_file, &parent, &staging, &mut report) {
            error!(error = %e, archive = %archive_file.display(), "Staging bundle failed, live bundle left untouched");
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(error = %cleanup, path = %staging.display(), "Failed to remove staging directory");
            }
            return Err(e);
        }

        swap_into_place(&staging, destination_dir, &mut report)?;

        info!(
            destination = %destination_dir.display(),
            files = report.files_extracted,
            stale_entries = report.stale_entries,
            "Bundle directory replaced"
        );
        Ok(report)
    }

    fn stage(
        &self,
        archive_file: &Path,
        scratch_dir: &Path,
        staging: &Path,
        report: &mut ReplaceReport,
    ) -> Result<(), ArchiveError> {
        let compressed = fs::read(archive_file).map_err(|e| ArchiveError::io(archive_file, e))?;
        let tar_bytes = gunzip(&compressed)?;
        debug!(
            compressed = compressed.len(),
            decompressed = tar_bytes.len(),
            "Decompressed bundle archive"
        );

        let mut tar_file = tempfile::Builder::new()
            .prefix(".bundle-")
            .suffix(".tar")
            .tempfile_in(scratch_dir)
            .map_err(|e| ArchiveError::io(scratch_dir, e))?;
        tar_file
            .write_all(&tar_bytes)
            .and_then(|_| tar_file.flush())
            .map_err(|e| ArchiveError::io(tar_file.path(), e))?;
        drop(tar_bytes);

        let unpacked = unpack_tar(tar_file.path(), staging);

        let tar_path = tar_file.path().to_path_buf();
        if let Err(e) = tar_file.close() {
            warn!(error = %e, path = %tar_path.display(), "Failed to delete temporary tar file");
            report.stale_entries += 1;
        }
        report.files_extracted = unpacked?;

        if let Some(name) = &self.manifest_name {
            let manifest = staging.join(name);
            if !manifest.is_file() {
                return Err(ArchiveError::InvalidBundle(format!("{name} missing from archive")));
            }
            ContentTree::load(&manifest)
                .map_err(|e| ArchiveError::InvalidBundle(format!("{name}: {e}")))?;
        }
        Ok(())
    }
}

/// Gunzip a complete in-memory gzip stream.
pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Err(ArchiveError::Decompression("not a gzip stream".to_string()));
    }
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ArchiveError::Decompression(e.to_string()))?;
    Ok(out)
}

/// Unpack the tar file at `tar_path` into `destination`, returning the number of
/// regular files written. Entries that would land outside `destination` are
/// skipped.
pub fn unpack_tar(tar_path: &Path, destination: &Path) -> Result<usize, ArchiveError> {
    let file = File::open(tar_path).map_err(|e| ArchiveError::io(tar_path, e))?;
    let mut archive = Archive::new(file);
    let extraction = |e: std::io::Error| ArchiveError::Extraction(e.to_string());

    let mut files = 0;
    for entry in archive.entries().map_err(extraction)? {
        let mut entry = entry.map_err(extraction)?;
        let entry_path = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let is_file = entry.header().entry_type().is_file();

        if entry.unpack_in(destination).map_err(extraction)? {
            if is_file {
                files += 1;
            }
        } else {
            warn!(entry = %entry_path, "Skipped archive entry outside the bundle directory");
        }
    }
    Ok(files)
}

/// Recursively delete everything inside `directory`, keeping the directory.
///
/// Best effort: failures are logged and counted, never returned.
pub fn clear_directory(directory: &Path) -> usize {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!(error = %e, path = %directory.display(), "Failed to list directory for clearing");
            return 1;
        }
    };

    let mut failures = 0;
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                warn!(error = %e, path = %directory.display(), "Failed to read directory entry");
                failures += 1;
                continue;
            }
        };
        let removed = if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = removed {
            warn!(error = %e, path = %path.display(), "Failed to remove entry");
            failures += 1;
        }
    }
    failures
}

fn swap_into_place(
    staging: &Path,
    destination_dir: &Path,
    report: &mut ReplaceReport,
) -> Result<(), ArchiveError> {
    let backup = sibling_path(destination_dir, "previous");
    let had_previous = destination_dir.exists();

    if had_previous {
        fs::rename(destination_dir, &backup).map_err(|e| {
            let _ = fs::remove_dir_all(staging);
            ArchiveError::io(destination_dir, e)
        })?;
    }

    if let Err(e) = fs::rename(staging, destination_dir) {
        error!(error = %e, destination = %destination_dir.display(), "Failed to move staged bundle into place");
        if had_previous {
            if let Err(restore) = fs::rename(&backup, destination_dir) {
                error!(error = %restore, backup = %backup.display(), "Failed to restore previous bundle");
            }
        }
        let _ = fs::remove_dir_all(staging);
        return Err(ArchiveError::io(destination_dir, e));
    }

    if had_previous {
        report.replaced_previous = true;
        if let Err(e) = fs::remove_dir_all(&backup) {
            warn!(error = %e, path = %backup.display(), "Failed to delete previous bundle");
            report.stale_entries += 1 + clear_directory(&backup);
        }
    }
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// A unique hidden sibling of `path`, e.g. `.CIEBundle.staging-<uuid>`.
fn sibling_path(path: &Path, purpose: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bundle".to_string());
    parent_dir(path).join(format!(".{name}.{purpose}-{}", Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_paths_are_hidden_and_unique() {
        let a = sibling_path(Path::new("/data/CIEBundle"), "staging");
        let b = sibling_path(Path::new("/data/CIEBundle"), "staging");
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(Path::new("/data")));
        assert!(a
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".CIEBundle.staging-"));
    }

    #[test]
    fn relative_destination_uses_current_dir() {
        assert_eq!(parent_dir(Path::new("CIEBundle")), PathBuf::from("."));
    }

    #[test]
    fn gunzip_rejects_plain_bytes() {
        assert!(matches!(
            gunzip(b"plain text"),
            Err(ArchiveError::Decompression(_))
        ));
        assert!(matches!(gunzip(&[]), Err(ArchiveError::Decompression(_))));
    }
}
