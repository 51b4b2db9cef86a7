use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Directory name of the bundle root inside the application data directory.
pub const BUNDLE_DIR_NAME: &str = "CIEBundle";

const APP_DIR_NAME: &str = "bundle-sync";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleSyncConfig {
    /// API base address of the publishing service.
    pub base_url: String,
    pub project_id: String,
    /// Bundle language; the server default when absent.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_bundle_dir")]
    pub bundle_dir: PathBuf,
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,
}

impl BundleSyncConfig {
    pub fn trace_loaded(&self) {
        info!(
            base_url = %self.base_url,
            project_id = %self.project_id,
            language = self.language.as_deref().unwrap_or("<default>"),
            bundle_dir = %self.bundle_dir.display(),
            documents_dir = %self.documents_dir.display(),
            "Loaded BundleSyncConfig"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

fn data_root() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_bundle_dir() -> PathBuf {
    data_root().join(BUNDLE_DIR_NAME)
}

pub fn default_documents_dir() -> PathBuf {
    dirs::document_dir().unwrap_or_else(|| data_root().join(APP_DIR_NAME).join("documents"))
}

pub fn default_state_file() -> PathBuf {
    data_root().join(APP_DIR_NAME).join("state.json")
}

pub fn default_manifest_name() -> String {
    crate::archive::DEFAULT_MANIFEST_NAME.to_string()
}
