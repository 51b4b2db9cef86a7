/// `load_config` module: reads the static YAML config and merges environment
/// overrides into a [`BundleSyncConfig`].
///
/// # Responsibilities
/// - Parse the user-supplied YAML file
/// - Apply `BUNDLE_SYNC_BASE_URL` / `BUNDLE_SYNC_PROJECT_ID` over the file values
/// - Fill unset directories with the platform defaults from `bundle-sync-core`
///
/// # Errors
/// All errors are `anyhow::Error` and name the file or variable involved.
use anyhow::Result;
use bundle_sync_core::config::{
    default_bundle_dir, default_documents_dir, default_manifest_name, default_state_file,
    BundleSyncConfig,
};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const BASE_URL_ENV: &str = "BUNDLE_SYNC_BASE_URL";
pub const PROJECT_ID_ENV: &str = "BUNDLE_SYNC_PROJECT_ID";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    base_url: Option<String>,
    project_id: Option<String>,
    language: Option<String>,
    bundle_dir: Option<PathBuf>,
    documents_dir: Option<PathBuf>,
    state_file: Option<PathBuf>,
    manifest_name: Option<String>,
}

/// Load the YAML config at `path`, then apply environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BundleSyncConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a config made of env vars and defaults only.
    let raw: RawConfig = if config_content.trim().is_empty() {
        RawConfig::default()
    } else {
        match serde_yaml::from_str(&config_content) {
            Ok(conf) => conf,
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
            }
        }
    };

    let base_url = required(BASE_URL_ENV, "base_url", raw.base_url)?;
    let project_id = required(PROJECT_ID_ENV, "project_id", raw.project_id)?;

    let config = BundleSyncConfig {
        base_url,
        project_id,
        language: raw.language.filter(|l| !l.is_empty()),
        bundle_dir: raw.bundle_dir.unwrap_or_else(default_bundle_dir),
        documents_dir: raw.documents_dir.unwrap_or_else(default_documents_dir),
        state_file: raw.state_file.unwrap_or_else(default_state_file),
        manifest_name: raw.manifest_name.unwrap_or_else(default_manifest_name),
    };
    config.trace_loaded();
    Ok(config)
}

/// The env var wins over the file value; an empty value counts as unset.
fn required(var: &str, key: &str, from_file: Option<String>) -> Result<String> {
    if let Ok(value) = env::var(var) {
        if !value.trim().is_empty() {
            info!(var, key, "Using value from environment");
            return Ok(value);
        }
    }
    match from_file.filter(|v| !v.trim().is_empty()) {
        Some(value) => Ok(value),
        None => {
            error!(var, key, "Missing required configuration value");
            Err(anyhow::anyhow!(
                "Missing {key}: set `{key}` in the config file or the {var} environment variable"
            ))
        }
    }
}
