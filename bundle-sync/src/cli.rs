//! CLI glue for bundle-sync: argument parsing and wiring of the core pipeline.
//!
//! All bundle logic (metadata, download, replace, tree lookups) lives in
//! `bundle-sync-core`. This module only builds the collaborators from a
//! [`BundleSyncConfig`] and prints results.
//!
//! Call [`run`] with a parsed [`Cli`] from `main` or from integration tests.
use crate::load_config::load_config;
use anyhow::{Context, Result};
use bundle_sync_core::archive::ArchiveCodec;
use bundle_sync_core::cache_store::{CacheState, FileCacheStore};
use bundle_sync_core::config::BundleSyncConfig;
use bundle_sync_core::library::ContentLibrary;
use bundle_sync_core::resolver::PathResolver;
use bundle_sync_core::synchronise::{BundleSynchronizer, SyncOutcome};
use bundle_sync_core::transport::HttpTransport;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Keep a local content bundle in step with its publishing service.
#[derive(Parser)]
#[clap(
    name = "bundle-sync",
    version,
    about = "Download, install and query published content bundles"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install the latest publish if it is newer than the local bundle
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Show the installed bundle
    Status {
        #[clap(long)]
        config: PathBuf,
    },
    /// Print the directory node with the given id as JSON
    Find {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        id: i64,
    },
    /// Print the local path of a bundle-relative file
    Resolve {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        path: String,
    },
    /// Fetch a remote document into the documents cache and print its path
    Document {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        url: Url,
    },
    /// Delete the installed bundle and its recorded state
    Reset {
        #[clap(long)]
        config: PathBuf,
    },
}

type Synchronizer = BundleSynchronizer<HttpTransport, FileCacheStore>;

struct App {
    config: BundleSyncConfig,
    transport: Arc<HttpTransport>,
    synchronizer: Synchronizer,
}

impl App {
    fn build(config: BundleSyncConfig) -> Result<Self> {
        let transport = Arc::new(
            HttpTransport::new(&config.base_url)
                .with_context(|| format!("Invalid base_url {:?}", config.base_url))?,
        );
        let store = Arc::new(
            FileCacheStore::open(&config.state_file).with_context(|| {
                format!("Failed to open state file {}", config.state_file.display())
            })?,
        );
        let resolver = PathResolver::new(&config.bundle_dir, &config.documents_dir);
        let library = Arc::new(ContentLibrary::open(resolver, config.manifest_name.clone()));
        let synchronizer = BundleSynchronizer::new(transport.clone(), store, library)
            .with_codec(ArchiveCodec::with_manifest_name(config.manifest_name.clone()));
        Ok(Self {
            config,
            transport,
            synchronizer,
        })
    }

    fn library(&self) -> &ContentLibrary {
        self.synchronizer.library()
    }
}

fn status_line(state: &CacheState) -> String {
    match (&state.cached_bundle_info, state.has_bundle()) {
        (Some(info), true) => format!(
            "installed: {} (published {})",
            info.identifier.as_deref().unwrap_or("<unknown>"),
            info.publish_date
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| "<unknown>".to_string())
        ),
        _ => "no bundle installed".to_string(),
    }
}

/// Async CLI entrypoint for `main` and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config } => {
            let app = App::build(load_config(config)?)?;
            tracing::info!(command = "sync", "Starting synchronisation");
            let outcome = app
                .synchronizer
                .sync(&app.config.project_id, app.config.language.as_deref())
                .await;
            match outcome {
                Ok(SyncOutcome::UpToDate) => {
                    tracing::info!(command = "sync", "Bundle already up to date");
                    println!("up to date");
                    Ok(())
                }
                Ok(SyncOutcome::Updated {
                    bundle_info,
                    report,
                    state_persisted,
                }) => {
                    tracing::info!(command = "sync", ?report, "Synchronisation complete");
                    if !state_persisted {
                        tracing::warn!(
                            state_file = %app.config.state_file.display(),
                            "Bundle installed but its state was not saved; the next sync downloads it again"
                        );
                    }
                    println!(
                        "updated to {} ({} files)",
                        bundle_info.identifier.as_deref().unwrap_or("<unknown>"),
                        report.files_extracted
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(anyhow::Error::new(e).context("Synchronisation failed"))
                }
            }
        }
        Commands::Status { config } => {
            let app = App::build(load_config(config)?)?;
            let state = app.synchronizer.cache_state();
            println!("{}", status_line(&state));
            if let Some(tree) = app.library().tree().await {
                println!("nodes: {}", tree.len());
            }
            Ok(())
        }
        Commands::Find { config, id } => {
            let app = App::build(load_config(config)?)?;
            let node = app
                .library()
                .find(id)
                .await
                .with_context(|| format!("No directory with id {id}"))?;
            println!("{}", serde_json::to_string_pretty(&node)?);
            Ok(())
        }
        Commands::Resolve { config, path } => {
            let app = App::build(load_config(config)?)?;
            let local = app
                .library()
                .resolve_bundle_path(&path)
                .await
                .with_context(|| format!("{path} is not in the installed bundle"))?;
            println!("{}", local.display());
            Ok(())
        }
        Commands::Document { config, url } => {
            let app = App::build(load_config(config)?)?;
            let stored = app
                .library()
                .resolver()
                .download_document(app.transport.as_ref(), &url, None)
                .await
                .with_context(|| format!("Failed to fetch document {url}"))?;
            println!("{}", stored.display());
            Ok(())
        }
        Commands::Reset { config } => {
            let app = App::build(load_config(config)?)?;
            let failures = app.synchronizer.reset().await?;
            if failures > 0 {
                tracing::warn!(failures, "Some bundle entries could not be removed");
            }
            println!("bundle removed");
            Ok(())
        }
    }
}
