//! harvest-processor - contribution harvester
//!
//! Offline batch job run periodically by an external scheduler. One run
//! bootstraps default data, harvests every configured source incrementally,
//! stamps releases, applies corrections and exits. A non-zero exit status
//! means a fatal error; skipped tuples are only logged.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use harvest_common::config::{default_config_path, load_toml_config_or_default, RootFolderResolver};
use harvest_common::KeyedStore;
use harvest_processor::services::{IdentityDirectory, LaunchpadDirectory, NullDirectory};
use harvest_processor::sources::SourceRegistry;
use harvest_processor::{HarvestConfig, HarvestRun};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for harvest-processor
#[derive(Parser, Debug)]
#[command(name = "harvest-processor")]
#[command(about = "Incrementally harvest contribution activity into the keyed store")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "HARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder for the store and source data
    #[arg(short, long, env = "HARVEST_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Skip identity directory lookups for this run
    #[arg(long)]
    no_directory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The config file may itself name the root folder
    let bootstrap_root = RootFolderResolver::new(args.root_folder.clone(), None).resolve();
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&bootstrap_root));
    let toml_config = load_toml_config_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml_config.logging.level)),
        )
        .init();

    info!(
        "Starting harvest-processor v{}",
        env!("CARGO_PKG_VERSION")
    );

    let root_folder = RootFolderResolver::new(args.root_folder.clone(), toml_config.root_folder.clone()).resolve();
    let config = HarvestConfig::from_toml(&toml_config, &root_folder);
    info!(
        config = %config_path.display(),
        root_folder = %root_folder.display(),
        store = %config.store_path.display(),
        "Configuration resolved"
    );

    let store = KeyedStore::open(&config.store_path, config.lock_wait_ms)
        .await
        .with_context(|| format!("Failed to open store {}", config.store_path.display()))?;

    let directory: Arc<dyn IdentityDirectory> = if config.directory_enabled && !args.no_directory {
        Arc::new(
            LaunchpadDirectory::new(
                &config.directory_url,
                config.directory_timeout,
                config.directory_min_interval_ms,
            )
            .context("Failed to build identity directory client")?,
        )
    } else {
        info!("Identity directory disabled");
        Arc::new(NullDirectory)
    };

    let sources = SourceRegistry::file_backed(&config.sources_root);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let summary = HarvestRun::new(store.clone(), config, sources, directory, cancel)
        .execute()
        .await
        .context("Harvest run aborted")?;

    if summary.cancelled {
        warn!("Harvest interrupted; the next run resumes from stored cursors");
    }
    info!(
        repo_tuples_failed = summary.repos.tuples_failed,
        records_inserted = summary.repos.records.inserted,
        records_merged = summary.repos.records.merged,
        records_rejected = summary.repos.records.rejected,
        "Harvest finished"
    );

    store.close().await;
    Ok(())
}

/// Cancel the run on Ctrl+C or SIGTERM
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping after the current tuple");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping after the current tuple");
        },
    }
    cancel.cancel();
}
