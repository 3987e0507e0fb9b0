//! immich-onedrive-diff
//!
//! Lists the OneDrive camera roll (cached between runs), compares it against
//! the Immich library and downloads whatever Immich is missing into a review
//! directory.
//!
//! Settings can come from flags, the environment, or a `.env` file in the
//! working directory. Real environment variables win over `.env` entries.

mod cli;
mod report;

use anyhow::{Context, Result};
use bridge_desktop::{ReqwestHttpClient, TokioFileSystem};
use bridge_traits::{Clock, FileSystemAccess, HttpClient, SystemClock};
use clap::Parser;
use cli::Cli;
use core_reconcile::{FileCacheStore, MetadataCache, ReconcileCoordinator, RunSummary};
use core_runtime::logging::{init_logging, redact_if_sensitive, strip_path};
use provider_immich::ImmichConnector;
use provider_onedrive::OneDriveConnector;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    init_logging(cli.logging_config(std::env::var("RUST_LOG").ok()))
        .context("Failed to initialize logging")?;

    match dotenv {
        Ok(path) => debug!(file = %strip_path(&path.to_string_lossy()), "Loaded .env"),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => warn!(error = %e, "Ignoring unreadable .env file"),
    }

    let app = cli.app_config().context("Invalid configuration")?;
    debug!(config = ?app, "Configuration loaded");
    info!(
        immich = %app.immich_base_url,
        api_key = %redact_if_sensitive("api_key", &app.immich_api_key),
        cache = %strip_path(&app.cache_path.to_string_lossy()),
        "Starting reconciliation"
    );

    let http: Arc<dyn HttpClient> =
        Arc::new(ReqwestHttpClient::new().context("Failed to create HTTP client")?);
    let file_system: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let onedrive = OneDriveConnector::new(http.clone(), &app.onedrive_access_token)
        .with_graph_api_base(&app.graph_api_base)
        .with_camera_roll_path(&app.camera_roll_path);
    let immich = ImmichConnector::new(http, &app.immich_base_url, &app.immich_api_key)
        .with_page_size(app.immich_page_size);
    let cache = MetadataCache::new(FileCacheStore::new(file_system.clone(), &app.cache_path));

    let coordinator = ReconcileCoordinator::new(
        cli.reconcile_config(&app),
        Arc::new(onedrive),
        Arc::new(immich),
        file_system,
        cache,
        clock.clone(),
    )
    .context("Invalid reconciliation settings")?;

    let plan = coordinator.plan().await?;

    let mut stdout = io::stdout().lock();
    report::write_plan(&mut stdout, &plan, clock.now())?;

    if plan.missing().is_empty() || cli.dry_run {
        report::write_summary(&mut stdout, &RunSummary::from_plan(&plan))?;
        return Ok(());
    }

    if !cli.yes && io::stdin().is_terminal() {
        drop(stdout);
        let target = coordinator.config().target_dir.clone();
        let count = plan.missing().len();
        let confirmed = tokio::task::spawn_blocking(move || confirm(count, &target))
            .await
            .context("Confirmation prompt panicked")??;
        if !confirmed {
            println!("Nothing downloaded.");
            return Ok(());
        }
        stdout = io::stdout().lock();
    }

    let summary = coordinator.collect(&plan).await?;
    report::write_summary(&mut stdout, &summary)?;

    Ok(())
}

fn confirm(count: usize, target_dir: &Path) -> io::Result<bool> {
    let mut stdout = io::stdout();
    write!(
        stdout,
        "Download {} files into {}? [y/N] ",
        count,
        target_dir.display()
    )?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
