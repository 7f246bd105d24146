//! `install` command.
//!
//! Installs run on a worker task behind the bridge. The default output is a
//! progress bar; `--json` prints every worker message as one JSON line.

use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use projdata::bridge::{
    spawn_worker, InstallerClient, WorkerChannels, WorkerMessage, WorkerRequest,
};
use projdata::config::ConfigFile;
use projdata::installer::{
    BundleInstaller, HttpFetcher, InstallError, InstallOutcome, InstallRequest, InstallStatus,
    ProgressCallback,
};
use tracing::debug;

use super::common::{format_size, installer_config, StoreArgs};
use crate::error::CliError;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}";

/// Arguments for `install`.
#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Bundle archive URL [default: config.ini]
    #[arg(long)]
    pub url: Option<String>,

    /// Bundle version to install [default: config.ini]
    #[arg(long)]
    pub version: Option<String>,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Fail when the download stalls for this many seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    pub idle_timeout: Option<u64>,

    /// Print worker messages as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Run the install command.
pub async fn run(args: InstallArgs, config: &ConfigFile) -> Result<(), CliError> {
    let url = args.url.or_else(|| config.bundle_url.clone()).ok_or_else(|| {
        CliError::Config(
            "No bundle URL specified. Use --url or set url in config.ini [bundle] section."
                .to_string(),
        )
    })?;
    let version = args
        .version
        .or_else(|| config.bundle_version.clone())
        .ok_or_else(|| {
            CliError::Config(
                "No bundle version specified. \
                 Use --version or set version in config.ini [bundle] section."
                    .to_string(),
            )
        })?;

    let mut resolved = installer_config(config, &args.store);
    if let Some(secs) = args.idle_timeout {
        let idle = Some(Duration::from_secs(secs)).filter(|d| !d.is_zero());
        resolved = resolved.with_idle_timeout(idle);
    }
    debug!(
        store_dir = %resolved.store_dir.display(),
        store = %resolved.default_store_name,
        "Resolved store"
    );

    let installer = BundleInstaller::new(HttpFetcher::new()?, resolved);
    let request = InstallRequest::new(url, version);

    if args.json {
        run_json(installer, request).await
    } else {
        run_interactive(installer, request).await
    }
}

async fn run_interactive(
    installer: BundleInstaller<HttpFetcher>,
    request: InstallRequest,
) -> Result<(), CliError> {
    let client = InstallerClient::spawn(installer);

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let progress = bar.clone();
    let on_progress: ProgressCallback = Box::new(move |report| {
        if let Some(total) = report.total_bytes {
            progress.set_length(total);
        }
        progress.set_position(report.bytes_consumed);
        progress.set_message(format!("{} entries", report.entries_written));
    });

    let result = client.install(request, Some(on_progress)).await;
    bar.finish_and_clear();

    print_outcome(&result?);
    Ok(())
}

fn print_outcome(outcome: &InstallOutcome) {
    match outcome.status {
        InstallStatus::Cached => println!(
            "{} Version {} already installed at {}",
            style("✓").green(),
            outcome.version,
            outcome.store_root.display()
        ),
        InstallStatus::Installed => println!(
            "{} Installed version {} ({} entries, {} downloaded) into {}",
            style("✓").green(),
            outcome.version,
            outcome.entries_written,
            format_size(outcome.bytes_downloaded),
            outcome.store_root.display()
        ),
    }

    if outcome.entries_skipped > 0 {
        println!(
            "{} Skipped {} entries with unsafe paths",
            style("!").yellow(),
            outcome.entries_skipped
        );
    }
}

async fn run_json(
    installer: BundleInstaller<HttpFetcher>,
    request: InstallRequest,
) -> Result<(), CliError> {
    let WorkerChannels {
        requests,
        mut messages,
    } = spawn_worker(installer);

    requests
        .send(WorkerRequest::Install { id: 1, request })
        .await
        .map_err(|_| InstallError::Transport("installer worker exited".to_string()))?;

    while let Some(message) = messages.recv().await {
        println!("{}", serde_json::to_string(&message)?);
        match message {
            WorkerMessage::Progress { .. } => continue,
            WorkerMessage::Ready { .. } => return Ok(()),
            WorkerMessage::Error { error, .. } => return Err(InstallError::from(error).into()),
        }
    }

    Err(InstallError::Transport("installer worker exited".to_string()).into())
}
