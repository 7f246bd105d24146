//! projdata CLI - Command-line interface
//!
//! Installs versioned data bundles into a local store and inspects them.

mod commands;
mod error;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use console::style;
use projdata::config::ConfigFile;
use projdata::logging::{init_logging, LoggingConfig};

use commands::common::StoreArgs;
use commands::install::InstallArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "projdata")]
#[command(version, about = "Install and inspect versioned data bundles", long_about = None)]
struct Cli {
    /// Configuration file [default: <config dir>/projdata/config.ini]
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download and install a bundle version unless it is already installed
    Install(InstallArgs),
    /// Show the installed version
    Status(StoreArgs),
    /// List the files in the store
    List(StoreArgs),
    /// Remove everything from the store
    Clear(StoreArgs),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref())?;

    // Before the runtime starts so the local time offset can be read.
    let _guard = init_logging(&logging_config(&config, cli.verbose))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Install(args) => commands::install::run(args, &config).await,
            Commands::Status(args) => commands::store::status(args, &config).await,
            Commands::List(args) => commands::store::list(args, &config).await,
            Commands::Clear(args) => commands::store::clear(args, &config).await,
        }
    })
}

fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::load_default()?,
    };
    Ok(config)
}

fn logging_config(config: &ConfigFile, verbose: bool) -> LoggingConfig {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.log_level.clone().unwrap_or_else(|| "info".to_string())
    };

    LoggingConfig {
        level,
        log_dir: config.log_dir.clone(),
        ..Default::default()
    }
}
