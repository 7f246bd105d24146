//! Store inspection commands: `status`, `list`, `clear`.

use console::style;
use projdata::config::ConfigFile;
use projdata::installer::{EntryKind, VersionLedger};

use super::common::{format_size, open_store, StoreArgs};
use crate::error::CliError;

/// Print the installed version.
pub async fn status(args: StoreArgs, config: &ConfigFile) -> Result<(), CliError> {
    let store = open_store(config, &args).await?;

    println!("Store: {}", store.root().display());
    match VersionLedger::new(&store).read().await {
        Some(version) => println!("Installed version: {}", style(version).green()),
        None => println!("Installed version: {}", style("not installed").yellow()),
    }
    Ok(())
}

/// List the files in the store.
pub async fn list(args: StoreArgs, config: &ConfigFile) -> Result<(), CliError> {
    let store = open_store(config, &args).await?;
    let files: Vec<_> = store
        .list()?
        .into_iter()
        .filter(|e| e.kind == EntryKind::File)
        .collect();

    if files.is_empty() {
        println!("No files in {}", store.root().display());
        return Ok(());
    }

    let total: u64 = files.iter().map(|e| e.size).sum();
    for entry in &files {
        println!("{:>10}  {}", format_size(entry.size), entry.path);
    }
    println!();
    println!("{} files, {}", files.len(), format_size(total));
    Ok(())
}

/// Wipe the store, version marker included.
pub async fn clear(args: StoreArgs, config: &ConfigFile) -> Result<(), CliError> {
    let store = open_store(config, &args).await?;
    let removed = store.clear().await?;

    println!(
        "Cleared {}: removed {} top-level entries",
        store.root().display(),
        removed
    );
    Ok(())
}
