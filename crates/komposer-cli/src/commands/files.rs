//! `list_files`, `list_generated_files`, `get_file_info`, `cleanup_temp_files`
//! (spec §6).

use super::common::respond;
use clap::Args;
use komposer_config::Config;
use komposer_core::{Error, FileHandle};
use komposer_registry::{FileListing, Registry};
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;

/// Probe a file's container/stream metadata.
#[derive(Args)]
pub struct FileInfoArgs {
    /// Handle of the file to probe, e.g. `file_deadbeef`.
    pub id: String,
}

/// Remove stale temp-class files.
#[derive(Args)]
pub struct CleanupArgs {
    /// Only remove files last modified more than this many seconds ago.
    /// Omit to remove every temp-class file.
    #[arg(long)]
    pub older_than_secs: Option<u64>,
}

fn listing_json(listing: &FileListing) -> serde_json::Value {
    json!({
        "id": listing.handle.to_string(),
        "name": listing.name,
        "size": listing.size,
        "extension": listing.extension,
    })
}

/// `list_files() → { files: [{id, name, size, extension}] }`.
pub fn list_files(config: &Config) {
    let mut registry = Registry::new(config.clone());
    respond(
        registry
            .list_source_files()
            .map(|listings| json!({ "files": listings.iter().map(listing_json).collect::<Vec<_>>() }))
            .map_err(Error::from),
    );
}

/// `list_generated_files() → { files: [...], total_count }`.
pub fn list_generated_files(config: &Config) {
    let mut registry = Registry::new(config.clone());
    respond(registry.list_generated_files().map(|listings| {
        json!({
            "files": listings.iter().map(listing_json).collect::<Vec<_>>(),
            "total_count": listings.len(),
        })
    }).map_err(Error::from));
}

/// `get_file_info(id) → { success, media_info }`.
pub fn file_info(config: &Config, args: FileInfoArgs) {
    respond(file_info_inner(config, &args.id));
}

fn file_info_inner(config: &Config, id: &str) -> Result<serde_json::Value, Error> {
    let mut registry = Registry::new(config.clone());
    // Ensure the handle exists in this process by populating the registry
    // from both source and generated roots before resolving it.
    registry.list_source_files()?;
    registry.list_generated_files()?;

    let handle = FileHandle::from_str(id)
        .map_err(|_| Error::validation(format!("'{id}' is not a valid file handle")))?;
    let path = registry.resolve(handle)?;
    let media_info = komposer_media::probe(&path, &config.metadata_root, config.process_timeout)?;
    Ok(json!({ "media_info": media_info }))
}

/// `cleanup_temp_files() → { removed }`.
///
/// Only handles the registry already knows as `HandleClass::Temp` are
/// eligible — directory scans (`list_source_files`/`list_generated_files`)
/// register everything they find as `Generated`, a kept byproduct, so this
/// sweeps whatever a prior `process_file`/`batch_process`/composition call
/// in the same process allocated as an intermediate.
pub fn cleanup_temp_files(config: &Config, args: CleanupArgs) {
    let mut registry = Registry::new(config.clone());
    respond(
        registry
            .cleanup_temp(args.older_than_secs.map(Duration::from_secs))
            .map(|removed| json!({ "removed": removed }))
            .map_err(Error::from),
    );
}
