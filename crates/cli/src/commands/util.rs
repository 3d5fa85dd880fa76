use std::path::Path;

use anyhow::{anyhow, Context, Result};
use sample_pipeline_core::config::WorkerConfig;
use sample_pipeline_core::db::StorageContext;
use sample_pipeline_core::model::Digest;

use crate::canonicalize_or_current;

/// Resolve `root` and open the store beneath it.
pub fn open_storage(root: &str) -> Result<StorageContext> {
    let root_path = canonicalize_or_current(root)?;
    StorageContext::from_root(&root_path)
}

/// Read and validate a worker config file.
pub fn load_worker_config(path: &str) -> Result<WorkerConfig> {
    WorkerConfig::load(Path::new(path))
        .with_context(|| format!("Failed to load worker config from {path}"))
}

pub fn parse_digest(value: &str) -> Result<Digest> {
    Digest::parse(value).map_err(|err| anyhow!("Invalid digest {value:?}: {err}"))
}

/// Helper to print whether a directory exists.
pub fn print_dir_status(label: &str, path: &Path) {
    let exists = path.is_dir();
    println!("- {label}: {} ({})", if exists { "OK" } else { "MISSING" }, path.display());
}

/// Print `value` as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T, what: &str) -> Result<()> {
    let serialized = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {what} to JSON"))?;
    println!("{}", serialized);
    Ok(())
}
