//! Helpers for loading storage config and opening the sample database.

use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest as _, Sha256};

use crate::db::{SampleDb, StorageConfig, StorageLayout};

/// Load the storage config JSON from disk for a given layout.
pub fn load_storage_config(layout: &StorageLayout) -> Result<StorageConfig> {
    let config_json = fs::read_to_string(&layout.storage_config_path).with_context(|| {
        format!("Failed to read storage config at {}", layout.storage_config_path.display())
    })?;
    let config: StorageConfig =
        serde_json::from_str(&config_json).context("Failed to parse storage config JSON")?;
    Ok(config)
}

/// Resolve the DB path (respecting relative/absolute config) and open a SampleDb.
pub fn open_storage_db(layout: &StorageLayout) -> Result<(StorageConfig, PathBuf, SampleDb)> {
    let config = load_storage_config(layout)?;
    let config_db_path = Path::new(&config.db.path);
    let db_path = if config_db_path.is_absolute() {
        config_db_path.to_path_buf()
    } else {
        layout.root.join(config_db_path)
    };
    let db = SampleDb::open(&db_path)
        .with_context(|| format!("Failed to open sample database at {}", db_path.display()))?;
    Ok((config, db_path, db))
}

/// Create the directory skeleton and config file for a new store.
///
/// Existing directories are left alone; an existing config file is overwritten.
pub fn init_storage(layout: &StorageLayout, config: &StorageConfig) -> Result<()> {
    for dir in [&layout.meta_dir, &layout.samples_dir, &layout.analyses_dir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(&layout.storage_config_path, json).with_context(|| {
        format!("Failed to write storage config: {}", layout.storage_config_path.display())
    })?;
    Ok(())
}

/// Compute the SHA-256 hash of a file and return it as a hex string.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open sample for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read sample for hashing: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    Ok(format!("{:x}", digest))
}
