use anyhow::{Context, Result};
use serde::Serialize;

use sample_pipeline_core::db::{init_storage, SampleDb, StorageConfig, StorageLayout};

use crate::commands::{open_storage, print_dir_status, print_json};
use crate::{canonicalize_or_current, infer_store_name};

#[derive(Serialize)]
pub struct StorageInfoSnapshot {
    pub name: String,
    pub root: String,
    pub config_file: String,
    pub config_version: String,
    pub db_path: String,
    pub schema_version: i32,
    pub cases: usize,
    pub samples: usize,
    pub analysis_runs: usize,
}

/// Initialize a new sample store at `root`.
pub fn init_storage_command(root: &str, name: Option<String>) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let layout = StorageLayout::new(&root_path);

    let store_name = match name {
        Some(n) => n,
        None => infer_store_name(&root_path),
    };

    let config = StorageConfig::new(&store_name, layout.db_path_relative_string());
    init_storage(&layout, &config)?;

    // Create the database immediately so follow-on commands can rely on it.
    SampleDb::open(&layout.db_path).with_context(|| {
        format!("Failed to initialize sample database at {}", layout.db_path.display())
    })?;

    println!("Initialized sample store:");
    println!("  Name: {}", store_name);
    println!("  Root: {}", layout.root.display());
    println!("  Config: {}", layout.storage_config_path.display());
    println!("  DB path (relative): {}", config.db.path);
    println!("  Samples dir: {}", layout.samples_dir.display());
    println!("  Analyses dir: {}", layout.analyses_dir.display());

    Ok(())
}

/// Show basic information about an existing store.
pub fn storage_info_command(root: &str, json: bool) -> Result<()> {
    let ctx = open_storage(root)?;
    let snapshot = StorageInfoSnapshot {
        name: ctx.config.name.clone(),
        root: ctx.layout.root.display().to_string(),
        config_file: ctx.layout.storage_config_path.display().to_string(),
        config_version: ctx.config.config_version.clone(),
        db_path: ctx.db_path.display().to_string(),
        schema_version: ctx.db.schema_version().context("Failed to read schema version")?,
        cases: ctx.db.list_cases().context("Failed to list cases")?.len(),
        samples: ctx.db.list_samples(None).context("Failed to list samples")?.len(),
        analysis_runs: ctx.db.list_analysis_runs(None).context("Failed to list runs")?.len(),
    };

    if json {
        return print_json(&snapshot, "storage info");
    }

    println!("Sample Store Info");
    println!("=================");
    println!("Name: {}", snapshot.name);
    println!("Root: {}", snapshot.root);
    println!("Config file: {}", snapshot.config_file);
    println!("Config version: {}", snapshot.config_version);
    println!("DB path: {}", snapshot.db_path);
    println!("Schema version: {}", snapshot.schema_version);
    println!(
        "Cases: {}  Samples: {}  Analysis runs: {}",
        snapshot.cases, snapshot.samples, snapshot.analysis_runs
    );
    println!();

    println!("Directories:");
    print_dir_status("Meta dir (.store)", &ctx.layout.meta_dir);
    print_dir_status("Samples dir", &ctx.layout.samples_dir);
    print_dir_status("Analyses dir", &ctx.layout.analyses_dir);

    Ok(())
}
