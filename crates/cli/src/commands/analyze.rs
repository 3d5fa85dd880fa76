use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use sample_pipeline_core::db::{SampleStore, StorageContext};
use sample_pipeline_core::services::analyzers::{Analyzer, AnalyzerInfo, AnalyzerRegistry};
use sample_pipeline_core::services::driver::AnalyzerDriver;

use crate::canonicalize_or_current;
use crate::commands::{load_worker_config, open_storage, parse_digest, print_json};

/// List the analyzers a worker config registers.
pub fn analyzers_command(config: &str, json: bool) -> Result<()> {
    let config = load_worker_config(config)?;
    let registry = AnalyzerRegistry::from_config(&config);
    let infos: Vec<AnalyzerInfo> = registry.iter().map(Analyzer::info).collect();

    if json {
        return print_json(&infos, "analyzers");
    }

    println!("Analyzers ({}):", infos.len());
    if infos.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for info in infos {
        println!("  - {} (v{}) - {}", info.name, info.version, info.description);
    }
    Ok(())
}

/// Pick the analyzers to run: every registered one, or exactly those named.
pub fn select_analyzers(registry: &AnalyzerRegistry, names: &[String]) -> Result<Vec<Analyzer>> {
    if names.is_empty() {
        return Ok(registry.iter().cloned().collect());
    }
    names
        .iter()
        .map(|name| {
            registry.get(name).cloned().ok_or_else(|| {
                anyhow!(
                    "Unknown or disabled analyzer '{}'. Registered: {}",
                    name,
                    registry.names().join(", ")
                )
            })
        })
        .collect()
}

/// Run the selected analyzers concurrently over every sample sharing `digest`.
///
/// Fails if any analyzer failed or the run was interrupted.
pub async fn analyze_command(
    root: Option<&str>,
    config: &str,
    digest: &str,
    names: &[String],
) -> Result<()> {
    let config = load_worker_config(config)?;
    let root_path = match root {
        Some(root) => canonicalize_or_current(root)?,
        None => match &config.storage_root {
            Some(path) => path.clone(),
            None => canonicalize_or_current(".")?,
        },
    };
    let ctx = open_storage(&root_path.to_string_lossy())?;
    let digest = parse_digest(digest)?;
    let task = ctx.task_for_digest(&digest)?;

    let registry = AnalyzerRegistry::from_config(&config);
    let selected = select_analyzers(&registry, names)?;
    if selected.is_empty() {
        return Err(anyhow!("No analyzers are enabled in the worker config"));
    }

    let store: Arc<StorageContext> = Arc::new(ctx);
    let driver = AnalyzerDriver::new(store.clone());
    info!(digest = %digest, samples = task.samples.len(), analyzers = selected.len(), "starting analysis");

    let mut tasks = JoinSet::new();
    for analyzer in selected {
        let driver = driver.clone();
        let task = task.clone();
        tasks.spawn(async move {
            let ok = driver.run(&analyzer, &task).await;
            (analyzer.name(), ok)
        });
    }

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let mut failed: Vec<&'static str> = Vec::new();
    let mut archives: Vec<PathBuf> = Vec::new();
    let mut panicked = 0usize;
    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                Some(Ok((name, ok))) => {
                    println!("  - {}: {}", name, if ok { "succeeded" } else { "failed" });
                    if ok {
                        archives.push(store.analysis_paths(&digest, name).archive);
                    } else {
                        failed.push(name);
                    }
                }
                Some(Err(err)) => {
                    error!(error = %err, "analyzer task aborted");
                    panicked += 1;
                }
                None => break,
            },
            signal = &mut interrupt => {
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for interrupt");
                }
                warn!("interrupted; cancelling in-flight analyzers");
                tasks.shutdown().await;
                return Err(anyhow!("Analysis of {} interrupted", digest));
            }
        }
    }

    // Only archives written by this run.
    archives.sort();
    for archive in &archives {
        println!("  archive: {}", archive.display());
    }

    if !failed.is_empty() || panicked > 0 {
        failed.sort_unstable();
        return Err(anyhow!(
            "{} analyzer(s) failed for {}: {}",
            failed.len() + panicked,
            digest,
            failed.join(", ")
        ));
    }
    Ok(())
}

/// List recorded analyzer runs, optionally for a single digest.
pub fn list_runs_command(root: &str, digest: Option<&str>, json: bool) -> Result<()> {
    let ctx = open_storage(root)?;
    let digest = digest.map(parse_digest).transpose()?;
    let runs = ctx.db.list_analysis_runs(digest.as_ref()).context("Failed to list analysis runs")?;

    if json {
        return print_json(&runs, "analysis runs");
    }

    println!("Analysis runs ({}):", runs.len());
    if runs.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for run in runs {
        println!(
            "  - {} {} [{}] started={} finished={} archive={}",
            run.digest,
            run.analyzer,
            run.status.as_str(),
            run.started_at,
            run.finished_at,
            run.archive.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
