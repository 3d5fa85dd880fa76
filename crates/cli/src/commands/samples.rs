use std::path::Path;

use anyhow::{Context, Result};

use crate::canonicalize_or_current;
use crate::commands::{open_storage, print_json};

/// Create a case and print its guid.
pub fn add_case_command(root: &str, name: &str, description: Option<String>) -> Result<()> {
    let ctx = open_storage(root)?;
    let case = ctx.create_case(name, description).context("Failed to create case")?;

    println!("Added case:");
    println!("  Guid: {}", case.guid);
    println!("  Name: {}", case.name);
    Ok(())
}

/// List all cases in the store.
pub fn list_cases_command(root: &str, json: bool) -> Result<()> {
    let ctx = open_storage(root)?;
    let cases = ctx.db.list_cases().context("Failed to list cases")?;

    if json {
        return print_json(&cases, "cases");
    }

    println!("Cases ({}):", cases.len());
    if cases.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for case in cases {
        match case.description {
            Some(desc) => println!("  - {} {} - {}", case.guid, case.name, desc),
            None => println!("  - {} {}", case.guid, case.name),
        }
    }
    Ok(())
}

/// Ingest a file as a sample of `case_guid` and print its digest.
pub fn add_sample_command(
    root: &str,
    case_guid: &str,
    path: &str,
    name: Option<String>,
) -> Result<()> {
    let ctx = open_storage(root)?;

    let input_path = Path::new(path);
    let abs_path =
        if input_path.is_absolute() { input_path.to_path_buf() } else { canonicalize_or_current(path)? };

    let record = ctx.ingest_sample(case_guid, &abs_path, name)?;

    println!("Added sample:");
    println!("  Guid: {}", record.guid);
    println!("  Case: {}", record.case_guid);
    println!("  Name: {}", record.name);
    println!("  Size: {}", record.size);
    println!("  Digest: {}", record.digest);
    Ok(())
}

/// List samples, optionally restricted to one case.
pub fn list_samples_command(root: &str, case_guid: Option<&str>, json: bool) -> Result<()> {
    let ctx = open_storage(root)?;
    let samples = ctx.db.list_samples(case_guid).context("Failed to list samples")?;

    if json {
        return print_json(&samples, "samples");
    }

    println!("Samples ({}):", samples.len());
    if samples.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for sample in samples {
        let tags = if sample.tags.is_empty() {
            "-".to_string()
        } else {
            sample.tags.iter().cloned().collect::<Vec<_>>().join(",")
        };
        println!(
            "  - {} [{}] digest={} platform={} tags={}",
            sample.name, sample.case_guid, sample.digest, sample.opsystem, tags
        );
    }
    Ok(())
}
