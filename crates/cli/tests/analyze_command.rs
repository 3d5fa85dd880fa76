#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use predicates::prelude::*;
use sample_pipeline_core::db::{AnalysisRunStatus, SampleStore, StorageContext, StorageLayout};
use sample_pipeline_core::model::OperatingSystem;
use sample_worker::commands::init_storage_command;
use tempfile::tempdir;

fn worker() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("sample-worker")
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    config: PathBuf,
    digest: String,
}

/// A store holding one sample and a config whose tools are shell scripts.
fn fixture(floss_body: &str) -> Fixture {
    let dir = tempdir().unwrap();
    let bin = dir.path().join("bin");
    fs::create_dir_all(&bin).unwrap();
    let magika = write_script(
        &bin,
        "magika",
        "echo '{\"result\":{\"value\":{\"output\":{\"label\":\"pebin\"}}}}'",
    );
    let file = write_script(&bin, "file", "echo data");
    let ent = write_script(&bin, "ent", "echo 'Entropy = 7.9'");
    let floss = write_script(&bin, "floss", floss_body);

    let root = dir.path().join("store");
    init_storage_command(&root.to_string_lossy(), Some("Cli".into())).unwrap();
    let ctx = StorageContext::from_root(&root).unwrap();
    let case = ctx.create_case("case", None).unwrap();
    let input = dir.path().join("dropper.exe");
    fs::write(&input, b"MZ\x90\x00").unwrap();
    let digest = ctx.ingest_sample(&case.guid, &input, None).unwrap().digest.to_string();

    let config = dir.path().join("worker.yaml");
    fs::write(
        &config,
        format!(
            "storage_root: {root}\n\
             analyzers:\n  \
               content_type:\n    \
                 program_magika: {magika}\n    \
                 program_file: {file}\n    \
                 program_ent: {ent}\n  \
               floss:\n    \
                 program: {floss}\n",
            root = root.display(),
            magika = magika.display(),
            file = file.display(),
            ent = ent.display(),
            floss = floss.display(),
        ),
    )
    .unwrap();

    Fixture { _dir: dir, root, config, digest }
}

#[test]
fn analyze_runs_every_registered_analyzer() {
    let fx = fixture("echo strings");

    worker()
        .arg("analyze")
        .arg("--config")
        .arg(&fx.config)
        .args(["--digest", &fx.digest])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("content_type: succeeded")
                .and(predicate::str::contains("floss: succeeded")),
        );

    let ctx = StorageContext::from_root(&fx.root).unwrap();
    let sample = &ctx.db.list_samples(None).unwrap()[0];
    assert_eq!(sample.opsystem, OperatingSystem::Windows);
    assert!(sample.tags.contains("pebin") && sample.tags.contains("windows"));

    for analyzer in ["content_type", "floss"] {
        let paths = ctx.analysis_paths(&sample.digest, analyzer);
        assert!(paths.archive.is_file(), "{analyzer} archive");
        assert!(!paths.data_dir.exists(), "{analyzer} workspace removed");
    }
    let runs = ctx.db.list_analysis_runs(Some(&sample.digest)).unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == AnalysisRunStatus::Succeeded));
}

#[test]
fn analyze_fails_when_any_analyzer_fails() {
    let fx = fixture("exit 1");

    worker()
        .arg("analyze")
        .arg("--root")
        .arg(&fx.root)
        .arg("--config")
        .arg(&fx.config)
        .args(["--digest", &fx.digest])
        .assert()
        .failure()
        .stdout(predicate::str::contains("floss: failed"))
        .stderr(predicate::str::contains("1 analyzer(s) failed"));

    let layout = StorageLayout::new(&fx.root);
    let ctx = StorageContext::from_root(&fx.root).unwrap();
    let digest = ctx.db.list_samples(None).unwrap()[0].digest.clone();
    assert!(layout.analysis_paths(&digest, "content_type").archive.is_file());
    assert!(!layout.analysis_paths(&digest, "floss").archive.exists());
}

#[test]
fn analyze_can_select_a_single_analyzer() {
    let fx = fixture("exit 1");

    worker()
        .arg("analyze")
        .arg("--config")
        .arg(&fx.config)
        .args(["--digest", &fx.digest, "--analyzer", "content_type"])
        .assert()
        .success()
        .stdout(predicate::str::contains("floss").not());

    worker()
        .arg("list-runs")
        .arg("--root")
        .arg(&fx.root)
        .args(["--digest", &fx.digest, "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("content_type").and(predicate::str::contains("succeeded")));
}

#[test]
fn analyze_rejects_unknown_analyzer_and_digest() {
    let fx = fixture("echo ok");

    worker()
        .arg("analyze")
        .arg("--config")
        .arg(&fx.config)
        .args(["--digest", &fx.digest, "--analyzer", "yara"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown or disabled analyzer 'yara'"));

    worker()
        .arg("analyze")
        .arg("--config")
        .arg(&fx.config)
        .args(["--digest", "abcdef"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No samples reference digest"));
}

#[test]
fn failed_rerun_does_not_report_the_earlier_archive() {
    let fx = fixture("echo strings");
    let floss = fx.root.parent().unwrap().join("bin").join("floss");

    worker()
        .arg("analyze")
        .arg("--config")
        .arg(&fx.config)
        .args(["--digest", &fx.digest, "--analyzer", "floss"])
        .assert()
        .success()
        .stdout(predicate::str::contains("floss/archive.tar.gz"));

    write_script(floss.parent().unwrap(), "floss", "exit 1");

    worker()
        .arg("analyze")
        .arg("--config")
        .arg(&fx.config)
        .args(["--digest", &fx.digest])
        .assert()
        .failure()
        .stdout(
            predicate::str::contains("floss: failed")
                .and(predicate::str::contains("content_type/archive.tar.gz"))
                .and(predicate::str::contains("floss/archive.tar.gz").not()),
        );

    // The stale archive stays on disk; it is just not reported.
    let layout = StorageLayout::new(&fx.root);
    let digest = sample_pipeline_core::model::Digest::parse(&fx.digest).unwrap();
    assert!(layout.analysis_paths(&digest, "floss").archive.is_file());
}
