#![cfg(unix)]

use std::collections::BTreeSet;
use std::fs;

use sample_pipeline_core::model::{OperatingSystem, SampleRef};
use sample_pipeline_core::services::classify::OutputClassifier;
use sample_pipeline_core::services::enrich::{derived_tags, SampleEnricher};

mod common;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn derived_tags_are_label_and_platform() {
    let classification = OutputClassifier::default().classify_label("elf");
    assert_eq!(derived_tags(&classification), set(&["elf", "linux"]));

    let unknown = OutputClassifier::default().classify_label("python");
    assert_eq!(derived_tags(&unknown), set(&["any", "python"]));
}

#[test]
fn enrichment_is_idempotent_and_keeps_existing_tags() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = common::init_store(&tmp.path().join("store"));
    let case = ctx.create_case("case", None).unwrap();
    let input = tmp.path().join("bin");
    fs::write(&input, b"\x7fELF").unwrap();
    let record = ctx.ingest_sample(&case.guid, &input, None).unwrap();
    let sample = SampleRef::new(&case.guid, &record.guid);
    ctx.db.add_tags(&sample, &set(&["manual"])).unwrap();

    let classification = OutputClassifier::default().classify_label("elf");
    let enricher = SampleEnricher::new(&ctx);
    for _ in 0..2 {
        let summary = enricher.enrich(&classification, std::slice::from_ref(&sample));
        assert!(summary.is_complete());
        assert_eq!(summary.updated, 1);
    }

    let stored = ctx.db.get_sample(&sample).unwrap().unwrap();
    assert_eq!(stored.opsystem, OperatingSystem::Linux);
    assert_eq!(stored.tags, set(&["elf", "linux", "manual"]));
}

#[test]
fn later_classification_overwrites_platform_and_unions_tags() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = common::init_store(&tmp.path().join("store"));
    let case = ctx.create_case("case", None).unwrap();
    let input = tmp.path().join("bin");
    fs::write(&input, b"data").unwrap();
    let record = ctx.ingest_sample(&case.guid, &input, None).unwrap();
    let sample = SampleRef::new(&case.guid, &record.guid);

    let enricher = SampleEnricher::new(&ctx);
    let classifier = OutputClassifier::default();
    enricher.enrich(&classifier.classify_label("elf"), std::slice::from_ref(&sample));
    enricher.enrich(&classifier.classify_label("pebin"), std::slice::from_ref(&sample));

    let stored = ctx.db.get_sample(&sample).unwrap().unwrap();
    assert_eq!(stored.opsystem, OperatingSystem::Windows);
    assert_eq!(stored.tags, set(&["elf", "linux", "pebin", "windows"]));
}

#[test]
fn one_failing_sample_does_not_stop_the_others() {
    let tmp = tempfile::tempdir().unwrap();
    let a = SampleRef::new("case-1", "s-a");
    let b = SampleRef::new("case-2", "s-b");
    let c = SampleRef::new("case-3", "s-c");
    let store = common::FakeStore::new(tmp.path()).failing_on(b.clone());

    let classification = OutputClassifier::default().classify_label("apk");
    let summary =
        SampleEnricher::new(&store).enrich(&classification, &[a.clone(), b.clone(), c.clone()]);

    assert_eq!(summary.updated, 2);
    assert_eq!(summary.failed, vec![b.clone()]);
    assert!(!summary.is_complete());
    for ok in [&a, &c] {
        assert_eq!(store.platform(ok), Some(OperatingSystem::Android));
        assert_eq!(store.tags(ok), set(&["android", "apk"]));
    }
    assert_eq!(store.platform(&b), None);
}

#[test]
fn unknown_sample_in_real_store_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = common::init_store(&tmp.path().join("store"));
    let ghost = SampleRef::new("no-case", "no-sample");

    let summary = SampleEnricher::new(&ctx)
        .enrich(&OutputClassifier::default().classify_label("elf"), &[ghost.clone()]);

    assert_eq!(summary.updated, 0);
    assert_eq!(summary.failed, vec![ghost]);
}
