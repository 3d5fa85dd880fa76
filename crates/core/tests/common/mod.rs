#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sample_pipeline_core::db::{
    init_storage, AnalysisPaths, AnalysisRunRecord, DbError, DbResult, SampleStore,
    StorageConfig, StorageContext, StorageLayout,
};
use sample_pipeline_core::model::{Digest, OperatingSystem, SampleRef};

/// Write an executable `/bin/sh` script standing in for an external tool.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path
}

/// Fresh store rooted at `root` with its database created.
pub fn init_store(root: &Path) -> StorageContext {
    let layout = StorageLayout::new(root);
    let config = StorageConfig::new("TestStore", layout.db_path_relative_string());
    init_storage(&layout, &config).expect("init storage");
    StorageContext::from_root(root).expect("open storage")
}

/// Stand-in magika output: noise, an empty result, then the verdict.
pub fn magika_script(label: &str) -> String {
    format!(
        "echo 'not-json'\n\
         echo '{{\"result\":{{}}}}'\n\
         echo '{{\"result\":{{\"value\":{{\"output\":{{\"label\":\"{label}\"}}}}}}}}'"
    )
}

/// In-memory store that can be told to reject writes for specific samples.
pub struct FakeStore {
    pub root: PathBuf,
    pub platforms: Mutex<HashMap<SampleRef, OperatingSystem>>,
    pub tags: Mutex<HashMap<SampleRef, BTreeSet<String>>>,
    pub failing: HashSet<SampleRef>,
    pub runs: Mutex<Vec<AnalysisRunRecord>>,
}

impl FakeStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            platforms: Mutex::new(HashMap::new()),
            tags: Mutex::new(HashMap::new()),
            failing: HashSet::new(),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, sample: SampleRef) -> Self {
        self.failing.insert(sample);
        self
    }

    pub fn platform(&self, sample: &SampleRef) -> Option<OperatingSystem> {
        self.platforms.lock().unwrap().get(sample).copied()
    }

    pub fn tags(&self, sample: &SampleRef) -> BTreeSet<String> {
        self.tags.lock().unwrap().get(sample).cloned().unwrap_or_default()
    }
}

impl SampleStore for FakeStore {
    fn sample_raw(&self, digest: &Digest) -> PathBuf {
        self.root.join("samples").join(digest.as_str())
    }

    fn analysis_paths(&self, digest: &Digest, analyzer: &str) -> AnalysisPaths {
        AnalysisPaths::under(self.root.join("analyses").join(digest.as_str()).join(analyzer))
    }

    fn set_platform(&self, sample: &SampleRef, opsystem: OperatingSystem) -> DbResult<()> {
        if self.failing.contains(sample) {
            return Err(DbError::UnknownSample(sample.clone()));
        }
        self.platforms.lock().unwrap().insert(sample.clone(), opsystem);
        Ok(())
    }

    fn add_tags(&self, sample: &SampleRef, tags: &BTreeSet<String>) -> DbResult<()> {
        if self.failing.contains(sample) {
            return Err(DbError::UnknownSample(sample.clone()));
        }
        self.tags.lock().unwrap().entry(sample.clone()).or_default().extend(tags.iter().cloned());
        Ok(())
    }

    fn record_analysis_run(&self, record: &AnalysisRunRecord) -> DbResult<()> {
        self.runs.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Names of the files inside a `.tar.gz` archive.
pub fn archive_entries(archive: &Path) -> BTreeSet<String> {
    let file = fs::File::open(archive).expect("open archive");
    let mut tarball = tar::Archive::new(flate2::read::GzDecoder::new(file));
    let mut names = BTreeSet::new();
    for entry in tarball.entries().expect("archive entries") {
        let entry = entry.expect("archive entry");
        if entry.header().entry_type().is_file() {
            let path = entry.path().expect("entry path");
            if let Some(name) = path.file_name() {
                names.insert(name.to_string_lossy().to_string());
            }
        }
    }
    names
}
