use std::path::{Path, PathBuf};

use crate::model::Digest;

/// File name of the run log inside each workspace directory.
pub const RUN_LOG_NAME: &str = "analysis.log";

/// Logical layout of a sample store on disk.
///
/// This is derived from a chosen root path. It does *not* perform any IO itself.
/// The CLI or other frontends are responsible for actually creating directories
/// and files based on this layout.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Root directory of the store.
    pub root: PathBuf,
    /// Directory for internal metadata (.store).
    pub meta_dir: PathBuf,
    /// Path to the storage config file (JSON).
    pub storage_config_path: PathBuf,
    /// Path to the sample database file.
    pub db_path: PathBuf,
    /// Content-addressable directory of raw samples, one file per digest.
    pub samples_dir: PathBuf,
    /// Directory for analysis workspaces and archives (organized by digest).
    pub analyses_dir: PathBuf,
}

/// Paths owned by one (digest, analyzer) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisPaths {
    /// Ephemeral workspace directory; removed after every run.
    pub data_dir: PathBuf,
    /// Run log, kept inside `data_dir` so it is archived with the artifacts.
    pub log: PathBuf,
    /// Archive produced when a run succeeds.
    pub archive: PathBuf,
    /// Archive produced for failed runs when failure archiving is enabled.
    pub failure_archive: PathBuf,
}

impl AnalysisPaths {
    /// Compute the paths for an analysis rooted at `dir`.
    pub fn under(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let data_dir = dir.join("data");
        Self {
            log: data_dir.join(RUN_LOG_NAME),
            data_dir,
            archive: dir.join("archive.tar.gz"),
            failure_archive: dir.join("failure.tar.gz"),
        }
    }
}

impl StorageLayout {
    /// Compute the default layout for a store rooted at `root`.
    ///
    /// This does *not* touch the filesystem.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let meta_dir = root.join(".store");
        let storage_config_path = meta_dir.join("storage.json");
        let db_path = meta_dir.join("samples.db");
        let samples_dir = root.join("samples");
        let analyses_dir = root.join("analyses");

        Self { root, meta_dir, storage_config_path, db_path, samples_dir, analyses_dir }
    }

    /// Compute a database path string suitable for storing in `StorageConfig`,
    /// typically as a path relative to `root`.
    pub fn db_path_relative_string(&self) -> String {
        match self.db_path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().to_string(),
            Err(_) => self.db_path.to_string_lossy().to_string(),
        }
    }

    /// Location of the raw bytes for `digest`.
    pub fn sample_raw(&self, digest: &Digest) -> PathBuf {
        self.samples_dir.join(digest.as_str())
    }

    /// Workspace and archive paths for one analyzer run over `digest`.
    pub fn analysis_paths(&self, digest: &Digest, analyzer: &str) -> AnalysisPaths {
        AnalysisPaths::under(self.analyses_dir.join(digest.as_str()).join(analyzer))
    }
}
