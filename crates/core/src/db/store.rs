//! The storage seam used by the pipeline and its local SQLite-backed implementation.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;

use crate::db::{
    open_storage_db, sha256_file, AnalysisPaths, AnalysisRunRecord, DbResult, SampleDb,
    StorageConfig, StorageLayout,
};
use crate::model::{AnalyzerTask, CaseRecord, Digest, OperatingSystem, SampleRecord, SampleRef};

/// Storage operations the analysis pipeline depends on.
///
/// The pipeline treats storage as an external collaborator: it only needs to
/// locate raw samples and workspaces, mutate sample metadata, and record runs.
/// Implementations must be safe to share between concurrently running tasks.
pub trait SampleStore: Send + Sync {
    /// Location of the raw bytes for `digest`.
    fn sample_raw(&self, digest: &Digest) -> PathBuf;

    /// Workspace and archive locations for one (digest, analyzer) pair.
    fn analysis_paths(&self, digest: &Digest, analyzer: &str) -> AnalysisPaths;

    /// Overwrite the platform attribute of one sample.
    fn set_platform(&self, sample: &SampleRef, opsystem: OperatingSystem) -> DbResult<()>;

    /// Union `tags` into the tag set of one sample.
    fn add_tags(&self, sample: &SampleRef, tags: &BTreeSet<String>) -> DbResult<()>;

    /// Persist the outcome of one analyzer run.
    fn record_analysis_run(&self, record: &AnalysisRunRecord) -> DbResult<()>;
}

/// Convenience wrapper bundling layout, config, db path, and an open SampleDb.
#[derive(Debug)]
pub struct StorageContext {
    pub layout: StorageLayout,
    pub config: StorageConfig,
    pub db_path: PathBuf,
    pub db: SampleDb,
}

impl StorageContext {
    /// Load storage config and open the database for a given root.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self> {
        let layout = StorageLayout::new(root);
        let (config, db_path, db) = open_storage_db(&layout)?;
        Ok(Self { layout, config, db_path, db })
    }

    /// Create a case with a fresh guid.
    pub fn create_case(&self, name: &str, description: Option<String>) -> Result<CaseRecord> {
        let record = CaseRecord {
            guid: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description,
        };
        self.db.insert_case(&record)?;
        Ok(record)
    }

    /// Hash `path`, copy it into the content-addressable sample directory
    /// (unless already present), and register it as a sample of `case_guid`.
    pub fn ingest_sample(
        &self,
        case_guid: &str,
        path: &Path,
        name: Option<String>,
    ) -> Result<SampleRecord> {
        if !path.is_file() {
            return Err(anyhow!("Sample file does not exist: {}", path.display()));
        }
        if self.db.get_case(case_guid)?.is_none() {
            return Err(anyhow!("Unknown case {}", case_guid));
        }

        let digest = Digest::parse(&sha256_file(path)?)?;
        let raw = self.layout.sample_raw(&digest);
        if !raw.exists() {
            fs::create_dir_all(&self.layout.samples_dir).with_context(|| {
                format!("Failed to create samples dir: {}", self.layout.samples_dir.display())
            })?;
            fs::copy(path, &raw)
                .with_context(|| format!("Failed to store sample at {}", raw.display()))?;
        }
        let size = fs::metadata(&raw)
            .with_context(|| format!("Failed to stat stored sample {}", raw.display()))?
            .len();

        let name = name.unwrap_or_else(|| {
            path.file_name()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| digest.to_string())
        });
        let record = SampleRecord {
            guid: uuid::Uuid::new_v4().to_string(),
            case_guid: case_guid.to_string(),
            digest,
            name,
            size,
            opsystem: OperatingSystem::Any,
            tags: BTreeSet::new(),
            created_at: Utc::now().to_rfc3339(),
        };
        self.db.insert_sample(&record)?;
        Ok(record)
    }

    /// Build the task for `digest` from every sample that references it.
    pub fn task_for_digest(&self, digest: &Digest) -> Result<AnalyzerTask> {
        let samples = self.db.samples_for_digest(digest)?;
        if samples.is_empty() {
            return Err(anyhow!("No samples reference digest {}", digest));
        }
        Ok(AnalyzerTask::new(digest.clone(), samples))
    }
}

impl SampleStore for StorageContext {
    fn sample_raw(&self, digest: &Digest) -> PathBuf {
        self.layout.sample_raw(digest)
    }

    fn analysis_paths(&self, digest: &Digest, analyzer: &str) -> AnalysisPaths {
        self.layout.analysis_paths(digest, analyzer)
    }

    fn set_platform(&self, sample: &SampleRef, opsystem: OperatingSystem) -> DbResult<()> {
        self.db.set_platform(sample, opsystem)
    }

    fn add_tags(&self, sample: &SampleRef, tags: &BTreeSet<String>) -> DbResult<()> {
        self.db.add_tags(sample, tags)
    }

    fn record_analysis_run(&self, record: &AnalysisRunRecord) -> DbResult<()> {
        self.db.insert_analysis_run(record).map(|_| ())
    }
}
