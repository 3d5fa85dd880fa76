//! Ephemeral per-run workspace: artifact files, the shared run log, and the
//! archive-or-discard step that ends every run.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::AnalysisPaths;

/// Width of the separator lines framing each step in the run log.
const SEPARATOR_WIDTH: usize = 40;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid artifact name {0:?}")]
    InvalidArtifactName(String),
    #[error("archive task did not complete: {0}")]
    Join(String),
}

impl WorkspaceError {
    fn io(path: &Path, source: io::Error) -> Self {
        WorkspaceError::Io { path: path.to_path_buf(), source }
    }
}

/// Append-only transcript of every command run for one task.
///
/// Each step is framed as a `=` separator, the echoed argv, a `-` separator,
/// followed by whatever the step wrote to standard error.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    fn create(path: &Path) -> Result<Self, WorkspaceError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| WorkspaceError::io(path, e))?;
        Ok(Self { path: path.to_path_buf(), file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the header for a step about to run.
    pub fn begin_step(&mut self, argv: &[String]) -> io::Result<()> {
        let mut header = String::new();
        header.push_str(&"=".repeat(SEPARATOR_WIDTH));
        header.push('\n');
        header.push_str(&format!("{argv:?}"));
        header.push('\n');
        header.push_str(&"-".repeat(SEPARATOR_WIDTH));
        header.push('\n');
        self.file.write_all(header.as_bytes())?;
        self.file.flush()
    }

    /// A handle a child process can use as its standard error.
    ///
    /// The handle shares the file offset with the log, so bytes written by the
    /// child land after the header written by [`RunLog::begin_step`].
    pub fn stderr_handle(&self) -> io::Result<Stdio> {
        Ok(Stdio::from(self.file.try_clone()?))
    }
}

/// Directory holding the artifacts and run log of one (digest, analyzer) run.
///
/// The directory is removed when the workspace is finalized. If the workspace
/// is dropped without being finalized (e.g. the owning task was cancelled), the
/// directory is removed on drop instead, without archiving.
#[derive(Debug)]
pub struct AnalysisWorkspace {
    paths: AnalysisPaths,
    log: RunLog,
    archive_failures: bool,
    finalized: bool,
}

impl AnalysisWorkspace {
    /// Create the workspace directory (and parents) and open a fresh run log.
    ///
    /// A directory left behind by an interrupted earlier run is reused.
    pub fn open(paths: AnalysisPaths) -> Result<Self, WorkspaceError> {
        fs::create_dir_all(&paths.data_dir).map_err(|e| WorkspaceError::io(&paths.data_dir, e))?;
        let log = match RunLog::create(&paths.log) {
            Ok(log) => log,
            Err(err) => {
                if let Err(cleanup) = remove_workspace_dir(&paths.data_dir) {
                    warn!(error = %cleanup, "failed to remove workspace after log creation failed");
                }
                return Err(err);
            }
        };
        debug!(dir = %paths.data_dir.display(), "workspace opened");
        Ok(Self { paths, log, archive_failures: false, finalized: false })
    }

    /// Also package failed runs, into the failure archive path.
    pub fn archive_failures(mut self, enabled: bool) -> Self {
        self.archive_failures = enabled;
        self
    }

    pub fn paths(&self) -> &AnalysisPaths {
        &self.paths
    }

    pub fn data_dir(&self) -> &Path {
        &self.paths.data_dir
    }

    pub fn log(&mut self) -> &mut RunLog {
        &mut self.log
    }

    /// Path of an artifact inside the workspace.
    pub fn artifact_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.paths.data_dir.join(name)),
            _ => Err(WorkspaceError::InvalidArtifactName(name.to_string())),
        }
    }

    /// Create (or truncate) an artifact file for step output.
    pub fn artifact(&self, name: &str) -> Result<File, WorkspaceError> {
        let path = self.artifact_path(name)?;
        if path == self.paths.log {
            return Err(WorkspaceError::InvalidArtifactName(name.to_string()));
        }
        File::create(&path).map_err(|e| WorkspaceError::io(&path, e))
    }

    /// Archive the workspace if `success` (or if failure archiving is on), then
    /// remove the directory.
    ///
    /// The directory is removed on every path, including when archiving fails.
    /// Returns the archive written, if any.
    pub async fn finalize(mut self, success: bool) -> Result<Option<PathBuf>, WorkspaceError> {
        self.finalized = true;
        let target = if success {
            Some(self.paths.archive.clone())
        } else if self.archive_failures {
            Some(self.paths.failure_archive.clone())
        } else {
            None
        };
        let data_dir = self.paths.data_dir.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let archived = match target {
                Some(target) => create_archive(&data_dir, &target).map(|()| Some(target)),
                None => Ok(None),
            };
            let removed = remove_workspace_dir(&data_dir);
            (archived, removed)
        })
        .await;

        match joined {
            Ok((archived, removed)) => {
                removed?;
                archived
            }
            Err(err) => {
                remove_workspace_dir(&self.paths.data_dir)?;
                Err(WorkspaceError::Join(err.to_string()))
            }
        }
    }
}

impl Drop for AnalysisWorkspace {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        if let Err(err) = remove_workspace_dir(&self.paths.data_dir) {
            warn!(error = %err, "failed to remove abandoned workspace");
        } else {
            debug!(dir = %self.paths.data_dir.display(), "abandoned workspace removed");
        }
    }
}

fn remove_workspace_dir(dir: &Path) -> Result<(), WorkspaceError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(WorkspaceError::io(dir, err)),
    }
}

/// Package every file under `data_dir` into a gzip-compressed tarball at `target`.
///
/// The archive is written next to `target` and renamed into place, so a
/// half-written archive is never visible under the final name.
fn create_archive(data_dir: &Path, target: &Path) -> Result<(), WorkspaceError> {
    let partial = target.with_extension("partial");
    let result = write_tarball(data_dir, &partial)
        .and_then(|()| fs::rename(&partial, target))
        .map_err(|e| WorkspaceError::io(target, e));
    if result.is_err() {
        match fs::remove_file(&partial) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(partial = %partial.display(), error = %err, "failed to remove partial archive");
            }
        }
    }
    result
}

fn write_tarball(data_dir: &Path, dest: &Path) -> io::Result<()> {
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", data_dir)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?.sync_all()
}
