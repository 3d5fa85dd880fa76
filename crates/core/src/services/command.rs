//! Spawning one external tool with its output captured to the workspace.

use std::ffi::OsString;
use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::services::workspace::RunLog;

/// How a single command invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Exited with status zero.
    Succeeded,
    /// Exited with a non-zero status (`None` when killed by a signal).
    Exited(Option<i32>),
    /// Could not be launched at all (missing binary, permissions, ...).
    SpawnFailed(String),
    /// Exceeded the per-step deadline and was killed.
    TimedOut(Duration),
    /// Waiting on the child or preparing its stdio failed.
    Io(String),
}

impl StepOutcome {
    /// True iff the process was spawned and exited with status zero.
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded)
    }
}

/// Render argv for the run log and for process-level logging.
pub fn render_argv(program: &Path, args: &[OsString]) -> Vec<String> {
    std::iter::once(program.to_string_lossy().into_owned())
        .chain(args.iter().map(|a| a.to_string_lossy().into_owned()))
        .collect()
}

/// Runs external commands, redirecting stdout to an artifact and stderr to the run log.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    timeout: Option<Duration>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Kill a step and treat it as failed once `timeout` has elapsed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Spawn `program` with `args` and wait for it.
    ///
    /// Standard output goes verbatim to `stdout`; standard error is appended to
    /// `log` after a header echoing argv. Launch failures are reported through
    /// the same outcome channel as non-zero exits.
    pub async fn run(
        &self,
        program: &Path,
        args: &[OsString],
        stdout: File,
        log: &mut RunLog,
    ) -> StepOutcome {
        let argv = render_argv(program, args);
        if let Err(err) = log.begin_step(&argv) {
            warn!(error = %err, log = %log.path().display(), "failed to write run log header");
            return StepOutcome::Io(err.to_string());
        }
        let stderr = match log.stderr_handle() {
            Ok(handle) => handle,
            Err(err) => {
                warn!(error = %err, "failed to share run log with child");
                return StepOutcome::Io(err.to_string());
            }
        };

        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                warn!(program = %program.display(), error = %err, "failed to spawn");
                return StepOutcome::SpawnFailed(err.to_string());
            }
        };

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    warn!(
                        program = %program.display(),
                        timeout_secs = limit.as_secs_f64(),
                        "step exceeded its deadline; killing"
                    );
                    if let Err(err) = child.kill().await {
                        warn!(error = %err, "failed to kill timed out step");
                    }
                    return StepOutcome::TimedOut(limit);
                }
            },
            None => child.wait().await,
        };

        match waited {
            Ok(status) if status.success() => {
                debug!(?argv, "step succeeded");
                StepOutcome::Succeeded
            }
            Ok(status) => {
                warn!(?argv, %status, "step exited unsuccessfully");
                StepOutcome::Exited(status.code())
            }
            Err(err) => {
                warn!(?argv, error = %err, "failed waiting on step");
                StepOutcome::Io(err.to_string())
            }
        }
    }
}
