//! Ordered command steps with abort-on-first-failure semantics.

use std::ffi::OsString;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::services::command::{render_argv, CommandRunner};
use crate::services::workspace::AnalysisWorkspace;

/// One external tool invocation and the artifact its stdout is captured to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStep {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub artifact: String,
}

impl CommandStep {
    pub fn new(program: impl Into<PathBuf>, artifact: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), artifact: artifact.into() }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Full argv, program first, rendered as text.
    pub fn argv(&self) -> Vec<String> {
        render_argv(&self.program, &self.args)
    }
}

/// The ordered work of one analyzer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepSequence {
    steps: Vec<CommandStep>,
}

impl StepSequence {
    pub fn new(steps: Vec<CommandStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[CommandStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order against `workspace`.
    ///
    /// Stops at the first step that fails; later steps are never started.
    /// An empty sequence succeeds.
    pub async fn run(&self, runner: &CommandRunner, workspace: &mut AnalysisWorkspace) -> bool {
        for (idx, step) in self.steps.iter().enumerate() {
            let stdout = match workspace.artifact(&step.artifact) {
                Ok(file) => file,
                Err(err) => {
                    warn!(step = idx + 1, artifact = %step.artifact, error = %err, "cannot create artifact");
                    return false;
                }
            };
            let outcome = runner.run(&step.program, &step.args, stdout, workspace.log()).await;
            if !outcome.is_success() {
                info!(
                    step = idx + 1,
                    of = self.steps.len(),
                    argv = ?step.argv(),
                    ?outcome,
                    "step failed; skipping remaining steps"
                );
                return false;
            }
        }
        true
    }
}
