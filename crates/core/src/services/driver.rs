//! Per-analyzer task driver.
//!
//! `Init -> Running -> [Classifying -> Enriching] -> Finalizing -> Done`; any
//! failure before enrichment goes straight to `Finalizing` with success false.
//! The only thing a caller learns is the boolean outcome.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::db::{AnalysisRunRecord, AnalysisRunStatus, SampleStore};
use crate::model::AnalyzerTask;
use crate::services::analyzers::Analyzer;
use crate::services::classify::OutputClassifier;
use crate::services::command::CommandRunner;
use crate::services::enrich::SampleEnricher;
use crate::services::workspace::AnalysisWorkspace;

/// Driver state, reported in logs as the task progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStage {
    Init,
    Running,
    Classifying,
    Enriching,
    Finalizing,
    Done,
}

/// Runs analyzers against tasks, sharing one storage handle.
#[derive(Clone)]
pub struct AnalyzerDriver {
    store: Arc<dyn SampleStore>,
    classifier: OutputClassifier,
}

impl AnalyzerDriver {
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self { store, classifier: OutputClassifier::default() }
    }

    /// Use a different classifier for the content-type stage.
    pub fn with_classifier(mut self, classifier: OutputClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Run `analyzer` over `task`; true iff every stage succeeded and an
    /// archive was produced.
    ///
    /// Dropping the returned future cancels the task: the running child is
    /// killed and the workspace directory is removed.
    pub async fn run(&self, analyzer: &Analyzer, task: &AnalyzerTask) -> bool {
        let span = info_span!(
            "analyzer_task",
            analyzer = analyzer.name(),
            digest = %task.primary_digest
        );
        self.run_inner(analyzer, task).instrument(span).await
    }

    async fn run_inner(&self, analyzer: &Analyzer, task: &AnalyzerTask) -> bool {
        let started_at = Utc::now().to_rfc3339();

        debug!(stage = ?TaskStage::Init);
        let sample_raw = self.store.sample_raw(&task.primary_digest);
        let paths = self.store.analysis_paths(&task.primary_digest, analyzer.name());
        let mut workspace = match AnalysisWorkspace::open(paths) {
            Ok(workspace) => workspace.archive_failures(analyzer.base().archive_failures),
            Err(err) => {
                error!(error = %err, "failed to open workspace");
                self.record(analyzer, task, false, None, started_at);
                return false;
            }
        };

        let mut success = sample_raw.is_file();
        if !success {
            warn!(sample = %sample_raw.display(), "raw sample is missing");
        }

        if success {
            debug!(stage = ?TaskStage::Running);
            let runner = CommandRunner::new().with_timeout(analyzer.base().step_timeout());
            success = analyzer.steps(&sample_raw).run(&runner, &mut workspace).await;
        }

        if success {
            if let Some(stage) = analyzer.classification() {
                debug!(stage = ?TaskStage::Classifying);
                let verdict = workspace
                    .artifact_path(stage.artifact)
                    .map_err(|e| e.to_string())
                    .and_then(|path| self.classifier.classify_file(&path).map_err(|e| e.to_string()));
                match verdict {
                    Ok(Some(classification)) => {
                        debug!(stage = ?TaskStage::Enriching, label = %classification.label);
                        let summary = SampleEnricher::new(self.store.as_ref())
                            .enrich(&classification, &task.samples);
                        if !summary.is_complete() {
                            warn!(
                                updated = summary.updated,
                                failed = summary.failed.len(),
                                "enrichment incomplete"
                            );
                        }
                    }
                    Ok(None) => {
                        warn!(artifact = stage.artifact, "classifier produced no label");
                        success = false;
                    }
                    Err(err) => {
                        warn!(artifact = stage.artifact, error = %err, "failed to read classifier output");
                        success = false;
                    }
                }
            }
        }

        debug!(stage = ?TaskStage::Finalizing, success);
        let archive = match workspace.finalize(success).await {
            Ok(archive) => archive,
            Err(err) => {
                error!(error = %err, "failed to finalize workspace");
                success = false;
                None
            }
        };

        self.record(analyzer, task, success, archive, started_at);
        info!(stage = ?TaskStage::Done, success, "analyzer task finished");
        success
    }

    fn record(
        &self,
        analyzer: &Analyzer,
        task: &AnalyzerTask,
        success: bool,
        archive: Option<PathBuf>,
        started_at: String,
    ) {
        let record = AnalysisRunRecord {
            digest: task.primary_digest.to_string(),
            analyzer: analyzer.name().to_string(),
            status: AnalysisRunStatus::from_success(success),
            archive: archive.map(|p| p.display().to_string()),
            started_at,
            finished_at: Utc::now().to_rfc3339(),
        };
        // Bookkeeping only; the run outcome does not depend on it.
        if let Err(err) = self.store.record_analysis_run(&record) {
            warn!(error = %err, "failed to record analysis run");
        }
    }
}
