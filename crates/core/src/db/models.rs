use serde::{Deserialize, Serialize};

/// Terminal status of an analyzer run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisRunStatus {
    Succeeded,
    Failed,
}

impl AnalysisRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisRunStatus::Succeeded => "succeeded",
            AnalysisRunStatus::Failed => "failed",
        }
    }

    pub fn from_success(success: bool) -> Self {
        if success {
            AnalysisRunStatus::Succeeded
        } else {
            AnalysisRunStatus::Failed
        }
    }
}

/// Bookkeeping record for one analyzer run over a digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisRunRecord {
    pub digest: String,
    pub analyzer: String,
    pub status: AnalysisRunStatus,
    /// Archive produced by the run, if any.
    pub archive: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}
