//! Propagating a classification into every sample that shares the analyzed digest.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::db::SampleStore;
use crate::model::SampleRef;
use crate::services::classify::Classification;

/// Per-task tally of enrichment writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub updated: usize,
    pub failed: Vec<SampleRef>,
}

impl EnrichmentSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Tags merged into a sample for a classification: the raw label and the
/// platform's canonical name.
pub fn derived_tags(classification: &Classification) -> BTreeSet<String> {
    [classification.label.clone(), classification.platform.as_str().to_string()]
        .into_iter()
        .collect()
}

/// Writes classification results to storage, one independent update per sample.
pub struct SampleEnricher<'a> {
    store: &'a dyn SampleStore,
}

impl<'a> SampleEnricher<'a> {
    pub fn new(store: &'a dyn SampleStore) -> Self {
        Self { store }
    }

    /// Overwrite the platform and union the derived tags for every sample.
    ///
    /// A failed write for one sample is logged and does not stop the others;
    /// updates already applied are kept.
    pub fn enrich(
        &self,
        classification: &Classification,
        samples: &[SampleRef],
    ) -> EnrichmentSummary {
        let tags = derived_tags(classification);
        let mut summary = EnrichmentSummary::default();
        for sample in samples {
            let written = self
                .store
                .set_platform(sample, classification.platform)
                .and_then(|()| self.store.add_tags(sample, &tags));
            match written {
                Ok(()) => {
                    debug!(%sample, platform = %classification.platform, "sample enriched");
                    summary.updated += 1;
                }
                Err(err) => {
                    warn!(%sample, error = %err, "failed to enrich sample");
                    summary.failed.push(sample.clone());
                }
            }
        }
        summary
    }
}
