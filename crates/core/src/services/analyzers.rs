//! The closed set of analyzers and the registry that selects them by name.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::config::{
    BaseAnalyzerConfig, ContentTypeConfig, DieConfig, FlossConfig, WorkerConfig, YaraConfig,
};
use crate::services::steps::{CommandStep, StepSequence};

pub const CONTENT_TYPE: &str = "content_type";
pub const DIE: &str = "die";
pub const FLOSS: &str = "floss";
pub const YARA: &str = "yara";

/// Version reported by every built-in analyzer.
pub const ANALYZER_VERSION: &str = "0.1.0";

/// Artifact the content-type classifier reads.
pub const MAGIKA_ARTIFACT: &str = "magika.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzerInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

/// Classification-and-enrichment stage run after the steps succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationStage {
    /// Artifact holding the classifier's JSONL output.
    pub artifact: &'static str,
}

/// A configured analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analyzer {
    ContentType(ContentTypeConfig),
    Die(DieConfig),
    Floss(FlossConfig),
    Yara(YaraConfig),
}

impl Analyzer {
    pub fn name(&self) -> &'static str {
        match self {
            Analyzer::ContentType(_) => CONTENT_TYPE,
            Analyzer::Die(_) => DIE,
            Analyzer::Floss(_) => FLOSS,
            Analyzer::Yara(_) => YARA,
        }
    }

    pub fn info(&self) -> AnalyzerInfo {
        let description = match self {
            Analyzer::ContentType(_) => {
                "Content type detection (magika, file, ent); sets sample platform and tags"
            }
            Analyzer::Die(_) => "Detect It Easy packer/compiler identification",
            Analyzer::Floss(_) => "FLOSS obfuscated string extraction",
            Analyzer::Yara(_) => "Yara rule matching",
        };
        AnalyzerInfo { name: self.name(), version: ANALYZER_VERSION, description }
    }

    pub fn base(&self) -> &BaseAnalyzerConfig {
        match self {
            Analyzer::ContentType(cfg) => &cfg.base,
            Analyzer::Die(cfg) => &cfg.base,
            Analyzer::Floss(cfg) => &cfg.base,
            Analyzer::Yara(cfg) => &cfg.base,
        }
    }

    /// The commands to run against the raw sample at `sample`.
    pub fn steps(&self, sample: &Path) -> StepSequence {
        let steps = match self {
            Analyzer::ContentType(cfg) => vec![
                CommandStep::new(&cfg.program_magika, MAGIKA_ARTIFACT)
                    .args(["--no-colors", "--jsonl"])
                    .arg(sample),
                CommandStep::new(&cfg.program_file, "file_mime_type.txt")
                    .arg("--mime-type")
                    .arg(sample),
                CommandStep::new(&cfg.program_file, "file.txt").arg(sample),
                CommandStep::new(&cfg.program_ent, "ent.txt").arg(sample),
            ],
            Analyzer::Die(cfg) => vec![CommandStep::new(&cfg.program, "diec.txt")
                .args(["-u", "--verbose"])
                .arg(sample)],
            Analyzer::Floss(cfg) => vec![CommandStep::new(&cfg.program, "output.txt")
                .args(["--color", "never"])
                .arg(sample)],
            Analyzer::Yara(cfg) => {
                let mut step = CommandStep::new(&cfg.program, "output.txt").args(["-N", "-r"]);
                if cfg.compiled {
                    step = step.arg("-C");
                }
                vec![step.args(cfg.rule_files.iter().map(|p| p.as_os_str())).arg(sample)]
            }
        };
        StepSequence::new(steps)
    }

    /// Only the content-type analyzer classifies and enriches.
    pub fn classification(&self) -> Option<ClassificationStage> {
        match self {
            Analyzer::ContentType(_) => Some(ClassificationStage { artifact: MAGIKA_ARTIFACT }),
            _ => None,
        }
    }
}

/// Registry of analyzers keyed by name, built once at start-up.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: BTreeMap<&'static str, Analyzer>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self { analyzers: BTreeMap::new() }
    }

    /// Register an analyzer, replacing any previous one with the same name.
    pub fn register(&mut self, analyzer: Analyzer) -> &mut Self {
        self.analyzers.insert(analyzer.name(), analyzer);
        self
    }

    /// Build a registry from every enabled section of `config`.
    pub fn from_config(config: &WorkerConfig) -> Self {
        let sections = &config.analyzers;
        let candidates = [
            sections.content_type.clone().map(Analyzer::ContentType),
            sections.die.clone().map(Analyzer::Die),
            sections.floss.clone().map(Analyzer::Floss),
            sections.yara.clone().map(Analyzer::Yara),
        ];
        let mut registry = Self::new();
        for analyzer in candidates.into_iter().flatten() {
            if analyzer.base().enabled {
                registry.register(analyzer);
            }
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&Analyzer> {
        self.analyzers.get(name)
    }

    /// Sorted list of registered analyzer names for error messages/help.
    pub fn names(&self) -> Vec<&'static str> {
        self.analyzers.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Analyzer> {
        self.analyzers.values()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}
