//! Worker configuration: where storage lives and how each analyzer is set up.
//!
//! Loaded from YAML. Every analyzer section embeds [`BaseAnalyzerConfig`] by
//! value; the analyzer-specific fields are validated after the shared ones.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid {analyzer} config: {reason}")]
    Invalid { analyzer: &'static str, reason: String },
}

fn default_enabled() -> bool {
    true
}

/// Fields shared by every analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseAnalyzerConfig {
    /// Disabled analyzers are not registered.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-step deadline; a step running longer is killed and counts as failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,
    /// Keep a failure archive of the workspace when a run fails.
    #[serde(default)]
    pub archive_failures: bool,
}

impl Default for BaseAnalyzerConfig {
    fn default() -> Self {
        Self { enabled: true, step_timeout_secs: None, archive_failures: false }
    }
}

impl BaseAnalyzerConfig {
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self, analyzer: &'static str) -> Result<(), ConfigError> {
        if self.step_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                analyzer,
                reason: "step_timeout_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn require_absolute(
    analyzer: &'static str,
    field: &str,
    path: &Path,
) -> Result<(), ConfigError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            analyzer,
            reason: format!("{field} must be an absolute path, got {}", path.display()),
        })
    }
}

/// Content-type analyzer: magika, file (twice), and ent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeConfig {
    #[serde(flatten)]
    pub base: BaseAnalyzerConfig,
    pub program_magika: PathBuf,
    pub program_file: PathBuf,
    pub program_ent: PathBuf,
}

impl ContentTypeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base.validate("content_type")?;
        require_absolute("content_type", "program_magika", &self.program_magika)?;
        require_absolute("content_type", "program_file", &self.program_file)?;
        require_absolute("content_type", "program_ent", &self.program_ent)
    }
}

/// Detect It Easy analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieConfig {
    #[serde(flatten)]
    pub base: BaseAnalyzerConfig,
    pub program: PathBuf,
}

impl DieConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base.validate("die")?;
        require_absolute("die", "program", &self.program)
    }
}

/// FLOSS string extraction analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlossConfig {
    #[serde(flatten)]
    pub base: BaseAnalyzerConfig,
    pub program: PathBuf,
}

impl FlossConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base.validate("floss")?;
        require_absolute("floss", "program", &self.program)
    }
}

/// Yara rule-matching analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YaraConfig {
    #[serde(flatten)]
    pub base: BaseAnalyzerConfig,
    pub program: PathBuf,
    /// Rule files are precompiled (`-C`).
    #[serde(default)]
    pub compiled: bool,
    pub rule_files: Vec<PathBuf>,
}

impl YaraConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base.validate("yara")?;
        require_absolute("yara", "program", &self.program)?;
        if self.rule_files.is_empty() {
            return Err(ConfigError::Invalid {
                analyzer: "yara",
                reason: "rule_files must list at least one rule file".to_string(),
            });
        }
        Ok(())
    }
}

/// Optional per-analyzer sections; absent sections are not registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentTypeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub die: Option<DieConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floss: Option<FlossConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yara: Option<YaraConfig>,
}

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Store root; a frontend may override it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_root: Option<PathBuf>,
    #[serde(default)]
    pub analyzers: AnalyzersConfig,
}

impl WorkerConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: WorkerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(cfg) = &self.analyzers.content_type {
            cfg.validate()?;
        }
        if let Some(cfg) = &self.analyzers.die {
            cfg.validate()?;
        }
        if let Some(cfg) = &self.analyzers.floss {
            cfg.validate()?;
        }
        if let Some(cfg) = &self.analyzers.yara {
            cfg.validate()?;
        }
        Ok(())
    }
}
