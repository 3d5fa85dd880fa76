//! Core data model for samples, cases, platforms, and analyzer tasks.
//!
//! These are plain value types shared by the storage layer and the pipeline
//! services. Nothing in here performs IO.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a string is not a usable sample digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    #[error("digest is empty")]
    Empty,
    #[error("digest contains non-hex character {0:?}")]
    NonHex(char),
}

/// Content-derived identifier naming a unique binary sample.
///
/// Digests are lowercase hex strings. They are used to build filesystem paths
/// for raw samples and workspaces, so anything other than hex is rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    pub fn parse(value: &str) -> Result<Self, DigestError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(DigestError::Empty);
        }
        if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(DigestError::NonHex(bad));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Digest::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Digest::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.0
    }
}

/// Platform attribute attached to a sample.
///
/// `Any` is the "unspecified platform" value used when classification finds a
/// label that no platform claims.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    #[default]
    Any,
    Ios,
    Linux,
    Darwin,
    Android,
    Windows,
}

impl OperatingSystem {
    /// Canonical name, also used as the tag added during enrichment.
    pub fn as_str(self) -> &'static str {
        match self {
            OperatingSystem::Any => "any",
            OperatingSystem::Ios => "ios",
            OperatingSystem::Linux => "linux",
            OperatingSystem::Darwin => "darwin",
            OperatingSystem::Android => "android",
            OperatingSystem::Windows => "windows",
        }
    }

    /// Decode a stored name. Unknown values fall back to `Any`.
    pub fn from_name(value: &str) -> Self {
        match value {
            "ios" => OperatingSystem::Ios,
            "linux" => OperatingSystem::Linux,
            "darwin" => OperatingSystem::Darwin,
            "android" => OperatingSystem::Android,
            "windows" => OperatingSystem::Windows,
            _ => OperatingSystem::Any,
        }
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A case groups samples under investigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub guid: String,
    pub name: String,
    pub description: Option<String>,
}

/// A logical sample: one reference to a digest from within a case.
///
/// Several samples (in the same or different cases) may share a digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub guid: String,
    pub case_guid: String,
    pub digest: Digest,
    pub name: String,
    pub size: u64,
    pub opsystem: OperatingSystem,
    pub tags: BTreeSet<String>,
    pub created_at: String,
}

/// Identifies one (case, sample) pair in storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleRef {
    pub case_guid: String,
    pub sample_guid: String,
}

impl SampleRef {
    pub fn new(case_guid: impl Into<String>, sample_guid: impl Into<String>) -> Self {
        Self { case_guid: case_guid.into(), sample_guid: sample_guid.into() }
    }
}

impl fmt::Display for SampleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.case_guid, self.sample_guid)
    }
}

/// Unit of work handed to an analyzer driver.
///
/// Carries the digest to analyze and every (case, sample) pair sharing it;
/// all of them are enriched identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerTask {
    pub primary_digest: Digest,
    pub samples: Vec<SampleRef>,
}

impl AnalyzerTask {
    pub fn new(primary_digest: Digest, samples: Vec<SampleRef>) -> Self {
        Self { primary_digest, samples }
    }
}
