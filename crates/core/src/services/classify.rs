//! Mapping a content-type tool's JSONL verdict to a sample platform.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::model::OperatingSystem;

/// Labels recognised per platform, consulted top to bottom.
const STANDARD_RULES: &[(OperatingSystem, &[&str])] = &[
    (OperatingSystem::Ios, &[]),
    (OperatingSystem::Linux, &["deb", "elf", "coff", "rpm", "squashfs", "snap"]),
    (OperatingSystem::Darwin, &["applebplist", "appleplist", "dmg", "dsstore"]),
    (OperatingSystem::Android, &["apk", "dex"]),
    (
        OperatingSystem::Windows,
        &[
            "outlook",
            "mscompress",
            "asp",
            "autohotkey",
            "autoit",
            "pdb",
            "thumbsdb",
            "pebin",
            "one",
            "msi",
            "lnk",
            "doc",
            "docx",
            "powershell",
            "ppt",
            "pptx",
            "cat",
            "chm",
            "cab",
            "vba",
            "winregistry",
            "xar",
            "xls",
            "xlsb",
            "xlsx",
        ],
    ),
];

/// Ordered label-to-platform table with a mandatory fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    rules: Vec<(OperatingSystem, BTreeSet<&'static str>)>,
    fallback: OperatingSystem,
}

impl LabelTable {
    pub fn new(rules: &[(OperatingSystem, &[&'static str])], fallback: OperatingSystem) -> Self {
        let rules = rules
            .iter()
            .map(|(platform, labels)| (*platform, labels.iter().copied().collect()))
            .collect();
        Self { rules, fallback }
    }

    /// The table shipped with the content-type analyzer; falls back to `any`.
    pub fn standard() -> Self {
        Self::new(STANDARD_RULES, OperatingSystem::Any)
    }

    /// First platform whose label set contains `label`, else the fallback.
    pub fn lookup(&self, label: &str) -> OperatingSystem {
        self.rules
            .iter()
            .find(|(_, labels)| labels.contains(label))
            .map(|(platform, _)| *platform)
            .unwrap_or(self.fallback)
    }

    pub fn fallback(&self) -> OperatingSystem {
        self.fallback
    }

    /// Every (platform, label) pair in table order.
    pub fn entries(&self) -> impl Iterator<Item = (OperatingSystem, &'static str)> + '_ {
        self.rules
            .iter()
            .flat_map(|(platform, labels)| labels.iter().map(move |label| (*platform, *label)))
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// A tool label and the platform it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub label: String,
    pub platform: OperatingSystem,
}

/// Extract the label of the last record in a JSONL stream that carries one.
///
/// Only lines starting with `{` are parsed. Lines that are not valid JSON, or
/// that lack `result.value.output.label`, are skipped. Returns `None` if no
/// record yields a non-empty label.
pub fn last_label<R: BufRead>(reader: R) -> io::Result<Option<String>> {
    let mut label = None;
    for line in reader.split(b'\n') {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }
        let record: Value = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(err) => {
                debug!(error = %err, "skipping malformed record");
                continue;
            }
        };
        if let Some(found) = record.pointer("/result/value/output/label").and_then(Value::as_str)
        {
            if !found.is_empty() {
                label = Some(found.to_string());
            }
        }
    }
    Ok(label)
}

/// Classifies tool output against a [`LabelTable`].
#[derive(Debug, Clone, Default)]
pub struct OutputClassifier {
    table: LabelTable,
}

impl OutputClassifier {
    pub fn new(table: LabelTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &LabelTable {
        &self.table
    }

    /// Classify a label directly.
    pub fn classify_label(&self, label: &str) -> Classification {
        Classification { label: label.to_string(), platform: self.table.lookup(label) }
    }

    /// Scan the whole stream; `None` means the tool gave no verdict.
    pub fn classify_reader<R: BufRead>(&self, reader: R) -> io::Result<Option<Classification>> {
        Ok(last_label(reader)?.map(|label| self.classify_label(&label)))
    }

    pub fn classify_file(&self, path: &Path) -> io::Result<Option<Classification>> {
        let file = File::open(path)?;
        self.classify_reader(BufReader::new(file))
    }
}
