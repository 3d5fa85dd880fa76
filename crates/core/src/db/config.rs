use serde::{Deserialize, Serialize};

/// Database location for a sample store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Path to the sample database file (typically relative to the store root).
    pub path: String,
}

impl DbConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Serializable configuration describing a sample store.
///
/// This lives at `.store/storage.json` in the store root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Human-friendly store name.
    pub name: String,
    /// Optional description / notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Config format version, unrelated to the schema version of the database.
    pub config_version: String,
    /// Database configuration (path is typically relative to the store root).
    pub db: DbConfig,
}

impl StorageConfig {
    /// Create a new storage configuration using the given name and db path.
    pub fn new(name: impl Into<String>, db_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            config_version: "0.1.0".to_string(),
            db: DbConfig::new(db_path),
        }
    }
}
