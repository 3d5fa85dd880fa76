//! sample-pipeline-core
//!
//! Core library for running external analysis tools against ingested samples.
//!
//! An analyzer is a fixed sequence of command-line tools. Each run gets its own
//! workspace directory; tool output is captured as artifacts next to a run log,
//! archived when every step succeeds, and discarded either way. The
//! content-type analyzer additionally classifies its output and writes the
//! derived platform and tags back to every sample sharing the digest.
//!
//! All substantive logic lives here so it is testable and reusable from
//! multiple frontends; the CLI is a thin wrapper.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod services;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
