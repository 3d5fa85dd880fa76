//! Sample storage: on-disk layout, storage config, and the SQLite sample database.
//!
//! The pipeline reaches storage only through the [`SampleStore`] trait;
//! [`StorageContext`] is the local implementation backed by [`SampleDb`].

pub mod config;
pub mod layout;
pub mod models;
pub mod sample_db;
pub mod store;
pub mod util;

pub use config::*;
pub use layout::*;
pub use models::*;
pub use sample_db::*;
pub use store::*;
pub use util::*;
