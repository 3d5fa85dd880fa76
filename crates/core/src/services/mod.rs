//! The analyzer execution pipeline.
//!
//! Leaf first: [`command`] spawns one tool, [`workspace`] owns the run
//! directory and log, [`steps`] sequences commands, [`classify`] and
//! [`enrich`] derive and store sample metadata, [`analyzers`] describes the
//! configured tools, and [`driver`] runs a whole task.

pub mod analyzers;
pub mod classify;
pub mod command;
pub mod driver;
pub mod enrich;
pub mod steps;
pub mod workspace;
