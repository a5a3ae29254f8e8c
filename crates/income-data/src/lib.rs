//! Data layer for the PNAD income engine.
//!
//! Reads the labeled microdata CSV and the monthly series it is joined with,
//! rebuilds households from person rows, folds them into national, state and
//! macro-region aggregates, and assembles the JSON payloads emitted by the
//! command-line tool. The deflator, BCB conversion and validation utilities
//! also live here since they share the CSV plumbing.

pub mod aggregator;
pub mod analysis;
pub mod bcb;
pub mod columns;
pub mod crosstab;
pub mod deflate;
pub mod households;
pub mod insights;
pub mod reader;
pub mod validate;

pub use income_core as core;
