//! Domain types and pure algorithms for the PNAD income engine.
//!
//! Everything in this crate is I/O free except [`settings`], which owns the
//! command-line surface and the persisted last-used parameters.

pub mod bands;
pub mod categories;
pub mod deflator;
pub mod error;
pub mod formatting;
pub mod models;
pub mod parsing;
pub mod reference;
pub mod regions;
pub mod settings;
pub mod stats;
