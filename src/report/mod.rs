//! Reporting utilities: fit summaries, delay tables and forecast excerpts.

pub mod format;

pub use format::*;
