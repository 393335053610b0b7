//! Input/output helpers.
//!
//! - CSV ingest of daily cumulative counts (`ingest`)
//! - CSV exports of observed and forecast tables (`export`)
//! - fit JSON read/write (`fit_file`)

pub mod export;
pub mod fit_file;
pub mod ingest;

pub use export::*;
pub use fit_file::*;
pub use ingest::*;
