//! Observed data sources: the remote dataset and synthetic series.

pub mod remote;
pub mod synthetic;

pub use remote::*;
pub use synthetic::*;
