//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - configuration enums (`ModelVariant`, `ModelChoice`, `InitialCondition`)
//! - observed inputs (`DailyRecord`, `ObservedSeries`, `DerivedSeries`)
//! - model inputs/outputs (`SirParams`, `LockdownWindow`, `Trajectory`, `DelayFit`)
//! - the run configuration (`FitConfig`)

pub mod types;

pub use types::*;
