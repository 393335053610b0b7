//! `sir-forecast` library crate.
//!
//! SIR epidemic calibration: an ODE simulator with an optional lockdown
//! segment, a delay-shifted MSE loss, a Nelder–Mead calibrator, a parallel
//! reporting-delay search and a forecaster.
//!
//! The binary (`sirfit`) is a thin wrapper around this library so that core
//! logic is testable without spawning processes.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod forecast;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
pub mod tui;
