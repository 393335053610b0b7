//! SIR model implementation.
//!
//! The model is a small, pure simulator so that calibration and forecasting code
//! can stay generic.

pub mod sir;

pub use sir::*;
