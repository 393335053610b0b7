//! Calibration of SIR parameters against an observed series.
//!
//! Responsibilities:
//!
//! - score parameter vectors at a given reporting delay (MSE loss)
//! - minimize the loss per delay candidate (Nelder–Mead)
//! - search the delay candidates (parallel) and pick the best fit

pub mod calibrate;
pub mod delay;
pub mod loss;

pub use calibrate::*;
pub use delay::*;
pub use loss::*;
