//! Numerical building blocks: ODE integration and derivative-free minimization.

pub mod ode;
pub mod simplex;

pub use ode::*;
pub use simplex::*;
