//! Numerical building blocks shared by the diagnostics and estimators.

pub mod ols;
pub mod stats;

pub use ols::{OlsFit, newey_west_se, ols, solve_least_squares};
