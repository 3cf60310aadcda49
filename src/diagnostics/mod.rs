//! Stationarity, cointegration and residual diagnostics.
//!
//! All tests are read-only over the panel: they consume slices and emit
//! tabular results. The estimators call the residual suite on their own
//! residuals; the diagnostics stage runs the unit-root and rank tests.

pub mod johansen;
pub mod residual;
pub mod unit_root;

pub use johansen::{JohansenResult, RankStat, johansen_test};
pub use residual::{DiagnosticTest, residual_suite};
pub use unit_root::{AdfResult, adf_test};
