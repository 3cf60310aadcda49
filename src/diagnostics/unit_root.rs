//! Augmented Dickey–Fuller unit-root test.
//!
//! Auxiliary regression (constant, no trend):
//!
//! ```text
//! Δy_t = c + ρ·y_{t-1} + Σ_{i=1..p} φ_i·Δy_{t-i} + ε_t
//! ```
//!
//! The statistic is the t-ratio on ρ, compared against the asymptotic
//! Dickey–Fuller critical values for the constant-only case. Lag order p is
//! chosen by BIC over 0..=p_max with p_max from Schwert's rule, all
//! candidates evaluated on the common sample so their BICs are comparable.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;
use crate::math::ols;

/// Asymptotic critical values, constant-only case (1%, 5%, 10%).
pub const ADF_CRITICAL: [(f64, f64); 3] = [(0.01, -3.43), (0.05, -2.86), (0.10, -2.57)];

#[derive(Debug, Clone)]
pub struct AdfResult {
    pub series: String,
    pub statistic: f64,
    /// Selected lag order of the differenced terms.
    pub lags: usize,
    /// Effective observations in the final regression.
    pub nobs: usize,
    /// (significance level, critical value) pairs.
    pub critical: [(f64, f64); 3],
    /// Verdict at the 5% level: true when the unit root is rejected.
    pub stationary_5pct: bool,
}

/// Run the ADF test on `values` (missing entries are trimmed first).
pub fn adf_test(series: impl Into<String>, values: &[f64]) -> Result<AdfResult, AppError> {
    let series = series.into();
    let y = usable_suffix(values);
    let n = y.len();
    if n < 15 {
        return Err(AppError::insufficient(format!(
            "Series '{series}' has only {n} usable observations for the ADF test."
        )));
    }

    // Schwert (1989) bound, capped so the common sample stays workable.
    let p_max = (12.0 * (n as f64 / 100.0).powf(0.25)).floor() as usize;
    let p_max = p_max.min(n / 2 - 2);

    let dy: Vec<f64> = (1..n).map(|t| y[t] - y[t - 1]).collect();

    // Candidates share the start index p_max+1 so BIC compares like with like.
    let mut best: Option<(f64, usize)> = None;
    for p in 0..=p_max {
        if let Some(fit) = adf_regression(&y, &dy, p, p_max) {
            let n_eff = fit.nobs as f64;
            let k = (p + 2) as f64;
            let sse = fit.residuals.dot(&fit.residuals);
            let bic = n_eff * (sse / n_eff).ln() + k * n_eff.ln();
            if best.map(|(b, _)| bic < b).unwrap_or(true) {
                best = Some((bic, p));
            }
        }
    }
    let (_, lags) = best.ok_or_else(|| {
        AppError::insufficient(format!("ADF auxiliary regression failed for '{series}'."))
    })?;

    // Final fit at the chosen lag order uses the full available sample.
    let fit = adf_regression(&y, &dy, lags, lags).ok_or_else(|| {
        AppError::insufficient(format!("ADF auxiliary regression failed for '{series}'."))
    })?;

    let se = fit.std_errors();
    let statistic = fit.beta[1] / se[1];
    let stationary_5pct = statistic < ADF_CRITICAL[1].1;

    Ok(AdfResult {
        series,
        statistic,
        lags,
        nobs: fit.nobs,
        critical: ADF_CRITICAL,
        stationary_5pct,
    })
}

/// Fit the auxiliary regression with `p` lagged differences, starting at
/// offset `start_lag + 1` into the difference series.
fn adf_regression(y: &[f64], dy: &[f64], p: usize, start_lag: usize) -> Option<crate::math::OlsFit> {
    let t0 = start_lag + 1; // index into dy
    let rows = dy.len().checked_sub(t0)?;
    let k = p + 2;
    if rows <= k {
        return None;
    }

    let mut x = DMatrix::<f64>::zeros(rows, k);
    let mut target = DVector::<f64>::zeros(rows);
    for (r, t) in (t0..dy.len()).enumerate() {
        target[r] = dy[t];
        x[(r, 0)] = 1.0;
        x[(r, 1)] = y[t]; // y_{t-1} in level indexing: dy[t] = y[t+1]-y[t]
        for i in 1..=p {
            x[(r, 1 + i)] = dy[t - i];
        }
    }

    ols(&x, &target)
}

/// Trailing run of finite values (interior gaps would misalign the lags, so
/// everything before the last missing entry is discarded).
fn usable_suffix(values: &[f64]) -> Vec<f64> {
    let cut = values
        .iter()
        .rposition(|v| !v.is_finite())
        .map(|i| i + 1)
        .unwrap_or(0);
    values[cut..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_distr::Normal;

    fn noise(seed: u64, n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    #[test]
    fn stationary_ar1_rejects_unit_root() {
        let e = noise(7, 400);
        let mut y = vec![0.0];
        for t in 1..400 {
            y.push(0.3 * y[t - 1] + e[t]);
        }
        let result = adf_test("ar1", &y).unwrap();
        assert!(result.stationary_5pct, "stat={}", result.statistic);
        assert!(result.statistic < -3.5);
    }

    #[test]
    fn random_walk_does_not_reject_unit_root() {
        let e = noise(11, 400);
        let mut y = vec![0.0];
        for t in 1..400 {
            y.push(y[t - 1] + e[t]);
        }
        let result = adf_test("rw", &y).unwrap();
        assert!(!result.stationary_5pct, "stat={}", result.statistic);
    }

    #[test]
    fn leading_missing_values_are_trimmed() {
        let mut y = vec![f64::NAN, f64::NAN];
        let e = noise(3, 100);
        let mut level = 0.0;
        for t in 0..100 {
            level = 0.2 * level + e[t];
            y.push(level);
        }
        let result = adf_test("gappy", &y).unwrap();
        assert!(result.nobs < 100);
    }

    #[test]
    fn short_series_is_an_insufficient_data_error() {
        let err = adf_test("short", &[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
