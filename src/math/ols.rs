//! Least-squares solvers.
//!
//! Every regression in the pipeline (ADF auxiliary regressions, the VECM
//! short-run equations, each local-projection horizon) is a small dense
//! problem, so we solve via SVD rather than normal equations:
//!
//! - SVD handles tall design matrices and near-collinear columns robustly
//!   (nalgebra's `QR::solve` is intended for square systems).
//! - Parameter counts are tiny (≤ ~10 columns), so SVD cost is irrelevant.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if the strict solve fails; monthly
    // macro regressors can be close to collinear over short subsamples.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// A fitted OLS regression with the pieces needed for inference.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub beta: DVector<f64>,
    pub residuals: DVector<f64>,
    /// `(X'X)^-1`, the bread of both classical and HAC covariance estimators.
    pub xtx_inv: DMatrix<f64>,
    /// Residual variance with a degrees-of-freedom correction.
    pub sigma2: f64,
    pub nobs: usize,
}

impl OlsFit {
    /// Classical (homoskedastic) standard errors.
    pub fn std_errors(&self) -> DVector<f64> {
        let k = self.beta.len();
        DVector::from_fn(k, |i, _| (self.sigma2 * self.xtx_inv[(i, i)]).max(0.0).sqrt())
    }
}

/// Fit `y = X beta + e` and return coefficients, residuals and `(X'X)^-1`.
///
/// Returns `None` when the design matrix is rank-deficient beyond what the
/// SVD tolerances tolerate, or when `X'X` cannot be inverted.
pub fn ols(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<OlsFit> {
    let n = x.nrows();
    let k = x.ncols();
    if n <= k {
        return None;
    }

    let beta = solve_least_squares(x, y)?;
    let residuals = y - x * &beta;
    let xtx_inv = (x.transpose() * x).try_inverse()?;
    let sse = residuals.dot(&residuals);
    let sigma2 = sse / (n - k) as f64;

    Some(OlsFit {
        beta,
        residuals,
        xtx_inv,
        sigma2,
        nobs: n,
    })
}

/// Newey–West (HAC) standard errors with Bartlett weights.
///
/// `bandwidth` is the number of autocovariance lags included; 0 reduces to
/// White's heteroskedasticity-robust errors. Local projections use
/// `bandwidth = h` because the overlapping h-step outcome induces an MA(h)
/// error structure.
pub fn newey_west_se(x: &DMatrix<f64>, fit: &OlsFit, bandwidth: usize) -> DVector<f64> {
    let n = x.nrows();
    let k = x.ncols();
    let e = &fit.residuals;

    // Meat: S = sum_t e_t^2 x_t x_t' + sum_l w_l sum_t (x_t e_t e_{t-l} x_{t-l}' + transpose)
    let mut meat = DMatrix::<f64>::zeros(k, k);
    for t in 0..n {
        let xt = x.row(t).transpose();
        meat += &xt * xt.transpose() * (e[t] * e[t]);
    }
    for lag in 1..=bandwidth.min(n.saturating_sub(1)) {
        let w = 1.0 - lag as f64 / (bandwidth as f64 + 1.0);
        let mut gamma = DMatrix::<f64>::zeros(k, k);
        for t in lag..n {
            let xt = x.row(t).transpose();
            let xl = x.row(t - lag).transpose();
            gamma += &xt * xl.transpose() * (e[t] * e[t - lag]);
        }
        meat += (&gamma + gamma.transpose()) * w;
    }

    let cov = &fit.xtx_inv * meat * &fit.xtx_inv;
    DVector::from_fn(k, |i, _| cov[(i, i)].max(0.0).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn ols_recovers_coefficients_with_noise() {
        // y = 1 + 0.5 x with tiny deterministic perturbations.
        let n = 50;
        let mut rows = Vec::with_capacity(n * 2);
        let mut ys = Vec::with_capacity(n);
        for i in 0..n {
            let xv = i as f64 / 10.0;
            rows.push(1.0);
            rows.push(xv);
            let bump = if i % 2 == 0 { 1e-3 } else { -1e-3 };
            ys.push(1.0 + 0.5 * xv + bump);
        }
        let x = DMatrix::from_row_slice(n, 2, &rows);
        let y = DVector::from_row_slice(&ys);

        let fit = ols(&x, &y).unwrap();
        assert!((fit.beta[0] - 1.0).abs() < 1e-3);
        assert!((fit.beta[1] - 0.5).abs() < 1e-3);
        assert_eq!(fit.nobs, n);
        assert!(fit.std_errors()[1] < 1e-3);
    }

    #[test]
    fn newey_west_zero_bandwidth_matches_white() {
        let x = DMatrix::from_row_slice(6, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0, 1.0, 4.0, 1.0, 5.0]);
        let y = DVector::from_row_slice(&[0.1, 1.2, 1.9, 3.1, 4.0, 5.2]);
        let fit = ols(&x, &y).unwrap();

        let se = newey_west_se(&x, &fit, 0);
        assert!(se.iter().all(|v| v.is_finite() && *v > 0.0));
    }
}
