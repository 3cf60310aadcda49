//! Residual diagnostics: autocorrelation, heteroskedasticity, normality.
//!
//! Each test reports its statistic, an approximate p-value from the
//! chi-squared CDF, and a 5% verdict. "passed" means the residuals look
//! clean: no autocorrelation, no ARCH effects, compatible with normality.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;
use crate::math::{ols, stats};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DiagnosticTest {
    pub name: String,
    pub statistic: f64,
    pub p_value: f64,
    pub lags: usize,
    /// True when the null of clean residuals is not rejected at 5%.
    pub passed_5pct: bool,
}

/// Ljung–Box Q test for residual autocorrelation up to `lags`.
pub fn ljung_box(residuals: &[f64], lags: usize) -> Result<DiagnosticTest, AppError> {
    let n = residuals.len();
    if n <= lags + 2 {
        return Err(AppError::insufficient(format!(
            "{n} residuals are too few for a Ljung-Box test at {lags} lags."
        )));
    }
    let n_f = n as f64;
    let mut q = 0.0;
    for k in 1..=lags {
        let rho = stats::autocorrelation(residuals, k);
        q += rho * rho / (n_f - k as f64);
    }
    q *= n_f * (n_f + 2.0);
    let p_value = 1.0 - stats::chi_squared_cdf(q, lags);
    Ok(DiagnosticTest {
        name: "ljung_box".to_string(),
        statistic: q,
        p_value,
        lags,
        passed_5pct: p_value > 0.05,
    })
}

/// Engle's ARCH-LM test: regress squared residuals on their own lags; the
/// statistic is n·R² of that auxiliary regression.
pub fn arch_lm(residuals: &[f64], lags: usize) -> Result<DiagnosticTest, AppError> {
    let sq: Vec<f64> = residuals.iter().map(|e| e * e).collect();
    let n = sq.len();
    if n <= lags + 3 {
        return Err(AppError::insufficient(format!(
            "{n} residuals are too few for an ARCH-LM test at {lags} lags."
        )));
    }

    let rows = n - lags;
    let mut x = DMatrix::<f64>::zeros(rows, lags + 1);
    let mut y = DVector::<f64>::zeros(rows);
    for r in 0..rows {
        let t = r + lags;
        y[r] = sq[t];
        x[(r, 0)] = 1.0;
        for i in 1..=lags {
            x[(r, i)] = sq[t - i];
        }
    }

    let fit = ols(&x, &y)
        .ok_or_else(|| AppError::insufficient("ARCH-LM auxiliary regression is singular."))?;
    let ybar = y.mean();
    let tss: f64 = y.iter().map(|v| (v - ybar).powi(2)).sum();
    let sse = fit.residuals.dot(&fit.residuals);
    let r2 = if tss > f64::EPSILON { 1.0 - sse / tss } else { 0.0 };
    let statistic = rows as f64 * r2.clamp(0.0, 1.0);
    let p_value = 1.0 - stats::chi_squared_cdf(statistic, lags);

    Ok(DiagnosticTest {
        name: "arch_lm".to_string(),
        statistic,
        p_value,
        lags,
        passed_5pct: p_value > 0.05,
    })
}

/// Jarque–Bera normality test from sample skewness and excess kurtosis.
pub fn jarque_bera(residuals: &[f64]) -> Result<DiagnosticTest, AppError> {
    let n = residuals.len();
    if n < 8 {
        return Err(AppError::insufficient(format!(
            "{n} residuals are too few for a Jarque-Bera test."
        )));
    }
    let s = stats::skewness(residuals);
    let k = stats::excess_kurtosis(residuals);
    let statistic = n as f64 / 6.0 * (s * s + k * k / 4.0);
    let p_value = 1.0 - stats::chi_squared_cdf(statistic, 2);
    Ok(DiagnosticTest {
        name: "jarque_bera".to_string(),
        statistic,
        p_value,
        lags: 0,
        passed_5pct: p_value > 0.05,
    })
}

/// The standard battery, with the conventional lag rule min(√n, 12).
pub fn residual_suite(residuals: &[f64]) -> Result<Vec<DiagnosticTest>, AppError> {
    let lags = ((residuals.len() as f64).sqrt().round() as usize).clamp(1, 12);
    Ok(vec![
        ljung_box(residuals, lags)?,
        arch_lm(residuals, lags)?,
        jarque_bera(residuals)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_distr::Normal;

    fn gaussian_noise(seed: u64, n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    #[test]
    fn white_noise_passes_the_suite() {
        let e = gaussian_noise(5, 500);
        let suite = residual_suite(&e).unwrap();
        for test in suite {
            assert!(test.passed_5pct, "{} failed: p={}", test.name, test.p_value);
        }
    }

    #[test]
    fn ar1_residuals_fail_ljung_box() {
        let e = gaussian_noise(9, 500);
        let mut y = vec![0.0];
        for t in 1..500 {
            y.push(0.6 * y[t - 1] + e[t]);
        }
        let test = ljung_box(&y, 12).unwrap();
        assert!(!test.passed_5pct);
    }

    #[test]
    fn garch_like_residuals_fail_arch_lm() {
        // Volatility clustering: variance depends on the lagged shock.
        let e = gaussian_noise(13, 800);
        let mut y = vec![0.0f64];
        for t in 1..800 {
            let sigma2 = 0.2 + 0.7 * y[t - 1] * y[t - 1];
            y.push(sigma2.sqrt() * e[t]);
        }
        let test = arch_lm(&y, 12).unwrap();
        assert!(!test.passed_5pct);
    }

    #[test]
    fn skewed_residuals_fail_jarque_bera() {
        let e = gaussian_noise(17, 600);
        let skewed: Vec<f64> = e.iter().map(|x| x.exp()).collect();
        let test = jarque_bera(&skewed).unwrap();
        assert!(!test.passed_5pct);
    }
}
