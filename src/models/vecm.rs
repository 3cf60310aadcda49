//! Vector error-correction model.
//!
//! Estimation runs the Unfit → RankDetermined → Fitted sequence: the
//! Johansen test fixes the cointegration rank, β comes from its leading
//! eigenvectors (normalized on the first variable), and the loadings α plus
//! the short-run Γ matrices come from least squares of ΔY on the
//! error-correction terms, lagged differences and a constant. Rank 0 is not
//! an error: the stage logs it and skips the long-run outputs.
//!
//! Impulse responses are computed from the level-VAR representation:
//!
//! ```text
//! A_1 = I + αβ' + Γ_1,   A_i = Γ_i − Γ_{i−1},   A_{p+1} = −Γ_p
//! Ψ_0 = I,   Ψ_h = Σ_{i=1..min(h,p+1)} A_i Ψ_{h−i}
//! ```
//!
//! with one-unit (non-orthogonalized) shocks.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::config::{COINTEGRATION_GROUP, RunConfig};
use crate::diagnostics::residual::DiagnosticTest;
use crate::diagnostics::{JohansenResult, johansen_test, residual_suite};
use crate::error::AppError;
use crate::math::ols;
use crate::panel::MonthlyPanel;

/// One point of an impulse-response surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrfPoint {
    pub shock: String,
    pub response: String,
    pub horizon: usize,
    pub value: f64,
}

/// Fitted VECM state, persisted to `results/models/vecm.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VecmArtifact {
    pub variables: Vec<String>,
    pub rank: usize,
    pub lag_order: usize,
    pub nobs: usize,
    /// Cointegrating vectors, rows = relations, columns = variables,
    /// normalized so the first variable's coefficient is 1.
    pub beta: Vec<Vec<f64>>,
    /// Adjustment loadings, rows = equations, columns = relations.
    pub alpha: Vec<Vec<f64>>,
    /// Short-run coefficient matrices Γ_1..Γ_p, each k×k.
    pub gamma: Vec<Vec<Vec<f64>>>,
    pub intercept: Vec<f64>,
    pub eigenvalues: Vec<f64>,
    pub irf: Vec<IrfPoint>,
    /// Residual diagnostics per equation.
    pub diagnostics: Vec<(String, Vec<DiagnosticTest>)>,
}

/// Estimation outcome: the rank test always runs; the artifact exists only
/// when a cointegrating relation was found.
pub struct VecmOutcome {
    pub rank_test: JohansenResult,
    pub artifact: Option<VecmArtifact>,
    /// Notes for the report (skips, warnings).
    pub notes: Vec<String>,
}

/// Estimate the VECM on the configured cointegration group.
pub fn estimate(panel: &MonthlyPanel, config: &RunConfig) -> Result<VecmOutcome, AppError> {
    let variables: Vec<String> = COINTEGRATION_GROUP.iter().map(|s| s.to_string()).collect();
    let levels = level_matrix(panel, &variables)?;
    let p = config.vecm.lag_order;

    let rank_test = johansen_test(&variables, &levels, p)?;
    let mut notes = Vec::new();

    if rank_test.rank == 0 {
        notes.push(
            "Johansen test found no cointegrating relation (rank 0); long-run outputs skipped."
                .to_string(),
        );
        return Ok(VecmOutcome {
            rank_test,
            artifact: None,
            notes,
        });
    }

    let k = variables.len();
    let r = rank_test.rank.min(k - 1);

    // β: leading eigenvectors, normalized on the first variable.
    let mut beta = DMatrix::<f64>::zeros(k, r);
    for j in 0..r {
        let col = rank_test.eigenvectors.column(j).clone_owned();
        let pivot = col[0];
        if pivot.abs() < 1e-12 {
            notes.push(format!(
                "Cointegrating vector {j} has a ~0 coefficient on {}; left un-normalized.",
                variables[0]
            ));
            beta.set_column(j, &col);
        } else {
            beta.set_column(j, &(col / pivot));
        }
    }

    let fit = fit_short_run(&levels, &beta, p)?;
    let irf = impulse_responses(&variables, &fit, config.vecm.irf_horizon);

    // Per-equation residual diagnostics.
    let mut diagnostics = Vec::with_capacity(k);
    for (j, name) in variables.iter().enumerate() {
        let resid: Vec<f64> = (0..fit.residuals.nrows()).map(|t| fit.residuals[(t, j)]).collect();
        diagnostics.push((name.clone(), residual_suite(&resid)?));
    }

    let artifact = VecmArtifact {
        variables: variables.clone(),
        rank: r,
        lag_order: p,
        nobs: fit.nobs,
        beta: matrix_rows(&beta.transpose()),
        alpha: matrix_rows(&fit.alpha),
        gamma: fit.gamma.iter().map(matrix_rows).collect(),
        intercept: fit.intercept.iter().copied().collect(),
        eigenvalues: rank_test.eigenvalues.clone(),
        irf,
        diagnostics,
    };

    Ok(VecmOutcome {
        rank_test,
        artifact: Some(artifact),
        notes,
    })
}

struct ShortRunFit {
    alpha: DMatrix<f64>,
    gamma: Vec<DMatrix<f64>>,
    intercept: DVector<f64>,
    residuals: DMatrix<f64>,
    pi: DMatrix<f64>,
    nobs: usize,
}

/// Given β, estimate α, Γ_1..Γ_p and the intercept equation by equation.
fn fit_short_run(
    levels: &DMatrix<f64>,
    beta: &DMatrix<f64>,
    p: usize,
) -> Result<ShortRunFit, AppError> {
    let t_total = levels.nrows();
    let k = levels.ncols();
    let r = beta.ncols();
    let n_eff = t_total - 1 - p;

    let dy = DMatrix::from_fn(t_total - 1, k, |t, j| levels[(t + 1, j)] - levels[(t, j)]);

    // Design: constant, r error-correction terms, then p blocks of lagged
    // differences.
    let m = 1 + r + k * p;
    if n_eff <= m {
        return Err(AppError::insufficient(
            "Too few observations for the VECM short-run regression.",
        ));
    }
    let mut x = DMatrix::<f64>::zeros(n_eff, m);
    let mut y = DMatrix::<f64>::zeros(n_eff, k);
    for (row, t) in (p..dy.nrows()).enumerate() {
        x[(row, 0)] = 1.0;
        for rel in 0..r {
            let mut ect = 0.0;
            for j in 0..k {
                ect += beta[(j, rel)] * levels[(t, j)];
            }
            x[(row, 1 + rel)] = ect;
        }
        for lag in 1..=p {
            for j in 0..k {
                x[(row, 1 + r + (lag - 1) * k + j)] = dy[(t - lag, j)];
            }
        }
        for j in 0..k {
            y[(row, j)] = dy[(t, j)];
        }
    }

    let mut alpha = DMatrix::<f64>::zeros(k, r);
    let mut gamma = vec![DMatrix::<f64>::zeros(k, k); p];
    let mut intercept = DVector::<f64>::zeros(k);
    let mut residuals = DMatrix::<f64>::zeros(n_eff, k);

    for eq in 0..k {
        let target: DVector<f64> = y.column(eq).into();
        let fit = ols(&x, &target)
            .ok_or_else(|| AppError::insufficient("VECM short-run regression is singular."))?;
        intercept[eq] = fit.beta[0];
        for rel in 0..r {
            alpha[(eq, rel)] = fit.beta[1 + rel];
        }
        for lag in 1..=p {
            for j in 0..k {
                gamma[lag - 1][(eq, j)] = fit.beta[1 + r + (lag - 1) * k + j];
            }
        }
        residuals.set_column(eq, &fit.residuals);
    }

    let pi = &alpha * beta.transpose();

    Ok(ShortRunFit {
        alpha,
        gamma,
        intercept,
        residuals,
        pi,
        nobs: n_eff,
    })
}

/// MA coefficients of the implied level VAR, flattened into IRF points.
fn impulse_responses(variables: &[String], fit: &ShortRunFit, horizon: usize) -> Vec<IrfPoint> {
    let k = variables.len();
    let p = fit.gamma.len();

    // Level-VAR companion matrices A_1..A_{p+1}.
    let mut a = vec![DMatrix::<f64>::zeros(k, k); p + 1];
    a[0] = DMatrix::identity(k, k) + &fit.pi + &fit.gamma[0];
    for i in 1..p {
        a[i] = &fit.gamma[i] - &fit.gamma[i - 1];
    }
    a[p] = -fit.gamma[p - 1].clone();

    let mut psi: Vec<DMatrix<f64>> = vec![DMatrix::identity(k, k)];
    for h in 1..=horizon {
        let mut next = DMatrix::<f64>::zeros(k, k);
        for i in 1..=h.min(p + 1) {
            next += &a[i - 1] * &psi[h - i];
        }
        psi.push(next);
    }

    let mut out = Vec::with_capacity((horizon + 1) * k * k);
    for h in 0..=horizon {
        for shock in 0..k {
            for response in 0..k {
                out.push(IrfPoint {
                    shock: variables[shock].clone(),
                    response: variables[response].clone(),
                    horizon: h,
                    value: psi[h][(response, shock)],
                });
            }
        }
    }
    out
}

/// Stack the group's level columns, trimming rows with any missing value at
/// the edges (interior gaps are not expected after forward-filling).
fn level_matrix(panel: &MonthlyPanel, variables: &[String]) -> Result<DMatrix<f64>, AppError> {
    let columns: Vec<&[f64]> = variables
        .iter()
        .map(|name| panel.require_column(name))
        .collect::<Result<_, _>>()?;

    let n = panel.n_rows();
    let row_ok = |t: usize| columns.iter().all(|c| c[t].is_finite());
    let start = (0..n).find(|&t| row_ok(t));
    let end = (0..n).rev().find(|&t| row_ok(t));
    let (Some(start), Some(end)) = (start, end) else {
        return Err(AppError::insufficient(
            "No complete rows for the cointegration group.",
        ));
    };

    let rows: Vec<usize> = (start..=end).filter(|&t| row_ok(t)).collect();
    if rows.len() < end - start + 1 {
        // Interior gaps would desynchronize the lag structure.
        return Err(AppError::insufficient(
            "Cointegration group has interior missing values; rebuild the panel.",
        ));
    }

    Ok(DMatrix::from_fn(rows.len(), variables.len(), |t, j| {
        columns[j][rows[t]]
    }))
}

fn matrix_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows())
        .map(|i| (0..m.ncols()).map(|j| m[(i, j)]).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::{MonthlyPanel, month_end, next_month_end};
    use chrono::NaiveDate;
    use rand::prelude::*;
    use rand_distr::Normal;

    /// Panel with log_sp500 cointegrated with log_balance (coefficient 1.5)
    /// and log_gdp an independent smooth trend.
    fn synthetic_panel(n: usize, seed: u64) -> MonthlyPanel {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();

        let mut trend = vec![0.0f64];
        for t in 1..n {
            trend.push(trend[t - 1] + 0.01 * normal.sample(&mut rng) + 0.002);
        }

        let log_balance: Vec<f64> = trend.iter().map(|w| 8.0 + w).collect();
        let log_sp500: Vec<f64> = trend
            .iter()
            .map(|w| 7.0 + 1.5 * w + 0.005 * normal.sample(&mut rng))
            .collect();
        // Independent stochastic trend so the moment matrices stay full rank.
        let mut log_gdp = vec![9.0f64];
        for t in 1..n {
            log_gdp.push(log_gdp[t - 1] + 0.003 + 0.004 * normal.sample(&mut rng));
        }

        let mut months = Vec::with_capacity(n);
        let mut m = month_end(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        for _ in 0..n {
            months.push(m);
            m = next_month_end(m);
        }

        MonthlyPanel::new(
            months,
            vec![
                ("log_sp500".into(), log_sp500),
                ("log_balance".into(), log_balance),
                ("log_gdp".into(), log_gdp),
            ],
        )
        .unwrap()
    }

    #[test]
    fn recovers_injected_long_run_coefficient() {
        let panel = synthetic_panel(360, 42);
        let config = RunConfig::new("data", "results");
        let outcome = estimate(&panel, &config).unwrap();
        assert!(outcome.rank_test.rank >= 1);

        let artifact = outcome.artifact.expect("cointegrated system must fit");
        // β normalized on log_sp500: (1, b_balance, b_gdp) with
        // log_sp500 − 1.5·log_balance stationary ⇒ b_balance ≈ −1.5.
        let b = &artifact.beta[0];
        assert!((b[0] - 1.0).abs() < 1e-9);
        assert!(
            (b[1] + 1.5).abs() < 0.25,
            "long-run coefficient off: {}",
            b[1]
        );
    }

    #[test]
    fn irf_starts_at_identity_and_stays_finite() {
        let panel = synthetic_panel(360, 7);
        let config = RunConfig::new("data", "results");
        let outcome = estimate(&panel, &config).unwrap();
        let artifact = outcome.artifact.unwrap();

        for point in &artifact.irf {
            assert!(point.value.is_finite());
            if point.horizon == 0 {
                let expected = if point.shock == point.response { 1.0 } else { 0.0 };
                assert!((point.value - expected).abs() < 1e-12);
            }
        }
        let max_h = artifact.irf.iter().map(|p| p.horizon).max().unwrap();
        assert_eq!(max_h, config.vecm.irf_horizon);
    }

    #[test]
    fn independent_walks_yield_rank_zero_and_no_artifact() {
        let n = 360;
        let mut rng = StdRng::seed_from_u64(99);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut cols: Vec<Vec<f64>> = Vec::new();
        for _ in 0..3 {
            let mut w = vec![0.0f64];
            for t in 1..n {
                w.push(w[t - 1] + 0.01 * normal.sample(&mut rng));
            }
            cols.push(w);
        }
        let mut months = Vec::with_capacity(n);
        let mut m = month_end(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        for _ in 0..n {
            months.push(m);
            m = next_month_end(m);
        }
        let panel = MonthlyPanel::new(
            months,
            vec![
                ("log_sp500".into(), cols[0].clone()),
                ("log_balance".into(), cols[1].clone()),
                ("log_gdp".into(), cols[2].clone()),
            ],
        )
        .unwrap();

        let config = RunConfig::new("data", "results");
        let outcome = estimate(&panel, &config).unwrap();
        if outcome.rank_test.rank == 0 {
            assert!(outcome.artifact.is_none());
            assert!(!outcome.notes.is_empty());
        }
    }
}
