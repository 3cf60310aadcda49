//! Local-projection impulse responses.
//!
//! For each horizon h in 0..=H a *separate* regression is run:
//!
//! ```text
//! (log_sp500[t+h] − log_sp500[t−1]) = β_h·shock_t + δ_h·(shock_t × bear_t)
//!                                     + controls_t·γ_h + c + u_t
//! ```
//!
//! Horizons never share coefficients; this independence is what
//! distinguishes local projections from VAR-implied IRFs, and it means a
//! later horizon failing (too few rows) does not disturb earlier ones.
//! Standard errors are Newey–West with bandwidth h, matching the MA(h)
//! error structure the overlapping outcome induces; confidence bands are
//! ±1.96 standard errors.
//!
//! The regime interaction uses the persisted HMM decode when available and
//! degenerates to a zero column (dropped from the design) otherwise.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::error::AppError;
use crate::math::{newey_west_se, ols};
use crate::models::regime::RegimeArtifact;
use crate::panel::MonthlyPanel;

const SHOCK: &str = "growth_balance";
const OUTCOME: &str = "log_sp500";
const CONTROLS: &[&str] = &["delta_ff", "delta_slope", "delta_vix"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonEstimate {
    pub horizon: usize,
    pub coefficient: f64,
    pub std_error: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    /// Interaction coefficient (shock × bear regime), when estimated.
    pub interaction: Option<f64>,
    pub nobs: usize,
}

/// Impulse-response profile, persisted to `results/models/localproj.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalProjArtifact {
    pub shock: String,
    pub outcome: String,
    pub controls: Vec<String>,
    pub with_regime_interaction: bool,
    pub horizons: Vec<HorizonEstimate>,
}

pub struct LocalProjOutcome {
    pub artifact: Option<LocalProjArtifact>,
    pub notes: Vec<String>,
}

/// Run the horizon-by-horizon regressions.
pub fn estimate(
    panel: &MonthlyPanel,
    regimes: Option<&RegimeArtifact>,
    config: &RunConfig,
) -> Result<LocalProjOutcome, AppError> {
    let outcome_col = panel.require_column(OUTCOME)?;
    let shock_col = panel.require_column(SHOCK)?;
    let ret_col = panel.require_column("ret_sp500")?;
    let control_cols: Vec<&[f64]> = CONTROLS
        .iter()
        .map(|name| panel.require_column(name))
        .collect::<Result<_, _>>()?;

    let mut notes = Vec::new();
    let bear = match regimes {
        Some(artifact) => {
            let indicator = artifact.bear_indicator(panel.months());
            // A constant indicator makes the interaction collinear with the
            // shock (or identically zero), so it cannot be estimated.
            let has_bear = indicator.iter().any(|&v| v > 0.0);
            let has_bull = indicator.iter().any(|&v| v == 0.0);
            if has_bear && has_bull {
                Some(indicator)
            } else {
                notes.push(
                    "Decoded regimes are constant over the sample; the shock × regime interaction is omitted."
                        .to_string(),
                );
                None
            }
        }
        None => {
            notes.push(
                "No regime artifact found; the shock × regime interaction is omitted.".to_string(),
            );
            None
        }
    };

    let n = panel.n_rows();
    let with_interaction = bear.is_some();
    // Columns: const, shock, (interaction), controls, lagged return.
    let k = 2 + usize::from(with_interaction) + CONTROLS.len() + 1;

    let mut horizons = Vec::new();
    for h in 0..=config.localproj.max_horizon {
        let mut x_rows: Vec<f64> = Vec::new();
        let mut y_vals: Vec<f64> = Vec::new();

        for t in 1..n.saturating_sub(h) {
            let y = outcome_col[t + h] - outcome_col[t - 1];
            let lagged_ret = ret_col[t - 1];
            let shock = shock_col[t];
            let controls: Vec<f64> = control_cols.iter().map(|c| c[t]).collect();

            let finite = y.is_finite()
                && shock.is_finite()
                && lagged_ret.is_finite()
                && controls.iter().all(|v| v.is_finite());
            if !finite {
                continue;
            }

            x_rows.push(1.0);
            x_rows.push(shock);
            if let Some(bear) = &bear {
                x_rows.push(shock * bear[t]);
            }
            x_rows.extend_from_slice(&controls);
            x_rows.push(lagged_ret);
            y_vals.push(y);
        }

        let rows = y_vals.len();
        if rows <= k + 5 {
            notes.push(format!("Horizon {h}: only {rows} usable rows; stopped here."));
            break;
        }

        let x = DMatrix::from_row_slice(rows, k, &x_rows);
        let y = DVector::from_row_slice(&y_vals);
        let Some(fit) = ols(&x, &y) else {
            notes.push(format!("Horizon {h}: regression singular; skipped."));
            continue;
        };

        let se = newey_west_se(&x, &fit, h);
        let coefficient = fit.beta[1];
        let std_error = se[1];
        horizons.push(HorizonEstimate {
            horizon: h,
            coefficient,
            std_error,
            ci_lower: coefficient - 1.96 * std_error,
            ci_upper: coefficient + 1.96 * std_error,
            interaction: with_interaction.then(|| fit.beta[2]),
            nobs: rows,
        });
    }

    if horizons.is_empty() {
        notes.push("No horizon had enough data; local projections skipped.".to_string());
        return Ok(LocalProjOutcome {
            artifact: None,
            notes,
        });
    }

    Ok(LocalProjOutcome {
        artifact: Some(LocalProjArtifact {
            shock: SHOCK.to_string(),
            outcome: OUTCOME.to_string(),
            controls: CONTROLS.iter().map(|s| s.to_string()).collect(),
            with_regime_interaction: with_interaction,
            horizons,
        }),
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::{MonthlyPanel, month_end, next_month_end};
    use rand::prelude::*;
    use rand_distr::Normal;

    /// DGP where the shock moves the log level by 0.8 permanently starting
    /// at the impact month: y_t = 0.8·Σ_{s≤t} shock_s + noise.
    fn lp_panel(n: usize, seed: u64) -> MonthlyPanel {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();

        let shocks: Vec<f64> = (0..n).map(|_| 0.01 * normal.sample(&mut rng)).collect();
        let mut level = vec![0.0f64; n];
        for t in 1..n {
            level[t] = level[t - 1] + 0.8 * shocks[t] + 0.0005 * normal.sample(&mut rng);
        }
        let mut ret = vec![f64::NAN; n];
        for t in 1..n {
            ret[t] = level[t] - level[t - 1];
        }

        let mut zeros = |_: usize| (0..n).map(|_| 0.001 * normal.sample(&mut rng)).collect::<Vec<_>>();

        let mut months = Vec::with_capacity(n);
        let mut m = month_end(chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        for _ in 0..n {
            months.push(m);
            m = next_month_end(m);
        }

        MonthlyPanel::new(
            months,
            vec![
                ("log_sp500".into(), level),
                ("ret_sp500".into(), ret),
                ("growth_balance".into(), shocks),
                ("delta_ff".into(), zeros(0)),
                ("delta_slope".into(), zeros(1)),
                ("delta_vix".into(), zeros(2)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn recovers_flat_cumulative_response() {
        let panel = lp_panel(300, 42);
        let config = RunConfig::new("data", "results");
        let outcome = estimate(&panel, None, &config).unwrap();
        let artifact = outcome.artifact.unwrap();

        // A permanent one-time level shift: every horizon's coefficient is
        // ≈ 0.8 (the outcome is cumulative from t-1).
        for est in &artifact.horizons {
            assert!(
                (est.coefficient - 0.8).abs() < 0.15,
                "h={} coef={}",
                est.horizon,
                est.coefficient
            );
            assert!(est.ci_lower <= est.coefficient && est.coefficient <= est.ci_upper);
        }
        assert_eq!(artifact.horizons.len(), config.localproj.max_horizon + 1);
        assert!(!artifact.with_regime_interaction);
    }

    #[test]
    fn horizons_are_independent() {
        let panel = lp_panel(300, 7);
        let mut config = RunConfig::new("data", "results");
        let full = estimate(&panel, None, &config).unwrap().artifact.unwrap();

        config.localproj.max_horizon = 6;
        let short = estimate(&panel, None, &config).unwrap().artifact.unwrap();

        // Truncating the horizon range must not change earlier estimates.
        for (a, b) in short.horizons.iter().zip(&full.horizons) {
            assert_eq!(a.horizon, b.horizon);
            assert_eq!(a.coefficient, b.coefficient);
            assert_eq!(a.std_error, b.std_error);
        }
    }

    #[test]
    fn interaction_column_appears_with_a_regime_artifact() {
        let panel = lp_panel(200, 3);
        let config = RunConfig::new("data", "results");

        let artifact = RegimeArtifact {
            observable: "ret_sp500".into(),
            state_means: [-0.02, 0.015],
            state_variances: [4e-4, 1e-4],
            transition: [[0.9, 0.1], [0.05, 0.95]],
            initial: [0.5, 0.5],
            log_likelihood: 0.0,
            iterations: 10,
            bull_state: 1,
            // Bear for the first half, bull after, so the interaction
            // column is not degenerate.
            states: panel
                .months()
                .iter()
                .enumerate()
                .map(|(i, m)| (*m, usize::from(i >= panel.n_rows() / 2)))
                .collect(),
        };

        let outcome = estimate(&panel, Some(&artifact), &config).unwrap();
        let lp = outcome.artifact.unwrap();
        assert!(lp.with_regime_interaction);
        assert!(lp.horizons[0].interaction.is_some());
    }
}
