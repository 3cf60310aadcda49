//! Formatted terminal summaries, one function per stage.
//!
//! Keeping all formatting here keeps the estimators clean and makes output
//! changes localized (important if these summaries ever grow snapshot
//! tests). Reports are plain strings; the app layer prints them.

use crate::config::RunConfig;
use crate::data::RawSeries;
use crate::diagnostics::{AdfResult, JohansenResult};
use crate::models::boost::BoostArtifact;
use crate::models::events::EventStudyArtifact;
use crate::models::localproj::LocalProjArtifact;
use crate::models::regime::RegimeArtifact;
use crate::models::vecm::VecmArtifact;
use crate::panel::MonthlyPanel;

pub fn format_fetch_summary(series: &[RawSeries], shiller_months: Option<usize>) -> String {
    let mut out = String::new();
    out.push_str("=== qes - data fetch ===\n");
    for s in series {
        out.push_str(&format!(
            "  {:<14} [{}:{}]  obs={:<6} span={} .. {}\n",
            s.name,
            s.source.label(),
            s.code,
            s.len(),
            s.first_date().map(|d| d.to_string()).unwrap_or_default(),
            s.last_date().map(|d| d.to_string()).unwrap_or_default(),
        ));
    }
    match shiller_months {
        Some(n) => out.push_str(&format!("  {:<14} [external]  months={n}\n", "shiller")),
        None => out.push_str("  shiller        [external]  skipped (no usable rows)\n"),
    }
    out
}

pub fn format_panel_summary(panel: &MonthlyPanel) -> String {
    let first = panel.months().first().map(|d| d.to_string()).unwrap_or_default();
    let last = panel.months().last().map(|d| d.to_string()).unwrap_or_default();

    let mut out = String::new();
    out.push_str("=== qes - monthly panel ===\n");
    out.push_str(&format!(
        "Months: {} ({first} .. {last})\nColumns: {}\n",
        panel.n_rows(),
        panel.columns().len()
    ));

    // Missing-value summary, worst offenders first.
    let mut missing: Vec<(&str, usize)> = panel
        .columns()
        .iter()
        .map(|(name, values)| (name.as_str(), values.iter().filter(|v| !v.is_finite()).count()))
        .filter(|(_, n)| *n > 0)
        .collect();
    missing.sort_by(|a, b| b.1.cmp(&a.1));
    if missing.is_empty() {
        out.push_str("No missing values.\n");
    } else {
        out.push_str("Missing values:\n");
        for (name, n) in missing {
            let pct = 100.0 * n as f64 / panel.n_rows() as f64;
            out.push_str(&format!("  {name:<18} {n:>4} ({pct:.1}%)\n"));
        }
    }
    out
}

pub fn format_unit_root_table(results: &[AdfResult]) -> String {
    let mut out = String::new();
    out.push_str("=== qes - unit root tests (ADF, constant) ===\n");
    out.push_str(&format!(
        "{:<18} {:>9} {:>5} {:>6}   {:>6} {:>6} {:>6}   verdict\n",
        "series", "stat", "lags", "nobs", "1%", "5%", "10%"
    ));
    for r in results {
        out.push_str(&format!(
            "{:<18} {:>9.3} {:>5} {:>6}   {:>6.2} {:>6.2} {:>6.2}   {}\n",
            r.series,
            r.statistic,
            r.lags,
            r.nobs,
            r.critical[0].1,
            r.critical[1].1,
            r.critical[2].1,
            if r.stationary_5pct { "stationary" } else { "unit root" }
        ));
    }
    out
}

pub fn format_johansen(result: &JohansenResult) -> String {
    let mut out = String::new();
    out.push_str("=== qes - Johansen cointegration test ===\n");
    out.push_str(&format!("Group: {}\n", result.variables.join(", ")));
    out.push_str(&format!(
        "Effective obs: {} | lag order: {}\n\n",
        result.nobs, result.lag_order
    ));
    out.push_str("rank   trace      cv95     max-eig    cv95\n");
    for (t, m) in result.trace.iter().zip(&result.max_eigen) {
        let marker = if t.rejected { "*" } else { " " };
        out.push_str(&format!(
            "<= {}{marker}  {:>8.3} {:>8.3}   {:>8.3} {:>8.3}\n",
            t.rank, t.statistic, t.critical_95, m.statistic, m.critical_95
        ));
    }
    out.push_str(&format!("\nInferred rank: {}\n", result.rank));
    out
}

pub fn format_vecm(artifact: &VecmArtifact, notes: &[String]) -> String {
    let mut out = String::new();
    out.push_str("=== qes - VECM ===\n");
    out.push_str(&format!(
        "Rank: {} | lags: {} | obs: {}\n",
        artifact.rank, artifact.lag_order, artifact.nobs
    ));

    for (rel, row) in artifact.beta.iter().enumerate() {
        let terms: Vec<String> = artifact
            .variables
            .iter()
            .zip(row)
            .map(|(v, c)| format!("{c:+.3}·{v}"))
            .collect();
        out.push_str(&format!("Long-run {rel}: {} = 0\n", terms.join(" ")));
    }
    out.push_str("Adjustment loadings (alpha):\n");
    for (eq, row) in artifact.alpha.iter().enumerate() {
        out.push_str(&format!(
            "  d{:<16} {}\n",
            artifact.variables[eq],
            row.iter().map(|v| format!("{v:+.4}")).collect::<Vec<_>>().join("  ")
        ));
    }

    out.push_str("Residual diagnostics (p-values):\n");
    for (name, tests) in &artifact.diagnostics {
        let rendered: Vec<String> = tests
            .iter()
            .map(|t| format!("{}={:.3}", t.name, t.p_value))
            .collect();
        out.push_str(&format!("  {:<18} {}\n", name, rendered.join("  ")));
    }

    for note in notes {
        out.push_str(&format!("note: {note}\n"));
    }
    out
}

pub fn format_regimes(artifact: &RegimeArtifact) -> String {
    let bull = artifact.bull_state;
    let bear = 1 - bull;
    let n_bear = artifact
        .states
        .iter()
        .filter(|(_, s)| *s != artifact.bull_state)
        .count();

    let mut out = String::new();
    out.push_str("=== qes - regime model (2-state HMM) ===\n");
    out.push_str(&format!(
        "Converged after {} iterations | log-likelihood {:.3}\n",
        artifact.iterations, artifact.log_likelihood
    ));
    out.push_str(&format!(
        "bull: mean={:+.4} sd={:.4} | bear: mean={:+.4} sd={:.4}\n",
        artifact.state_means[bull],
        artifact.state_variances[bull].sqrt(),
        artifact.state_means[bear],
        artifact.state_variances[bear].sqrt(),
    ));
    out.push_str(&format!(
        "P(stay bull)={:.3} P(stay bear)={:.3}\n",
        artifact.transition[bull][bull], artifact.transition[bear][bear]
    ));
    out.push_str(&format!(
        "Decoded months: {} ({} bear)\n",
        artifact.states.len(),
        n_bear
    ));
    out
}

pub fn format_boost(artifact: &BoostArtifact) -> String {
    let mut out = String::new();
    out.push_str("=== qes - boosted trees + attribution ===\n");
    out.push_str(&format!(
        "Trees: {} | train obs: {} | holdout: {}\n",
        artifact.trees.len(),
        artifact.n_train,
        artifact.n_test
    ));
    out.push_str(&format!("Train RMSE: {:.5}", artifact.train_rmse));
    if let Some(test) = artifact.test_rmse {
        out.push_str(&format!(" | test RMSE: {test:.5}"));
    }
    out.push('\n');
    out.push_str("Feature importance (mean |contribution|):\n");
    for (name, value) in &artifact.importance {
        out.push_str(&format!("  {name:<18} {value:.6}\n"));
    }
    out
}

pub fn format_localproj(artifact: &LocalProjArtifact) -> String {
    let mut out = String::new();
    out.push_str("=== qes - local projections ===\n");
    out.push_str(&format!(
        "Shock: {} -> outcome: {} | interaction: {}\n",
        artifact.shock,
        artifact.outcome,
        if artifact.with_regime_interaction { "shock × bear" } else { "none" }
    ));
    out.push_str("  h    coef      se        95% CI            nobs\n");
    for est in &artifact.horizons {
        out.push_str(&format!(
            "{:>4} {:>8.4} {:>8.4}  [{:>7.4}, {:>7.4}]  {:>5}\n",
            est.horizon, est.coefficient, est.std_error, est.ci_lower, est.ci_upper, est.nobs
        ));
    }
    out
}

pub fn format_event_study(artifact: &EventStudyArtifact) -> String {
    let mut out = String::new();
    out.push_str("=== qes - event study (QE announcements) ===\n");
    out.push_str(&format!(
        "{:<22} {:<12} {:>10}\n",
        "event", "date", "CAR"
    ));
    for event in &artifact.per_event {
        out.push_str(&format!(
            "{:<22} {:<12} {:>9.4}%\n",
            event.name,
            event.date.to_string(),
            100.0 * event.car
        ));
    }
    if let Some(last) = artifact.aggregate.last() {
        out.push_str(&format!(
            "\nAverage CAR at offset {:+}: {:.4}% (sd {:.4}%, {} events)\n",
            last.offset,
            100.0 * last.mean_car,
            100.0 * last.dispersion,
            last.n_events
        ));
    }
    out
}

pub fn format_run_header(config: &RunConfig) -> String {
    format!(
        "=== qes - QE & asset valuations pipeline ===\nWindow: {} .. {}\nData: {} | Results: {}\n",
        config.start,
        config.end,
        config.data_dir.display(),
        config.results_dir.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::unit_root::ADF_CRITICAL;

    #[test]
    fn unit_root_table_mentions_verdicts() {
        let results = vec![
            AdfResult {
                series: "log_sp500".into(),
                statistic: -1.1,
                lags: 3,
                nobs: 290,
                critical: ADF_CRITICAL,
                stationary_5pct: false,
            },
            AdfResult {
                series: "ret_sp500".into(),
                statistic: -9.8,
                lags: 0,
                nobs: 298,
                critical: ADF_CRITICAL,
                stationary_5pct: true,
            },
        ];
        let table = format_unit_root_table(&results);
        assert!(table.contains("unit root"));
        assert!(table.contains("stationary"));
    }
}
