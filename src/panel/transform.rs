//! Derived variables: logs, differences, growth rates and the curve slope.
//!
//! Transforms are deterministic functions of base columns and are re-derived
//! every time the panel is built; they are never the source of truth. Domain
//! errors (log of a non-positive value) produce `NaN` at that observation and
//! are otherwise non-fatal.

use crate::error::AppError;
use crate::panel::MonthlyPanel;

/// Natural log; non-positive or missing input yields `NaN`.
pub fn log_series(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|&v| if v.is_finite() && v > 0.0 { v.ln() } else { f64::NAN })
        .collect()
}

/// First difference; the first observation (and any with a missing operand)
/// is `NaN`.
pub fn diff(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for t in 1..values.len() {
        out[t] = values[t] - values[t - 1];
    }
    out
}

/// Elementwise difference of two columns (`a - b`).
pub fn spread(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(&x, &y)| x - y).collect()
}

/// Append the full derived-variable set to a freshly merged panel.
///
/// A derivation whose base column is absent is skipped (the Shiller columns
/// are optional), mirroring how the panel degrades when an optional source
/// is not configured. The returned list names the columns actually added.
pub fn derive_all(panel: &mut MonthlyPanel) -> Result<Vec<String>, AppError> {
    let mut added = Vec::new();

    // Logs of strictly positive level series.
    for (base, log_name) in [
        ("sp500", "log_sp500"),
        ("fed_balance", "log_balance"),
        ("gdp_nominal", "log_gdp"),
        ("earnings", "log_earnings"),
    ] {
        if let Some(values) = panel.column(base) {
            let logged = log_series(values);
            panel.add_column(log_name, logged)?;
            added.push(log_name.to_string());
        }
    }

    // Log-differences: monthly equity return and balance-sheet growth.
    for (base, diff_name) in [("log_sp500", "ret_sp500"), ("log_balance", "growth_balance")] {
        if let Some(values) = panel.column(base) {
            let d = diff(values);
            panel.add_column(diff_name, d)?;
            added.push(diff_name.to_string());
        }
    }

    // Simple differences for series already in percent / points.
    for (base, diff_name) in [
        ("vix", "delta_vix"),
        ("ff_rate", "delta_ff"),
        ("spread_bbb", "delta_spread"),
    ] {
        if let Some(values) = panel.column(base) {
            let d = diff(values);
            panel.add_column(diff_name, d)?;
            added.push(diff_name.to_string());
        }
    }

    // Term-structure slope and its monthly change.
    if let (Some(long), Some(short)) = (panel.column("treasury_10y"), panel.column("treasury_2y")) {
        let slope = spread(long, short);
        let d = diff(&slope);
        panel.add_column("slope_curve", slope)?;
        panel.add_column("delta_slope", d)?;
        added.push("slope_curve".to_string());
        added.push("delta_slope".to_string());
    }

    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::{month_end, next_month_end};
    use chrono::NaiveDate;

    #[test]
    fn log_of_non_positive_is_nan_not_error() {
        let out = log_series(&[1.0, 0.0, -3.0, f64::NAN, std::f64::consts::E]);
        assert!((out[0] - 0.0).abs() < 1e-12);
        assert!(out[1].is_nan());
        assert!(out[2].is_nan());
        assert!(out[3].is_nan());
        assert!((out[4] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn diff_propagates_missing_values() {
        let out = diff(&[1.0, 3.0, f64::NAN, 7.0]);
        assert!(out[0].is_nan());
        assert!((out[1] - 2.0).abs() < 1e-12);
        assert!(out[2].is_nan());
        assert!(out[3].is_nan());
    }

    #[test]
    fn derive_all_builds_slope_and_returns() {
        let mut m = month_end(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let mut months = Vec::new();
        for _ in 0..3 {
            months.push(m);
            m = next_month_end(m);
        }
        let mut panel = MonthlyPanel::new(
            months,
            vec![
                ("sp500".into(), vec![100.0, 110.0, 121.0]),
                ("treasury_10y".into(), vec![3.0, 3.2, 3.1]),
                ("treasury_2y".into(), vec![2.0, 2.5, 2.9]),
            ],
        )
        .unwrap();

        let added = derive_all(&mut panel).unwrap();
        assert!(added.iter().any(|c| c == "ret_sp500"));
        let ret = panel.column("ret_sp500").unwrap();
        assert!((ret[1] - (110.0f64 / 100.0).ln()).abs() < 1e-12);
        let slope = panel.column("slope_curve").unwrap();
        assert!((slope[2] - 0.2).abs() < 1e-12);
    }
}
