//! Monthly aggregation: collapse heterogeneous-frequency raw series onto a
//! single month-end index and merge them into one panel.
//!
//! Policy, per series:
//! - sub-monthly series are forward-filled over intra-month gaps and then
//!   collapsed to month-end (last value or calendar-month average);
//! - quarterly series additionally forward-fill across the months of each
//!   quarter, through the end of the panel;
//! - months at either edge of the window where the base equity series has no
//!   data are dropped, never imputed.
//!
//! Aggregation is deterministic: identical raw inputs produce an identical
//! panel, which is what makes the persisted CSV/Parquet pair trustworthy as
//! a re-entry point for later stages.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::config::{MonthlyAgg, RunConfig, SeriesSpec};
use crate::data::RawSeries;
use crate::data::shiller::ShillerDataset;
use crate::error::AppError;
use crate::panel::{MonthlyPanel, month_end, next_month_end, transform};

/// Everything the aggregation stage consumes.
pub struct PanelInputs {
    pub series: Vec<(SeriesSpec, RawSeries)>,
    pub shiller: Option<ShillerDataset>,
}

/// Collapse observations to one value per month-end.
///
/// With [`MonthlyAgg::Last`] the last observation at or before each month-end
/// is used, which both picks the closing value of observed months and carries
/// values across months with no observations (the forward-fill step of the
/// aggregation policy). With [`MonthlyAgg::Mean`] only observed months get a
/// value.
pub fn resample_monthly(obs: &[(NaiveDate, f64)], agg: MonthlyAgg) -> Vec<(NaiveDate, f64)> {
    let (Some(&(first, _)), Some(&(last, _))) = (obs.first(), obs.last()) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut cursor = 0usize;
    let mut carried = f64::NAN;
    let mut month = month_end(first);
    let stop = month_end(last);

    loop {
        let mut in_month_sum = 0.0;
        let mut in_month_n = 0usize;
        while cursor < obs.len() && obs[cursor].0 <= month {
            carried = obs[cursor].1;
            in_month_sum += obs[cursor].1;
            in_month_n += 1;
            cursor += 1;
        }
        match agg {
            MonthlyAgg::Last => {
                if carried.is_finite() {
                    out.push((month, carried));
                }
            }
            MonthlyAgg::Mean => {
                if in_month_n > 0 {
                    out.push((month, in_month_sum / in_month_n as f64));
                }
            }
        }
        if month == stop {
            break;
        }
        month = next_month_end(month);
    }

    out
}

/// Build the monthly panel from raw inputs and derive the transformed
/// variable set.
pub fn build_panel(inputs: &PanelInputs, config: &RunConfig) -> Result<MonthlyPanel, AppError> {
    let base = inputs
        .series
        .iter()
        .find(|(spec, _)| spec.name == "sp500")
        .ok_or_else(|| {
            AppError::config("The sp500 series is required as the panel base; run `qes fetch`.")
        })?;

    let window_start = month_end(config.start);
    let window_end = month_end(config.end);

    // The base index: months where the equity series actually has data,
    // clipped to the window. Edges outside the data are dropped here.
    let base_monthly = resample_monthly(&base.1.observations, base.0.agg);
    let months: Vec<NaiveDate> = base_monthly
        .iter()
        .map(|(d, _)| *d)
        .filter(|d| *d >= window_start && *d <= window_end)
        .collect();
    if months.is_empty() {
        return Err(AppError::insufficient(
            "No sp500 observations inside the sample window.",
        ));
    }

    let mut panel = MonthlyPanel::new(months.clone(), Vec::new())?;

    for (spec, raw) in &inputs.series {
        let resampled = resample_monthly(&raw.observations, spec.agg);
        let by_month: HashMap<NaiveDate, f64> = resampled.iter().copied().collect();

        let mut values: Vec<f64> = months
            .iter()
            .map(|m| by_month.get(m).copied().unwrap_or(f64::NAN))
            .collect();

        if spec.quarterly {
            forward_fill(&mut values);
        }

        panel.add_column(spec.name, values)?;
    }

    if let Some(shiller) = &inputs.shiller {
        for (name, series) in [
            ("shiller_price", &shiller.price),
            ("shiller_dividend", &shiller.dividend),
            ("earnings", &shiller.earnings),
            ("cape", &shiller.cape),
        ] {
            if series.is_empty() {
                continue;
            }
            let by_month: HashMap<NaiveDate, f64> = series.iter().copied().collect();
            let values: Vec<f64> = months
                .iter()
                .map(|m| by_month.get(m).copied().unwrap_or(f64::NAN))
                .collect();
            panel.add_column(name, values)?;
        }
    }

    transform::derive_all(&mut panel)?;
    Ok(panel)
}

/// Carry the last finite value forward; leading missing entries stay `NaN`.
fn forward_fill(values: &mut [f64]) {
    let mut last = f64::NAN;
    for v in values.iter_mut() {
        if v.is_finite() {
            last = *v;
        } else if last.is_finite() {
            *v = last;
        }
    }
}
