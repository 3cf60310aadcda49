//! Event study around QE announcement dates.
//!
//! Works on the *daily* equity series, not the monthly panel: announcement
//! effects live at daily resolution. For each event the pre-event
//! estimation window fixes a baseline mean daily log return; abnormal
//! returns inside the event window are actual minus baseline, cumulated by
//! trading-day offset. Events whose windows fall outside the data are
//! skipped with a note. The aggregate profile is the cross-event mean CAR
//! per offset with the cross-event standard deviation as the dispersion
//! measure.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::{EVENTS, RunConfig};
use crate::error::AppError;
use crate::math::stats;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResult {
    pub name: String,
    pub date: NaiveDate,
    /// Mean daily log return over the estimation window.
    pub baseline: f64,
    /// Cumulative abnormal return at the end of the event window.
    pub car: f64,
    /// CAR by trading-day offset, ordered as offsets.
    pub car_path: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetSummary {
    pub offset: i64,
    pub mean_car: f64,
    /// Cross-event standard deviation.
    pub dispersion: f64,
    pub n_events: usize,
}

/// Event-study output, persisted to `results/models/event_study.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStudyArtifact {
    pub per_event: Vec<EventResult>,
    pub offsets: Vec<i64>,
    pub aggregate: Vec<OffsetSummary>,
}

pub struct EventStudyOutcome {
    pub artifact: Option<EventStudyArtifact>,
    pub notes: Vec<String>,
}

/// Run the study on a daily price series (ascending dates).
pub fn estimate(
    daily_prices: &[(NaiveDate, f64)],
    config: &RunConfig,
) -> Result<EventStudyOutcome, AppError> {
    if daily_prices.len() < 300 {
        return Err(AppError::insufficient(
            "Daily price series is too short for an event study.",
        ));
    }

    // Daily log returns, indexed by trading day.
    let mut dates = Vec::with_capacity(daily_prices.len() - 1);
    let mut returns = Vec::with_capacity(daily_prices.len() - 1);
    for w in daily_prices.windows(2) {
        let (prev, curr) = (w[0], w[1]);
        if prev.1 > 0.0 && curr.1 > 0.0 {
            dates.push(curr.0);
            returns.push((curr.1 / prev.1).ln());
        }
    }

    let (est_lo, est_hi) = config.event_study.estimation_window;
    let (ev_lo, ev_hi) = config.event_study.event_window;
    let offsets: Vec<i64> = (ev_lo..=ev_hi).collect();

    let mut notes = Vec::new();
    let mut per_event = Vec::new();

    for event in EVENTS {
        let event_date = event.date();
        // First trading day at or after the announcement.
        let Some(pos) = dates.iter().position(|d| *d >= event_date) else {
            notes.push(format!("{}: after the end of the data; skipped.", event.name));
            continue;
        };
        let pos = pos as i64;
        let lo = pos + est_lo;
        let hi = pos + ev_hi;
        if lo < 0 || hi >= returns.len() as i64 {
            notes.push(format!(
                "{}: window [{est_lo}, {ev_hi}] falls outside the data; skipped.",
                event.name
            ));
            continue;
        }

        let est_slice = &returns[(pos + est_lo) as usize..=(pos + est_hi) as usize];
        let baseline = stats::mean(est_slice);

        let mut car = 0.0;
        let mut car_path = Vec::with_capacity(offsets.len());
        for &offset in &offsets {
            let r = returns[(pos + offset) as usize];
            car += r - baseline;
            car_path.push(car);
        }

        per_event.push(EventResult {
            name: event.name.to_string(),
            date: event_date,
            baseline,
            car,
            car_path,
        });
    }

    if per_event.is_empty() {
        notes.push("No event had a complete window; event study skipped.".to_string());
        return Ok(EventStudyOutcome {
            artifact: None,
            notes,
        });
    }

    let aggregate = offsets
        .iter()
        .enumerate()
        .map(|(i, &offset)| {
            let cars: Vec<f64> = per_event.iter().map(|e| e.car_path[i]).collect();
            OffsetSummary {
                offset,
                mean_car: stats::mean(&cars),
                dispersion: if cars.len() > 1 { stats::variance(&cars).sqrt() } else { 0.0 },
                n_events: cars.len(),
            }
        })
        .collect();

    Ok(EventStudyOutcome {
        artifact: Some(EventStudyArtifact {
            per_event,
            offsets,
            aggregate,
        }),
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_distr::Normal;

    /// Daily series over 2007–2024 with a +5% jump injected on the first
    /// trading day at/after each QE event date.
    fn daily_series(seed: u64, jump: f64) -> Vec<(NaiveDate, f64)> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 0.005).unwrap();
        let event_dates: Vec<NaiveDate> = EVENTS.iter().map(|e| e.date()).collect();

        let mut out = Vec::new();
        let mut price: f64 = 1000.0;
        let mut d = NaiveDate::from_ymd_opt(2007, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let mut pending_jump = false;
        while d <= end {
            use chrono::Datelike;
            let is_weekend = matches!(d.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun);
            if event_dates.contains(&d) {
                pending_jump = true;
            }
            if !is_weekend {
                let mut r = normal.sample(&mut rng);
                if pending_jump {
                    r += jump;
                    pending_jump = false;
                }
                price *= r.exp();
                out.push((d, price));
            }
            d += chrono::Duration::days(1);
        }
        out
    }

    #[test]
    fn injected_jumps_show_up_as_positive_average_car() {
        let config = RunConfig::new("data", "results");
        let outcome = estimate(&daily_series(42, 0.05), &config).unwrap();
        let artifact = outcome.artifact.unwrap();

        assert!(artifact.per_event.len() >= 8);
        let last = artifact.aggregate.last().unwrap();
        assert!(
            last.mean_car > 0.03,
            "mean CAR at final offset: {}",
            last.mean_car
        );
        // CAR at the last pre-event offset should still be near zero.
        let pre = &artifact.aggregate[0];
        assert!(pre.mean_car.abs() < 0.02);
    }

    #[test]
    fn no_jump_means_no_systematic_effect() {
        let config = RunConfig::new("data", "results");
        let outcome = estimate(&daily_series(7, 0.0), &config).unwrap();
        let artifact = outcome.artifact.unwrap();
        let last = artifact.aggregate.last().unwrap();
        assert!(last.mean_car.abs() < 0.03);
    }

    #[test]
    fn events_outside_the_data_are_skipped_with_notes() {
        // Series ends in 2010: the later events cannot be evaluated.
        let full = daily_series(3, 0.0);
        let cutoff = NaiveDate::from_ymd_opt(2010, 12, 31).unwrap();
        let truncated: Vec<_> = full.into_iter().filter(|(d, _)| *d <= cutoff).collect();

        let config = RunConfig::new("data", "results");
        let outcome = estimate(&truncated, &config).unwrap();
        assert!(!outcome.notes.is_empty());
        let artifact = outcome.artifact.unwrap();
        assert!(artifact.per_event.len() < EVENTS.len());
    }
}
