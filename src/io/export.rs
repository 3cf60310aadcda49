//! Result-table CSV writers, one per stage output.
//!
//! The tables are meant to be easy to consume in spreadsheets or downstream
//! scripts; every writer is a plain header-then-rows dump with fixed
//! precision.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::diagnostics::{AdfResult, JohansenResult};
use crate::error::AppError;
use crate::models::boost::{BoostArtifact, BoostSample};
use crate::models::events::EventStudyArtifact;
use crate::models::localproj::LocalProjArtifact;
use crate::models::regime::RegimeArtifact;
use crate::models::vecm::VecmArtifact;

fn create(path: &Path) -> Result<File, AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::config(format!("Failed to create '{}': {e}", parent.display()))
        })?;
    }
    File::create(path)
        .map_err(|e| AppError::config(format!("Failed to create '{}': {e}", path.display())))
}

fn io_err(path: &Path, e: std::io::Error) -> AppError {
    AppError::config(format!("Failed to write '{}': {e}", path.display()))
}

/// `unit_root.csv`: one row per tested series.
pub fn write_unit_root_csv(path: &Path, results: &[AdfResult]) -> Result<(), AppError> {
    let mut file = create(path)?;
    writeln!(file, "series,statistic,lags,nobs,crit_1pct,crit_5pct,crit_10pct,stationary_5pct")
        .map_err(|e| io_err(path, e))?;
    for r in results {
        writeln!(
            file,
            "{},{:.4},{},{},{:.2},{:.2},{:.2},{}",
            r.series,
            r.statistic,
            r.lags,
            r.nobs,
            r.critical[0].1,
            r.critical[1].1,
            r.critical[2].1,
            r.stationary_5pct
        )
        .map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

/// `cointegration.csv`: trace and max-eigenvalue tables.
pub fn write_johansen_csv(path: &Path, result: &JohansenResult) -> Result<(), AppError> {
    let mut file = create(path)?;
    writeln!(file, "test,hypothesized_rank,statistic,critical_95,rejected")
        .map_err(|e| io_err(path, e))?;
    for stat in &result.trace {
        writeln!(
            file,
            "trace,{},{:.4},{:.4},{}",
            stat.rank, stat.statistic, stat.critical_95, stat.rejected
        )
        .map_err(|e| io_err(path, e))?;
    }
    for stat in &result.max_eigen {
        writeln!(
            file,
            "max_eigenvalue,{},{:.4},{:.4},{}",
            stat.rank, stat.statistic, stat.critical_95, stat.rejected
        )
        .map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

/// `vecm_coefficients.csv`: long-run vectors and adjustment loadings.
pub fn write_vecm_coefficients_csv(path: &Path, artifact: &VecmArtifact) -> Result<(), AppError> {
    let mut file = create(path)?;
    writeln!(file, "kind,relation,variable,value").map_err(|e| io_err(path, e))?;
    for (rel, row) in artifact.beta.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
            writeln!(file, "beta,{rel},{},{value:.6}", artifact.variables[j])
                .map_err(|e| io_err(path, e))?;
        }
    }
    for (eq, row) in artifact.alpha.iter().enumerate() {
        for (rel, value) in row.iter().enumerate() {
            writeln!(file, "alpha,{rel},{},{value:.6}", artifact.variables[eq])
                .map_err(|e| io_err(path, e))?;
        }
    }
    Ok(())
}

/// `vecm_irf.csv`: the impulse-response surface, long format.
pub fn write_vecm_irf_csv(path: &Path, artifact: &VecmArtifact) -> Result<(), AppError> {
    let mut file = create(path)?;
    writeln!(file, "shock,response,horizon,value").map_err(|e| io_err(path, e))?;
    for point in &artifact.irf {
        writeln!(
            file,
            "{},{},{},{:.8}",
            point.shock, point.response, point.horizon, point.value
        )
        .map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

/// `regimes.csv`: decoded state per month.
pub fn write_regimes_csv(path: &Path, artifact: &RegimeArtifact) -> Result<(), AppError> {
    let mut file = create(path)?;
    writeln!(file, "date,state,label").map_err(|e| io_err(path, e))?;
    for (date, state) in &artifact.states {
        writeln!(file, "{date},{state},{}", artifact.state_label(*state))
            .map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

/// `boost_predictions.csv`: per-month prediction vs. realized target.
pub fn write_boost_predictions_csv(
    path: &Path,
    artifact: &BoostArtifact,
    sample: &BoostSample,
) -> Result<(), AppError> {
    let mut file = create(path)?;
    writeln!(file, "date,split,actual,predicted").map_err(|e| io_err(path, e))?;
    for (i, month) in sample.months.iter().enumerate() {
        let split = if i < artifact.n_train { "train" } else { "test" };
        writeln!(
            file,
            "{month},{split},{:.8},{:.8}",
            sample.target[i],
            artifact.predict(&sample.features[i])
        )
        .map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

/// `boost_attribution.csv`: per-month, per-feature contributions plus the
/// reconciliation columns.
pub fn write_boost_attribution_csv(
    path: &Path,
    artifact: &BoostArtifact,
    sample: &BoostSample,
) -> Result<(), AppError> {
    let mut file = create(path)?;
    let mut header = String::from("date");
    for name in &artifact.feature_names {
        header.push(',');
        header.push_str(name);
    }
    header.push_str(",contribution_sum,prediction_minus_baseline");
    writeln!(file, "{header}").map_err(|e| io_err(path, e))?;

    for (i, month) in sample.months.iter().enumerate() {
        let contributions = artifact.contributions(&sample.features[i]);
        let total: f64 = contributions.iter().sum();
        let gap = artifact.predict(&sample.features[i]) - artifact.baseline;
        let mut row = month.to_string();
        for c in &contributions {
            row.push_str(&format!(",{c:.8}"));
        }
        row.push_str(&format!(",{total:.8},{gap:.8}"));
        writeln!(file, "{row}").map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

/// `local_projections.csv`: the impulse-response profile.
pub fn write_localproj_csv(path: &Path, artifact: &LocalProjArtifact) -> Result<(), AppError> {
    let mut file = create(path)?;
    writeln!(file, "horizon,coefficient,std_error,ci_lower,ci_upper,interaction,nobs")
        .map_err(|e| io_err(path, e))?;
    for est in &artifact.horizons {
        writeln!(
            file,
            "{},{:.6},{:.6},{:.6},{:.6},{},{}",
            est.horizon,
            est.coefficient,
            est.std_error,
            est.ci_lower,
            est.ci_upper,
            est.interaction.map(|v| format!("{v:.6}")).unwrap_or_default(),
            est.nobs
        )
        .map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

/// `event_study.csv`: per-event CARs followed by the aggregate profile.
pub fn write_event_study_csv(path: &Path, artifact: &EventStudyArtifact) -> Result<(), AppError> {
    let mut file = create(path)?;
    writeln!(file, "section,event,date,offset,value,dispersion,n")
        .map_err(|e| io_err(path, e))?;
    for event in &artifact.per_event {
        for (i, offset) in artifact.offsets.iter().enumerate() {
            writeln!(
                file,
                "event,{},{},{offset},{:.8},,",
                event.name, event.date, event.car_path[i]
            )
            .map_err(|e| io_err(path, e))?;
        }
    }
    for summary in &artifact.aggregate {
        writeln!(
            file,
            "aggregate,,,{},{:.8},{:.8},{}",
            summary.offset, summary.mean_car, summary.dispersion, summary.n_events
        )
        .map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::unit_root::ADF_CRITICAL;

    #[test]
    fn unit_root_table_renders_one_row_per_series() {
        let dir = std::env::temp_dir().join(format!("qes_export_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("unit_root.csv");

        let results = vec![AdfResult {
            series: "log_sp500".into(),
            statistic: -1.23,
            lags: 2,
            nobs: 300,
            critical: ADF_CRITICAL,
            stationary_5pct: false,
        }];
        write_unit_root_csv(&path, &results).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("log_sp500,-1.2300,2,300"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
