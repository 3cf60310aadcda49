//! Stage orchestration.
//!
//! The pipeline is strictly sequential: fetch → panel → diagnostics →
//! estimators. Every stage persists its outputs and every later stage reads
//! only persisted files, which is what makes each stage an idempotent
//! re-entry point: a partial run resumes by re-invoking the next stage, no
//! checkpointing machinery involved.
//!
//! Error policy per the taxonomy: retrieval failures abort (no partial
//! panel); estimation failures (no cointegration, EM divergence, thin
//! samples) surface as notes and skip that model's outputs only.

use crate::config::{self, DataSource, RunConfig};
use crate::data::shiller::ShillerDataset;
use crate::data::{FredClient, RawSeries, YahooClient, read_series, shiller, write_series};
use crate::diagnostics::{AdfResult, JohansenResult, adf_test, johansen_test};
use crate::error::AppError;
use crate::io::{artifact, export};
use crate::models::regime::RegimeArtifact;
use crate::models::{boost, events, localproj, regime, vecm};
use crate::panel::aggregate::{PanelInputs, build_panel};
use crate::panel::{MonthlyPanel, snapshot};
use nalgebra::DMatrix;

/// Fetch every configured series and persist the raw CSVs.
pub fn run_fetch(config: &RunConfig) -> Result<(Vec<RawSeries>, Option<usize>), AppError> {
    config.ensure_dirs()?;

    let yahoo = YahooClient::new();
    let fred = FredClient::from_env()?;

    let mut fetched = Vec::new();
    for spec in config::all_series() {
        let observations = match spec.source {
            DataSource::Yahoo => yahoo.fetch_daily_closes(spec.code, config.start, config.end)?,
            DataSource::Fred => fred.fetch_series(spec.code, config.start, config.end)?,
            DataSource::External => continue,
        };
        let series = RawSeries::new(spec.name, spec.source, spec.code, observations);
        write_series(&config.raw_series_path(&spec), &series)?;
        fetched.push(series);
    }

    // The Shiller dataset is optional enrichment: a failed download is
    // reported but does not abort the run, matching the original study's
    // tolerance for the external file.
    let shiller_months = match shiller::fetch(&config.shiller_url, config.start, config.end) {
        Ok(data) => {
            shiller::write_csv(&config.shiller_path(), &data)?;
            Some(data.n_months())
        }
        Err(e) => {
            eprintln!("warning: Shiller dataset skipped: {e}");
            None
        }
    };

    Ok((fetched, shiller_months))
}

/// Build the monthly panel from persisted raw series and snapshot it.
pub fn run_panel(config: &RunConfig) -> Result<MonthlyPanel, AppError> {
    config.ensure_dirs()?;

    let mut series = Vec::new();
    for spec in config::all_series() {
        let path = config.raw_series_path(&spec);
        if !path.exists() {
            return Err(AppError::config(format!(
                "Raw series '{}' not found at '{}'; run `qes fetch` first.",
                spec.name,
                path.display()
            )));
        }
        series.push((spec, read_series(&path, spec.source)?));
    }

    let shiller_path = config.shiller_path();
    let shiller: Option<ShillerDataset> = if shiller_path.exists() {
        Some(shiller::read_csv(&shiller_path)?)
    } else {
        None
    };

    let panel = build_panel(&PanelInputs { series, shiller }, config)?;
    snapshot::write_csv(&config.panel_csv_path(), &panel)?;
    snapshot::write_parquet(&config.panel_parquet_path(), &panel)?;
    Ok(panel)
}

/// Load the persisted panel (Parquet preferred, CSV fallback).
pub fn load_panel(config: &RunConfig) -> Result<MonthlyPanel, AppError> {
    let parquet = config.panel_parquet_path();
    if parquet.exists() {
        return snapshot::read_parquet(&parquet);
    }
    let csv = config.panel_csv_path();
    if csv.exists() {
        return snapshot::read_csv(&csv);
    }
    Err(AppError::config(
        "No persisted panel found; run `qes panel` first.",
    ))
}

/// Unit-root tests plus the Johansen rank test; both written as tables.
pub fn run_diagnostics(
    config: &RunConfig,
    panel: &MonthlyPanel,
) -> Result<(Vec<AdfResult>, Option<JohansenResult>, Vec<String>), AppError> {
    config.ensure_dirs()?;
    let mut notes = Vec::new();

    let mut adf_results = Vec::new();
    for name in config::UNIT_ROOT_TARGETS {
        let Some(values) = panel.column(name) else {
            notes.push(format!("unit root: column '{name}' missing; skipped."));
            continue;
        };
        match adf_test(*name, values) {
            Ok(result) => adf_results.push(result),
            Err(e) => notes.push(format!("unit root '{name}': {e}")),
        }
    }
    export::write_unit_root_csv(&config.tables_dir().join("unit_root.csv"), &adf_results)?;

    let johansen = match johansen_group(config, panel) {
        Ok(result) => {
            export::write_johansen_csv(&config.tables_dir().join("cointegration.csv"), &result)?;
            Some(result)
        }
        Err(e) => {
            notes.push(format!("cointegration test skipped: {e}"));
            None
        }
    };

    Ok((adf_results, johansen, notes))
}

fn johansen_group(config: &RunConfig, panel: &MonthlyPanel) -> Result<JohansenResult, AppError> {
    let names: Vec<String> = config::COINTEGRATION_GROUP.iter().map(|s| s.to_string()).collect();
    let columns: Vec<&[f64]> = names
        .iter()
        .map(|n| panel.require_column(n))
        .collect::<Result<_, _>>()?;

    // Complete rows only; the group is forward-filled so gaps sit at edges.
    let rows: Vec<usize> = (0..panel.n_rows())
        .filter(|&t| columns.iter().all(|c| c[t].is_finite()))
        .collect();
    if rows.len() < 3 * names.len() * config.vecm.lag_order {
        return Err(AppError::insufficient(
            "Too few complete rows for the cointegration group.",
        ));
    }
    let levels = DMatrix::from_fn(rows.len(), names.len(), |t, j| columns[j][rows[t]]);
    johansen_test(&names, &levels, config.vecm.lag_order)
}

/// VECM stage: rank test, fit, IRFs, artifacts.
pub fn run_vecm(config: &RunConfig, panel: &MonthlyPanel) -> Result<vecm::VecmOutcome, AppError> {
    config.ensure_dirs()?;
    let outcome = vecm::estimate(panel, config)?;
    if let Some(artifact_data) = &outcome.artifact {
        artifact::write_json(&config.models_dir().join("vecm.json"), artifact_data)?;
        export::write_vecm_coefficients_csv(
            &config.tables_dir().join("vecm_coefficients.csv"),
            artifact_data,
        )?;
        export::write_vecm_irf_csv(&config.tables_dir().join("vecm_irf.csv"), artifact_data)?;
    }
    Ok(outcome)
}

/// Regime stage: EM fit, Viterbi decode, artifacts.
pub fn run_regimes(
    config: &RunConfig,
    panel: &MonthlyPanel,
) -> Result<regime::RegimeOutcome, AppError> {
    config.ensure_dirs()?;
    let outcome = regime::estimate(panel, config)?;
    if let Some(artifact_data) = &outcome.artifact {
        artifact::write_json(&config.models_dir().join("regimes.json"), artifact_data)?;
        export::write_regimes_csv(&config.tables_dir().join("regimes.csv"), artifact_data)?;
    }
    Ok(outcome)
}

/// Boosted-tree stage: fit, holdout evaluation, attribution tables.
pub fn run_boost(config: &RunConfig, panel: &MonthlyPanel) -> Result<boost::BoostOutcome, AppError> {
    config.ensure_dirs()?;
    let outcome = boost::estimate(panel, config)?;
    if let Some(artifact_data) = &outcome.artifact {
        artifact::write_json(&config.models_dir().join("boost.json"), artifact_data)?;
        export::write_boost_predictions_csv(
            &config.tables_dir().join("boost_predictions.csv"),
            artifact_data,
            &outcome.sample,
        )?;
        export::write_boost_attribution_csv(
            &config.tables_dir().join("boost_attribution.csv"),
            artifact_data,
            &outcome.sample,
        )?;
    }
    Ok(outcome)
}

/// Local-projection stage; uses the persisted regime decode when present.
pub fn run_localproj(
    config: &RunConfig,
    panel: &MonthlyPanel,
) -> Result<localproj::LocalProjOutcome, AppError> {
    config.ensure_dirs()?;
    let regimes: Option<RegimeArtifact> =
        artifact::read_json_optional(&config.models_dir().join("regimes.json"))?;
    let outcome = localproj::estimate(panel, regimes.as_ref(), config)?;
    if let Some(artifact_data) = &outcome.artifact {
        artifact::write_json(&config.models_dir().join("localproj.json"), artifact_data)?;
        export::write_localproj_csv(
            &config.tables_dir().join("local_projections.csv"),
            artifact_data,
        )?;
    }
    Ok(outcome)
}

/// Event-study stage; reads the *daily* equity series from data/raw.
pub fn run_events(config: &RunConfig) -> Result<events::EventStudyOutcome, AppError> {
    config.ensure_dirs()?;
    let spec = config::series_by_name("sp500")
        .ok_or_else(|| AppError::config("sp500 missing from the series table."))?;
    let path = config.raw_series_path(&spec);
    if !path.exists() {
        return Err(AppError::config(format!(
            "Daily sp500 series not found at '{}'; run `qes fetch` first.",
            path.display()
        )));
    }
    let daily = read_series(&path, spec.source)?;

    let outcome = events::estimate(&daily.observations, config)?;
    if let Some(artifact_data) = &outcome.artifact {
        artifact::write_json(&config.models_dir().join("event_study.json"), artifact_data)?;
        export::write_event_study_csv(
            &config.tables_dir().join("event_study.csv"),
            artifact_data,
        )?;
    }
    Ok(outcome)
}
