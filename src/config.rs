//! Run configuration.
//!
//! Everything a stage needs (paths, sample window, series tables, model
//! parameters, event dates) lives in one explicit [`RunConfig`] value that the
//! orchestrator hands to each stage. There is no ambient/global state; a test
//! can build a config pointing at a temp directory and run any stage in
//! isolation.

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::AppError;

/// Where a raw series comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// FRED observations API (needs `FRED_API_KEY`).
    Fred,
    /// Yahoo Finance chart API (no key).
    Yahoo,
    /// Published historical dataset fetched from a plain URL.
    External,
}

impl DataSource {
    pub fn label(self) -> &'static str {
        match self {
            DataSource::Fred => "fred",
            DataSource::Yahoo => "yahoo",
            DataSource::External => "external",
        }
    }
}

/// How a sub-monthly series is collapsed onto the month-end index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthlyAgg {
    /// Last observation of the calendar month (stocks, levels, rates).
    Last,
    /// Calendar-month average (flows).
    Mean,
}

/// One entry of the data-source table.
#[derive(Debug, Clone, Copy)]
pub struct SeriesSpec {
    /// Column name in the monthly panel.
    pub name: &'static str,
    /// Source identifier (FRED code or Yahoo ticker).
    pub code: &'static str,
    pub source: DataSource,
    pub agg: MonthlyAgg,
    /// Quarterly series are forward-filled across the months of each quarter.
    pub quarterly: bool,
}

/// FRED series, fetched at native frequency.
pub const FRED_SERIES: &[SeriesSpec] = &[
    SeriesSpec {
        name: "fed_balance",
        code: "WALCL",
        source: DataSource::Fred,
        agg: MonthlyAgg::Last,
        quarterly: false,
    },
    SeriesSpec {
        name: "ff_rate",
        code: "DFF",
        source: DataSource::Fred,
        agg: MonthlyAgg::Last,
        quarterly: false,
    },
    SeriesSpec {
        name: "treasury_2y",
        code: "DGS2",
        source: DataSource::Fred,
        agg: MonthlyAgg::Last,
        quarterly: false,
    },
    SeriesSpec {
        name: "treasury_10y",
        code: "DGS10",
        source: DataSource::Fred,
        agg: MonthlyAgg::Last,
        quarterly: false,
    },
    SeriesSpec {
        name: "spread_bbb",
        code: "BAMLC0A4CBBB",
        source: DataSource::Fred,
        agg: MonthlyAgg::Last,
        quarterly: false,
    },
    SeriesSpec {
        name: "gdp_nominal",
        code: "GDP",
        source: DataSource::Fred,
        agg: MonthlyAgg::Last,
        quarterly: true,
    },
];

/// Yahoo Finance tickers (daily adjusted closes).
pub const YAHOO_SERIES: &[SeriesSpec] = &[
    SeriesSpec {
        name: "sp500",
        code: "^GSPC",
        source: DataSource::Yahoo,
        agg: MonthlyAgg::Last,
        quarterly: false,
    },
    SeriesSpec {
        name: "vix",
        code: "^VIX",
        source: DataSource::Yahoo,
        agg: MonthlyAgg::Last,
        quarterly: false,
    },
];

/// Default URL for the CSV rendition of the Shiller dataset.
pub const SHILLER_CSV_URL: &str =
    "https://datahub.io/core/s-and-p-500/r/data.csv";

/// A dated policy event for the event study.
#[derive(Debug, Clone, Copy)]
pub struct EventSpec {
    pub name: &'static str,
    ymd: (i32, u32, u32),
}

impl EventSpec {
    pub fn date(&self) -> NaiveDate {
        let (y, m, d) = self.ymd;
        // The table below is static and only contains valid dates.
        NaiveDate::from_ymd_opt(y, m, d).expect("event table holds valid dates")
    }
}

/// QE announcements and related policy events.
pub const EVENTS: &[EventSpec] = &[
    EventSpec { name: "QE1_announcement", ymd: (2008, 11, 25) },
    EventSpec { name: "QE2_announcement", ymd: (2010, 11, 3) },
    EventSpec { name: "Operation_Twist", ymd: (2011, 9, 21) },
    EventSpec { name: "QE3_announcement", ymd: (2012, 9, 13) },
    EventSpec { name: "Taper_tantrum", ymd: (2013, 5, 22) },
    EventSpec { name: "Taper_begins", ymd: (2013, 12, 18) },
    EventSpec { name: "COVID_crisis", ymd: (2020, 3, 11) },
    EventSpec { name: "COVID_QE_unlimited", ymd: (2020, 3, 15) },
    EventSpec { name: "First_rate_hike", ymd: (2022, 3, 16) },
    EventSpec { name: "SVB_collapse", ymd: (2023, 3, 10) },
];

/// Series tested for unit roots in the diagnostics stage.
pub const UNIT_ROOT_TARGETS: &[&str] = &[
    "log_sp500",
    "log_balance",
    "log_gdp",
    "ret_sp500",
    "growth_balance",
    "slope_curve",
];

/// Variable group for the Johansen rank test and the VECM.
pub const COINTEGRATION_GROUP: &[&str] = &["log_sp500", "log_balance", "log_gdp"];

/// Feature set for the boosted-tree model (fixed monthly deltas).
pub const BOOST_FEATURES: &[&str] = &[
    "growth_balance",
    "delta_ff",
    "delta_slope",
    "delta_spread",
    "delta_vix",
];

/// VECM settings.
#[derive(Debug, Clone, Copy)]
pub struct VecmParams {
    /// Lag order in differences.
    pub lag_order: usize,
    /// IRF horizon in months.
    pub irf_horizon: usize,
}

/// Two-state regime model settings.
#[derive(Debug, Clone, Copy)]
pub struct HmmParams {
    pub max_iter: usize,
    /// Convergence tolerance on the log-likelihood increment.
    pub tol: f64,
    /// Seed for any randomized restarts; the default initialization is
    /// deterministic so decoded regimes are reproducible run-to-run.
    pub seed: u64,
}

/// Boosted-tree settings (values carried over from the study design).
#[derive(Debug, Clone, Copy)]
pub struct BoostParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Row fraction sampled per tree.
    pub subsample: f64,
    /// Feature fraction sampled per tree.
    pub colsample: f64,
    pub min_leaf: usize,
    pub seed: u64,
    /// Chronological holdout: the last `test_size` usable months.
    pub test_size: usize,
}

/// Local-projection settings.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjParams {
    /// Horizons 0..=max_horizon, one independent regression each.
    pub max_horizon: usize,
}

/// Event-study windows, in trading days relative to the event.
#[derive(Debug, Clone, Copy)]
pub struct EventStudyParams {
    pub estimation_window: (i64, i64),
    pub event_window: (i64, i64),
}

/// Full run configuration handed to every stage.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
    /// Sample window (inclusive).
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub shiller_url: String,
    pub vecm: VecmParams,
    pub hmm: HmmParams,
    pub boost: BoostParams,
    pub localproj: LocalProjParams,
    pub event_study: EventStudyParams,
}

impl RunConfig {
    pub fn new(data_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            results_dir: results_dir.into(),
            start: NaiveDate::from_ymd_opt(2000, 1, 1).expect("valid date"),
            end: NaiveDate::from_ymd_opt(2025, 12, 31).expect("valid date"),
            shiller_url: SHILLER_CSV_URL.to_string(),
            vecm: VecmParams {
                lag_order: 2,
                irf_horizon: 24,
            },
            hmm: HmmParams {
                max_iter: 1000,
                tol: 1e-6,
                seed: 42,
            },
            boost: BoostParams {
                n_trees: 100,
                max_depth: 3,
                learning_rate: 0.1,
                subsample: 0.8,
                colsample: 0.8,
                min_leaf: 1,
                seed: 42,
                test_size: 24,
            },
            localproj: LocalProjParams { max_horizon: 24 },
            event_study: EventStudyParams {
                estimation_window: (-120, -21),
                event_window: (-5, 20),
            },
        }
    }

    /// Raw series fetched at native frequency.
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    /// Externally published datasets (Shiller).
    pub fn external_dir(&self) -> PathBuf {
        self.data_dir.join("external")
    }

    /// The monthly panel and its snapshots.
    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.results_dir.join("tables")
    }

    pub fn figures_dir(&self) -> PathBuf {
        self.results_dir.join("figures")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.results_dir.join("models")
    }

    pub fn panel_csv_path(&self) -> PathBuf {
        self.processed_dir().join("monthly_panel.csv")
    }

    pub fn panel_parquet_path(&self) -> PathBuf {
        self.processed_dir().join("monthly_panel.parquet")
    }

    pub fn raw_series_path(&self, spec: &SeriesSpec) -> PathBuf {
        match spec.source {
            DataSource::Fred | DataSource::Yahoo => self
                .raw_dir()
                .join(format!("{}_{}.csv", spec.source.label(), spec.name)),
            DataSource::External => self.external_dir().join(format!("{}.csv", spec.name)),
        }
    }

    pub fn shiller_path(&self) -> PathBuf {
        self.external_dir().join("shiller.csv")
    }

    /// Create the directory layout (idempotent).
    pub fn ensure_dirs(&self) -> Result<(), AppError> {
        for dir in [
            self.raw_dir(),
            self.external_dir(),
            self.processed_dir(),
            self.tables_dir(),
            self.figures_dir(),
            self.models_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::config(format!("Failed to create directory '{}': {e}", dir.display()))
            })?;
        }
        Ok(())
    }

    /// Sanity-check parameter consistency before a run.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.start >= self.end {
            return Err(AppError::config("Sample window end must be after start."));
        }
        if self.vecm.lag_order < 1 {
            return Err(AppError::config("VECM lag order must be at least 1."));
        }
        if self.boost.n_trees == 0 {
            return Err(AppError::config("Boosted model needs at least one tree."));
        }
        if !(self.boost.subsample > 0.0 && self.boost.subsample <= 1.0) {
            return Err(AppError::config("Row subsample fraction must be in (0, 1]."));
        }
        if !(self.boost.colsample > 0.0 && self.boost.colsample <= 1.0) {
            return Err(AppError::config("Column subsample fraction must be in (0, 1]."));
        }
        let (a, b) = self.event_study.estimation_window;
        let (c, d) = self.event_study.event_window;
        if a >= b || c >= d || b > c {
            return Err(AppError::config(
                "Event-study estimation window must precede the event window.",
            ));
        }
        Ok(())
    }
}

/// All series specs in fetch order.
pub fn all_series() -> Vec<SeriesSpec> {
    let mut out: Vec<SeriesSpec> = Vec::new();
    out.extend_from_slice(YAHOO_SERIES);
    out.extend_from_slice(FRED_SERIES);
    out
}

/// Resolve a series spec by panel column name.
pub fn series_by_name(name: &str) -> Option<SeriesSpec> {
    all_series().into_iter().find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = RunConfig::new("data", "results");
        config.validate().unwrap();
    }

    #[test]
    fn event_table_dates_parse() {
        for event in EVENTS {
            let d = event.date();
            assert!(d.to_string().len() == 10, "unexpected date {d}");
        }
    }

    #[test]
    fn boost_features_exist_in_transform_set() {
        // The feature table must reference derived columns only.
        for f in BOOST_FEATURES {
            assert!(f.starts_with("delta_") || f.starts_with("growth_"));
        }
    }

    #[test]
    fn raw_paths_partition_by_source() {
        let config = RunConfig::new("d", "r");
        let spec = series_by_name("sp500").unwrap();
        assert!(config
            .raw_series_path(&spec)
            .to_string_lossy()
            .contains("raw/yahoo_sp500.csv"));
        let spec = series_by_name("fed_balance").unwrap();
        assert!(config
            .raw_series_path(&spec)
            .to_string_lossy()
            .contains("raw/fred_fed_balance.csv"));
    }
}
