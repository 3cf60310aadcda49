//! Raw-series CSV persistence under `data/raw` and `data/external`.
//!
//! One file per series: a `#` metadata line (source, code, retrieval
//! timestamp) followed by `date,<name>` rows in ascending date order. Raw
//! files are immutable once fetched; the aggregation stage only reads them.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;

use crate::config::DataSource;
use crate::error::AppError;

/// A named time series at native frequency, tagged with its provenance.
#[derive(Debug, Clone)]
pub struct RawSeries {
    pub name: String,
    pub source: DataSource,
    /// Source identifier (FRED code, Yahoo ticker, or dataset URL).
    pub code: String,
    /// RFC 3339 retrieval timestamp; `None` when re-read from disk without
    /// a metadata line.
    pub fetched_at: Option<String>,
    /// Ascending by date; values are finite (placeholders are dropped at
    /// fetch time).
    pub observations: Vec<(NaiveDate, f64)>,
}

impl RawSeries {
    pub fn new(
        name: impl Into<String>,
        source: DataSource,
        code: impl Into<String>,
        mut observations: Vec<(NaiveDate, f64)>,
    ) -> Self {
        observations.sort_by_key(|(d, _)| *d);
        Self {
            name: name.into(),
            source,
            code: code.into(),
            fetched_at: Some(chrono::Utc::now().to_rfc3339()),
            observations,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|(d, _)| *d)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|(d, _)| *d)
    }
}

/// Write a raw series to `path`, creating parent directories as needed.
pub fn write_series(path: &Path, series: &RawSeries) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::config(format!("Failed to create '{}': {e}", parent.display()))
        })?;
    }
    let mut file = File::create(path)
        .map_err(|e| AppError::config(format!("Failed to create '{}': {e}", path.display())))?;

    writeln!(
        file,
        "# source={} code={} fetched={}",
        series.source.label(),
        series.code,
        series.fetched_at.as_deref().unwrap_or("unknown"),
    )
    .and_then(|_| writeln!(file, "date,{}", series.name))
    .map_err(|e| AppError::config(format!("Failed to write '{}': {e}", path.display())))?;

    for (date, value) in &series.observations {
        writeln!(file, "{date},{value}")
            .map_err(|e| AppError::config(format!("Failed to write '{}': {e}", path.display())))?;
    }
    Ok(())
}

/// Read a raw series back from `path`.
///
/// The series name is taken from the header row; provenance comes from the
/// `#` metadata line when present.
pub fn read_series(path: &Path, source: DataSource) -> Result<RawSeries, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::config(format!("Failed to open '{}': {e}", path.display())))?;

    let mut code = String::new();
    let mut fetched_at = None;
    if let Some(meta) = text.lines().next().filter(|l| l.starts_with('#')) {
        for field in meta.trim_start_matches('#').split_whitespace() {
            if let Some(v) = field.strip_prefix("code=") {
                code = v.to_string();
            } else if let Some(v) = field.strip_prefix("fetched=") {
                fetched_at = Some(v.to_string());
            }
        }
    }

    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AppError::config(format!("Bad header in '{}': {e}", path.display())))?;
    if headers.len() < 2 || headers.get(0).map(str::to_ascii_lowercase).as_deref() != Some("date") {
        return Err(AppError::config(format!(
            "'{}' is not a raw series file (expected `date,<name>` header).",
            path.display()
        )));
    }
    let name = headers.get(1).unwrap_or_default().to_string();

    let mut observations = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| AppError::config(format!("Bad row {} in '{}': {e}", i + 2, path.display())))?;
        let date = NaiveDate::parse_from_str(record.get(0).unwrap_or_default(), "%Y-%m-%d")
            .map_err(|e| {
                AppError::config(format!(
                    "Invalid date '{}' in '{}': {e}",
                    record.get(0).unwrap_or_default(),
                    path.display()
                ))
            })?;
        let raw_value = record.get(1).unwrap_or_default();
        if raw_value.is_empty() {
            continue;
        }
        let value: f64 = raw_value.parse().map_err(|e| {
            AppError::config(format!("Invalid value '{raw_value}' in '{}': {e}", path.display()))
        })?;
        if value.is_finite() {
            observations.push((date, value));
        }
    }
    observations.sort_by_key(|(d, _)| *d);

    Ok(RawSeries {
        name,
        source,
        code,
        fetched_at,
        observations,
    })
}
