//! Panel persistence: a tabular CSV and an equivalent binary Parquet
//! snapshot, both keyed by the same month-end index and column set.
//!
//! The CSV is the human-auditable form; the Parquet file is what later
//! stages load by default. Either can rebuild the panel, and both go through
//! [`MonthlyPanel::new`] on load so the index invariant is re-checked.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::AppError;
use crate::panel::MonthlyPanel;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid date")
}

/// Write the panel as CSV (`date,<col>,...`; missing cells are empty).
pub fn write_csv(path: &Path, panel: &MonthlyPanel) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::config(format!("Failed to create '{}': {e}", path.display())))?;

    let mut header = String::from("date");
    for name in panel.column_names() {
        header.push(',');
        header.push_str(name);
    }
    writeln!(file, "{header}")
        .map_err(|e| AppError::config(format!("Failed to write '{}': {e}", path.display())))?;

    for (i, month) in panel.months().iter().enumerate() {
        let mut row = month.to_string();
        for (_, values) in panel.columns() {
            row.push(',');
            if values[i].is_finite() {
                row.push_str(&format!("{:.10}", values[i]));
            }
        }
        writeln!(file, "{row}")
            .map_err(|e| AppError::config(format!("Failed to write '{}': {e}", path.display())))?;
    }
    Ok(())
}

/// Read a panel back from CSV, re-validating the index invariant.
pub fn read_csv(path: &Path) -> Result<MonthlyPanel, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open '{}': {e}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::config(format!("Bad header in '{}': {e}", path.display())))?
        .clone();
    if headers.get(0).map(str::to_ascii_lowercase).as_deref() != Some("date") {
        return Err(AppError::config(format!(
            "'{}' is not a panel CSV (first column must be 'date').",
            path.display()
        )));
    }

    let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    let mut months = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];

    for (i, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| AppError::config(format!("Bad row {} in '{}': {e}", i + 2, path.display())))?;
        let date = NaiveDate::parse_from_str(record.get(0).unwrap_or_default(), "%Y-%m-%d")
            .map_err(|e| {
                AppError::config(format!(
                    "Invalid panel date '{}': {e}",
                    record.get(0).unwrap_or_default()
                ))
            })?;
        months.push(date);
        for (j, column) in columns.iter_mut().enumerate() {
            let cell = record.get(j + 1).unwrap_or_default();
            if cell.is_empty() {
                column.push(f64::NAN);
            } else {
                let v: f64 = cell.parse().map_err(|e| {
                    AppError::config(format!("Invalid panel cell '{cell}' at row {}: {e}", i + 2))
                })?;
                column.push(v);
            }
        }
    }

    MonthlyPanel::new(months, names.into_iter().zip(columns).collect())
}

/// Write the panel as a Parquet snapshot (atomic: temp file then rename).
pub fn write_parquet(path: &Path, panel: &MonthlyPanel) -> Result<(), AppError> {
    let mut df = to_dataframe(panel)?;

    let tmp_path = path.with_extension("parquet.tmp");
    let file = File::create(&tmp_path)
        .map_err(|e| AppError::config(format!("Failed to create '{}': {e}", tmp_path.display())))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(|e| AppError::config(format!("Failed to write Parquet snapshot: {e}")))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        AppError::config(format!("Atomic rename of Parquet snapshot failed: {e}"))
    })?;
    Ok(())
}

/// Load the Parquet snapshot back into a panel.
pub fn read_parquet(path: &Path) -> Result<MonthlyPanel, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open '{}': {e}", path.display())))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| AppError::config(format!("Failed to read Parquet snapshot: {e}")))?;
    from_dataframe(&df)
}

fn to_dataframe(panel: &MonthlyPanel) -> Result<DataFrame, AppError> {
    let e = epoch();
    let dates: Vec<i32> = panel
        .months()
        .iter()
        .map(|d| (*d - e).num_days() as i32)
        .collect();

    let mut cols: Vec<Column> = Vec::with_capacity(panel.columns().len() + 1);
    cols.push(
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| AppError::config(format!("Date cast failed: {e}")))?,
    );
    for (name, values) in panel.columns() {
        cols.push(Column::new(name.as_str().into(), values.clone()));
    }

    DataFrame::new(cols).map_err(|e| AppError::config(format!("DataFrame creation failed: {e}")))
}

fn from_dataframe(df: &DataFrame) -> Result<MonthlyPanel, AppError> {
    if df.height() == 0 {
        return Err(AppError::insufficient("Parquet snapshot has no rows."));
    }

    let date_col = df
        .column("date")
        .map_err(|e| AppError::config(format!("Snapshot is missing 'date': {e}")))?
        .date()
        .map_err(|e| AppError::config(format!("Snapshot 'date' has the wrong type: {e}")))?;

    let e = epoch();
    let mut months = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let days = date_col
            .get(i)
            .ok_or_else(|| AppError::config(format!("Null date at snapshot row {i}.")))?;
        months.push(e + chrono::Duration::days(days as i64));
    }

    let mut columns = Vec::new();
    for col in df.get_columns() {
        let name = col.name().as_str();
        if name == "date" {
            continue;
        }
        let ca = col
            .f64()
            .map_err(|e| AppError::config(format!("Snapshot column '{name}' is not f64: {e}")))?;
        let values: Vec<f64> = (0..df.height()).map(|i| ca.get(i).unwrap_or(f64::NAN)).collect();
        columns.push((name.to_string(), values));
    }

    MonthlyPanel::new(months, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::{month_end, next_month_end};
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> std::path::PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("qes_snap_{}_{id}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_panel() -> MonthlyPanel {
        let mut m = month_end(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let mut months = Vec::new();
        for _ in 0..4 {
            months.push(m);
            m = next_month_end(m);
        }
        MonthlyPanel::new(
            months,
            vec![
                ("sp500".into(), vec![3225.52, 2954.22, 2584.59, 2912.43]),
                ("vix".into(), vec![18.84, f64::NAN, 53.54, 34.15]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn csv_roundtrip_preserves_index_and_missing_cells() {
        let dir = temp_dir();
        let path = dir.join("panel.csv");
        let panel = sample_panel();

        write_csv(&path, &panel).unwrap();
        let loaded = read_csv(&path).unwrap();

        assert_eq!(loaded.months(), panel.months());
        assert_eq!(loaded.column_names(), panel.column_names());
        assert!(loaded.column("vix").unwrap()[1].is_nan());
        assert!((loaded.column("sp500").unwrap()[0] - 3225.52).abs() < 1e-9);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn csv_write_is_byte_stable() {
        let dir = temp_dir();
        let a = dir.join("a.csv");
        let b = dir.join("b.csv");
        let panel = sample_panel();
        write_csv(&a, &panel).unwrap();
        write_csv(&b, &panel).unwrap();
        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn parquet_roundtrip_matches_csv() {
        let dir = temp_dir();
        let path = dir.join("panel.parquet");
        let panel = sample_panel();

        write_parquet(&path, &panel).unwrap();
        let loaded = read_parquet(&path).unwrap();

        assert_eq!(loaded.months(), panel.months());
        assert_eq!(loaded.column_names(), panel.column_names());
        assert!(loaded.column("vix").unwrap()[1].is_nan());
        assert!((loaded.column("vix").unwrap()[2] - 53.54).abs() < 1e-9);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupted_csv_index_fails_validation_on_load() {
        let dir = temp_dir();
        let path = dir.join("panel.csv");
        // Mid-month date violates the month-end invariant.
        std::fs::write(&path, "date,x\n2020-01-31,1.0\n2020-02-14,2.0\n").unwrap();
        assert!(read_csv(&path).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
