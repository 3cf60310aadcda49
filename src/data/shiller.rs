//! Shiller long-run valuation dataset (price, dividend, earnings, CAPE).
//!
//! The pipeline consumes the CSV rendition of the dataset from a configured
//! URL. Column headers vary between mirrors ("SP500" vs "price", "PE10" vs
//! "cape"), as do date encodings (ISO `2024-01` vs the spreadsheet's decimal
//! `2024.01`), so parsing is header-driven and tolerant of both.

use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use reqwest::blocking::Client;

use crate::error::AppError;
use crate::panel::month_end;

/// Monthly valuation columns, all aligned to month-end dates.
#[derive(Debug, Clone, Default)]
pub struct ShillerDataset {
    pub price: Vec<(NaiveDate, f64)>,
    pub dividend: Vec<(NaiveDate, f64)>,
    pub earnings: Vec<(NaiveDate, f64)>,
    pub cape: Vec<(NaiveDate, f64)>,
}

impl ShillerDataset {
    pub fn n_months(&self) -> usize {
        self.price.len()
    }
}

/// Download and parse the dataset, filtered to `[start, end]`.
pub fn fetch(url: &str, start: NaiveDate, end: NaiveDate) -> Result<ShillerDataset, AppError> {
    let client = Client::new();
    let resp = client
        .get(url)
        .send()
        .map_err(|e| AppError::retrieval(format!("Shiller dataset request failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(AppError::retrieval(format!(
            "Shiller dataset request failed with status {}.",
            resp.status()
        )));
    }

    let text = resp
        .text()
        .map_err(|e| AppError::retrieval(format!("Failed to read Shiller dataset body: {e}")))?;

    parse_csv(&text, start, end)
}

/// Parse the dataset CSV, keeping rows inside `[start, end]`.
pub fn parse_csv(text: &str, start: NaiveDate, end: NaiveDate) -> Result<ShillerDataset, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AppError::retrieval(format!("Failed to read Shiller headers: {e}")))?
        .clone();

    let col = |candidates: &[&str]| -> Option<usize> {
        headers.iter().position(|h| {
            let h = h.to_ascii_lowercase();
            candidates.iter().any(|c| h == *c)
        })
    };

    let date_idx = col(&["date"])
        .ok_or_else(|| AppError::retrieval("Shiller dataset has no 'date' column."))?;
    let price_idx = col(&["sp500", "price", "p"]);
    let dividend_idx = col(&["dividend", "d"]);
    let earnings_idx = col(&["earnings", "e"]);
    let cape_idx = col(&["pe10", "cape"]);

    if price_idx.is_none() && earnings_idx.is_none() && cape_idx.is_none() {
        return Err(AppError::retrieval(
            "Shiller dataset has none of the expected value columns.",
        ));
    }

    let mut out = ShillerDataset::default();
    for record in reader.records() {
        let record =
            record.map_err(|e| AppError::retrieval(format!("Bad Shiller row: {e}")))?;
        let raw_date = record.get(date_idx).unwrap_or_default();
        if raw_date.is_empty() {
            continue;
        }
        let date = match parse_month(raw_date) {
            Some(d) => d,
            None => continue, // footer rows in some mirrors
        };
        if date < start || date > end {
            continue;
        }

        let push = |idx: Option<usize>, target: &mut Vec<(NaiveDate, f64)>| {
            if let Some(i) = idx {
                if let Some(v) = record.get(i).and_then(parse_number) {
                    target.push((date, v));
                }
            }
        };
        push(price_idx, &mut out.price);
        push(dividend_idx, &mut out.dividend);
        push(earnings_idx, &mut out.earnings);
        push(cape_idx, &mut out.cape);
    }

    for series in [&mut out.price, &mut out.dividend, &mut out.earnings, &mut out.cape] {
        series.sort_by_key(|(d, _)| *d);
    }

    if out.n_months() == 0 && out.earnings.is_empty() && out.cape.is_empty() {
        return Err(AppError::retrieval(
            "Shiller dataset yielded no rows inside the sample window.",
        ));
    }

    Ok(out)
}

/// Parse a month label to its month-end date.
///
/// Accepts `YYYY-MM`, `YYYY-MM-DD`, and the spreadsheet's decimal `YYYY.MM`
/// (where October appears as `.1` because the trailing zero is dropped).
fn parse_month(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(month_end(d));
    }
    if let Some((y, m)) = raw.split_once('-') {
        let year: i32 = y.parse().ok()?;
        let month: u32 = m.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1).map(month_end);
    }
    if let Some((y, m)) = raw.split_once('.') {
        let year: i32 = y.parse().ok()?;
        let month: u32 = if m == "1" { 10 } else { m.parse().ok()? };
        return NaiveDate::from_ymd_opt(year, month, 1).map(month_end);
    }
    None
}

fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") {
        return None;
    }
    let v: f64 = trimmed.parse().ok()?;
    v.is_finite().then_some(v)
}

/// Persist the dataset as one combined CSV under `data/external`.
pub fn write_csv(path: &Path, data: &ShillerDataset) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::config(format!("Failed to create '{}': {e}", parent.display()))
        })?;
    }
    let mut file = std::fs::File::create(path)
        .map_err(|e| AppError::config(format!("Failed to create '{}': {e}", path.display())))?;

    // Union of dates across the four columns.
    let mut dates: Vec<NaiveDate> = data
        .price
        .iter()
        .chain(&data.dividend)
        .chain(&data.earnings)
        .chain(&data.cape)
        .map(|(d, _)| *d)
        .collect();
    dates.sort();
    dates.dedup();

    let lookup = |series: &[(NaiveDate, f64)], d: NaiveDate| -> String {
        series
            .iter()
            .find(|(sd, _)| *sd == d)
            .map(|(_, v)| v.to_string())
            .unwrap_or_default()
    };

    writeln!(file, "date,shiller_price,shiller_dividend,earnings,cape")
        .map_err(|e| AppError::config(format!("Failed to write '{}': {e}", path.display())))?;
    for d in dates {
        writeln!(
            file,
            "{d},{},{},{},{}",
            lookup(&data.price, d),
            lookup(&data.dividend, d),
            lookup(&data.earnings, d),
            lookup(&data.cape, d),
        )
        .map_err(|e| AppError::config(format!("Failed to write '{}': {e}", path.display())))?;
    }
    Ok(())
}

/// Read back the combined CSV written by [`write_csv`].
pub fn read_csv(path: &Path) -> Result<ShillerDataset, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::config(format!("Failed to open '{}': {e}", path.display())))?;
    // The persisted form uses ISO dates and canonical headers, so the
    // tolerant parser handles it with a wide-open window.
    parse_csv(
        &text,
        NaiveDate::from_ymd_opt(1800, 1, 1).expect("valid date"),
        NaiveDate::from_ymd_opt(2200, 12, 31).expect("valid date"),
    )
}
