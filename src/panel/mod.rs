//! The monthly panel: a month-end date index plus named float columns.
//!
//! Invariant (checked at construction and again when a persisted panel is
//! loaded): the index is strictly increasing with exactly one entry per
//! calendar month and no gaps, each date being the last day of its month.
//! Missing cells are `NaN`; estimators drop rows they cannot use.
//!
//! The panel is created once by the aggregation stage and read-only
//! afterwards; estimators receive `&MonthlyPanel` and never mutate it.

pub mod aggregate;
pub mod snapshot;
pub mod transform;

use chrono::{Datelike, NaiveDate};

use crate::error::AppError;

/// Last calendar day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (y, m) = (date.year(), date.month());
    let first_next = if m == 12 {
        NaiveDate::from_ymd_opt(y + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(y, m + 1, 1)
    };
    first_next.expect("valid month arithmetic") - chrono::Duration::days(1)
}

/// Month-end date one month after `date` (which must itself be a month-end).
pub fn next_month_end(date: NaiveDate) -> NaiveDate {
    month_end(date + chrono::Duration::days(1))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyPanel {
    months: Vec<NaiveDate>,
    columns: Vec<(String, Vec<f64>)>,
}

impl MonthlyPanel {
    /// Build a panel, validating the index invariant and column lengths.
    pub fn new(
        months: Vec<NaiveDate>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, AppError> {
        if months.is_empty() {
            return Err(AppError::insufficient("Monthly panel has no rows."));
        }
        for (i, &m) in months.iter().enumerate() {
            if m != month_end(m) {
                return Err(AppError::config(format!(
                    "Panel index entry {m} is not a month-end date."
                )));
            }
            if i > 0 && m != next_month_end(months[i - 1]) {
                return Err(AppError::config(format!(
                    "Panel index has a gap or disorder between {} and {m}.",
                    months[i - 1]
                )));
            }
        }
        for (name, values) in &columns {
            if values.len() != months.len() {
                return Err(AppError::config(format!(
                    "Column '{name}' has {} values for {} months.",
                    values.len(),
                    months.len()
                )));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for (name, _) in &columns {
            if !seen.insert(name.as_str()) {
                return Err(AppError::config(format!("Duplicate panel column '{name}'.")));
            }
        }
        Ok(Self { months, columns })
    }

    pub fn n_rows(&self) -> usize {
        self.months.len()
    }

    pub fn months(&self) -> &[NaiveDate] {
        &self.months
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Fetch a column or fail with a pointer at the aggregation stage.
    pub fn require_column(&self, name: &str) -> Result<&[f64], AppError> {
        self.column(name).ok_or_else(|| {
            AppError::config(format!(
                "Panel is missing column '{name}'; rebuild it with `qes panel`."
            ))
        })
    }

    /// Append a derived column (aggregation-stage use only).
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<(), AppError> {
        let name = name.into();
        if values.len() != self.months.len() {
            return Err(AppError::config(format!(
                "Derived column '{name}' has {} values for {} months.",
                values.len(),
                self.months.len()
            )));
        }
        if self.column(&name).is_some() {
            return Err(AppError::config(format!("Duplicate panel column '{name}'.")));
        }
        self.columns.push((name, values));
        Ok(())
    }

    /// Row position of a month-end date, if present.
    pub fn row_of(&self, month: NaiveDate) -> Option<usize> {
        // Index is contiguous, so position arithmetic beats a scan.
        let first = *self.months.first()?;
        if month < first || month > *self.months.last()? {
            return None;
        }
        let idx = (month.year() - first.year()) as usize * 12 + month.month() as usize
            - first.month() as usize;
        (self.months.get(idx) == Some(&month)).then_some(idx)
    }

    pub fn columns(&self) -> &[(String, Vec<f64>)] {
        &self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn months(from: (i32, u32), n: usize) -> Vec<NaiveDate> {
        let mut out = Vec::with_capacity(n);
        let mut m = month_end(NaiveDate::from_ymd_opt(from.0, from.1, 1).unwrap());
        for _ in 0..n {
            out.push(m);
            m = next_month_end(m);
        }
        out
    }

    #[test]
    fn month_end_handles_year_boundary_and_leap_years() {
        let d = NaiveDate::from_ymd_opt(2023, 12, 5).unwrap();
        assert_eq!(month_end(d), NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        let d = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(month_end(d), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn panel_accepts_contiguous_month_ends() {
        let idx = months((2020, 11), 4);
        let panel = MonthlyPanel::new(idx.clone(), vec![("x".into(), vec![1.0; 4])]).unwrap();
        assert_eq!(panel.n_rows(), 4);
        assert_eq!(panel.row_of(idx[2]), Some(2));
        assert_eq!(panel.row_of(NaiveDate::from_ymd_opt(2019, 1, 31).unwrap()), None);
    }

    #[test]
    fn panel_rejects_gapped_index() {
        let mut idx = months((2021, 1), 4);
        idx.remove(2);
        let err = MonthlyPanel::new(idx, vec![]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn panel_rejects_non_month_end_dates() {
        let idx = vec![NaiveDate::from_ymd_opt(2021, 1, 15).unwrap()];
        assert!(MonthlyPanel::new(idx, vec![]).is_err());
    }

    #[test]
    fn panel_rejects_duplicate_and_ragged_columns() {
        let idx = months((2021, 1), 2);
        assert!(
            MonthlyPanel::new(
                idx.clone(),
                vec![("x".into(), vec![1.0, 2.0]), ("x".into(), vec![3.0, 4.0])]
            )
            .is_err()
        );
        assert!(MonthlyPanel::new(idx, vec![("x".into(), vec![1.0])]).is_err());
    }
}
