//! FRED observations API client.
//!
//! Series are fetched at native frequency over the configured window. There
//! is no retry/backoff beyond what the blocking client does; a failed fetch
//! is a fatal Retrieval error and the orchestrator aborts the run rather
//! than continuing with a partial panel.

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::error::AppError;

const BASE_URL: &str = "https://api.stlouisfed.org/fred/series/observations";
const OBS_LIMIT: usize = 100_000;

pub struct FredClient {
    client: Client,
    api_key: String,
}

impl FredClient {
    /// Build a client from `FRED_API_KEY` (a `.env` file is honored).
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("FRED_API_KEY")
            .map_err(|_| AppError::config("Missing FRED_API_KEY in environment (.env)."))?;
        Ok(Self::with_key(api_key))
    }

    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Fetch one series' observations, ascending, within `[start, end]`.
    ///
    /// FRED encodes missing observations as "."; those are dropped here so
    /// downstream code only ever sees finite values.
    pub fn fetch_series(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, AppError> {
        let resp = self
            .client
            .get(BASE_URL)
            .query(&[
                ("series_id", code),
                ("api_key", &self.api_key),
                ("file_type", "json"),
                ("sort_order", "asc"),
                ("observation_start", &start.to_string()),
                ("observation_end", &end.to_string()),
                ("limit", &OBS_LIMIT.to_string()),
            ])
            .send()
            .map_err(|e| AppError::retrieval(format!("FRED request for {code} failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::retrieval(format!(
                "FRED request for {code} failed with status {} (unknown code?).",
                resp.status()
            )));
        }

        let body: ObservationsResponse = resp
            .json()
            .map_err(|e| AppError::retrieval(format!("Failed to parse FRED response for {code}: {e}")))?;

        let mut out = Vec::with_capacity(body.observations.len());
        for obs in body.observations {
            let value = match parse_value(&obs.value) {
                Some(v) => v,
                None => continue,
            };
            let date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d")
                .map_err(|e| AppError::retrieval(format!("Invalid FRED date '{}': {e}", obs.date)))?;
            out.push((date, value));
        }

        if out.is_empty() {
            return Err(AppError::retrieval(format!(
                "No observations returned for FRED series {code}."
            )));
        }

        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed == "." || trimmed.is_empty() {
        return None;
    }
    let v = trimmed.parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}
