//! Yahoo Finance chart API client (daily adjusted closes, no key needed).

use chrono::{DateTime, NaiveDate};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::error::AppError;

const BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

// Yahoo rejects requests without a browser-ish user agent.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) qe-study/0.1";

pub struct YahooClient {
    client: Client,
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Fetch daily closes for `ticker` within `[start, end]`, ascending.
    ///
    /// Adjusted closes are preferred when the payload carries them; null
    /// entries (holidays, halted sessions) are skipped.
    pub fn fetch_daily_closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, AppError> {
        let period1 = start
            .and_hms_opt(0, 0, 0)
            .expect("midnight exists")
            .and_utc()
            .timestamp();
        let period2 = end
            .and_hms_opt(23, 59, 59)
            .expect("valid time")
            .and_utc()
            .timestamp();

        let url = format!("{BASE_URL}/{ticker}");
        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "history".to_string()),
            ])
            .send()
            .map_err(|e| AppError::retrieval(format!("Yahoo request for {ticker} failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::retrieval(format!(
                "Yahoo request for {ticker} failed with status {} (unknown ticker?).",
                resp.status()
            )));
        }

        let body: ChartResponse = resp
            .json()
            .map_err(|e| AppError::retrieval(format!("Failed to parse Yahoo response for {ticker}: {e}")))?;

        extract_closes(ticker, body)
    }
}

fn extract_closes(ticker: &str, body: ChartResponse) -> Result<Vec<(NaiveDate, f64)>, AppError> {
    let result = body
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .ok_or_else(|| {
            AppError::retrieval(format!("Yahoo returned no chart data for {ticker}."))
        })?;

    let quote = result
        .indicators
        .quote
        .first()
        .ok_or_else(|| AppError::retrieval(format!("Yahoo payload for {ticker} has no quotes.")))?;

    // Prefer the adjusted series when present.
    let closes: &[Option<f64>] = result
        .indicators
        .adjclose
        .as_ref()
        .and_then(|a| a.first())
        .map(|a| a.adjclose.as_slice())
        .unwrap_or(quote.close.as_slice());

    let mut out = Vec::with_capacity(result.timestamp.len());
    for (ts, close) in result.timestamp.iter().zip(closes) {
        let Some(value) = close.filter(|v| v.is_finite()) else {
            continue;
        };
        let date = DateTime::from_timestamp(*ts, 0)
            .ok_or_else(|| AppError::retrieval(format!("Invalid Yahoo timestamp {ts}.")))?
            .date_naive();
        out.push((date, value));
    }

    if out.is_empty() {
        return Err(AppError::retrieval(format!(
            "No usable closes returned for Yahoo ticker {ticker}."
        )));
    }

    out.sort_by_key(|(d, _)| *d);
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_payload_decodes_and_skips_nulls() {
        let json = r#"{
            "chart": {
                "result": [{
                    "timestamp": [946857600, 946944000, 947030400],
                    "indicators": {
                        "quote": [{"close": [1455.22, null, 1399.42]}],
                        "adjclose": [{"adjclose": [1455.22, null, 1399.42]}]
                    }
                }]
            }
        }"#;
        let body: ChartResponse = serde_json::from_str(json).unwrap();
        let closes = extract_closes("^GSPC", body).unwrap();
        assert_eq!(closes.len(), 2);
        assert_eq!(closes[0].0, NaiveDate::from_ymd_opt(2000, 1, 3).unwrap());
        assert!((closes[0].1 - 1455.22).abs() < 1e-9);
    }

    #[test]
    fn empty_chart_is_a_retrieval_error() {
        let json = r#"{"chart": {"result": null}}"#;
        let body: ChartResponse = serde_json::from_str(json).unwrap();
        let err = extract_closes("^GSPC", body).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
