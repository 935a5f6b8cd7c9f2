//! Yahoo Finance chart-API quote source (primary).
//!
//! Asks for a one-week window of daily bars ending the day after the as-of
//! date and takes the last non-null close on or before it. That covers
//! weekends and market holidays without a calendar.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::source::{QuoteSource, SourceError};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

const USER_AGENT: &str = "Mozilla/5.0 (compatible; mcd/0.1)";
const LOOKBACK_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct YahooChartSource {
    http: reqwest::Client,
    base_url: String,
}

impl Default for YahooChartSource {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooChartSource {
    pub fn new() -> Self {
        Self::new_with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn new_with_base_url(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn chart_url(&self, ticker: &str) -> String {
        format!("{}/v8/finance/chart/{}", self.base_url.trim_end_matches('/'), ticker)
    }
}

#[async_trait]
impl QuoteSource for YahooChartSource {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn quote(&self, ticker: &str, date: NaiveDate) -> Result<Decimal, SourceError> {
        let period1 = epoch_of(date - Duration::days(LOOKBACK_DAYS));
        let period2 = epoch_of(date + Duration::days(1));

        let resp = self
            .http
            .get(self.chart_url(ticker))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body: ChartEnvelope = resp
            .json()
            .await
            .map_err(|e| SourceError::Decode(format!("yahoo chart json: {e}")))?;

        if let Some(err) = body.chart.error {
            return Err(match err.code.as_deref() {
                Some("Not Found") => SourceError::NotFound {
                    ticker: ticker.to_string(),
                    date,
                },
                _ => SourceError::Api {
                    code: Some(i64::from(status.as_u16())),
                    message: err.description.unwrap_or_else(|| "unknown".to_string()),
                },
            });
        }
        if !status.is_success() {
            return Err(SourceError::Api {
                code: Some(i64::from(status.as_u16())),
                message: "yahoo http error".to_string(),
            });
        }

        let result = body
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.swap_remove(0)) })
            .ok_or_else(|| SourceError::NotFound {
                ticker: ticker.to_string(),
                date,
            })?;

        last_close_on_or_before(&result, date).ok_or_else(|| SourceError::NotFound {
            ticker: ticker.to_string(),
            date,
        })
    }
}

fn epoch_of(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

fn last_close_on_or_before(result: &ChartResult, date: NaiveDate) -> Option<Decimal> {
    let closes = result.indicators.quote.first()?.close.as_slice();
    result
        .timestamp
        .iter()
        .zip(closes.iter())
        .filter_map(|(ts, close)| {
            let day = DateTime::from_timestamp(*ts, 0)?.date_naive();
            let px = Decimal::from_f64((*close)?)?.round_dp(4);
            (day <= date).then_some((day, px))
        })
        .max_by_key(|(day, _)| *day)
        .map(|(_, px)| px)
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBlock>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    close: Vec<Option<f64>>,
}
