//! Alpha Vantage `TIME_SERIES_DAILY` quote source (fallback).
//!
//! API key is passed in by the caller; it is never logged and is redacted
//! from `Debug`.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::source::{QuoteSource, SourceError};

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";

#[derive(Clone)]
pub struct AlphaVantageSource {
    api_key: Option<String>,
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for AlphaVantageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlphaVantageSource")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AlphaVantageSource {
    pub fn new(api_key: Option<String>) -> Self {
        Self::new_with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn new_with_base_url(api_key: Option<String>, base_url: String) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl QuoteSource for AlphaVantageSource {
    fn name(&self) -> &str {
        "alphavantage"
    }

    async fn quote(&self, ticker: &str, date: NaiveDate) -> Result<Decimal, SourceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SourceError::Config("alphavantage api key not set".to_string()))?;

        let resp = self
            .http
            .get(self.query_url())
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", ticker),
                ("outputsize", "compact"),
                ("apikey", api_key),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Api {
                code: Some(i64::from(status.as_u16())),
                message: "alphavantage http error".to_string(),
            });
        }

        let body: DailyResponse = resp
            .json()
            .await
            .map_err(|e| SourceError::Decode(format!("alphavantage json: {e}")))?;

        if let Some(msg) = body.api_message() {
            return Err(SourceError::Api {
                code: None,
                message: msg.to_string(),
            });
        }

        let series = body.series.unwrap_or_default();
        let (_, bar) = series
            .range(..=date)
            .next_back()
            .ok_or_else(|| SourceError::NotFound {
                ticker: ticker.to_string(),
                date,
            })?;

        bar.close
            .trim()
            .parse::<Decimal>()
            .map_err(|e| SourceError::Decode(format!("alphavantage close '{}': {e}", bar.close)))
    }
}

#[derive(Debug, Deserialize)]
struct DailyResponse {
    #[serde(rename = "Time Series (Daily)")]
    series: Option<BTreeMap<NaiveDate, DailyBar>>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

impl DailyResponse {
    // Rate-limit notices come back as 200 with a Note/Information field.
    fn api_message(&self) -> Option<&str> {
        self.error_message
            .as_deref()
            .or(self.note.as_deref())
            .or(self.information.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "4. close")]
    close: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn picks_latest_bar_on_or_before_asof() {
        let server = MockServer::start_async().await;
        let m = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/query")
                    .query_param("function", "TIME_SERIES_DAILY")
                    .query_param("symbol", "ABC")
                    .query_param("apikey", "k");
                then.status(200).json_body(json!({
                    "Meta Data": { "2. Symbol": "ABC" },
                    "Time Series (Daily)": {
                        "2024-06-10": { "1. open": "11.0", "4. close": "11.50" },
                        "2024-06-07": { "1. open": "10.0", "4. close": "10.3300" },
                        "2024-06-06": { "1. open": "10.0", "4. close": "10.0100" }
                    }
                }));
            })
            .await;

        let src = AlphaVantageSource::new_with_base_url(Some("k".into()), server.base_url());
        assert_eq!(src.quote("ABC", d("2024-06-09")).await.unwrap(), dec!(10.33));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_note_is_api_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/query");
                then.status(200)
                    .json_body(json!({ "Note": "Thank you for using Alpha Vantage! call frequency exceeded" }));
            })
            .await;

        let src = AlphaVantageSource::new_with_base_url(Some("k".into()), server.base_url());
        let err = src.quote("ABC", d("2024-06-03")).await.unwrap_err();
        match err {
            SourceError::Api { code: None, message } => assert!(message.contains("frequency")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_request() {
        let src = AlphaVantageSource::new_with_base_url(Some("  ".into()), "http://127.0.0.1:1".into());
        let err = src.quote("ABC", d("2024-06-03")).await.unwrap_err();
        assert!(matches!(err, SourceError::Config(_)));
    }

    #[tokio::test]
    async fn no_bar_before_asof_is_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/query");
                then.status(200).json_body(json!({
                    "Time Series (Daily)": { "2024-06-10": { "4. close": "11.50" } }
                }));
            })
            .await;

        let src = AlphaVantageSource::new_with_base_url(Some("k".into()), server.base_url());
        let err = src.quote("ABC", d("2024-06-01")).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
    }

    #[test]
    fn debug_redacts_api_key() {
        let src = AlphaVantageSource::new(Some("supersecret".into()));
        let dbg = format!("{src:?}");
        assert!(!dbg.contains("supersecret"));
        assert!(dbg.contains("<redacted>"));
    }
}
