//! mcd-testkit
//!
//! Deterministic fixtures for scenario tests.
//! - [`ScriptedSource`]: an in-memory quote source with per-(ticker, date)
//!   prices, failure injection, latency and call counters
//! - [`load_prices_csv`]: `ticker,date,price` fixture files
//! - small builders for providers and dates

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use mcd_md::{MarketDataProvider, QuoteSource, SourceError};
use mcd_schemas::normalize_ticker;
use rust_decimal::Decimal;

type PriceKey = (String, NaiveDate);

#[derive(Default)]
struct Script {
    prices: HashMap<PriceKey, Decimal>,
    failing_tickers: HashSet<String>,
    fail_all: bool,
    calls: HashMap<String, usize>,
}

/// Quote source driven entirely by the test.
///
/// Unknown (ticker, date) pairs answer `NotFound`; there is no
/// "latest close before date" lookup.
pub struct ScriptedSource {
    name: String,
    latency: Option<Duration>,
    script: Mutex<Script>,
    total_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            latency: None,
            script: Mutex::new(Script::default()),
            total_calls: AtomicUsize::new(0),
        }
    }

    /// Every quote waits `d` before answering.
    pub fn with_latency(mut self, d: Duration) -> Self {
        self.latency = Some(d);
        self
    }

    pub fn with_price(self, ticker: &str, date: NaiveDate, price: Decimal) -> Self {
        self.set_price(ticker, date, price);
        self
    }

    pub fn with_prices<I>(self, rows: I) -> Self
    where
        I: IntoIterator<Item = (String, NaiveDate, Decimal)>,
    {
        for (t, d, p) in rows {
            self.set_price(&t, d, p);
        }
        self
    }

    pub fn set_price(&self, ticker: &str, date: NaiveDate, price: Decimal) {
        self.lock().prices.insert((normalize_ticker(ticker), date), price);
    }

    /// Every request for `ticker` fails with a transport error.
    pub fn fail_ticker(&self, ticker: &str) {
        self.lock().failing_tickers.insert(normalize_ticker(ticker));
    }

    /// Every request fails, whatever the ticker.
    pub fn fail_all(&self, on: bool) {
        self.lock().fail_all = on;
    }

    pub fn calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, ticker: &str) -> usize {
        self.lock().calls.get(&normalize_ticker(ticker)).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl QuoteSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote(&self, ticker: &str, date: NaiveDate) -> Result<Decimal, SourceError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let answer = {
            let mut s = self.lock();
            *s.calls.entry(ticker.to_string()).or_insert(0) += 1;
            if s.fail_all || s.failing_tickers.contains(ticker) {
                Err(SourceError::Transport(format!("{} scripted outage", self.name)))
            } else {
                s.prices
                    .get(&(ticker.to_string(), date))
                    .copied()
                    .ok_or_else(|| SourceError::NotFound {
                        ticker: ticker.to_string(),
                        date,
                    })
            }
        };
        if let Some(d) = self.latency {
            tokio::time::sleep(d).await;
        }
        answer
    }
}

/// Provider over `sources` in order; the first is primary.
pub fn provider(sources: &[Arc<ScriptedSource>]) -> Arc<MarketDataProvider> {
    let chain: Vec<Arc<dyn QuoteSource>> = sources.iter().map(|s| s.clone() as Arc<dyn QuoteSource>).collect();
    Arc::new(MarketDataProvider::new(chain))
}

/// 2024-01-`d`.
pub fn jan(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap_or_default()
}

/// Read a `ticker,date,price` fixture. Rows keep file order.
pub fn load_prices_csv(path: &str) -> Result<Vec<(String, NaiveDate, Decimal)>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("open prices csv: {path}"))?;
    parse_price_records(&mut rdr)
}

pub fn parse_prices_csv(text: &str) -> Result<Vec<(String, NaiveDate, Decimal)>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(text.as_bytes());
    parse_price_records(&mut rdr)
}

fn parse_price_records<R: std::io::Read>(rdr: &mut csv::Reader<R>) -> Result<Vec<(String, NaiveDate, Decimal)>> {
    let mut out = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let row = i + 1;
        let ticker = normalize_ticker(rec.get(0).unwrap_or(""));
        let date = NaiveDate::parse_from_str(rec.get(1).unwrap_or(""), "%Y-%m-%d")
            .with_context(|| format!("row {row}: parse date"))?;
        let price: Decimal = rec
            .get(2)
            .unwrap_or("")
            .parse()
            .with_context(|| format!("row {row}: parse price"))?;
        out.push((ticker, date, price));
    }
    Ok(out)
}
