use chrono::NaiveDate;
use mcd_schemas::DateRange;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::snapshot::ValuationSnapshot;
use crate::AccountingError;

/// One persisted snapshot row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityRecord {
    pub date: NaiveDate,
    pub cash: Decimal,
    pub holdings_value: Decimal,
    pub total_equity: Decimal,
    pub daily_pnl: Decimal,
    pub cumulative_pnl: Decimal,
    pub benchmark_ticker: Option<String>,
    pub benchmark_price: Option<Decimal>,
}

impl From<&ValuationSnapshot> for EquityRecord {
    fn from(s: &ValuationSnapshot) -> Self {
        Self {
            date: s.date,
            cash: s.cash,
            holdings_value: s.holdings_value,
            total_equity: s.total_equity,
            daily_pnl: s.daily_pnl,
            cumulative_pnl: s.cumulative_pnl,
            benchmark_ticker: s.benchmark.as_ref().map(|b| b.ticker.clone()),
            benchmark_price: s.benchmark.as_ref().map(|b| b.price),
        }
    }
}

/// Date-ordered equity history. At most one record per date.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EquityHistory {
    records: Vec<EquityRecord>,
}

impl EquityHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted rows in any order; a repeated date is an error.
    pub fn from_records(mut records: Vec<EquityRecord>) -> Result<Self, AccountingError> {
        records.sort_by_key(|r| r.date);
        if let Some(w) = records.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(AccountingError::DuplicateDate(w[0].date));
        }
        Ok(Self { records })
    }

    /// Insert keeping date order. Refuses a second record for the same date.
    pub fn record(&mut self, rec: EquityRecord) -> Result<(), AccountingError> {
        match self.records.binary_search_by_key(&rec.date, |r| r.date) {
            Ok(_) => Err(AccountingError::DuplicateDate(rec.date)),
            Err(pos) => {
                self.records.insert(pos, rec);
                Ok(())
            }
        }
    }

    /// Latest record strictly before `date`.
    pub fn previous_before(&self, date: NaiveDate) -> Option<&EquityRecord> {
        let idx = self.records.partition_point(|r| r.date < date);
        idx.checked_sub(1).map(|i| &self.records[i])
    }

    pub fn get(&self, date: NaiveDate) -> Option<&EquityRecord> {
        self.records
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|i| &self.records[i])
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn last(&self) -> Option<&EquityRecord> {
        self.records.last()
    }

    pub fn records(&self) -> &[EquityRecord] {
        &self.records
    }

    pub fn in_range(&self, range: &DateRange) -> impl Iterator<Item = &EquityRecord> + '_ {
        let range = *range;
        self.records.iter().filter(move |r| range.contains(r.date))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
