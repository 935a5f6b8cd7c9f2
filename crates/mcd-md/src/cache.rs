//! Per-key locked quote cache.
//!
//! One slot per (ticker, date). A slot is an async mutex around an optional
//! quote; whoever holds the slot lock is the only task allowed to fetch for
//! that key. Callers arriving while a fetch is in flight wait on the slot and
//! then read the stored quote instead of fetching again.
//!
//! Stored quotes are never overwritten. The only way to refresh a key is
//! [`PriceCache::clear`], which takes each affected slot lock before
//! evicting, so it cannot interleave with an in-flight fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use mcd_schemas::normalize_ticker;
use tokio::sync::Mutex as AsyncMutex;

use crate::PriceQuote;

type Slot = Arc<AsyncMutex<Option<PriceQuote>>>;

/// Cache key. The ticker is always stored normalized.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuoteKey {
    pub ticker: String,
    pub date: NaiveDate,
}

impl QuoteKey {
    pub fn new(ticker: &str, date: NaiveDate) -> Self {
        Self {
            ticker: normalize_ticker(ticker),
            date,
        }
    }
}

#[derive(Default)]
pub struct PriceCache {
    slots: Mutex<HashMap<QuoteKey, Slot>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    // The map lock is only ever held for map surgery, never across an await.
    fn lock_slots(&self) -> MutexGuard<'_, HashMap<QuoteKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, key: &QuoteKey) -> Slot {
        self.lock_slots().entry(key.clone()).or_default().clone()
    }

    /// Stored quote for `key`, waiting out any in-flight fetch.
    pub async fn get(&self, key: &QuoteKey) -> Option<PriceQuote> {
        let slot = self.lock_slots().get(key).cloned()?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// Store `quote` unless the key is already populated. Returns the quote
    /// that is authoritative for the key afterwards.
    pub async fn put(&self, quote: PriceQuote) -> PriceQuote {
        let key = QuoteKey::new(&quote.ticker, quote.date);
        let slot = self.slot(&key);
        let mut guard = slot.lock().await;
        match guard.as_ref() {
            Some(existing) => existing.clone(),
            None => {
                *guard = Some(quote.clone());
                quote
            }
        }
    }

    /// Return the cached quote, or run `fetch` while holding the key's slot.
    ///
    /// Errors are not cached; the next caller fetches again. A failed key
    /// leaves no slot behind once nobody else is waiting on it.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &QuoteKey, fetch: F) -> Result<PriceQuote, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PriceQuote, E>>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;
        if let Some(hit) = guard.as_ref() {
            tracing::debug!(ticker = %key.ticker, date = %key.date, "price cache hit");
            return Ok(hit.clone());
        }
        match fetch().await {
            Ok(quote) => {
                *guard = Some(quote.clone());
                Ok(quote)
            }
            Err(e) => {
                drop(guard);
                self.prune_empty(key, &slot);
                Err(e)
            }
        }
    }

    // Remove `slot` if it is still the map's slot for `key`, holds no quote,
    // and no other caller is holding or waiting on it.
    fn prune_empty(&self, key: &QuoteKey, slot: &Slot) {
        let mut slots = self.lock_slots();
        let unused = slots.get(key).is_some_and(|s| Arc::ptr_eq(s, slot))
            && Arc::strong_count(slot) == 2
            && slot.try_lock().is_ok_and(|g| g.is_none());
        if unused {
            slots.remove(key);
        }
    }

    /// Evict every date for `ticker`, or everything when `None`.
    /// Returns the number of quotes evicted.
    pub async fn clear(&self, ticker: Option<&str>) -> usize {
        let wanted = ticker.map(normalize_ticker);
        let targets: Vec<Slot> = self
            .lock_slots()
            .iter()
            .filter(|(k, _)| wanted.as_ref().map_or(true, |t| &k.ticker == t))
            .map(|(_, s)| s.clone())
            .collect();

        let mut evicted = 0usize;
        for slot in &targets {
            if slot.lock().await.take().is_some() {
                evicted += 1;
            }
        }
        drop(targets);

        // Drop empty slots nobody else is holding.
        self.lock_slots().retain(|_, slot| {
            Arc::strong_count(slot) > 1 || slot.try_lock().map_or(true, |g| g.is_some())
        });

        evicted
    }

    /// Number of populated entries.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.lock_slots().values().cloned().collect();
        let mut n = 0usize;
        for slot in slots {
            if slot.lock().await.is_some() {
                n += 1;
            }
        }
        n
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
