//! In-process sources backed by a stored quote. Used by the service binary
//! and by tests; real feed adapters live outside this crate.

use std::sync::RwLock;
use crate::error::{Error, Result};
use crate::price_infra::connectors::{IndexBreakdown, IndexEntry, IndexSource, PriceSource, Quote};
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

pub struct StaticSource {
    quote: RwLock<Option<Quote>>,
}

impl StaticSource {
    pub fn new(price: Price, timestamp: Timestamp) -> Self {
        StaticSource {
            quote: RwLock::new(Some(Quote::new(price, timestamp))),
        }
    }

    /// A source that has never observed a price; `view_price` fails.
    pub fn empty() -> Self {
        StaticSource {
            quote: RwLock::new(None),
        }
    }

    pub fn set_quote(&self, price: Price, timestamp: Timestamp) {
        if let Ok(mut quote) = self.quote.write() {
            *quote = Some(Quote::new(price, timestamp));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut quote) = self.quote.write() {
            *quote = None;
        }
    }
}

impl PriceSource for StaticSource {
    fn view_price(&self) -> Result<Quote> {
        let quote = self.quote.read()
            .map_err(|e| Error::SourceUnavailable(e.to_string()))?;
        quote.ok_or_else(|| Error::SourceUnavailable("no price observed".to_string()))
    }
}

/// Always unreachable.
pub struct FailingSource {
    reason: String,
}

impl FailingSource {
    pub fn new(reason: &str) -> Self {
        FailingSource { reason: reason.to_string() }
    }
}

impl PriceSource for FailingSource {
    fn view_price(&self) -> Result<Quote> {
        Err(Error::SourceUnavailable(self.reason.clone()))
    }
}

pub struct StaticIndexSource {
    entries: RwLock<Vec<IndexEntry>>,
}

impl StaticIndexSource {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        StaticIndexSource {
            entries: RwLock::new(entries),
        }
    }

    pub fn set_entries(&self, entries: Vec<IndexEntry>) {
        if let Ok(mut current) = self.entries.write() {
            *current = entries;
        }
    }
}

impl IndexSource for StaticIndexSource {
    fn breakdown(&self) -> Result<IndexBreakdown> {
        let entries = self.entries.read()
            .map_err(|e| Error::IndexUnavailable(e.to_string()))?;
        Ok(IndexBreakdown { entries: entries.clone() })
    }
}
