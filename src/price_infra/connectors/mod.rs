pub mod static_source;

use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

/// Latest observation reported by a source. Sources are not required to be fresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub price: Price,
    pub timestamp: Timestamp,
}

impl Quote {
    pub fn new(price: Price, timestamp: Timestamp) -> Self {
        Quote { price, timestamp }
    }
}

/// A registered price provider. An `Err` means the source is unreachable.
#[cfg_attr(test, mockall::automock)]
pub trait PriceSource: Send + Sync {
    fn view_price(&self) -> Result<Quote>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub asset_id: String,
    pub price: Price,
    pub timestamp: Timestamp,
    pub valid: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBreakdown {
    pub entries: Vec<IndexEntry>,
}

/// Multi-asset index consulted only while the registry has no active source.
#[cfg_attr(test, mockall::automock)]
pub trait IndexSource: Send + Sync {
    fn breakdown(&self) -> Result<IndexBreakdown>;
}
