use serde::{Deserialize, Serialize};
use crate::price_infra::admission::AggregateFlags;
use crate::types::ids::SourceId;
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

/// Emitted once per committed aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdated {
    pub price: Price,
    pub timestamp: Timestamp,
    pub sources_used: usize,
    pub flags: AggregateFlags,
}

/// Emitted for every source left out of a committed aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFiltered {
    pub source_id: SourceId,
    pub observed_price: Price,
    pub observed_timestamp: Timestamp,
    pub reason: FilterReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    Stale,
    Deviant,
    Failed,
}

impl FilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterReason::Stale => "stale",
            FilterReason::Deviant => "deviant",
            FilterReason::Failed => "failed",
        }
    }
}
