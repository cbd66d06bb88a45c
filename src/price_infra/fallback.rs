//! Degraded mode used while the registry has no active source: a plain
//! mean over the valid entries of an aggregate index.

use crate::price_infra::connectors::IndexBreakdown;
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FallbackPrice {
    pub price: Price,
    /// Newest timestamp among the averaged entries.
    pub timestamp: Timestamp,
    pub used_entries: usize,
}

/// Averages entries that are flagged valid, non-zero and fresh.
///
/// An entry is fresh when its timestamp is non-zero, not in the future and,
/// if `max_age_secs > 0`, no older than `max_age_secs`. Returns `None`
/// when no entry qualifies. The mean is rounded down.
pub fn average_valid_entries(
    breakdown: &IndexBreakdown,
    now: Timestamp,
    max_age_secs: u64,
) -> Option<FallbackPrice> {
    let mut prices: Vec<u128> = Vec::new();
    let mut newest = Timestamp::zero();

    for entry in &breakdown.entries {
        if !entry.valid || entry.price.is_zero() || entry.timestamp.is_zero() {
            continue;
        }
        let fresh = match entry.timestamp.age_at(now) {
            Some(age) => max_age_secs == 0 || age <= max_age_secs,
            None => false,
        };
        if !fresh {
            tracing::debug!(asset = %entry.asset_id, timestamp = %entry.timestamp, "Skipping stale index entry");
            continue;
        }

        prices.push(entry.price.raw_value());
        newest = newest.max(entry.timestamp);
    }

    if prices.is_empty() {
        return None;
    }

    // sum(p / n) + sum(p % n) / n, so the total never exceeds the largest price
    let count = prices.len() as u128;
    let whole: u128 = prices.iter().map(|p| p / count).sum();
    let remainder: u128 = prices.iter().map(|p| p % count).sum();

    Some(FallbackPrice {
        price: Price::from_raw(whole + remainder / count),
        timestamp: newest,
        used_entries: prices.len(),
    })
}
