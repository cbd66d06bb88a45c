use crate::error::{Error, InvariantViolation, Result};
use crate::price_infra::history::PriceHistory;
use crate::price_infra::registry::SourceRegistry;
use crate::types::timestamp::Timestamp;
use crate::MAX_SOURCES;

pub struct InvariantChecks;

impl InvariantChecks {
    /// Cached totals must match the active entries.
    pub fn check_registry(registry: &SourceRegistry) -> Result<()> {
        let active: Vec<_> = registry.configs().filter(|c| c.active).collect();

        if active.len() != registry.active_count() {
            return Err(Error::InvariantViolation(InvariantViolation {
                invariant: "registry_active_count",
                details: format!(
                    "active_count={} but {} entries are active",
                    registry.active_count(),
                    active.len()
                ),
            }));
        }

        let weight: u64 = active.iter().map(|c| c.weight_bps as u64).sum();
        if weight != registry.total_weight() {
            return Err(Error::InvariantViolation(InvariantViolation {
                invariant: "registry_total_weight",
                details: format!(
                    "total_weight={} but active weights sum to {}",
                    registry.total_weight(),
                    weight
                ),
            }));
        }

        if registry.len() > MAX_SOURCES {
            return Err(Error::InvariantViolation(InvariantViolation {
                invariant: "registry_capacity",
                details: format!("{} entries, capacity {}", registry.len(), MAX_SOURCES),
            }));
        }

        Ok(())
    }

    /// Walking newest to oldest, timestamps never increase.
    pub fn check_history_order(history: &PriceHistory) -> Result<()> {
        let mut newer: Option<Timestamp> = None;
        for (offset, point) in history.iter_backward().enumerate() {
            if let Some(newer_ts) = newer {
                if point.timestamp > newer_ts {
                    return Err(Error::InvariantViolation(InvariantViolation {
                        invariant: "history_order",
                        details: format!(
                            "point {} back has timestamp {} after newer point at {}",
                            offset, point.timestamp, newer_ts
                        ),
                    }));
                }
            }
            newer = Some(point.timestamp);
        }
        Ok(())
    }

    pub fn check_bootstrap(bootstrapped: bool, last_update: Timestamp, history: &PriceHistory) -> Result<()> {
        if bootstrapped == history.is_empty() {
            return Err(Error::InvariantViolation(InvariantViolation {
                invariant: "bootstrap",
                details: format!(
                    "bootstrapped={} with {} stored points",
                    bootstrapped,
                    history.len()
                ),
            }));
        }

        if let Some(latest) = history.latest() {
            if latest.timestamp != last_update {
                return Err(Error::InvariantViolation(InvariantViolation {
                    invariant: "last_update_time",
                    details: format!(
                        "last_update={} but newest point is at {}",
                        last_update, latest.timestamp
                    ),
                }));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_infra::history::PricePoint;
    use crate::types::price::Price;

    #[test]
    fn test_out_of_order_history_detected() {
        let mut history = PriceHistory::with_capacity(4);
        history.append(PricePoint::new(Price::from_units(1), Timestamp::from_secs(20)));
        history.append(PricePoint::new(Price::from_units(1), Timestamp::from_secs(10)));
        assert!(matches!(
            InvariantChecks::check_history_order(&history),
            Err(Error::InvariantViolation(v)) if v.invariant == "history_order"
        ));
    }

    #[test]
    fn test_bootstrap_consistency() {
        let mut history = PriceHistory::with_capacity(4);
        assert!(InvariantChecks::check_bootstrap(false, Timestamp::zero(), &history).is_ok());
        assert!(InvariantChecks::check_bootstrap(true, Timestamp::zero(), &history).is_err());

        history.append(PricePoint::new(Price::from_units(1), Timestamp::from_secs(10)));
        assert!(InvariantChecks::check_bootstrap(true, Timestamp::from_secs(10), &history).is_ok());
        assert!(InvariantChecks::check_bootstrap(true, Timestamp::from_secs(11), &history).is_err());
    }
}
