use std::sync::Arc;
use crate::config::{
    check_range, AggregatorConfig, AGGREGATE_MAX_AGE_RANGE, DEVIATION_RANGE, MIN_QUORUM_RANGE,
};
use crate::controls::AccessControl;
use crate::error::{Error, Result};
use crate::events::base::{EventPayload, OracleEvent};
use crate::events::price::{FilterReason, PriceUpdated, SourceFiltered};
use crate::interfaces::clock::Clock;
use crate::interfaces::event_producer::{EventSink, TracingEventSink};
use crate::invariants::checks::InvariantChecks;
use crate::observability::metrics;
use crate::observability::tracing::{trace_aggregation, trace_governance};
use crate::price_infra::admission::{
    Admission, AdmissionPolicy, AggregateFlags, ReasonCode, StaleCommitPolicy,
};
use crate::price_infra::connectors::{IndexSource, PriceSource, Quote};
use crate::price_infra::fallback::average_valid_entries;
use crate::price_infra::history::{PriceHistory, PricePoint};
use crate::price_infra::median::{weighted_median, ValidInput};
use crate::price_infra::registry::{SourceConfig, SourceRegistry};
use crate::price_infra::twap::TwapCalculator;
use crate::types::ids::{OperatorId, SourceId};
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregationPath {
    Registry,
    IndexFallback,
}

/// Full result of one aggregation pass.
#[derive(Clone, Debug)]
pub struct AggregationOutcome {
    /// Zero unless the pass produced an admissible-or-stale aggregate.
    pub price: Price,
    pub timestamp: Timestamp,
    pub flags: AggregateFlags,
    pub sources_used: usize,
    /// TWAP reference used for deviation checks; zero when history is empty.
    pub center: Price,
    pub path: AggregationPath,
    pub valid_inputs: Vec<ValidInput>,
    pub filtered: Vec<SourceFiltered>,
}

impl AggregationOutcome {
    fn low_quorum(
        path: AggregationPath,
        center: Price,
        sources_used: usize,
        filtered: Vec<SourceFiltered>,
    ) -> Self {
        AggregationOutcome {
            price: Price::zero(),
            timestamp: Timestamp::zero(),
            flags: AggregateFlags::LOW_QUORUM,
            sources_used,
            center,
            path,
            valid_inputs: Vec::new(),
            filtered,
        }
    }

    pub fn reading(&self) -> AggregateReading {
        AggregateReading {
            price: self.price,
            timestamp: self.timestamp,
            flags: self.flags,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregateReading {
    pub price: Price,
    pub timestamp: Timestamp,
    pub flags: AggregateFlags,
}

pub struct Aggregator {
    config: AggregatorConfig,
    registry: SourceRegistry,
    history: PriceHistory,
    fallback_source: Option<Arc<dyn IndexSource>>,
    access: AccessControl,
    clock: Arc<dyn Clock>,
    sink: Box<dyn EventSink>,
    bootstrapped: bool,
    last_update_time: Timestamp,
    event_sequence: u64,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig, admin: OperatorId, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Aggregator {
            config,
            registry: SourceRegistry::new(),
            history: PriceHistory::new(),
            fallback_source: None,
            access: AccessControl::new(admin),
            clock,
            sink: Box::new(TracingEventSink),
            bootstrapped: false,
            last_update_time: Timestamp::zero(),
            event_sequence: 0,
        })
    }

    pub fn with_event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    // ---------------------------------------------------------------------
    // Aggregation
    // ---------------------------------------------------------------------

    /// Runs the filtering and median pipeline without touching state.
    pub fn aggregate(&self) -> Result<AggregationOutcome> {
        let now = self.clock.now();
        let active = self.registry.active_count();
        let _span = trace_aggregation(active, now).entered();

        if active == 0 {
            if let Some(index) = &self.fallback_source {
                return Ok(self.aggregate_from_index(index.as_ref(), now));
            }
        }

        // Step 1: quorum is impossible, skip querying sources
        if active < self.config.min_quorum as usize {
            tracing::debug!(active, min_quorum = self.config.min_quorum, "Not enough active sources");
            return Ok(AggregationOutcome::low_quorum(AggregationPath::Registry, Price::zero(), 0, Vec::new()));
        }

        // Step 2: deviation reference
        let center = TwapCalculator::new(&self.history, now).center();

        // Step 3: query and filter each source
        let mut valid_inputs = Vec::with_capacity(active);
        let mut filtered = Vec::new();
        for entry in self.registry.active_entries() {
            let config = &entry.config;
            match entry.source.view_price() {
                Err(e) => {
                    tracing::warn!(source = %config.id, error = %e, "Price source call failed");
                    filtered.push(SourceFiltered {
                        source_id: config.id.clone(),
                        observed_price: Price::zero(),
                        observed_timestamp: Timestamp::zero(),
                        reason: FilterReason::Failed,
                    });
                }
                Ok(quote) => match Self::classify(&quote, config, center, now) {
                    Some(reason) => {
                        tracing::warn!(
                            source = %config.id,
                            price = %quote.price,
                            timestamp = %quote.timestamp,
                            reason = reason.as_str(),
                            "Filtered source observation"
                        );
                        filtered.push(SourceFiltered {
                            source_id: config.id.clone(),
                            observed_price: quote.price,
                            observed_timestamp: quote.timestamp,
                            reason,
                        });
                    }
                    None => valid_inputs.push(ValidInput {
                        source_id: config.id.clone(),
                        price: quote.price,
                        weight: config.weight_bps,
                        timestamp: quote.timestamp,
                    }),
                },
            }
        }

        // Step 4: quorum over filtered inputs
        if valid_inputs.len() < self.config.min_quorum as usize {
            return Ok(AggregationOutcome::low_quorum(AggregationPath::Registry, center, valid_inputs.len(), filtered));
        }

        // Step 5: weighted median
        let Some(pick) = weighted_median(&valid_inputs) else {
            return Ok(AggregationOutcome::low_quorum(AggregationPath::Registry, center, 0, filtered));
        };

        // Steps 6-8
        let (price, flags) = self.admission_flags(pick.price, pick.timestamp, center, now);
        Ok(AggregationOutcome {
            price,
            timestamp: pick.timestamp,
            flags,
            sources_used: valid_inputs.len(),
            center,
            path: AggregationPath::Registry,
            valid_inputs,
            filtered,
        })
    }

    fn aggregate_from_index(&self, index: &dyn IndexSource, now: Timestamp) -> AggregationOutcome {
        let center = TwapCalculator::new(&self.history, now).center();

        let breakdown = match index.breakdown() {
            Ok(breakdown) => breakdown,
            Err(e) => {
                tracing::warn!(error = %e, "Index fallback unavailable");
                return AggregationOutcome::low_quorum(AggregationPath::IndexFallback, center, 0, Vec::new());
            }
        };

        let Some(average) = average_valid_entries(&breakdown, now, self.config.aggregate_max_age_secs) else {
            return AggregationOutcome::low_quorum(AggregationPath::IndexFallback, center, 0, Vec::new());
        };
        if average.used_entries < self.config.fallback_min_quorum as usize {
            tracing::debug!(
                used = average.used_entries,
                required = self.config.fallback_min_quorum,
                "Index fallback below quorum"
            );
            return AggregationOutcome::low_quorum(AggregationPath::IndexFallback, center, average.used_entries, Vec::new());
        }

        let (price, flags) = self.admission_flags(average.price, average.timestamp, center, now);
        AggregationOutcome {
            price,
            timestamp: average.timestamp,
            flags,
            sources_used: average.used_entries,
            center,
            path: AggregationPath::IndexFallback,
            valid_inputs: Vec::new(),
            filtered: Vec::new(),
        }
    }

    fn classify(quote: &Quote, config: &SourceConfig, center: Price, now: Timestamp) -> Option<FilterReason> {
        if quote.timestamp.is_zero() {
            return Some(FilterReason::Stale);
        }
        match quote.timestamp.age_at(now) {
            Some(age) if age <= config.max_age_secs => {}
            _ => return Some(FilterReason::Stale),
        }
        if !center.is_zero() {
            match quote.price.deviation_bps(center) {
                Some(bps) if bps <= config.max_deviation_bps as u128 => {}
                _ => return Some(FilterReason::Deviant),
            }
        }
        None
    }

    /// Aggregate-level checks: deviation from TWAP zeroes the price, age only flags it.
    fn admission_flags(&self, price: Price, timestamp: Timestamp, center: Price, now: Timestamp) -> (Price, AggregateFlags) {
        if !center.is_zero() {
            let within = matches!(
                price.deviation_bps(center),
                Some(bps) if bps <= self.config.max_deviation_from_twap_bps as u128
            );
            if !within {
                tracing::warn!(%price, %center, "Aggregate deviates from TWAP");
                return (Price::zero(), AggregateFlags::DEVIANT_VS_TWAP);
            }
        }

        let mut flags = AggregateFlags::OK;
        if self.config.aggregate_max_age_secs > 0 {
            if let Some(age) = timestamp.age_at(now) {
                if age > self.config.aggregate_max_age_secs {
                    flags.insert(AggregateFlags::STALE);
                }
            }
        }
        (price, flags)
    }

    fn admission_policy(&self) -> AdmissionPolicy {
        AdmissionPolicy::new(self.config.stale_commit_policy)
    }

    /// Runs the pipeline and commits the aggregate if it is admissible.
    ///
    /// A rejected update leaves history, source bookkeeping and the event
    /// stream untouched.
    pub fn update_price(&mut self) -> Result<PriceUpdated> {
        let outcome = self.aggregate()?;

        for record in &outcome.filtered {
            metrics::SOURCES_FILTERED.with_label_values(&[record.reason.as_str()]).inc();
        }

        if let Admission::Reject(reason) = self.admission_policy().decide(outcome.flags, outcome.price) {
            metrics::PRICE_UPDATES_REJECTED.with_label_values(&[reason_label(reason)]).inc();
            tracing::warn!(
                flags = %outcome.flags,
                sources_used = outcome.sources_used,
                ?reason,
                "Price update rejected"
            );
            if reason == ReasonCode::ZeroPrice {
                return Err(Error::ZeroPrice);
            }
            return Err(Error::UpdateRejected {
                flags: outcome.flags,
                sources_used: outcome.sources_used,
            });
        }

        if outcome.timestamp < self.last_update_time {
            metrics::PRICE_UPDATES_REJECTED.with_label_values(&[reason_label(ReasonCode::OutOfOrder)]).inc();
            tracing::warn!(
                timestamp = %outcome.timestamp,
                last_update = %self.last_update_time,
                "Price update older than last commit"
            );
            return Err(Error::NonMonotonicTimestamp {
                timestamp: outcome.timestamp,
                last_update: self.last_update_time,
            });
        }

        Ok(self.commit(outcome))
    }

    fn commit(&mut self, outcome: AggregationOutcome) -> PriceUpdated {
        self.history.append(PricePoint::new(outcome.price, outcome.timestamp));
        self.last_update_time = outcome.timestamp;
        self.bootstrapped = true;
        for input in &outcome.valid_inputs {
            self.registry.mark_updated(&input.source_id, input.timestamp);
        }

        let now = self.clock.now();
        for record in outcome.filtered {
            self.publish(now, EventPayload::SourceFiltered(record));
        }
        let updated = PriceUpdated {
            price: outcome.price,
            timestamp: outcome.timestamp,
            sources_used: outcome.sources_used,
            flags: outcome.flags,
        };
        self.publish(now, EventPayload::PriceUpdated(updated.clone()));

        metrics::PRICE_UPDATES_COMMITTED.inc();
        metrics::AGGREGATE_PRICE.set(outcome.price.to_f64());
        if outcome.path == AggregationPath::IndexFallback {
            metrics::FALLBACK_COMMITS.inc();
        }
        tracing::info!(
            price = %outcome.price,
            timestamp = %outcome.timestamp,
            sources_used = outcome.sources_used,
            flags = %outcome.flags,
            path = ?outcome.path,
            "Committed aggregate price"
        );
        updated
    }

    fn publish(&mut self, now: Timestamp, payload: EventPayload) {
        self.event_sequence += 1;
        self.sink.publish(OracleEvent::new(self.event_sequence, now, payload));
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// `(price, timestamp)` of a fresh aggregation; the price is zero when
    /// quorum or the TWAP check fails.
    pub fn get_aggregated_price(&self) -> Result<(Price, Timestamp)> {
        let outcome = self.aggregate()?;
        Ok((outcome.price, outcome.timestamp))
    }

    pub fn get_aggregated_price_with_flags(&self) -> Result<AggregateReading> {
        Ok(self.aggregate()?.reading())
    }

    pub fn get_twap(&self, window_secs: u64) -> Price {
        TwapCalculator::new(&self.history, self.clock.now()).twap(window_secs)
    }

    /// Whether `update_price` would commit right now, and why not if it wouldn't.
    pub fn can_update(&self) -> Result<(bool, ReasonCode)> {
        let outcome = self.aggregate()?;
        if let Admission::Reject(reason) = self.admission_policy().decide(outcome.flags, outcome.price) {
            return Ok((false, reason));
        }
        if outcome.timestamp < self.last_update_time {
            return Ok((false, ReasonCode::OutOfOrder));
        }
        Ok((true, outcome.flags.primary_reason()))
    }

    pub fn get_active_source_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Active source ids in registration order.
    pub fn list_sources(&self) -> Vec<SourceId> {
        self.registry.active_ids()
    }

    pub fn latest_price(&self) -> Option<PricePoint> {
        self.history.latest()
    }

    pub fn last_update_time(&self) -> Timestamp {
        self.last_update_time
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn check_invariants(&self) -> Result<()> {
        InvariantChecks::check_registry(&self.registry)?;
        InvariantChecks::check_history_order(&self.history)?;
        InvariantChecks::check_bootstrap(self.bootstrapped, self.last_update_time, &self.history)?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Governance
    // ---------------------------------------------------------------------

    pub fn add_source(
        &mut self,
        caller: OperatorId,
        id: SourceId,
        source: Arc<dyn PriceSource>,
        weight_bps: u32,
        max_age_secs: u64,
        max_deviation_bps: u32,
    ) -> Result<()> {
        let _span = trace_governance("add_source", caller).entered();
        self.access.ensure_authorized(caller)?;
        self.registry.add(id.clone(), source, weight_bps, max_age_secs, max_deviation_bps)?;
        metrics::ACTIVE_SOURCES.set(self.registry.active_count() as i64);
        tracing::info!(source = %id, weight_bps, max_age_secs, max_deviation_bps, "Source added");
        Ok(())
    }

    pub fn remove_source(&mut self, caller: OperatorId, id: &SourceId) -> Result<()> {
        let _span = trace_governance("remove_source", caller).entered();
        self.access.ensure_authorized(caller)?;
        self.registry.remove(id, self.config.min_quorum)?;
        metrics::ACTIVE_SOURCES.set(self.registry.active_count() as i64);
        tracing::info!(source = %id, "Source deactivated");
        Ok(())
    }

    pub fn update_weight(&mut self, caller: OperatorId, id: &SourceId, weight_bps: u32) -> Result<()> {
        let _span = trace_governance("update_weight", caller).entered();
        self.access.ensure_authorized(caller)?;
        self.registry.update_weight(id, weight_bps)?;
        tracing::info!(source = %id, weight_bps, "Source weight updated");
        Ok(())
    }

    pub fn update_source_params(
        &mut self,
        caller: OperatorId,
        id: &SourceId,
        max_age_secs: u64,
        max_deviation_bps: u32,
    ) -> Result<()> {
        let _span = trace_governance("update_source_params", caller).entered();
        self.access.ensure_authorized(caller)?;
        self.registry.update_params(id, max_age_secs, max_deviation_bps)?;
        tracing::info!(source = %id, max_age_secs, max_deviation_bps, "Source parameters updated");
        Ok(())
    }

    pub fn set_min_quorum(&mut self, caller: OperatorId, min_quorum: u8) -> Result<()> {
        let _span = trace_governance("set_min_quorum", caller).entered();
        self.access.ensure_authorized(caller)?;
        check_range("min_quorum", min_quorum as u64, MIN_QUORUM_RANGE)?;
        self.config.min_quorum = min_quorum;
        tracing::info!(min_quorum, "Minimum quorum updated");
        Ok(())
    }

    pub fn set_aggregate_max_age(&mut self, caller: OperatorId, max_age_secs: u64) -> Result<()> {
        let _span = trace_governance("set_aggregate_max_age", caller).entered();
        self.access.ensure_authorized(caller)?;
        check_range("aggregate_max_age_secs", max_age_secs, AGGREGATE_MAX_AGE_RANGE)?;
        self.config.aggregate_max_age_secs = max_age_secs;
        tracing::info!(max_age_secs, "Aggregate max age updated");
        Ok(())
    }

    pub fn set_max_deviation_from_twap_bps(&mut self, caller: OperatorId, bps: u32) -> Result<()> {
        let _span = trace_governance("set_max_deviation_from_twap_bps", caller).entered();
        self.access.ensure_authorized(caller)?;
        check_range("max_deviation_from_twap_bps", bps as u64, DEVIATION_RANGE)?;
        self.config.max_deviation_from_twap_bps = bps;
        tracing::info!(bps, "TWAP deviation bound updated");
        Ok(())
    }

    pub fn set_fallback_min_quorum(&mut self, caller: OperatorId, min_quorum: u8) -> Result<()> {
        let _span = trace_governance("set_fallback_min_quorum", caller).entered();
        self.access.ensure_authorized(caller)?;
        check_range("fallback_min_quorum", min_quorum as u64, MIN_QUORUM_RANGE)?;
        self.config.fallback_min_quorum = min_quorum;
        tracing::info!(min_quorum, "Fallback quorum updated");
        Ok(())
    }

    pub fn set_fallback_source(&mut self, caller: OperatorId, source: Option<Arc<dyn IndexSource>>) -> Result<()> {
        let _span = trace_governance("set_fallback_source", caller).entered();
        self.access.ensure_authorized(caller)?;
        tracing::info!(configured = source.is_some(), "Index fallback source updated");
        self.fallback_source = source;
        Ok(())
    }

    pub fn set_stale_commit_policy(&mut self, caller: OperatorId, policy: StaleCommitPolicy) -> Result<()> {
        let _span = trace_governance("set_stale_commit_policy", caller).entered();
        self.access.ensure_authorized(caller)?;
        self.config.stale_commit_policy = policy;
        tracing::info!(?policy, "Stale commit policy updated");
        Ok(())
    }

    /// One-time history seed, only before the first commit.
    pub fn seed_initial_price(&mut self, caller: OperatorId, price: Price, timestamp: Timestamp) -> Result<()> {
        let _span = trace_governance("seed_initial_price", caller).entered();
        self.access.ensure_authorized(caller)?;
        if self.bootstrapped {
            return Err(Error::AlreadyBootstrapped);
        }
        if price.is_zero() {
            return Err(Error::ZeroPrice);
        }
        let now = self.clock.now();
        if timestamp > now {
            return Err(Error::FutureTimestamp { timestamp, now });
        }
        check_range("seed_timestamp", timestamp.as_secs(), (1, now.as_secs()))?;

        self.history.append(PricePoint::new(price, timestamp));
        self.last_update_time = timestamp;
        self.bootstrapped = true;
        tracing::info!(%price, %timestamp, "History seeded");
        Ok(())
    }

    pub fn grant_operator(&mut self, caller: OperatorId, operator: OperatorId) -> Result<()> {
        let _span = trace_governance("grant_operator", caller).entered();
        self.access.grant(caller, operator)
    }

    pub fn revoke_operator(&mut self, caller: OperatorId, operator: OperatorId) -> Result<()> {
        let _span = trace_governance("revoke_operator", caller).entered();
        self.access.revoke(caller, operator)
    }
}

fn reason_label(reason: ReasonCode) -> &'static str {
    match reason {
        ReasonCode::Ok => "ok",
        ReasonCode::LowQuorum => "low_quorum",
        ReasonCode::Stale => "stale",
        ReasonCode::DeviantVsTwap => "deviant_vs_twap",
        ReasonCode::ZeroPrice => "zero_price",
        ReasonCode::OutOfOrder => "out_of_order",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::clock::ManualClock;
    use crate::interfaces::event_producer::RecordingEventSink;
    use crate::price_infra::connectors::{IndexBreakdown, IndexEntry, MockIndexSource, MockPriceSource};

    const NOW: u64 = 1_700_000_000;

    fn setup(min_quorum: u8) -> (Aggregator, OperatorId, Arc<ManualClock>, RecordingEventSink) {
        let admin = OperatorId::new();
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(NOW)));
        let sink = RecordingEventSink::new();
        let config = AggregatorConfig { min_quorum, ..Default::default() };
        let aggregator = Aggregator::new(config, admin, clock.clone())
            .unwrap()
            .with_event_sink(sink.clone());
        (aggregator, admin, clock, sink)
    }

    fn quoting(units: u64, secs: u64) -> Arc<dyn PriceSource> {
        let mut mock = MockPriceSource::new();
        mock.expect_view_price()
            .returning(move || Ok(Quote::new(Price::from_units(units), Timestamp::from_secs(secs))));
        Arc::new(mock)
    }

    fn failing() -> Arc<dyn PriceSource> {
        let mut mock = MockPriceSource::new();
        mock.expect_view_price()
            .returning(|| Err(Error::SourceUnavailable("timeout".to_string())));
        Arc::new(mock)
    }

    #[test]
    fn test_fast_path_skips_source_queries() {
        let (mut aggregator, admin, _, _) = setup(3);
        let mut mock = MockPriceSource::new();
        mock.expect_view_price().times(0);
        aggregator.add_source(admin, SourceId::from("only"), Arc::new(mock), 5000, 60, 500).unwrap();

        let outcome = aggregator.aggregate().unwrap();
        assert_eq!(outcome.flags, AggregateFlags::LOW_QUORUM);
        assert_eq!(outcome.sources_used, 0);
        assert_eq!(outcome.price, Price::zero());
    }

    #[test]
    fn test_failed_source_is_isolated() {
        let (mut aggregator, admin, _, sink) = setup(2);
        aggregator.add_source(admin, SourceId::from("a"), quoting(100, NOW - 5), 3000, 60, 500).unwrap();
        aggregator.add_source(admin, SourceId::from("b"), failing(), 3000, 60, 500).unwrap();
        aggregator.add_source(admin, SourceId::from("c"), quoting(102, NOW - 2), 3000, 60, 500).unwrap();

        let outcome = aggregator.aggregate().unwrap();
        assert_eq!(outcome.flags, AggregateFlags::OK);
        assert_eq!(outcome.sources_used, 2);
        assert_eq!(outcome.filtered.len(), 1);
        assert_eq!(outcome.filtered[0].reason, FilterReason::Failed);

        let updated = aggregator.update_price().unwrap();
        assert_eq!(updated.price, Price::from_units(100));
        assert_eq!(updated.timestamp, Timestamp::from_secs(NOW - 5));
        assert_eq!(aggregator.last_update_time(), Timestamp::from_secs(NOW - 5));
        assert_eq!(sink.len(), 2);
        assert_eq!(
            aggregator.registry().get(&SourceId::from("c")).unwrap().last_update,
            Timestamp::from_secs(NOW - 2)
        );
        assert!(aggregator.check_invariants().is_ok());
    }

    #[test]
    fn test_future_timestamp_treated_as_stale() {
        let (mut aggregator, admin, _, _) = setup(1);
        aggregator.add_source(admin, SourceId::from("ahead"), quoting(100, NOW + 30), 5000, 60, 500).unwrap();

        let outcome = aggregator.aggregate().unwrap();
        assert_eq!(outcome.flags, AggregateFlags::LOW_QUORUM);
        assert_eq!(outcome.filtered[0].reason, FilterReason::Stale);
    }

    #[test]
    fn test_fallback_used_when_registry_empty() {
        let (mut aggregator, admin, _, _) = setup(1);
        let mut index = MockIndexSource::new();
        index.expect_breakdown().returning(|| {
            Ok(IndexBreakdown {
                entries: vec![
                    IndexEntry { asset_id: "btc".into(), price: Price::from_units(90), timestamp: Timestamp::from_secs(NOW - 10), valid: true },
                    IndexEntry { asset_id: "eth".into(), price: Price::from_units(110), timestamp: Timestamp::from_secs(NOW - 20), valid: true },
                    IndexEntry { asset_id: "sol".into(), price: Price::from_units(100), timestamp: Timestamp::from_secs(NOW - 1), valid: true },
                    IndexEntry { asset_id: "xrp".into(), price: Price::from_units(1), timestamp: Timestamp::from_secs(NOW), valid: false },
                ],
            })
        });
        aggregator.set_fallback_source(admin, Some(Arc::new(index))).unwrap();

        let outcome = aggregator.aggregate().unwrap();
        assert_eq!(outcome.path, AggregationPath::IndexFallback);
        assert_eq!(outcome.flags, AggregateFlags::OK);
        assert_eq!(outcome.price, Price::from_units(100));
        assert_eq!(outcome.timestamp, Timestamp::from_secs(NOW - 1));
        assert_eq!(outcome.sources_used, 3);

        aggregator.set_fallback_min_quorum(admin, 4).unwrap();
        let outcome = aggregator.aggregate().unwrap();
        assert_eq!(outcome.flags, AggregateFlags::LOW_QUORUM);
        assert_eq!(outcome.sources_used, 3);
    }

    #[test]
    fn test_fallback_failure_is_low_quorum() {
        let (mut aggregator, admin, _, _) = setup(1);
        let mut index = MockIndexSource::new();
        index.expect_breakdown()
            .returning(|| Err(Error::IndexUnavailable("reverted".to_string())));
        aggregator.set_fallback_source(admin, Some(Arc::new(index))).unwrap();

        let reading = aggregator.get_aggregated_price_with_flags().unwrap();
        assert_eq!(reading.flags, AggregateFlags::LOW_QUORUM);
        assert!(aggregator.update_price().is_err());
        assert!(aggregator.history().is_empty());
    }

    #[test]
    fn test_out_of_order_commit_rejected() {
        let (mut aggregator, admin, _, _) = setup(1);
        aggregator.seed_initial_price(admin, Price::from_units(100), Timestamp::from_secs(NOW - 10)).unwrap();
        aggregator.add_source(admin, SourceId::from("late"), quoting(100, NOW - 30), 5000, 60, 500).unwrap();

        assert_eq!(aggregator.can_update().unwrap(), (false, ReasonCode::OutOfOrder));
        assert!(matches!(aggregator.update_price(), Err(Error::NonMonotonicTimestamp { .. })));
        assert_eq!(aggregator.history().len(), 1);
    }

    #[test]
    fn test_extreme_history_price_still_aggregates() {
        let (mut aggregator, admin, _, sink) = setup(1);
        let huge = Price::from_raw(u128::MAX / 50);
        aggregator.seed_initial_price(admin, huge, Timestamp::from_secs(NOW - 100)).unwrap();

        let mut mock = MockPriceSource::new();
        mock.expect_view_price()
            .returning(move || Ok(Quote::new(huge, Timestamp::from_secs(NOW - 1))));
        aggregator.add_source(admin, SourceId::from("whale"), Arc::new(mock), 5000, 60, 500).unwrap();

        let reading = aggregator.get_aggregated_price_with_flags().unwrap();
        assert_eq!(reading.flags, AggregateFlags::OK);
        assert_eq!(reading.price, huge);
        assert_eq!(aggregator.get_twap(600), huge);

        aggregator.update_price().unwrap();
        assert_eq!(aggregator.history().len(), 2);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_extreme_source_price_is_filtered_not_fatal() {
        let (mut aggregator, admin, _, _) = setup(1);
        aggregator.seed_initial_price(admin, Price::from_units(100), Timestamp::from_secs(NOW - 100)).unwrap();

        let mut mock = MockPriceSource::new();
        mock.expect_view_price()
            .returning(|| Ok(Quote::new(Price::from_raw(u128::MAX), Timestamp::from_secs(NOW - 1))));
        aggregator.add_source(admin, SourceId::from("broken"), Arc::new(mock), 5000, 60, 5000).unwrap();

        let outcome = aggregator.aggregate().unwrap();
        assert_eq!(outcome.flags, AggregateFlags::LOW_QUORUM);
        assert_eq!(outcome.filtered[0].reason, FilterReason::Deviant);
    }

    #[test]
    fn test_shortfall_keeps_filter_records() {
        let (mut aggregator, admin, _, _) = setup(2);
        aggregator.add_source(admin, SourceId::from("a"), quoting(100, NOW - 5), 5000, 60, 500).unwrap();
        aggregator.add_source(admin, SourceId::from("b"), failing(), 5000, 60, 500).unwrap();

        let outcome = aggregator.aggregate().unwrap();
        assert_eq!(outcome.flags, AggregateFlags::LOW_QUORUM);
        assert_eq!(outcome.sources_used, 1);
        assert_eq!(outcome.filtered.len(), 1);
        assert_eq!(outcome.filtered[0].source_id, SourceId::from("b"));
    }

    #[test]
    fn test_update_source_params_changes_filtering() {
        let (mut aggregator, admin, _, _) = setup(1);
        let id = SourceId::from("lagging");
        aggregator.add_source(admin, id.clone(), quoting(100, NOW - 120), 5000, 60, 500).unwrap();

        let outcome = aggregator.aggregate().unwrap();
        assert_eq!(outcome.flags, AggregateFlags::LOW_QUORUM);
        assert_eq!(outcome.filtered[0].reason, FilterReason::Stale);

        let stranger = OperatorId::new();
        assert!(matches!(
            aggregator.update_source_params(stranger, &id, 300, 500),
            Err(Error::Unauthorized(_))
        ));
        assert_eq!(aggregator.registry().get(&id).unwrap().max_age_secs, 60);

        assert!(matches!(
            aggregator.update_source_params(admin, &id, 86_401, 500),
            Err(Error::InvalidParameter { parameter: "max_age_secs", .. })
        ));
        assert!(matches!(
            aggregator.update_source_params(admin, &id, 300, 5_001),
            Err(Error::InvalidParameter { parameter: "max_deviation_bps", .. })
        ));
        assert!(matches!(
            aggregator.update_source_params(admin, &SourceId::from("unknown"), 300, 500),
            Err(Error::SourceNotActive(_))
        ));

        aggregator.update_source_params(admin, &id, 300, 500).unwrap();
        let outcome = aggregator.aggregate().unwrap();
        assert_eq!(outcome.flags, AggregateFlags::OK);
        assert_eq!(outcome.price, Price::from_units(100));
        assert!(outcome.filtered.is_empty());
    }

    #[test]
    fn test_update_source_params_widens_deviation_band() {
        let (mut aggregator, admin, _, _) = setup(1);
        aggregator.seed_initial_price(admin, Price::from_units(100), Timestamp::from_secs(NOW - 100)).unwrap();
        let id = SourceId::from("jumpy");
        aggregator.add_source(admin, id.clone(), quoting(108, NOW - 1), 5000, 60, 500).unwrap();

        let outcome = aggregator.aggregate().unwrap();
        assert_eq!(outcome.filtered[0].reason, FilterReason::Deviant);

        aggregator.update_source_params(admin, &id, 60, 1_000).unwrap();
        let outcome = aggregator.aggregate().unwrap();
        assert_eq!(outcome.flags, AggregateFlags::OK);
        assert_eq!(outcome.price, Price::from_units(108));
    }

    #[test]
    fn test_governance_requires_operator() {
        let (mut aggregator, _, _, _) = setup(1);
        let stranger = OperatorId::new();
        assert!(matches!(aggregator.set_min_quorum(stranger, 2), Err(Error::Unauthorized(_))));
        assert!(matches!(
            aggregator.add_source(stranger, SourceId::from("x"), quoting(1, NOW), 100, 60, 100),
            Err(Error::Unauthorized(_))
        ));
        assert_eq!(aggregator.get_active_source_count(), 0);
        assert_eq!(aggregator.config().min_quorum, 1);
    }
}
