use std::sync::Arc;
use proptest::prelude::*;
use price_oracle::config::AggregatorConfig;
use price_oracle::interfaces::clock::{Clock, ManualClock};
use price_oracle::interfaces::event_producer::RecordingEventSink;
use price_oracle::price_infra::admission::AggregateFlags;
use price_oracle::price_infra::aggregator::Aggregator;
use price_oracle::price_infra::connectors::static_source::StaticSource;
use price_oracle::types::ids::{OperatorId, SourceId};
use price_oracle::types::price::Price;
use price_oracle::types::timestamp::Timestamp;

const START: u64 = 1_708_000_000;

fn build(quotes: &[(u64, u32)]) -> (Aggregator, Arc<ManualClock>, Vec<Arc<StaticSource>>) {
    let admin = OperatorId::new();
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(START)));
    let config = AggregatorConfig {
        min_quorum: 1,
        max_deviation_from_twap_bps: 5_000,
        ..Default::default()
    };
    let mut aggregator = Aggregator::new(config, admin, clock.clone())
        .unwrap()
        .with_event_sink(RecordingEventSink::new());

    let mut sources = Vec::new();
    for (i, &(units, weight)) in quotes.iter().enumerate() {
        let source = Arc::new(StaticSource::new(Price::from_units(units), Timestamp::from_secs(START)));
        aggregator
            .add_source(admin, SourceId::new(format!("src-{}", i)), source.clone(), weight, 600, 5_000)
            .unwrap();
        sources.push(source);
    }
    (aggregator, clock, sources)
}

proptest! {
    #[test]
    fn prop_first_aggregate_lies_within_source_range(
        quotes in prop::collection::vec((1u64..1_000_000, 1u32..2_000), 1..10)
    ) {
        let (aggregator, _, _) = build(&quotes);
        let outcome = aggregator.aggregate().unwrap();

        prop_assert_eq!(outcome.flags, AggregateFlags::OK);
        prop_assert_eq!(outcome.sources_used, quotes.len());

        let min = quotes.iter().map(|q| q.0).min().unwrap();
        let max = quotes.iter().map(|q| q.0).max().unwrap();
        prop_assert!(outcome.price >= Price::from_units(min));
        prop_assert!(outcome.price <= Price::from_units(max));
    }

    #[test]
    fn prop_committed_history_stays_ordered(
        steps in prop::collection::vec((1u64..600, 95u64..105), 1..40)
    ) {
        let (mut aggregator, clock, sources) = build(&[(100, 5_000), (100, 5_000)]);

        for (advance, units) in steps {
            clock.advance(advance);
            for source in &sources {
                source.set_quote(Price::from_units(units), clock.now());
            }
            // rejections are fine; they must not corrupt state
            let _ = aggregator.update_price();
            prop_assert!(aggregator.check_invariants().is_ok());
        }

        prop_assert!(aggregator.is_bootstrapped());
        let latest = aggregator.latest_price().unwrap();
        prop_assert_eq!(latest.timestamp, aggregator.last_update_time());
        let twap = aggregator.get_twap(3_600);
        prop_assert!(twap >= Price::from_units(95) && twap <= Price::from_units(104));
    }
}
