//! Property tests for the parser/generator pair and the monthly fold.

use proptest::prelude::*;
use runlog::{aggregate, format_pace, format_row, parse_pace, parse_row, Record, Venue};

fn arb_venue() -> impl Strategy<Value = Venue> {
    prop_oneof![
        Just(Venue::Treadmill),
        Just(Venue::Outdoor),
        Just(Venue::Track),
        Just(Venue::Other),
        Just(Venue::Custom("park loop".into())),
    ]
}

fn arb_record() -> impl Strategy<Value = Record> {
    (
        (1u32..=12, 1u32..=28),
        1u32..100_000,
        1u32..100_000,
        (3u32..12, 0u32..60),
        proptest::option::of(60u16..220),
        proptest::option::of(60u16..230),
        proptest::option::of(300u32..2000),
        arb_venue(),
        proptest::option::of(1u8..=10),
        "[a-z]{0,12}",
    )
        .prop_map(|(date, dist, dur, pace, avg_hr, max_hr, weight, venue, feeling, note)| {
            let ((month, day), (pm, ps)) = (date, pace);
            Record {
                date: format!("2024-{:02}-{:02}", month, day),
                distance_km: dist as f64 / 100.0,
                duration_min: dur as f64 / 100.0,
                pace: format!("{}:{:02}", pm, ps),
                avg_hr,
                max_hr,
                weight_kg: weight.map(|w| w as f64 / 10.0),
                venue,
                feeling,
                note,
            }
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: a formatted row parses back to the same record
    #[test]
    fn prop_row_round_trip(record in arb_record()) {
        let row = format_row(&record);
        prop_assert_eq!(parse_row(&row), Ok(Some(record)));
    }

    /// Property: pace seconds survive formatting
    #[test]
    fn prop_pace_round_trip(seconds in 0u32..20_000) {
        prop_assert_eq!(parse_pace(&format_pace(seconds)), Some(seconds));
    }

    /// Property: monthly totals add up to the overall totals
    #[test]
    fn prop_monthly_sums_match_totals(
        batches in proptest::collection::vec(
            (1u32..=12, proptest::collection::vec(arb_record(), 0..8)),
            0..10,
        )
    ) {
        let batches: Vec<(String, Vec<Record>)> = batches
            .into_iter()
            .map(|(month, records)| (format!("2024-{:02}", month), records))
            .collect();
        let dataset = aggregate(batches);

        let total: f64 = dataset.records.iter().map(|r| r.distance_km).sum();
        let monthly_total: f64 = dataset.monthly.values().map(|m| m.total_distance).sum();
        prop_assert!((total - monthly_total).abs() < 1e-6);

        let monthly_count: usize = dataset.monthly.values().map(|m| m.count).sum();
        prop_assert_eq!(monthly_count, dataset.records.len());
    }
}
