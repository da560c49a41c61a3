//! Integration tests for the statistics engine.
//!
//! The chunked path must agree with the direct path on every series, and
//! the size threshold must pick between them.

use proptest::prelude::*;
use valmap::stats::{chunked_statistics, direct_statistics};
use valmap::{
    compute_statistics, Dataset, MappingRecord, SeriesStats, StatsConfig, StatsMethod,
};

fn dataset(pairs: &[(u64, u64)]) -> Dataset {
    let records: Vec<MappingRecord> = pairs
        .iter()
        .enumerate()
        .map(|(i, &(o, t))| MappingRecord::derived(i as u64 + 1, o, t).unwrap())
        .collect();
    Dataset::from_records(&records)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * (1.0 + a.abs().max(b.abs()))
}

fn assert_series_close(a: &Option<SeriesStats>, b: &Option<SeriesStats>) {
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.min, b.min);
    assert_eq!(a.max, b.max);
    assert!(close(a.mean, b.mean), "mean {} vs {}", a.mean, b.mean);
    assert!(close(a.std, b.std), "std {} vs {}", a.std, b.std);
}

/// Strategy for generating mapping pairs with 16-bit pixel-like values
fn pairs_strategy() -> impl Strategy<Value = Vec<(u64, u64)>> {
    prop::collection::vec((0u64..65_536, 0u64..65_536), 1..400)
}

proptest! {
    #[test]
    fn prop_chunked_matches_direct(pairs in pairs_strategy(), chunk in 1usize..64) {
        let data = dataset(&pairs);
        let direct = direct_statistics(&data);
        let chunked = chunked_statistics(&data, chunk).unwrap();

        prop_assert_eq!(chunked.total_records, direct.total_records);
        prop_assert_eq!(chunked.method, StatsMethod::Chunked);
        assert_series_close(&chunked.original, &direct.original);
        assert_series_close(&chunked.target, &direct.target);
        assert_series_close(&chunked.delta, &direct.delta);
    }

    #[test]
    fn prop_threshold_selects_path(pairs in pairs_strategy()) {
        let data = dataset(&pairs);
        let below = compute_statistics(&data, &StatsConfig::new().with_chunk_threshold(data.len() + 1));
        let above = compute_statistics(
            &data,
            &StatsConfig::new().with_chunk_threshold(1).with_chunk_size(7),
        );

        prop_assert_eq!(below.method, StatsMethod::Direct);
        prop_assert_eq!(above.method, StatsMethod::Chunked);
        assert_series_close(&below.delta, &above.delta);
    }
}

#[test]
fn test_empty_dataset_has_no_series() {
    let summary = compute_statistics(&Dataset::new(), &StatsConfig::default());
    assert_eq!(summary.total_records, 0);
    assert_eq!(summary.method, StatsMethod::Empty);
    assert!(summary.original.is_none());
    assert!(summary.delta.is_none());
}

#[test]
fn test_population_std() {
    let data = dataset(&[(1, 1), (3, 3)]);
    let summary = compute_statistics(&data, &StatsConfig::default());
    assert_eq!(summary.original.unwrap().std, 1.0);
    assert_eq!(summary.delta.unwrap().std, 0.0);
}

#[test]
fn test_overflow_falls_back_to_sample() {
    // squares of these values overflow the exact accumulators
    let big = u64::MAX / 2;
    let pairs: Vec<(u64, u64)> = (0..50).map(|i| (big - i, big - i)).collect();
    let data = dataset(&pairs);
    let config = StatsConfig::new()
        .with_chunk_threshold(1)
        .with_chunk_size(10)
        .with_fallback_sample_size(20);

    let summary = compute_statistics(&data, &config);
    assert_eq!(summary.method, StatsMethod::Sampled);
    assert_eq!(summary.total_records, 50);
    assert_eq!(summary.delta.unwrap().mean, 0.0);
}

#[test]
fn test_summary_serializes_method() {
    let data = dataset(&[(1, 2), (2, 3)]);
    let summary = compute_statistics(&data, &StatsConfig::default());
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["method"], "direct");
    assert_eq!(json["total_records"], 2);
}

#[test]
fn test_default_threshold_switches_to_chunked() {
    let config = StatsConfig::default();
    let len = config.chunk_threshold + 1;
    let pairs: Vec<(u64, u64)> = (0..len as u64)
        .map(|i| (i % 65_536, (i * 7 + 3) % 65_536))
        .collect();
    let data = dataset(&pairs);

    let summary = compute_statistics(&data, &config);
    assert_eq!(summary.method, StatsMethod::Chunked);
    assert_eq!(summary.total_records, len);

    let direct = direct_statistics(&data);
    assert_series_close(&summary.original, &direct.original);
    assert_series_close(&summary.target, &direct.target);
    assert_series_close(&summary.delta, &direct.delta);
}
