//! Chunked statistics over the three numeric series.
//!
//! Small datasets are summarized directly. From `chunk_threshold` records
//! on, the dataset is scanned in fixed-size chunks that each produce an
//! exact integer accumulator (count, sum, sum of squares, min, max); the
//! accumulators merge associatively, so chunks can be reduced in parallel
//! with rayon when the `parallel` feature is enabled.
//!
//! If chunk accumulation fails (integer overflow on pathological values),
//! the summary is computed over a seeded random subsample instead and the
//! result is marked [`StatsMethod::Sampled`].
//!
//! Both paths report the population standard deviation, floored at zero.

pub mod numeric;
pub mod regression;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::StatsConfig;
use crate::dataset::Dataset;
use crate::error::{Result, ValmapError};

/// min / max / mean / standard deviation of one series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation (never negative).
    pub std: f64,
}

impl SeriesStats {
    /// Summarize a slice directly. `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        Self::from_series(values.iter().copied())
    }

    /// Summarize an iterator directly with a two-pass variance.
    pub fn from_series<I>(values: I) -> Option<Self>
    where
        I: Iterator<Item = f64> + Clone,
    {
        let mut n = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values.clone() {
            n += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        if n == 0 {
            return None;
        }
        let mean = sum / n as f64;
        let ss: f64 = values.map(|v| (v - mean) * (v - mean)).sum();
        Some(Self {
            min,
            max,
            mean,
            std: (ss / n as f64).max(0.0).sqrt(),
        })
    }
}

/// How a [`StatisticsSummary`] was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsMethod {
    /// Full series in one pass.
    Direct,
    /// Chunk accumulation.
    Chunked,
    /// Random subsample after chunk accumulation failed.
    Sampled,
    /// No records.
    Empty,
}

/// Aggregate view of a dataset's original, target and delta series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSummary {
    /// Records in the dataset (not the subsample, when sampled).
    pub total_records: usize,
    /// Original value statistics.
    pub original: Option<SeriesStats>,
    /// Target value statistics.
    pub target: Option<SeriesStats>,
    /// Delta statistics.
    pub delta: Option<SeriesStats>,
    /// Computation path.
    pub method: StatsMethod,
}

impl StatisticsSummary {
    /// Summary of an empty or cleared dataset.
    pub fn empty() -> Self {
        Self {
            total_records: 0,
            original: None,
            target: None,
            delta: None,
            method: StatsMethod::Empty,
        }
    }
}

/// Exact running aggregate of one integer series.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Accumulator {
    count: u64,
    sum: i128,
    sum_sq: u128,
    min: i128,
    max: i128,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            count: 0,
            sum: 0,
            sum_sq: 0,
            min: i128::MAX,
            max: i128::MIN,
        }
    }

    fn push(&mut self, value: i128) -> Option<()> {
        let magnitude = value.unsigned_abs();
        self.sum = self.sum.checked_add(value)?;
        self.sum_sq = self.sum_sq.checked_add(magnitude.checked_mul(magnitude)?)?;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        Some(())
    }

    fn merge(self, other: Self) -> Option<Self> {
        Some(Self {
            count: self.count + other.count,
            sum: self.sum.checked_add(other.sum)?,
            sum_sq: self.sum_sq.checked_add(other.sum_sq)?,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        })
    }

    fn finish(&self) -> Option<SeriesStats> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let mean = self.sum as f64 / n;

        // n * Σx² - (Σx)² is exact when it fits
        let exact = (self.count as u128)
            .checked_mul(self.sum_sq)
            .zip(self.sum.unsigned_abs().checked_mul(self.sum.unsigned_abs()))
            .map(|(a, b)| a.saturating_sub(b));
        let variance = match exact {
            Some(numerator) => numerator as f64 / (n * n),
            None => self.sum_sq as f64 / n - mean * mean,
        };

        Some(SeriesStats {
            min: self.min as f64,
            max: self.max as f64,
            mean,
            std: variance.max(0.0).sqrt(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct ChunkAccumulator {
    original: Accumulator,
    target: Accumulator,
    delta: Accumulator,
}

impl ChunkAccumulator {
    fn new() -> Self {
        Self {
            original: Accumulator::new(),
            target: Accumulator::new(),
            delta: Accumulator::new(),
        }
    }

    fn scan(dataset: &Dataset, start: usize, end: usize) -> Option<Self> {
        let mut acc = Self::new();
        for v in dataset.original().iter_range(start..end) {
            acc.original.push(v as i128)?;
        }
        for v in dataset.target().iter_range(start..end) {
            acc.target.push(v as i128)?;
        }
        for v in dataset.delta().iter_range(start..end) {
            acc.delta.push(v as i128)?;
        }
        Some(acc)
    }

    fn merge(self, other: Self) -> Option<Self> {
        Some(Self {
            original: self.original.merge(other.original)?,
            target: self.target.merge(other.target)?,
            delta: self.delta.merge(other.delta)?,
        })
    }
}

/// Summarize every series directly over the full dataset.
pub fn direct_statistics(dataset: &Dataset) -> StatisticsSummary {
    if dataset.is_empty() {
        return StatisticsSummary::empty();
    }
    StatisticsSummary {
        total_records: dataset.len(),
        original: SeriesStats::from_series(dataset.original().iter().map(|v| v as f64)),
        target: SeriesStats::from_series(dataset.target().iter().map(|v| v as f64)),
        delta: SeriesStats::from_series(dataset.delta().iter().map(|v| v as f64)),
        method: StatsMethod::Direct,
    }
}

/// Summarize the dataset by merging fixed-size chunk accumulators.
///
/// Fails if an exact integer sum overflows.
pub fn chunked_statistics(dataset: &Dataset, chunk_size: usize) -> Result<StatisticsSummary> {
    if chunk_size == 0 {
        return Err(ValmapError::invalid_config("stats chunk_size must be > 0"));
    }
    if dataset.is_empty() {
        return Ok(StatisticsSummary::empty());
    }

    let len = dataset.len();
    let chunks = len.div_ceil(chunk_size);
    let bounds = move |c: usize| (c * chunk_size, ((c + 1) * chunk_size).min(len));

    #[cfg(feature = "parallel")]
    let merged = (0..chunks)
        .into_par_iter()
        .map(|c| {
            let (start, end) = bounds(c);
            ChunkAccumulator::scan(dataset, start, end)
        })
        .reduce(
            || Some(ChunkAccumulator::new()),
            |a, b| a.zip(b).and_then(|(a, b)| a.merge(b)),
        );

    #[cfg(not(feature = "parallel"))]
    let merged = (0..chunks).try_fold(ChunkAccumulator::new(), |acc, c| {
        let (start, end) = bounds(c);
        acc.merge(ChunkAccumulator::scan(dataset, start, end)?)
    });

    let acc = merged.ok_or_else(|| ValmapError::Analysis {
        message: "integer accumulator overflow during chunked statistics".to_string(),
    })?;
    debug!("Accumulated {} records in {} chunks", len, chunks);

    Ok(StatisticsSummary {
        total_records: len,
        original: acc.original.finish(),
        target: acc.target.finish(),
        delta: acc.delta.finish(),
        method: StatsMethod::Chunked,
    })
}

/// Compute the statistics summary, choosing the path by dataset size.
pub fn compute_statistics(dataset: &Dataset, config: &StatsConfig) -> StatisticsSummary {
    if dataset.is_empty() {
        return StatisticsSummary::empty();
    }
    if dataset.len() < config.chunk_threshold {
        return direct_statistics(dataset);
    }

    match chunked_statistics(dataset, config.chunk_size) {
        Ok(summary) => summary,
        Err(e) => {
            warn!(
                "Chunked statistics failed ({}); using a {}-record sample",
                e, config.fallback_sample_size
            );
            let sample = dataset.sample(config.fallback_sample_size, config.seed);
            let mut summary = direct_statistics(&sample);
            summary.total_records = dataset.len();
            summary.method = StatsMethod::Sampled;
            summary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MappingRecord;

    fn dataset(pairs: &[(u64, u64)]) -> Dataset {
        let records: Vec<MappingRecord> = pairs
            .iter()
            .enumerate()
            .map(|(i, &(o, t))| MappingRecord::derived(i as u64 + 1, o, t).unwrap())
            .collect();
        Dataset::from_records(&records)
    }

    #[test]
    fn test_direct_statistics() {
        let data = dataset(&[(2, 3), (4, 3), (6, 9)]);
        let summary = direct_statistics(&data);
        let original = summary.original.unwrap();
        assert_eq!(original.min, 2.0);
        assert_eq!(original.max, 6.0);
        assert_eq!(original.mean, 4.0);
        assert!((original.std - (8.0f64 / 3.0).sqrt()).abs() < 1e-12);
        let delta = summary.delta.unwrap();
        assert_eq!((delta.min, delta.max), (-1.0, 3.0));
        assert_eq!(summary.method, StatsMethod::Direct);
    }

    #[test]
    fn test_chunked_matches_direct() {
        let pairs: Vec<(u64, u64)> = (0..1_003).map(|i| (i * 7 % 4096, (i * 13) % 5000)).collect();
        let data = dataset(&pairs);
        let direct = direct_statistics(&data);
        let chunked = chunked_statistics(&data, 100).unwrap();
        for (a, b) in [
            (direct.original, chunked.original),
            (direct.target, chunked.target),
            (direct.delta, chunked.delta),
        ] {
            let (a, b) = (a.unwrap(), b.unwrap());
            assert_eq!(a.min, b.min);
            assert_eq!(a.max, b.max);
            assert!((a.mean - b.mean).abs() <= 1e-9 * a.mean.abs().max(1.0));
            assert!((a.std - b.std).abs() <= 1e-9 * a.std.max(1.0));
        }
    }

    #[test]
    fn test_size_gate() {
        let data = dataset(&[(1, 2), (3, 4), (5, 6)]);
        let config = StatsConfig::new().with_chunk_threshold(3).with_chunk_size(2);
        assert_eq!(compute_statistics(&data, &config).method, StatsMethod::Chunked);
        let config = StatsConfig::new().with_chunk_threshold(4);
        assert_eq!(compute_statistics(&data, &config).method, StatsMethod::Direct);
    }

    #[test]
    fn test_overflow_falls_back_to_sample() {
        let big = u64::MAX - 1;
        let data = dataset(&[(big, big), (big, big), (big, big), (1, 1)]);
        assert!(chunked_statistics(&data, 2).is_err());

        let config = StatsConfig::new()
            .with_chunk_threshold(0)
            .with_fallback_sample_size(3);
        let summary = compute_statistics(&data, &config);
        assert_eq!(summary.method, StatsMethod::Sampled);
        assert_eq!(summary.total_records, 4);
        assert!(summary.original.unwrap().std >= 0.0);
    }

    #[test]
    fn test_constant_series_has_zero_std() {
        let data = dataset(&[(65_535, 65_535); 20]);
        let summary = chunked_statistics(&data, 7).unwrap();
        assert_eq!(summary.original.unwrap().std, 0.0);
        assert_eq!(summary.delta.unwrap().mean, 0.0);
    }

    #[test]
    fn test_empty_dataset() {
        let summary = compute_statistics(&Dataset::new(), &StatsConfig::default());
        assert_eq!(summary, StatisticsSummary::empty());
        assert_eq!(chunked_statistics(&Dataset::new(), 10).unwrap().method, StatsMethod::Empty);
    }
}
