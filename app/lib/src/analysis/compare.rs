//! Comparison of two mapping datasets.
//!
//! Two logs encode the same rule when their linear fits agree, their value
//! distributions pass a two-sample Kolmogorov–Smirnov test and their delta
//! series correlate. Every score here is symmetric in its two inputs.

use serde::Serialize;

use crate::analysis::verdict::StepOutcome;
use crate::config::{CompareConfig, StatsConfig};
use crate::dataset::Dataset;
use crate::error::{Result, ValmapError};
use crate::stats::numeric::kolmogorov_q;
use crate::stats::regression::{linregress, pearson};
use crate::stats::{compute_statistics, StatisticsSummary};

/// Agreement of two independent linear fits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearSimilarity {
    /// `1 - min(|Δslope|, 1)`.
    pub slope_similarity: f64,
    /// `1 - min(|Δintercept| / 100, 1)`.
    pub intercept_similarity: f64,
    /// `1 - min(|ΔR²|, 1)`.
    pub r2_similarity: f64,
    /// Mean of the three similarities, in [0, 1].
    pub overall_similarity: f64,
    /// `overall_similarity` exceeded the cutoff.
    pub is_similar: bool,
}

/// Result of one two-sample KS test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KsTest {
    /// Largest distance between the empirical CDFs.
    pub ks_statistic: f64,
    /// Asymptotic two-sided p-value.
    pub p_value: f64,
    /// `p_value` exceeded the significance level.
    pub is_similar: bool,
}

/// KS tests on the original and target series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistributionComparison {
    /// Test on original values.
    pub original_distribution: KsTest,
    /// Test on target values.
    pub target_distribution: KsTest,
    /// Both tests judged the series similar.
    pub overall_similarity: bool,
}

/// Agreement of the two delta series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeltaConsistency {
    /// Pearson correlation; 0 when lengths differ or it is undefined.
    pub change_correlation: f64,
    /// `|change_correlation|` exceeded the cutoff.
    pub change_consistency: bool,
    /// `|change_correlation|`.
    pub performance_similarity: f64,
}

/// Full comparison of two datasets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    /// Statistics of the first dataset.
    pub data1_stats: StatisticsSummary,
    /// Statistics of the second dataset.
    pub data2_stats: StatisticsSummary,
    /// Linear-fit similarity.
    pub algorithm_similarity: StepOutcome<LinearSimilarity>,
    /// Distribution tests.
    pub distribution_comparison: StepOutcome<DistributionComparison>,
    /// Delta correlation.
    pub performance_comparison: DeltaConsistency,
}

/// Two-sample Kolmogorov–Smirnov statistic and asymptotic p-value.
///
/// The p-value uses the effective size `n1 n2 / (n1 + n2)` with Stephens'
/// correction.
pub fn ks_2samp(a: &[f64], b: &[f64]) -> Result<(f64, f64)> {
    if a.is_empty() || b.is_empty() {
        return Err(ValmapError::degenerate("KS test needs two non-empty samples"));
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < a.len() && j < b.len() {
        let v = a[i].min(b[j]);
        while i < a.len() && a[i] <= v {
            i += 1;
        }
        while j < b.len() && b[j] <= v {
            j += 1;
        }
        d = d.max((i as f64 / n1 - j as f64 / n2).abs());
    }

    let en = (n1 * n2 / (n1 + n2)).sqrt();
    let p = kolmogorov_q((en + 0.12 + 0.11 / en) * d);
    Ok((d, p))
}

/// Compares two datasets.
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    config: CompareConfig,
    stats: StatsConfig,
}

impl Comparator {
    /// Create a comparator with default cutoffs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a comparator with custom cutoffs.
    pub fn with_config(config: CompareConfig) -> Self {
        Self {
            config,
            stats: StatsConfig::default(),
        }
    }

    /// Statistics settings used for the per-dataset summaries.
    pub fn with_stats_config(mut self, stats: StatsConfig) -> Self {
        self.stats = stats;
        self
    }

    /// Compare `a` with `b`.
    pub fn compare(&self, a: &Dataset, b: &Dataset) -> ComparisonReport {
        ComparisonReport {
            data1_stats: compute_statistics(a, &self.stats),
            data2_stats: compute_statistics(b, &self.stats),
            algorithm_similarity: self.linear_similarity(a, b).into(),
            distribution_comparison: self.distributions(a, b).into(),
            performance_comparison: self.delta_consistency(a, b),
        }
    }

    /// Similarity of independently fitted lines.
    pub fn linear_similarity(&self, a: &Dataset, b: &Dataset) -> Result<LinearSimilarity> {
        let fa = linregress(&a.original_f64(), &a.target_f64())?;
        let fb = linregress(&b.original_f64(), &b.target_f64())?;

        let slope_similarity = 1.0 - (fa.slope - fb.slope).abs().min(1.0);
        let intercept_similarity = 1.0 - ((fa.intercept - fb.intercept).abs() * 0.01).min(1.0);
        let r2_similarity = 1.0 - (fa.r_squared - fb.r_squared).abs().min(1.0);
        let overall = ((slope_similarity + intercept_similarity + r2_similarity) / 3.0).clamp(0.0, 1.0);

        Ok(LinearSimilarity {
            slope_similarity,
            intercept_similarity,
            r2_similarity,
            overall_similarity: overall,
            is_similar: overall > self.config.similarity_cutoff,
        })
    }

    /// KS tests on original and target values.
    pub fn distributions(&self, a: &Dataset, b: &Dataset) -> Result<DistributionComparison> {
        let ks = |x: Vec<f64>, y: Vec<f64>| -> Result<KsTest> {
            let (d, p) = ks_2samp(&x, &y)?;
            Ok(KsTest {
                ks_statistic: d,
                p_value: p,
                is_similar: p > self.config.ks_alpha,
            })
        };
        let original = ks(a.original_f64(), b.original_f64())?;
        let target = ks(a.target_f64(), b.target_f64())?;
        Ok(DistributionComparison {
            overall_similarity: original.is_similar && target.is_similar,
            original_distribution: original,
            target_distribution: target,
        })
    }

    /// Correlation of the delta series, position by position.
    pub fn delta_consistency(&self, a: &Dataset, b: &Dataset) -> DeltaConsistency {
        let r = if a.len() == b.len() {
            pearson(&a.delta_f64(), &b.delta_f64()).unwrap_or(0.0)
        } else {
            0.0
        };
        DeltaConsistency {
            change_correlation: r,
            change_consistency: r.abs() > self.config.correlation_cutoff,
            performance_similarity: r.abs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MappingRecord;

    fn dataset(pairs: impl IntoIterator<Item = (u64, u64)>) -> Dataset {
        let records: Vec<MappingRecord> = pairs
            .into_iter()
            .enumerate()
            .map(|(i, (o, t))| MappingRecord::derived(i as u64 + 1, o, t).unwrap())
            .collect();
        Dataset::from_records(&records)
    }

    #[test]
    fn test_ks_identical_samples() {
        let a: Vec<f64> = (0..100).map(|v| v as f64).collect();
        let (d, p) = ks_2samp(&a, &a).unwrap();
        assert_eq!(d, 0.0);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_ks_disjoint_samples() {
        let a: Vec<f64> = (0..100).map(|v| v as f64).collect();
        let b: Vec<f64> = (1_000..1_100).map(|v| v as f64).collect();
        let (d, p) = ks_2samp(&a, &b).unwrap();
        assert_eq!(d, 1.0);
        assert!(p < 1e-10);
    }

    #[test]
    fn test_ks_handles_ties() {
        let (d, _) = ks_2samp(&[1.0, 1.0, 2.0], &[1.0, 2.0, 2.0]).unwrap();
        assert!((d - 1.0 / 3.0).abs() < 1e-12);
        assert!(ks_2samp(&[], &[1.0]).is_err());
    }

    #[test]
    fn test_same_rule_is_similar() {
        let a = dataset((0..1_000).map(|v| (v, 2 * v + 5)));
        let b = dataset((0..1_000).map(|v| (v, 2 * v + 5)));
        let report = Comparator::new().compare(&a, &b);
        let linear = report.algorithm_similarity.value().unwrap();
        assert!(linear.is_similar);
        assert_eq!(linear.overall_similarity, 1.0);
        assert!(report.distribution_comparison.value().unwrap().overall_similarity);
    }

    #[test]
    fn test_different_rules_are_not_similar() {
        let a = dataset((0..1_000).map(|v| (v, v)));
        let b = dataset((0..1_000).map(|v| (v, 3 * v + 400)));
        let linear = Comparator::new().linear_similarity(&a, &b).unwrap();
        assert!(!linear.is_similar);
        assert_eq!(linear.slope_similarity, 0.0);
        assert_eq!(linear.intercept_similarity, 0.0);
        assert!(linear.overall_similarity >= 0.0);
    }

    #[test]
    fn test_delta_correlation_needs_equal_lengths() {
        let a = dataset((0..10).map(|v| (v, 2 * v)));
        let b = dataset((0..11).map(|v| (v, 2 * v)));
        let consistency = Comparator::new().delta_consistency(&a, &b);
        assert_eq!(consistency.change_correlation, 0.0);
        assert!(!consistency.change_consistency);

        let c = dataset((0..10).map(|v| (v, 3 * v)));
        let consistency = Comparator::new().delta_consistency(&a, &c);
        assert!((consistency.change_correlation - 1.0).abs() < 1e-12);
        assert!(consistency.change_consistency);
    }

    #[test]
    fn test_degenerate_fit_becomes_error_entry() {
        let a = dataset([(5, 6), (5, 7)]);
        let b = dataset([(1, 2), (2, 3)]);
        let report = Comparator::new().compare(&a, &b);
        assert!(report.algorithm_similarity.error().is_some());
        assert!(report.distribution_comparison.is_done());
    }
}
