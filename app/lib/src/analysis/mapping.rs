//! Constant, linear and piecewise-linear mapping tests.
//!
//! Every test returns `Result`; the session wraps each call in a
//! [`StepOutcome`] so one failing test never hides the others.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::analysis::deriver::PIECEWISE_CONFIDENCE;
use crate::analysis::verdict::StepOutcome;
use crate::analysis::window::{find_turning_points, TurningPoint};
use crate::config::AnalyzerConfig;
use crate::dataset::Dataset;
use crate::error::{Result, ValmapError};
use crate::stats::regression::{linregress, pearson, residuals, LinearFit, Residuals};

/// Verdict of the constant-offset test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstantTest {
    /// Exactly one distinct delta exists.
    pub is_constant: bool,
    /// The single delta, when constant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constant_change: Option<i64>,
    /// Number of distinct deltas.
    pub unique_changes: usize,
    /// Smallest and largest delta.
    pub change_range: [i64; 2],
    /// `target = original + k`, when constant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// 1.0 when constant, otherwise 0.0.
    pub confidence: f64,
}

/// Verdict of the whole-dataset linear test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearTest {
    /// R² exceeded the acceptance threshold.
    pub is_linear: bool,
    /// Regression parameters.
    #[serde(flatten)]
    pub fit: LinearFit,
    /// Residual error measures.
    #[serde(flatten)]
    pub residuals: Residuals,
    /// `target = a * original + b`.
    pub formula: String,
    /// R² when linear, otherwise 0.0.
    pub confidence: f64,
}

/// One value range of a piecewise mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    /// First position in the value-sorted data.
    pub start_index: usize,
    /// Last position in the value-sorted data, inclusive.
    pub end_index: usize,
    /// Smallest original value in the segment.
    pub start_value: u64,
    /// Largest original value in the segment.
    pub end_value: u64,
    /// Records in the segment.
    pub data_count: usize,
    /// Independent linear fit of the segment.
    pub fit: StepOutcome<LinearTest>,
}

/// Verdict of the piecewise test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PiecewiseTest {
    /// More than one segment survived.
    pub is_piecewise: bool,
    /// Retained turning points, earliest first.
    pub turning_points: Vec<TurningPoint>,
    /// Surviving segments in value order.
    pub segments: Vec<Segment>,
    /// `segments.len()`.
    pub total_segments: usize,
    /// [`PIECEWISE_CONFIDENCE`] when piecewise, otherwise 0.0.
    pub confidence: f64,
}

/// Counts describing the loaded records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataQuality {
    /// Records in the dataset.
    pub total_records: usize,
    /// Distinct original values.
    pub unique_original_values: usize,
    /// Distinct target values.
    pub unique_target_values: usize,
    /// Always 0: typed records cannot lack a numeric field.
    pub missing_values: usize,
}

/// High-level overview of how originals map to targets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingPatterns {
    /// A single delta explains every record.
    pub is_global_algorithm: bool,
    /// Distinct deltas.
    pub unique_change_count: usize,
    /// Pearson correlation of original and target; `None` without variance.
    pub correlation: Option<f64>,
    /// Regression of target on original.
    pub linear_fit: StepOutcome<LinearFit>,
    /// Record counts.
    pub data_quality: DataQuality,
}

/// 25/50/75% quantiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quartiles {
    /// First quartile.
    #[serde(rename = "0.25")]
    pub q25: f64,
    /// Median.
    #[serde(rename = "0.5")]
    pub q50: f64,
    /// Third quartile.
    #[serde(rename = "0.75")]
    pub q75: f64,
}

/// Shape of one numeric series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesDistribution {
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation; `None` for a single value.
    pub std: Option<f64>,
    /// 50% quantile.
    pub median: f64,
    /// 25/50/75% quantiles.
    pub quartiles: Quartiles,
}

/// Distribution of original, target and delta plus distinct counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSummary {
    /// Original values.
    pub original_distribution: SeriesDistribution,
    /// Target values.
    pub target_distribution: SeriesDistribution,
    /// Deltas.
    pub change_distribution: SeriesDistribution,
    /// Distinct original values.
    pub unique_original_values: usize,
    /// Distinct target values.
    pub unique_target_values: usize,
    /// Distinct `(original, target)` pairs.
    pub unique_mappings: usize,
}

fn require_records(dataset: &Dataset) -> Result<()> {
    if dataset.is_empty() {
        Err(ValmapError::degenerate("dataset has no records"))
    } else {
        Ok(())
    }
}

/// Linear interpolation between closest ranks of sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn describe(mut values: Vec<f64>) -> SeriesDistribution {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = if values.len() < 2 {
        None
    } else {
        let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
        Some((ss / (n - 1.0)).max(0.0).sqrt())
    };
    values.sort_by(f64::total_cmp);
    let quartiles = Quartiles {
        q25: quantile(&values, 0.25),
        q50: quantile(&values, 0.5),
        q75: quantile(&values, 0.75),
    };
    SeriesDistribution {
        min: values[0],
        max: values[values.len() - 1],
        mean,
        std,
        median: quartiles.q50,
        quartiles,
    }
}

fn format_linear(slope: f64, intercept: f64) -> String {
    let sign = if intercept < 0.0 { '-' } else { '+' };
    format!("target = {:.3} * original {} {:.1}", slope, sign, intercept.abs())
}

/// Runs the mapping tests over a dataset.
#[derive(Debug, Clone, Default)]
pub struct MappingAnalyzer {
    config: AnalyzerConfig,
}

impl MappingAnalyzer {
    /// Create an analyzer with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an analyzer with custom thresholds.
    pub fn with_config(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use.
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Check whether every record shares one delta.
    pub fn constant_test(&self, dataset: &Dataset) -> Result<ConstantTest> {
        require_records(dataset)?;
        let changes: BTreeSet<i64> = dataset.delta().iter().collect();
        let (min, max) = match (changes.first(), changes.last()) {
            (Some(&min), Some(&max)) => (min, max),
            _ => return Err(ValmapError::degenerate("dataset has no deltas")),
        };

        if changes.len() == 1 {
            Ok(ConstantTest {
                is_constant: true,
                constant_change: Some(min),
                unique_changes: 1,
                change_range: [min, max],
                formula: Some(format!("target = original {:+}", min)),
                confidence: 1.0,
            })
        } else {
            Ok(ConstantTest {
                is_constant: false,
                constant_change: None,
                unique_changes: changes.len(),
                change_range: [min, max],
                formula: None,
                confidence: 0.0,
            })
        }
    }

    /// Least-squares fit of target on original over the whole dataset.
    pub fn linear_test(&self, dataset: &Dataset) -> Result<LinearTest> {
        require_records(dataset)?;
        self.linear_test_on(&dataset.original_f64(), &dataset.target_f64())
    }

    fn linear_test_on(&self, x: &[f64], y: &[f64]) -> Result<LinearTest> {
        let fit = linregress(x, y)?;
        let is_linear = fit.r_squared > self.config.linear_r2_threshold;
        Ok(LinearTest {
            is_linear,
            confidence: if is_linear { fit.r_squared } else { 0.0 },
            residuals: residuals(&fit, x, y),
            formula: format_linear(fit.slope, fit.intercept),
            fit,
        })
    }

    /// Split the value-sorted data at turning points and fit each part.
    pub fn piecewise_test(&self, dataset: &Dataset) -> Result<PiecewiseTest> {
        require_records(dataset)?;
        self.config.validate()?;

        let sorted = dataset.sorted_by_original();
        let originals: Vec<u64> = sorted.original().iter().collect();
        let targets: Vec<u64> = sorted.target().iter().collect();
        let x: Vec<f64> = originals.iter().map(|&v| v as f64).collect();
        let y: Vec<f64> = targets.iter().map(|&v| v as f64).collect();

        let turning_points = find_turning_points(&originals, &targets, &self.config);

        let n = originals.len();
        let mut bounds = Vec::with_capacity(turning_points.len() + 1);
        let mut start = 0;
        for tp in &turning_points {
            bounds.push((start, tp.index));
            start = tp.index + 1;
        }
        if start < n {
            bounds.push((start, n - 1));
        }

        let segments: Vec<Segment> = bounds
            .into_iter()
            .filter(|&(s, e)| e + 1 - s > self.config.min_segment_records || turning_points.is_empty())
            .map(|(s, e)| Segment {
                start_index: s,
                end_index: e,
                start_value: originals[s],
                end_value: originals[e],
                data_count: e + 1 - s,
                fit: self.linear_test_on(&x[s..=e], &y[s..=e]).into(),
            })
            .collect();

        let is_piecewise = segments.len() > 1;
        Ok(PiecewiseTest {
            is_piecewise,
            confidence: if is_piecewise { PIECEWISE_CONFIDENCE } else { 0.0 },
            total_segments: segments.len(),
            turning_points,
            segments,
        })
    }

    /// Delta uniqueness, correlation, linear fit and record counts.
    pub fn mapping_patterns(&self, dataset: &Dataset) -> Result<MappingPatterns> {
        require_records(dataset)?;
        let x = dataset.original_f64();
        let y = dataset.target_f64();
        let changes: HashSet<i64> = dataset.delta().iter().collect();

        Ok(MappingPatterns {
            is_global_algorithm: changes.len() == 1,
            unique_change_count: changes.len(),
            correlation: pearson(&x, &y),
            linear_fit: linregress(&x, &y).into(),
            data_quality: DataQuality {
                total_records: dataset.len(),
                unique_original_values: distinct(dataset.original().iter()),
                unique_target_values: distinct(dataset.target().iter()),
                missing_values: 0,
            },
        })
    }

    /// Per-series distribution and distinct counts.
    pub fn distribution(&self, dataset: &Dataset) -> Result<DistributionSummary> {
        require_records(dataset)?;
        let pairs: HashSet<(u64, u64)> = dataset
            .original()
            .iter()
            .zip(dataset.target().iter())
            .collect();

        Ok(DistributionSummary {
            original_distribution: describe(dataset.original_f64()),
            target_distribution: describe(dataset.target_f64()),
            change_distribution: describe(dataset.delta_f64()),
            unique_original_values: distinct(dataset.original().iter()),
            unique_target_values: distinct(dataset.target().iter()),
            unique_mappings: pairs.len(),
        })
    }
}

fn distinct(values: impl Iterator<Item = u64>) -> usize {
    values.collect::<HashSet<u64>>().len()
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
    fn test_constant_offset() {
        let data = dataset((0..50).map(|v| (v, v + 5)));
        let verdict = MappingAnalyzer::new().constant_test(&data).unwrap();
        assert!(verdict.is_constant);
        assert_eq!(verdict.constant_change, Some(5));
        assert_eq!(verdict.confidence, 1.0);
        assert_eq!(verdict.formula.as_deref(), Some("target = original +5"));
    }

    #[test]
    fn test_not_constant_reports_range() {
        let data = dataset([(10, 8), (10, 13), (4, 4)]);
        let verdict = MappingAnalyzer::new().constant_test(&data).unwrap();
        assert!(!verdict.is_constant);
        assert_eq!(verdict.unique_changes, 3);
        assert_eq!(verdict.change_range, [-2, 3]);
        let json = serde_json::to_value(&verdict).unwrap();
        assert!(json.get("constant_change").is_none());
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let analyzer = MappingAnalyzer::new();
        assert!(analyzer.constant_test(&Dataset::new()).is_err());
        assert!(analyzer.linear_test(&Dataset::new()).is_err());
        assert!(analyzer.piecewise_test(&Dataset::new()).is_err());
    }

    #[test]
    fn test_linear_three_x_plus_seven() {
        let data = dataset((0..500).map(|v| (v, 3 * v + 7)));
        let verdict = MappingAnalyzer::new().linear_test(&data).unwrap();
        assert!(verdict.is_linear);
        assert!((verdict.fit.slope - 3.0).abs() < 1e-9);
        assert!((verdict.fit.intercept - 7.0).abs() < 1e-6);
        assert!((verdict.fit.r_squared - 1.0).abs() < 1e-12);
        assert_eq!(verdict.confidence, verdict.fit.r_squared);
        assert_eq!(verdict.formula, "target = 3.000 * original + 7.0");
    }

    #[test]
    fn test_scattered_values_have_no_linear_confidence() {
        let data = dataset((0..500).map(|v| (v, (v * 7_919) % 1_000)));
        let verdict = MappingAnalyzer::new().linear_test(&data).unwrap();
        assert!(!verdict.is_linear);
        assert_eq!(verdict.confidence, 0.0);
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["confidence"], 0.0);
    }

    #[test]
    fn test_linear_formula_negative_intercept() {
        assert_eq!(format_linear(0.5, -2.24), "target = 0.500 * original - 2.2");
    }

    #[test]
    fn test_piecewise_two_slopes() {
        // shuffled order; the test sorts by original value itself
        let pairs = (0..10_000u64).rev().map(|v| {
            let t = if v < 5_000 { v } else { 5_000 + 5 * (v - 5_000) };
            (v, t)
        });
        let data = dataset(pairs);
        let verdict = MappingAnalyzer::new().piecewise_test(&data).unwrap();
        assert!(verdict.is_piecewise);
        assert_eq!(verdict.turning_points.len(), 1);
        assert_eq!(verdict.total_segments, 2);
        assert_eq!(verdict.confidence, PIECEWISE_CONFIDENCE);

        let first = verdict.segments[0].fit.value().unwrap();
        let second = verdict.segments[1].fit.value().unwrap();
        assert!((first.fit.slope - 1.0).abs() < 1e-9);
        assert!((second.fit.slope - 5.0).abs() < 1e-9);
        assert_eq!(verdict.segments[0].start_value, 0);
        assert_eq!(verdict.segments[1].end_value, 9_999);
        assert_eq!(
            verdict.segments[0].data_count + verdict.segments[1].data_count,
            10_000
        );
    }

    #[test]
    fn test_no_turning_points_is_single_segment() {
        let data = dataset((0..300).map(|v| (v, 2 * v)));
        let verdict = MappingAnalyzer::new().piecewise_test(&data).unwrap();
        assert!(!verdict.is_piecewise);
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.total_segments, 1);
        assert_eq!(verdict.segments[0].data_count, 300);
    }

    #[test]
    fn test_segment_fit_failure_is_kept_as_error() {
        let data = dataset([(3, 1), (3, 2)]);
        let verdict = MappingAnalyzer::new().piecewise_test(&data).unwrap();
        assert!(verdict.segments[0].fit.error().is_some());
    }

    #[test]
    fn test_mapping_patterns() {
        let data = dataset([(1, 2), (2, 3), (3, 4), (3, 4)]);
        let patterns = MappingAnalyzer::new().mapping_patterns(&data).unwrap();
        assert!(patterns.is_global_algorithm);
        assert_eq!(patterns.unique_change_count, 1);
        assert_eq!(patterns.data_quality.unique_original_values, 3);
        assert_eq!(patterns.data_quality.missing_values, 0);
        assert!((patterns.correlation.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_distribution_quartiles() {
        let data = dataset([(1, 1), (2, 2), (3, 3), (4, 4)]);
        let summary = MappingAnalyzer::new().distribution(&data).unwrap();
        let original = summary.original_distribution;
        assert_eq!(original.quartiles.q25, 1.75);
        assert_eq!(original.median, 2.5);
        assert_eq!(original.quartiles.q75, 3.25);
        assert_eq!(summary.unique_mappings, 4);
        assert_eq!(summary.change_distribution.std, Some(0.0));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["original_distribution"]["quartiles"]["0.5"], 2.5);
    }
}
