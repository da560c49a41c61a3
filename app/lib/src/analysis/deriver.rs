//! Simplicity-first algorithm derivation.
//!
//! Hypotheses are tried from most to least restrictive: constant offset,
//! whole-range line, piecewise line, then the best generic model. The first
//! one that holds is returned with its native confidence.

use log::debug;
use serde::Serialize;

use crate::analysis::mapping::{ConstantTest, LinearTest, MappingAnalyzer, PiecewiseTest, Segment};
use crate::analysis::models::{ModelFitter, ModelReport};
use crate::analysis::verdict::ModelKind;
use crate::config::AnalyzerConfig;
use crate::dataset::Dataset;
use crate::error::Result;

/// Confidence assigned to an accepted piecewise derivation.
pub const PIECEWISE_CONFIDENCE: f64 = 0.8;

/// Confidence assigned to the generic-model fallback.
pub const MODEL_CONFIDENCE: f64 = 0.5;

/// Evidence behind a derived algorithm.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Derivation {
    /// Single delta.
    Constant(ConstantTest),
    /// Whole-range line.
    Linear(LinearTest),
    /// Line per value range.
    Piecewise(PiecewiseTest),
    /// Best of the generic model families.
    Model(ModelReport),
}

/// The accepted hypothesis and its confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedAlgorithm {
    /// Family of the accepted hypothesis.
    pub algorithm_type: AlgorithmType,
    /// Test result that accepted it.
    pub algorithm: Derivation,
    /// 1.0 for constant, R² for linear, 0.8 for piecewise, 0.5 otherwise.
    pub confidence: f64,
}

/// Outcome family of a derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmType {
    /// `target = original + k`.
    Constant,
    /// `target = a * original + b`.
    Linear,
    /// Linear on each of several value ranges.
    PiecewiseLinear,
    /// None of the structured hypotheses held.
    Complex,
}

impl AlgorithmType {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmType::Constant => "constant",
            AlgorithmType::Linear => "linear",
            AlgorithmType::PiecewiseLinear => "piecewise_linear",
            AlgorithmType::Complex => "complex",
        }
    }
}

impl std::fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Piecewise derivation: the segments, or a single linear range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PiecewiseDerivation {
    /// More than one segment was found.
    pub is_piecewise: bool,
    /// [`ModelKind::PiecewiseLinear`] or [`ModelKind::Linear`].
    pub algorithm: ModelKind,
    /// Number of segments.
    pub segment_count: usize,
    /// The segments, empty when the data is a single range.
    pub segments: Vec<Segment>,
}

/// Chooses the simplest hypothesis that explains a dataset.
#[derive(Debug, Clone, Default)]
pub struct AlgorithmDeriver {
    analyzer: MappingAnalyzer,
    fitter: ModelFitter,
}

impl AlgorithmDeriver {
    /// Create a deriver with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a deriver with custom analyzer thresholds.
    pub fn with_config(config: AnalyzerConfig) -> Self {
        Self {
            analyzer: MappingAnalyzer::with_config(config),
            fitter: ModelFitter::new(),
        }
    }

    /// Run constant → linear → piecewise → generic model, stopping at the
    /// first hypothesis that holds.
    pub fn derive(&self, dataset: &Dataset) -> Result<DerivedAlgorithm> {
        let constant = self.analyzer.constant_test(dataset)?;
        if constant.is_constant {
            debug!("Derived a constant offset");
            return Ok(DerivedAlgorithm {
                algorithm_type: AlgorithmType::Constant,
                confidence: constant.confidence,
                algorithm: Derivation::Constant(constant),
            });
        }

        // a failed linear or piecewise test only rules that hypothesis out
        match self.analyzer.linear_test(dataset) {
            Ok(linear) if linear.is_linear => {
                debug!("Derived a linear mapping (R² = {:.4})", linear.fit.r_squared);
                return Ok(DerivedAlgorithm {
                    algorithm_type: AlgorithmType::Linear,
                    confidence: linear.confidence,
                    algorithm: Derivation::Linear(linear),
                });
            }
            Ok(_) => {}
            Err(e) => debug!("Linear hypothesis rejected: {}", e),
        }

        match self.analyzer.piecewise_test(dataset) {
            Ok(piecewise) if piecewise.is_piecewise => {
                debug!("Derived {} linear segments", piecewise.total_segments);
                return Ok(DerivedAlgorithm {
                    algorithm_type: AlgorithmType::PiecewiseLinear,
                    confidence: piecewise.confidence,
                    algorithm: Derivation::Piecewise(piecewise),
                });
            }
            Ok(_) => {}
            Err(e) => debug!("Piecewise hypothesis rejected: {}", e),
        }

        Ok(DerivedAlgorithm {
            algorithm_type: AlgorithmType::Complex,
            confidence: MODEL_CONFIDENCE,
            algorithm: Derivation::Model(self.fitter.fit_all(dataset)),
        })
    }

    /// Piecewise segments when the data has them, otherwise one linear range.
    pub fn derive_piecewise(&self, dataset: &Dataset) -> Result<PiecewiseDerivation> {
        let piecewise = self.analyzer.piecewise_test(dataset)?;
        if !piecewise.is_piecewise {
            return Ok(PiecewiseDerivation {
                is_piecewise: false,
                algorithm: ModelKind::Linear,
                segment_count: 1,
                segments: Vec::new(),
            });
        }
        Ok(PiecewiseDerivation {
            is_piecewise: true,
            algorithm: ModelKind::PiecewiseLinear,
            segment_count: piecewise.total_segments,
            segments: piecewise.segments,
        })
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
    fn test_constant_wins_first() {
        let data = dataset((0..100).map(|v| (v, v + 3)));
        let derived = AlgorithmDeriver::new().derive(&data).unwrap();
        assert_eq!(derived.algorithm_type, AlgorithmType::Constant);
        assert_eq!(derived.confidence, 1.0);
    }

    #[test]
    fn test_linear_confidence_is_r_squared() {
        let data = dataset((0..100).map(|v| (v, 2 * v + 1)));
        let derived = AlgorithmDeriver::new().derive(&data).unwrap();
        assert_eq!(derived.algorithm_type, AlgorithmType::Linear);
        assert!((derived.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_piecewise_before_generic_models() {
        // the knee is sharp enough to keep the whole-range R² below 0.95
        let pairs = (0..4_000u64).map(|v| (v, if v < 2_000 { v } else { 2_000 + 20 * (v - 2_000) }));
        let config = AnalyzerConfig::new().with_window_size(500);
        let derived = AlgorithmDeriver::with_config(config).derive(&dataset(pairs)).unwrap();
        assert_eq!(derived.algorithm_type, AlgorithmType::PiecewiseLinear);
        assert_eq!(derived.confidence, PIECEWISE_CONFIDENCE);
    }

    #[test]
    fn test_scatter_falls_through_to_models() {
        let pairs = [(1, 9), (2, 1), (3, 7), (4, 2), (5, 8), (6, 3)];
        let derived = AlgorithmDeriver::new().derive(&dataset(pairs)).unwrap();
        assert_eq!(derived.algorithm_type, AlgorithmType::Complex);
        assert_eq!(derived.confidence, MODEL_CONFIDENCE);
        assert!(matches!(derived.algorithm, Derivation::Model(_)));
    }

    #[test]
    fn test_derive_piecewise_single_range() {
        let data = dataset((0..50).map(|v| (v, v * 4)));
        let derived = AlgorithmDeriver::new().derive_piecewise(&data).unwrap();
        assert!(!derived.is_piecewise);
        assert_eq!(derived.algorithm, ModelKind::Linear);
        assert_eq!(derived.segment_count, 1);
    }
}
