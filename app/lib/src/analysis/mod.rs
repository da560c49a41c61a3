//! Mapping-rule inference.
//!
//! - [`MappingAnalyzer`]: constant, linear and piecewise tests, plus the
//!   pattern and distribution overviews
//! - [`ModelFitter`]: polynomial, power, logarithmic and exponential fits
//! - [`AlgorithmDeriver`]: picks the simplest hypothesis that holds
//! - [`Comparator`]: judges whether two datasets share a rule
//!
//! All of them read a [`Dataset`](crate::Dataset) and never modify it, so
//! they can run concurrently on the same data.

mod compare;
mod deriver;
mod mapping;
mod models;
mod verdict;
mod window;

pub use compare::{
    ks_2samp, Comparator, ComparisonReport, DeltaConsistency, DistributionComparison, KsTest,
    LinearSimilarity,
};
pub use deriver::{
    AlgorithmDeriver, AlgorithmType, Derivation, DerivedAlgorithm, PiecewiseDerivation,
    MODEL_CONFIDENCE, PIECEWISE_CONFIDENCE,
};
pub use mapping::{
    ConstantTest, DataQuality, DistributionSummary, LinearTest, MappingAnalyzer, MappingPatterns,
    PiecewiseTest, Quartiles, Segment, SeriesDistribution,
};
pub use models::{
    fit_exponential, fit_linear, fit_logarithmic, fit_polynomial, fit_power, select_best,
    ModelFitter, ModelReport,
};
pub use verdict::{FitResult, ModelKind, ModelParameters, StepOutcome};
pub use window::{find_turning_points, window_slopes, TurningPoint};
