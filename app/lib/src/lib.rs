//! # Valmap
//!
//! Value-mapping log ingestion and transformation-rule inference.
//!
//! A mapping log records, line by line, an original value being turned into a
//! target value. This library reads such logs into a compact columnar
//! [`Dataset`] with bounded working memory, summarizes it, and infers the rule
//! that produced it: a constant offset, a line, a piecewise line, or the best
//! of several nonlinear model families.
//!
//! ## Features
//!
//! - **Format detection**: recognizes the simple, pixel and DICOM mapping
//!   log grammars from the first lines of a file
//! - **Streaming ingestion**: records are materialized into narrowed integer
//!   columns one chunk at a time, with optional sampling and a record cap
//! - **Chunked statistics**: exact integer accumulators merged in parallel
//!   (with the `parallel` feature), with a sampled fallback
//! - **Rule inference**: constant, linear and piecewise-linear tests,
//!   polynomial/power/logarithmic/exponential fits and a simplicity-first
//!   deriver
//! - **Comparison**: linear-fit similarity, two-sample KS tests and delta
//!   correlation between two logs
//! - **Thread-safe**: all public types implement `Send + Sync`
//!
//! ## Quick Start
//!
//! ### Loading and deriving
//!
//! ```rust,ignore
//! use valmap::{NoProgress, Session};
//!
//! let session = Session::new();
//! let loaded = session.load("mapping.log", &NoProgress)?;
//! println!("{} records ({})", loaded.records, loaded.format);
//!
//! let derived = session.derive_algorithm(&NoProgress)?;
//! println!("{} (confidence {:.2})", derived.algorithm_type, derived.confidence);
//! ```
//!
//! ### Working on a dataset directly
//!
//! ```rust,ignore
//! use valmap::{DatasetBuilder, MappingAnalyzer};
//!
//! let (dataset, _) = DatasetBuilder::new().build("mapping.log")?.into_result("mapping.log")?;
//! let analyzer = MappingAnalyzer::new();
//! let constant = analyzer.constant_test(&dataset)?;
//! let piecewise = analyzer.piecewise_test(&dataset)?;
//! println!("constant: {}, segments: {}", constant.is_constant, piecewise.total_segments);
//! ```
//!
//! ### Configuration
//!
//! ```rust,ignore
//! use valmap::{AnalyzerConfig, IngestConfig, Session, ValmapConfig};
//!
//! let config = ValmapConfig::new()
//!     .with_ingest(IngestConfig::new().with_sample_rate(0.1))
//!     .with_analyzer(AnalyzerConfig::new().with_window_size(500));
//!
//! let session = Session::with_config(config);
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Result`]. Failures inside one step of a
//! multi-step analysis are kept as a [`StepOutcome::Failed`] entry next to
//! the steps that succeeded.
//!
//! ```rust,ignore
//! use valmap::{NoProgress, Session, ValmapError};
//!
//! match Session::new().load("unknown.txt", &NoProgress) {
//!     Ok(summary) => println!("{} records", summary.records),
//!     Err(e) if e.is_recoverable() => eprintln!("No mapping data: {}", e),
//!     Err(ValmapError::Io { path, source }) => eprintln!("{}: {}", path.display(), source),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
pub mod analysis;
pub mod config;
pub mod dataset;
pub mod error;
pub mod parse;
pub mod session;
pub mod stats;

// Re-exports for convenience
pub use analysis::{
    AlgorithmDeriver, AlgorithmType, Comparator, ComparisonReport, ConstantTest, Derivation,
    DerivedAlgorithm, DistributionSummary, FitResult, LinearTest, MappingAnalyzer,
    MappingPatterns, ModelFitter, ModelKind, ModelParameters, ModelReport, PiecewiseDerivation,
    PiecewiseTest, Segment, StepOutcome, TurningPoint,
};
pub use config::{AnalyzerConfig, CompareConfig, IngestConfig, StatsConfig, ValmapConfig};
pub use dataset::{
    mapping_summary, read_mapping_summary, unique_mappings, write_mapping_summary, BuildStats,
    Dataset, DatasetBuilder, IntColumn, LoadOutcome, MappingKind, MappingRecord,
    MappingSummaryRow, UIntColumn, UniqueMapping,
};
pub use error::{Result, ValmapError};
pub use parse::{detect_format, inspect_file, FileInfo, LogFormat, RecordReader};
pub use session::{
    AnalysisKind, AnalysisReport, AnalysisSummary, LoadSummary, LoadedDataset, MemoryUsage,
    NoProgress, Operation, ProgressEvent, ProgressObserver, Session, SummaryKind,
};
pub use stats::{compute_statistics, SeriesStats, StatisticsSummary, StatsMethod};
