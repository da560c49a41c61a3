//! Explicit analysis context.
//!
//! A [`Session`] owns the currently loaded dataset and the last analysis.
//! Both live behind one `parking_lot::Mutex` that is held only to read or
//! swap an `Arc`; loading, statistics and fitting all run outside the lock on
//! an immutable snapshot, so callers always get shared, read-only data.
//!
//! Long operations report through a [`ProgressObserver`]. Any
//! `Fn(&ProgressEvent)` closure is an observer.
//!
//! # Example
//!
//! ```no_run
//! use valmap::{AnalysisKind, NoProgress, Session};
//!
//! let session = Session::new();
//! session.load("mapping.log", &NoProgress)?;
//! let report = session.analyze(AnalysisKind::Comprehensive, &NoProgress)?;
//! println!("{}", serde_json::to_string_pretty(&*report)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;

use crate::analysis::{
    AlgorithmDeriver, Comparator, ComparisonReport, DerivedAlgorithm, LinearTest, MappingAnalyzer,
    MappingPatterns, ModelFitter, ModelReport, PiecewiseDerivation, StepOutcome,
};
use crate::config::ValmapConfig;
use crate::dataset::{
    mapping_summary, unique_mappings, write_mapping_summary, BuildStats, Dataset, DatasetBuilder,
    MappingSummaryRow, UniqueMapping,
};
use crate::error::{Result, ValmapError};
use crate::parse::{inspect_file, FileInfo, LogFormat};
use crate::stats::{compute_statistics, StatisticsSummary};

/// Long-running operation a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Reading and indexing a log file.
    Load,
    /// Running an [`AnalysisKind`].
    Analysis,
    /// Deriving the mapping algorithm.
    Derivation,
    /// Comparing with another dataset.
    Comparison,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Load => "load",
            Operation::Analysis => "analysis",
            Operation::Derivation => "derivation",
            Operation::Comparison => "comparison",
        })
    }
}

/// Notification sent to a [`ProgressObserver`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent<'a> {
    /// The operation began.
    Started {
        /// Operation that began.
        operation: Operation,
    },
    /// Intermediate progress.
    Step {
        /// Operation in progress.
        operation: Operation,
        /// What is happening.
        message: &'a str,
        /// Estimated completion in [0, 1], when known.
        fraction: Option<f32>,
    },
    /// The operation finished successfully.
    Completed {
        /// Operation that finished.
        operation: Operation,
    },
    /// The operation failed.
    Failed {
        /// Operation that failed.
        operation: Operation,
        /// Error message.
        error: &'a str,
    },
}

/// Receives progress notifications from [`Session`] operations.
pub trait ProgressObserver {
    /// Handle one event.
    fn notify(&self, event: &ProgressEvent<'_>);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent<'_>),
{
    fn notify(&self, event: &ProgressEvent<'_>) {
        self(event)
    }
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn notify(&self, _event: &ProgressEvent<'_>) {}
}

/// Which analysis [`Session::analyze`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    /// Statistics, patterns, linear, piecewise and model fitting.
    #[default]
    Comprehensive,
    /// Whole-range linear test only.
    Linear,
    /// Piecewise derivation only.
    Piecewise,
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AnalysisKind::Comprehensive => "comprehensive",
            AnalysisKind::Linear => "linear",
            AnalysisKind::Piecewise => "piecewise",
        })
    }
}

impl FromStr for AnalysisKind {
    type Err = ValmapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "comprehensive" => Ok(AnalysisKind::Comprehensive),
            "linear" => Ok(AnalysisKind::Linear),
            "piecewise" => Ok(AnalysisKind::Piecewise),
            other => Err(ValmapError::Analysis {
                message: format!("unsupported analysis kind '{}'", other),
            }),
        }
    }
}

/// One analysis run. Steps that did not run for this kind are absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Kind that produced this report.
    pub analysis_type: AnalysisKind,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Cached statistics of the dataset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic_statistics: Option<StatisticsSummary>,
    /// Pattern overview.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_patterns: Option<StepOutcome<MappingPatterns>>,
    /// Whole-range linear test.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linear_analysis: Option<StepOutcome<LinearTest>>,
    /// Piecewise derivation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub piecewise_analysis: Option<StepOutcome<PiecewiseDerivation>>,
    /// Every model family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_fitting: Option<ModelReport>,
}

/// Summary verdict over the last comprehensive analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    /// One delta explains every record.
    GlobalConstant,
    /// Whole-range linear fit above the R² threshold.
    Linear,
    /// Piecewise structure detected.
    PiecewiseLinear,
    /// Nothing structured held.
    Unknown,
}

impl SummaryKind {
    /// Human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            SummaryKind::GlobalConstant => "global constant offset",
            SummaryKind::Linear => "linear mapping",
            SummaryKind::PiecewiseLinear => "piecewise linear mapping",
            SummaryKind::Unknown => "unknown algorithm",
        }
    }
}

/// Record counts shown with a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataOverview {
    /// Records in the dataset.
    pub total_records: usize,
    /// Distinct original values.
    pub unique_original_values: usize,
    /// Distinct target values.
    pub unique_target_values: usize,
}

/// Algorithm-type summary of the last comprehensive analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    /// Record counts.
    pub data_overview: DataOverview,
    /// Verdict.
    pub algorithm_type: SummaryKind,
    /// Description of the verdict.
    pub algorithm_description: String,
    /// Confidence of the verdict.
    pub confidence: f64,
}

/// What [`Session::load`] read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSummary {
    /// Source file.
    pub path: PathBuf,
    /// Grammar used.
    pub format: LogFormat,
    /// Records kept.
    pub records: usize,
    /// Build counters.
    pub build: BuildStats,
    /// Statistics of the new dataset.
    pub statistics: StatisticsSummary,
}

/// Heap footprint of the session's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MemoryUsage {
    /// Bytes held by the full dataset.
    pub dataset_bytes: usize,
    /// Bytes held by the visualization sample.
    pub sample_bytes: usize,
    /// Sum of both.
    pub total_bytes: usize,
}

/// A dataset together with everything derived at load time.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    /// Source file.
    pub path: PathBuf,
    /// All kept records.
    pub dataset: Dataset,
    /// Inspection result for the source file.
    pub file_info: FileInfo,
    /// Statistics of `dataset`.
    pub statistics: StatisticsSummary,
    /// Deterministic subsample for plotting.
    pub sample: Dataset,
    /// Build counters.
    pub build: BuildStats,
}

#[derive(Default)]
struct SessionState {
    loaded: Option<Arc<LoadedDataset>>,
    last_analysis: Option<Arc<AnalysisReport>>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn no_data() -> ValmapError {
    ValmapError::NoData {
        path: PathBuf::from("<session>"),
    }
}

/// Run `f` and report its start, completion or failure.
fn observed<T, P: ProgressObserver + ?Sized>(
    progress: &P,
    operation: Operation,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    progress.notify(&ProgressEvent::Started { operation });
    match f() {
        Ok(v) => {
            progress.notify(&ProgressEvent::Completed { operation });
            Ok(v)
        }
        Err(e) => {
            let message = e.to_string();
            progress.notify(&ProgressEvent::Failed {
                operation,
                error: &message,
            });
            Err(e)
        }
    }
}

/// Current dataset plus last analysis, behind one lock.
pub struct Session {
    config: ValmapConfig,
    state: Mutex<SessionState>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("loaded", &state.loaded.as_ref().map(|l| l.path.clone()))
            .field("has_analysis", &state.last_analysis.is_some())
            .finish()
    }
}

impl Session {
    /// Empty session with default settings.
    pub fn new() -> Self {
        Self::with_config(ValmapConfig::default())
    }

    /// Empty session with custom settings.
    pub fn with_config(config: ValmapConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Settings in use.
    pub fn config(&self) -> &ValmapConfig {
        &self.config
    }

    /// Read `path` into a standalone dataset using the session's settings.
    ///
    /// The session's own state is untouched.
    pub fn read_dataset(&self, path: impl AsRef<Path>) -> Result<Dataset> {
        let path = path.as_ref();
        let builder = DatasetBuilder::with_config(self.config.ingest.clone());
        let (dataset, _) = builder.build(path)?.into_result(path)?;
        Ok(dataset)
    }

    /// Load `path`, replacing the current dataset and clearing the last
    /// analysis.
    pub fn load<P>(&self, path: impl AsRef<Path>, progress: &P) -> Result<LoadSummary>
    where
        P: ProgressObserver + ?Sized,
    {
        let path = path.as_ref();
        observed(progress, Operation::Load, || {
            self.config.validate()?;
            let file_info = inspect_file(path, &self.config.ingest)?;
            let estimate = file_info.estimated_records.max(1) as f32;

            let builder = DatasetBuilder::with_config(self.config.ingest.clone());
            let outcome = builder.build_with_progress(path, |p| {
                let message = format!("parsed {} records", p.parsed);
                progress.notify(&ProgressEvent::Step {
                    operation: Operation::Load,
                    message: &message,
                    fraction: Some((p.parsed as f32 / estimate).min(1.0)),
                });
            })?;
            let (dataset, build) = outcome.into_result(path)?;

            progress.notify(&ProgressEvent::Step {
                operation: Operation::Load,
                message: "computing statistics",
                fraction: None,
            });
            let statistics = compute_statistics(&dataset, &self.config.stats);
            let sample = dataset.sample(self.config.visualization_sample, self.config.stats.seed);

            let summary = LoadSummary {
                path: path.to_path_buf(),
                format: build.format,
                records: dataset.len(),
                build: build.clone(),
                statistics: statistics.clone(),
            };
            let loaded = Arc::new(LoadedDataset {
                path: path.to_path_buf(),
                dataset,
                file_info,
                statistics,
                sample,
                build,
            });

            let mut state = self.state.lock();
            state.loaded = Some(loaded);
            state.last_analysis = None;
            drop(state);

            info!("Session now holds {} records from {}", summary.records, path.display());
            Ok(summary)
        })
    }

    /// Drop the current dataset and analysis.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.loaded = None;
        state.last_analysis = None;
        debug!("Session cleared");
    }

    /// Snapshot of the current dataset.
    pub fn current(&self) -> Option<Arc<LoadedDataset>> {
        self.state.lock().loaded.clone()
    }

    fn require_loaded(&self) -> Result<Arc<LoadedDataset>> {
        self.current().ok_or_else(no_data)
    }

    /// Cached statistics; empty when nothing is loaded.
    pub fn statistics(&self) -> StatisticsSummary {
        self.current()
            .map(|l| l.statistics.clone())
            .unwrap_or_else(StatisticsSummary::empty)
    }

    /// Inspection result of the loaded file.
    pub fn file_info(&self) -> Option<FileInfo> {
        self.current().map(|l| l.file_info.clone())
    }

    /// Most recent analysis, if any.
    pub fn last_analysis(&self) -> Option<Arc<AnalysisReport>> {
        self.state.lock().last_analysis.clone()
    }

    /// Run an analysis on the current dataset and keep it as the last one.
    pub fn analyze<P>(&self, kind: AnalysisKind, progress: &P) -> Result<Arc<AnalysisReport>>
    where
        P: ProgressObserver + ?Sized,
    {
        observed(progress, Operation::Analysis, || {
            let loaded = self.require_loaded()?;
            let data = &loaded.dataset;
            let analyzer = MappingAnalyzer::with_config(self.config.analyzer.clone());
            let deriver = AlgorithmDeriver::with_config(self.config.analyzer.clone());
            let step = |message: &str| {
                debug!("{} analysis: {}", kind, message);
                progress.notify(&ProgressEvent::Step {
                    operation: Operation::Analysis,
                    message,
                    fraction: None,
                });
            };

            let mut report = AnalysisReport {
                analysis_type: kind,
                timestamp: now_secs(),
                basic_statistics: None,
                mapping_patterns: None,
                linear_analysis: None,
                piecewise_analysis: None,
                model_fitting: None,
            };

            match kind {
                AnalysisKind::Comprehensive => {
                    report.basic_statistics = Some(loaded.statistics.clone());
                    step("mapping patterns");
                    report.mapping_patterns = Some(analyzer.mapping_patterns(data).into());
                    step("linear fit");
                    report.linear_analysis = Some(analyzer.linear_test(data).into());
                    step("piecewise detection");
                    report.piecewise_analysis = Some(deriver.derive_piecewise(data).into());
                    step("model fitting");
                    report.model_fitting = Some(ModelFitter::new().fit_all(data));
                }
                AnalysisKind::Linear => {
                    step("linear fit");
                    report.linear_analysis = Some(analyzer.linear_test(data).into());
                }
                AnalysisKind::Piecewise => {
                    step("piecewise detection");
                    report.piecewise_analysis = Some(deriver.derive_piecewise(data).into());
                }
            }

            let report = Arc::new(report);
            self.store_analysis(&loaded, &report);
            Ok(report)
        })
    }

    /// Keep `report` as the last analysis if `snapshot` is still loaded.
    fn store_analysis(&self, snapshot: &Arc<LoadedDataset>, report: &Arc<AnalysisReport>) -> bool {
        let mut state = self.state.lock();
        let current = state
            .loaded
            .as_ref()
            .is_some_and(|loaded| Arc::ptr_eq(loaded, snapshot));
        if current {
            state.last_analysis = Some(Arc::clone(report));
        } else {
            debug!(
                "Dataset {} was replaced during analysis; report not kept",
                snapshot.path.display()
            );
        }
        current
    }

    /// Derive the simplest algorithm that explains the current dataset.
    pub fn derive_algorithm<P>(&self, progress: &P) -> Result<DerivedAlgorithm>
    where
        P: ProgressObserver + ?Sized,
    {
        observed(progress, Operation::Derivation, || {
            let loaded = self.require_loaded()?;
            AlgorithmDeriver::with_config(self.config.analyzer.clone()).derive(&loaded.dataset)
        })
    }

    /// Compare the current dataset with `other`.
    pub fn compare_with<P>(&self, other: &Dataset, progress: &P) -> Result<ComparisonReport>
    where
        P: ProgressObserver + ?Sized,
    {
        observed(progress, Operation::Comparison, || {
            let loaded = self.require_loaded()?;
            let comparator = Comparator::with_config(self.config.compare.clone())
                .with_stats_config(self.config.stats.clone());
            Ok(comparator.compare(&loaded.dataset, other))
        })
    }

    /// Algorithm-type verdict of the last comprehensive analysis.
    pub fn summary(&self) -> Result<AnalysisSummary> {
        let report = self
            .last_analysis()
            .filter(|r| r.analysis_type == AnalysisKind::Comprehensive)
            .ok_or_else(|| ValmapError::Analysis {
                message: "no comprehensive analysis has been run".to_string(),
            })?;
        Ok(summarize(&report, self.config.analyzer.linear_r2_threshold))
    }

    /// Mapping summary of the current dataset, grouped by original value.
    pub fn mapping_summary(&self) -> Result<Vec<MappingSummaryRow>> {
        Ok(mapping_summary(&self.require_loaded()?.dataset))
    }

    /// Distinct `(original, target)` pairs of the current dataset.
    pub fn unique_mappings(&self) -> Result<Vec<UniqueMapping>> {
        Ok(unique_mappings(&self.require_loaded()?.dataset))
    }

    /// Write the mapping summary as CSV; returns the number of rows.
    pub fn export_mapping_summary(&self, path: impl AsRef<Path>) -> Result<usize> {
        let rows = self.mapping_summary()?;
        write_mapping_summary(&rows, path.as_ref())?;
        info!("Exported {} summary rows to {}", rows.len(), path.as_ref().display());
        Ok(rows.len())
    }

    /// Bytes held by the current dataset and sample.
    pub fn memory_usage(&self) -> MemoryUsage {
        match self.current() {
            Some(loaded) => {
                let dataset_bytes = loaded.dataset.memory_usage();
                let sample_bytes = loaded.sample.memory_usage();
                MemoryUsage {
                    dataset_bytes,
                    sample_bytes,
                    total_bytes: dataset_bytes + sample_bytes,
                }
            }
            None => MemoryUsage::default(),
        }
    }
}

fn summarize(report: &AnalysisReport, r2_threshold: f64) -> AnalysisSummary {
    let total_records = report.basic_statistics.as_ref().map_or(0, |s| s.total_records);
    let patterns = report.mapping_patterns.as_ref().and_then(StepOutcome::value);
    let data_overview = DataOverview {
        total_records,
        unique_original_values: patterns.map_or(0, |p| p.data_quality.unique_original_values),
        unique_target_values: patterns.map_or(0, |p| p.data_quality.unique_target_values),
    };

    let linear_r2 = patterns
        .and_then(|p| p.linear_fit.value())
        .map(|fit| fit.r_squared);
    let piecewise = report
        .piecewise_analysis
        .as_ref()
        .and_then(StepOutcome::value)
        .is_some_and(|p| p.is_piecewise);

    let (algorithm_type, confidence) = if patterns.is_some_and(|p| p.is_global_algorithm) {
        (SummaryKind::GlobalConstant, 1.0)
    } else if let Some(r2) = linear_r2.filter(|&r2| r2 > r2_threshold) {
        (SummaryKind::Linear, r2)
    } else if piecewise {
        (SummaryKind::PiecewiseLinear, crate::analysis::PIECEWISE_CONFIDENCE)
    } else {
        (SummaryKind::Unknown, 0.0)
    };

    AnalysisSummary {
        data_overview,
        algorithm_type,
        algorithm_description: algorithm_type.description().to_string(),
        confidence,
    }
}
