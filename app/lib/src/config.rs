//! Configuration types for the valmap library.
//!
//! This module provides configuration structs for ingestion, statistics,
//! mapping analysis and dataset comparison. Every threshold the pipeline
//! uses lives here with its tuned default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValmapError};

/// Configuration for reading a mapping log into a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Number of records buffered before a chunk is materialized.
    ///
    /// Bounds the live working buffer independent of file size.
    ///
    /// Default: 100,000 records
    pub chunk_size: usize,

    /// Number of leading lines examined by format detection.
    ///
    /// Default: 10 lines
    pub detect_lines: usize,

    /// Stop after this many records have been kept.
    ///
    /// Default: None (read the whole file)
    pub max_records: Option<usize>,

    /// Fraction of parsed records to keep, in (0, 1].
    ///
    /// A rate below 1 keeps every `round(1/rate)`-th record.
    ///
    /// Default: 1.0 (keep everything)
    pub sample_rate: f64,

    /// Parsed-record interval between progress notifications.
    ///
    /// Default: 1,000,000 records
    pub progress_interval: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100_000,
            detect_lines: 10,
            max_records: None,
            sample_rate: 1.0,
            progress_interval: 1_000_000,
        }
    }
}

impl IngestConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set the number of lines used for format detection.
    pub fn with_detect_lines(mut self, lines: usize) -> Self {
        self.detect_lines = lines;
        self
    }

    /// Set the maximum number of records to keep.
    pub fn with_max_records(mut self, max: Option<usize>) -> Self {
        self.max_records = max;
        self
    }

    /// Set the sampling rate.
    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the progress notification interval.
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Distance between kept records implied by `sample_rate`.
    ///
    /// Returns 1 when sampling is disabled.
    pub fn sample_step(&self) -> usize {
        if self.sample_rate >= 1.0 {
            1
        } else {
            ((1.0 / self.sample_rate).round() as usize).max(1)
        }
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate > 0.0 && self.sample_rate <= 1.0) {
            return Err(ValmapError::invalid_config(format!(
                "sample_rate must be in (0, 1], got {}",
                self.sample_rate
            )));
        }
        if self.chunk_size == 0 {
            return Err(ValmapError::invalid_config("chunk_size must be > 0"));
        }
        if self.detect_lines == 0 {
            return Err(ValmapError::invalid_config("detect_lines must be > 0"));
        }
        if self.progress_interval == 0 {
            return Err(ValmapError::invalid_config("progress_interval must be > 0"));
        }
        Ok(())
    }
}

/// Configuration for the chunked statistics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Datasets at or above this size use chunk accumulation.
    ///
    /// Default: 500,000 records
    pub chunk_threshold: usize,

    /// Records per accumulation chunk.
    ///
    /// Default: 500,000 records
    pub chunk_size: usize,

    /// Size of the random subsample used when chunk accumulation fails.
    ///
    /// Default: 100,000 records
    pub fallback_sample_size: usize,

    /// Seed for the fallback subsample.
    ///
    /// Default: 42
    pub seed: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: 500_000,
            chunk_size: 500_000,
            fallback_sample_size: 100_000,
            seed: 42,
        }
    }
}

impl StatsConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size at which chunk accumulation takes over.
    pub fn with_chunk_threshold(mut self, threshold: usize) -> Self {
        self.chunk_threshold = threshold;
        self
    }

    /// Set the accumulation chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set the fallback subsample size.
    pub fn with_fallback_sample_size(mut self, size: usize) -> Self {
        self.fallback_sample_size = size;
        self
    }

    /// Set the fallback seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ValmapError::invalid_config("stats chunk_size must be > 0"));
        }
        if self.fallback_sample_size == 0 {
            return Err(ValmapError::invalid_config(
                "fallback_sample_size must be > 0",
            ));
        }
        Ok(())
    }
}

/// Configuration for the mapping analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// R² above which a whole-dataset fit is accepted as linear.
    ///
    /// Default: 0.95
    pub linear_r2_threshold: f64,

    /// Width of the sliding regression window, in records.
    ///
    /// Default: 1,000 records
    pub window_size: usize,

    /// Minimum absolute slope change that flags a turning point.
    ///
    /// Default: 0.1
    pub slope_threshold: f64,

    /// Turning points this close to either end of the sorted data are dropped.
    ///
    /// Default: 100 records
    pub edge_guard: usize,

    /// Flagged positions closer than this collapse into one turning point.
    ///
    /// Default: 100 records
    pub merge_distance: usize,

    /// Maximum number of segments; at most `max_segments - 1` turning points.
    ///
    /// Default: 5
    pub max_segments: usize,

    /// Segments with this many records or fewer are discarded.
    ///
    /// Default: 10 records
    pub min_segment_records: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            linear_r2_threshold: 0.95,
            window_size: 1_000,
            slope_threshold: 0.1,
            edge_guard: 100,
            merge_distance: 100,
            max_segments: 5,
            min_segment_records: 10,
        }
    }
}

impl AnalyzerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the linear acceptance threshold.
    pub fn with_linear_r2_threshold(mut self, threshold: f64) -> Self {
        self.linear_r2_threshold = threshold;
        self
    }

    /// Set the sliding window width.
    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Set the slope change threshold.
    pub fn with_slope_threshold(mut self, threshold: f64) -> Self {
        self.slope_threshold = threshold;
        self
    }

    /// Set the edge guard.
    pub fn with_edge_guard(mut self, guard: usize) -> Self {
        self.edge_guard = guard;
        self
    }

    /// Set the candidate merge distance.
    pub fn with_merge_distance(mut self, distance: usize) -> Self {
        self.merge_distance = distance;
        self
    }

    /// Set the maximum number of segments.
    pub fn with_max_segments(mut self, max: usize) -> Self {
        self.max_segments = max;
        self
    }

    /// Set the minimum segment size.
    pub fn with_min_segment_records(mut self, min: usize) -> Self {
        self.min_segment_records = min;
        self
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 2 {
            return Err(ValmapError::invalid_config("window_size must be >= 2"));
        }
        if self.max_segments == 0 {
            return Err(ValmapError::invalid_config("max_segments must be >= 1"));
        }
        if !self.slope_threshold.is_finite() || self.slope_threshold < 0.0 {
            return Err(ValmapError::invalid_config(
                "slope_threshold must be a finite, non-negative number",
            ));
        }
        Ok(())
    }
}

/// Configuration for comparing two datasets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Linear-fit similarity above which two datasets are "similar".
    ///
    /// Default: 0.8
    pub similarity_cutoff: f64,

    /// KS p-value above which two distributions are "similar".
    ///
    /// Default: 0.05
    pub ks_alpha: f64,

    /// Absolute delta correlation above which the deltas are "consistent".
    ///
    /// Default: 0.8
    pub correlation_cutoff: f64,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            similarity_cutoff: 0.8,
            ks_alpha: 0.05,
            correlation_cutoff: 0.8,
        }
    }
}

impl CompareConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the similarity cutoff.
    pub fn with_similarity_cutoff(mut self, cutoff: f64) -> Self {
        self.similarity_cutoff = cutoff;
        self
    }

    /// Set the KS significance level.
    pub fn with_ks_alpha(mut self, alpha: f64) -> Self {
        self.ks_alpha = alpha;
        self
    }

    /// Set the delta correlation cutoff.
    pub fn with_correlation_cutoff(mut self, cutoff: f64) -> Self {
        self.correlation_cutoff = cutoff;
        self
    }
}

/// Top-level configuration bundling every stage.
///
/// Missing keys in a JSON config file fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValmapConfig {
    /// Ingestion settings.
    pub ingest: IngestConfig,
    /// Statistics settings.
    pub stats: StatsConfig,
    /// Mapping analyzer settings.
    pub analyzer: AnalyzerConfig,
    /// Comparator settings.
    pub compare: CompareConfig,
    /// Size of the random subsample kept for plotting.
    ///
    /// Default: 10,000 records
    pub visualization_sample: usize,
}

impl Default for ValmapConfig {
    fn default() -> Self {
        Self {
            ingest: IngestConfig::default(),
            stats: StatsConfig::default(),
            analyzer: AnalyzerConfig::default(),
            compare: CompareConfig::default(),
            visualization_sample: 10_000,
        }
    }
}

impl ValmapConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ingestion configuration.
    pub fn with_ingest(mut self, ingest: IngestConfig) -> Self {
        self.ingest = ingest;
        self
    }

    /// Set the statistics configuration.
    pub fn with_stats(mut self, stats: StatsConfig) -> Self {
        self.stats = stats;
        self
    }

    /// Set the analyzer configuration.
    pub fn with_analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Set the comparator configuration.
    pub fn with_compare(mut self, compare: CompareConfig) -> Self {
        self.compare = compare;
        self
    }

    /// Set the visualization sample size.
    pub fn with_visualization_sample(mut self, size: usize) -> Self {
        self.visualization_sample = size;
        self
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ValmapError::io(path, e))?;
        let config: ValmapConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every nested configuration.
    pub fn validate(&self) -> Result<()> {
        self.ingest.validate()?;
        self.stats.validate()?;
        self.analyzer.validate()?;
        Ok(())
    }
}
