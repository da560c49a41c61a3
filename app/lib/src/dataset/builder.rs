//! Streaming dataset construction.
//!
//! The builder drives a [`RecordReader`] over a file, applies sampling and
//! the record cap, and materializes records into narrowed column chunks as
//! soon as a chunk fills. Only one chunk's worth of raw records is ever
//! live; everything else is already in compact column form.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::IngestConfig;
use crate::dataset::{Dataset, MappingRecord};
use crate::error::{Result, ValmapError};
use crate::parse::{detect_format, open_records, LogFormat, RecordReader};

/// Progress snapshot passed to the builder's callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildProgress {
    /// Records accepted by the grammar so far.
    pub parsed: u64,
    /// Records kept after sampling.
    pub kept: usize,
    /// Chunks materialized so far.
    pub chunks: usize,
}

/// Counters describing one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Grammar used to read the file.
    pub format: LogFormat,
    /// Lines consumed from the input.
    pub lines_read: u64,
    /// Records accepted by the grammar.
    pub records_parsed: u64,
    /// Records kept in the dataset.
    pub records_kept: usize,
    /// Number of chunks materialized.
    pub chunks: usize,
}

/// Result of a build: either a dataset or the recoverable "no data" case.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// At least one record was kept.
    Loaded {
        /// The assembled dataset.
        dataset: Dataset,
        /// Build counters.
        stats: BuildStats,
    },
    /// The format was unknown or no line produced a kept record.
    NoData {
        /// Build counters.
        stats: BuildStats,
    },
}

impl LoadOutcome {
    /// Build counters for either case.
    pub fn stats(&self) -> &BuildStats {
        match self {
            LoadOutcome::Loaded { stats, .. } | LoadOutcome::NoData { stats } => stats,
        }
    }

    /// Turn the "no data" case into an error for `path`.
    ///
    /// A file whose format was not detected yields
    /// [`ValmapError::UnrecognizedFormat`]; a recognized file without kept
    /// records yields [`ValmapError::NoData`].
    pub fn into_result(self, path: impl Into<PathBuf>) -> Result<(Dataset, BuildStats)> {
        match self {
            LoadOutcome::Loaded { dataset, stats } => Ok((dataset, stats)),
            LoadOutcome::NoData { stats } if stats.format == LogFormat::Unknown => {
                Err(ValmapError::UnrecognizedFormat { path: path.into() })
            }
            LoadOutcome::NoData { .. } => Err(ValmapError::NoData { path: path.into() }),
        }
    }
}

/// Builds [`Dataset`]s from mapping logs with bounded working memory.
#[derive(Debug, Clone, Default)]
pub struct DatasetBuilder {
    config: IngestConfig,
}

impl DatasetBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with custom settings.
    pub fn with_config(config: IngestConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Detect the grammar of `path` and build a dataset from it.
    pub fn build(&self, path: impl AsRef<Path>) -> Result<LoadOutcome> {
        self.build_with_progress(path, |_| {})
    }

    /// Like [`build`](Self::build), reporting progress every
    /// `progress_interval` parsed records.
    pub fn build_with_progress<F>(&self, path: impl AsRef<Path>, progress: F) -> Result<LoadOutcome>
    where
        F: FnMut(&BuildProgress),
    {
        self.config.validate()?;
        let path = path.as_ref();
        let format = detect_format(path, self.config.detect_lines)?;
        debug!("Detected {} in {}", format, path.display());

        if !format.is_known() {
            return Ok(LoadOutcome::NoData {
                stats: BuildStats {
                    format,
                    lines_read: 0,
                    records_parsed: 0,
                    records_kept: 0,
                    chunks: 0,
                },
            });
        }

        let outcome = self.build_from_reader(open_records(path, format)?, progress)?;
        info!(
            "Loaded {} records from {} ({} lines)",
            outcome.stats().records_kept,
            path.display(),
            outcome.stats().lines_read
        );
        Ok(outcome)
    }

    /// Build a dataset from an already-open record stream.
    pub fn build_from_reader<R, F>(&self, mut records: RecordReader<R>, mut progress: F) -> Result<LoadOutcome>
    where
        R: BufRead,
        F: FnMut(&BuildProgress),
    {
        self.config.validate()?;
        let step = self.config.sample_step() as u64;
        let chunk_size = self.config.chunk_size;
        let interval = self.config.progress_interval as u64;

        let mut buffer: Vec<MappingRecord> = Vec::with_capacity(chunk_size.min(1 << 16));
        let mut chunks: Vec<Dataset> = Vec::new();
        let mut parsed = 0u64;
        let mut kept = 0usize;

        for record in records.by_ref() {
            if self.config.max_records.is_some_and(|max| kept >= max) {
                break;
            }
            let record = record?;
            let position = parsed;
            parsed += 1;

            if parsed % interval == 0 {
                progress(&BuildProgress {
                    parsed,
                    kept,
                    chunks: chunks.len(),
                });
            }
            if position % step != 0 {
                continue;
            }

            buffer.push(record);
            kept += 1;

            if buffer.len() >= chunk_size {
                chunks.push(Dataset::from_records(&buffer));
                buffer.clear();
                debug!("Materialized chunk {} ({} records kept)", chunks.len(), kept);
            }
        }

        if !buffer.is_empty() {
            chunks.push(Dataset::from_records(&buffer));
        }
        drop(buffer);

        let stats = BuildStats {
            format: records.format(),
            lines_read: records.lines_read(),
            records_parsed: parsed,
            records_kept: kept,
            chunks: chunks.len(),
        };

        if kept == 0 {
            return Ok(LoadOutcome::NoData { stats });
        }

        let dataset = Dataset::concat(&chunks);
        Ok(LoadOutcome::Loaded { dataset, stats })
    }
}
