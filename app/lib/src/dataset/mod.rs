//! Columnar dataset of mapping records.
//!
//! A [`Dataset`] is built once (by the [`DatasetBuilder`]) and never mutated
//! afterwards. Sorting, sampling and slicing all return new datasets, so a
//! dataset can be shared behind an `Arc` by any number of readers.
//!
//! Columns are stored at the narrowest integer width that holds their
//! values; see [`UIntColumn`] and [`IntColumn`].

mod builder;
mod column;
mod record;
mod summary;

pub use builder::{BuildProgress, BuildStats, DatasetBuilder, LoadOutcome};
pub use column::{IntColumn, IntIter, UIntColumn, UIntIter};
pub use record::{percent_of, signed_delta, MappingRecord};
pub use summary::{
    mapping_summary, read_mapping_summary, read_mapping_summary_from, unique_mappings,
    write_mapping_summary, write_mapping_summary_to, MappingKind, MappingSummaryRow,
    UniqueMapping,
};

use std::ops::Range;

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Name of the source line number column.
pub const LINE_NUMBER: &str = "line_number";
/// Name of the element index column.
pub const INDEX: &str = "index";
/// Name of the x position column.
pub const POSITION_X: &str = "x";
/// Name of the y position column.
pub const POSITION_Y: &str = "y";
/// Name of the original value column.
pub const ORIGINAL_VALUE: &str = "original_value";
/// Name of the target value column.
pub const TARGET_VALUE: &str = "target_value";
/// Name of the delta column.
pub const DELTA: &str = "delta";
/// Name of the delta percent column.
pub const DELTA_PERCENT: &str = "delta_percent";

fn gather(records: &[MappingRecord], f: impl Fn(&MappingRecord) -> u64) -> UIntColumn {
    let values: Vec<u64> = records.iter().map(f).collect();
    UIntColumn::from_values(&values)
}

/// Immutable, column-oriented collection of [`MappingRecord`]s.
///
/// The optional index and position columns exist only when every record
/// carried them.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    line_numbers: UIntColumn,
    index: Option<UIntColumn>,
    position: Option<(UIntColumn, UIntColumn)>,
    original: UIntColumn,
    target: UIntColumn,
    delta: IntColumn,
    delta_percent: Vec<f32>,
}

impl Default for Dataset {
    fn default() -> Self {
        Self {
            line_numbers: UIntColumn::U8(Vec::new()),
            index: None,
            position: None,
            original: UIntColumn::U8(Vec::new()),
            target: UIntColumn::U8(Vec::new()),
            delta: IntColumn::I8(Vec::new()),
            delta_percent: Vec::new(),
        }
    }
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize a batch of records into narrowed columns.
    pub fn from_records(records: &[MappingRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let index = if records.iter().all(|r| r.index.is_some()) {
            Some(gather(records, |r| r.index.unwrap_or_default()))
        } else {
            None
        };
        let position = if records.iter().all(|r| r.position.is_some()) {
            Some((
                gather(records, |r| r.position.map(|p| p.0).unwrap_or_default()),
                gather(records, |r| r.position.map(|p| p.1).unwrap_or_default()),
            ))
        } else {
            None
        };

        let deltas: Vec<i64> = records.iter().map(|r| r.delta).collect();

        Self {
            line_numbers: gather(records, |r| r.line_number),
            index,
            position,
            original: gather(records, |r| r.original),
            target: gather(records, |r| r.target),
            delta: IntColumn::from_values(&deltas),
            delta_percent: records.iter().map(|r| r.delta_percent as f32).collect(),
        }
    }

    /// Join datasets end to end, re-narrowing every column.
    pub fn concat(parts: &[Dataset]) -> Self {
        let parts: Vec<&Dataset> = parts.iter().filter(|d| !d.is_empty()).collect();
        match parts.len() {
            0 => return Self::default(),
            1 => return parts[0].clone(),
            _ => {}
        }

        let index = if parts.iter().all(|d| d.index.is_some()) {
            Some(UIntColumn::concat(parts.iter().filter_map(|d| d.index.as_ref())))
        } else {
            None
        };
        let position = if parts.iter().all(|d| d.position.is_some()) {
            let xs = parts.iter().filter_map(|d| d.position.as_ref().map(|p| &p.0));
            let ys = parts.iter().filter_map(|d| d.position.as_ref().map(|p| &p.1));
            Some((UIntColumn::concat(xs), UIntColumn::concat(ys)))
        } else {
            None
        };

        Self {
            line_numbers: UIntColumn::concat(parts.iter().map(|d| &d.line_numbers)),
            index,
            position,
            original: UIntColumn::concat(parts.iter().map(|d| &d.original)),
            target: UIntColumn::concat(parts.iter().map(|d| &d.target)),
            delta: IntColumn::concat(parts.iter().map(|d| &d.delta)),
            delta_percent: parts
                .iter()
                .flat_map(|d| d.delta_percent.iter().copied())
                .collect(),
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.original.len()
    }

    /// Whether the dataset holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the columns present in this dataset.
    pub fn column_names(&self) -> Vec<&'static str> {
        let mut names = vec![LINE_NUMBER];
        if self.index.is_some() {
            names.push(INDEX);
        }
        if self.position.is_some() {
            names.push(POSITION_X);
            names.push(POSITION_Y);
        }
        names.extend([ORIGINAL_VALUE, TARGET_VALUE, DELTA, DELTA_PERCENT]);
        names
    }

    /// Source line numbers.
    pub fn line_numbers(&self) -> &UIntColumn {
        &self.line_numbers
    }

    /// Element indices, if every record had one.
    pub fn index(&self) -> Option<&UIntColumn> {
        self.index.as_ref()
    }

    /// Element positions as `(x, y)` columns, if every record had one.
    pub fn position(&self) -> Option<(&UIntColumn, &UIntColumn)> {
        self.position.as_ref().map(|(x, y)| (x, y))
    }

    /// Original values.
    pub fn original(&self) -> &UIntColumn {
        &self.original
    }

    /// Target values.
    pub fn target(&self) -> &UIntColumn {
        &self.target
    }

    /// Deltas (`target - original`).
    pub fn delta(&self) -> &IntColumn {
        &self.delta
    }

    /// Delta percentages, stored as `f32`.
    pub fn delta_percent(&self) -> &[f32] {
        &self.delta_percent
    }

    /// Reassemble the record at `i`.
    pub fn record(&self, i: usize) -> Option<MappingRecord> {
        let original = self.original.get(i)?;
        let position = match &self.position {
            Some((x, y)) => Some((x.get(i)?, y.get(i)?)),
            None => None,
        };
        Some(MappingRecord {
            line_number: self.line_numbers.get(i)?,
            index: self.index.as_ref().and_then(|c| c.get(i)),
            position,
            original,
            target: self.target.get(i)?,
            delta: self.delta.get(i)?,
            delta_percent: *self.delta_percent.get(i)? as f64,
        })
    }

    /// Iterate over records in order.
    pub fn iter(&self) -> impl Iterator<Item = MappingRecord> + '_ {
        (0..self.len()).filter_map(move |i| self.record(i))
    }

    /// Original values as `f64`.
    pub fn original_f64(&self) -> Vec<f64> {
        self.original.iter().map(|v| v as f64).collect()
    }

    /// Target values as `f64`.
    pub fn target_f64(&self) -> Vec<f64> {
        self.target.iter().map(|v| v as f64).collect()
    }

    /// Deltas as `f64`.
    pub fn delta_f64(&self) -> Vec<f64> {
        self.delta.iter().map(|v| v as f64).collect()
    }

    /// New dataset holding the records at `indices`, in that order.
    ///
    /// Out-of-range indices are skipped.
    pub fn take(&self, indices: &[usize]) -> Self {
        let indices: Vec<usize> = indices.iter().copied().filter(|&i| i < self.len()).collect();
        Self {
            line_numbers: self.line_numbers.take(&indices),
            index: self.index.as_ref().map(|c| c.take(&indices)),
            position: self
                .position
                .as_ref()
                .map(|(x, y)| (x.take(&indices), y.take(&indices))),
            original: self.original.take(&indices),
            target: self.target.take(&indices),
            delta: self.delta.take(&indices),
            delta_percent: indices.iter().map(|&i| self.delta_percent[i]).collect(),
        }
    }

    /// New dataset holding a contiguous range of records.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            line_numbers: self.line_numbers.slice(range.clone()),
            index: self.index.as_ref().map(|c| c.slice(range.clone())),
            position: self
                .position
                .as_ref()
                .map(|(x, y)| (x.slice(range.clone()), y.slice(range.clone()))),
            original: self.original.slice(range.clone()),
            target: self.target.slice(range.clone()),
            delta: self.delta.slice(range.clone()),
            delta_percent: self.delta_percent[range].to_vec(),
        }
    }

    /// New dataset stably sorted by original value.
    pub fn sorted_by_original(&self) -> Self {
        let mut order: Vec<usize> = (0..self.len()).collect();
        let keys: Vec<u64> = self.original.iter().collect();
        order.sort_by_key(|&i| keys[i]);
        self.take(&order)
    }

    /// Deterministic random subset of at most `n` records, in source order.
    ///
    /// Datasets of `n` records or fewer are returned whole.
    pub fn sample(&self, n: usize, seed: u64) -> Self {
        if n >= self.len() {
            return self.clone();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut picked = rand::seq::index::sample(&mut rng, self.len(), n).into_vec();
        picked.sort_unstable();
        self.take(&picked)
    }

    /// Approximate heap footprint in bytes.
    pub fn memory_usage(&self) -> usize {
        let optional = self.index.as_ref().map_or(0, |c| c.memory_usage())
            + self
                .position
                .as_ref()
                .map_or(0, |(x, y)| x.memory_usage() + y.memory_usage());
        self.line_numbers.memory_usage()
            + optional
            + self.original.memory_usage()
            + self.target.memory_usage()
            + self.delta.memory_usage()
            + self.delta_percent.len() * std::mem::size_of::<f32>()
    }
}
