//! Grouped mapping views and their CSV serialization.
//!
//! The mapping summary groups records by original value; the unique view
//! lists each distinct `(original, target)` pair once and tags whether its
//! original value maps to one target or several.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{Result, ValmapError};

/// Aggregated target and delta statistics for one original value.
///
/// Means and standard deviations are rounded to two decimals. The standard
/// deviation is the sample deviation and is empty for single-record groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSummaryRow {
    /// Grouping key.
    pub original_value: u64,
    /// Records with this original value.
    pub target_value_count: u64,
    /// Mean target value.
    pub target_value_mean: f64,
    /// Sample standard deviation of the target value.
    pub target_value_std: Option<f64>,
    /// Smallest target value.
    pub target_value_min: u64,
    /// Largest target value.
    pub target_value_max: u64,
    /// Mean delta.
    pub delta_mean: f64,
    /// Sample standard deviation of the delta.
    pub delta_std: Option<f64>,
}

/// Whether an original value maps to a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    /// Every occurrence of the original value has the same target.
    OneToOne,
    /// The original value appears with two or more targets.
    OneToMany,
}

/// One distinct `(original, target)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueMapping {
    /// Original value.
    pub original_value: u64,
    /// Target value.
    pub target_value: u64,
    /// `target - original`.
    pub delta: i64,
    /// How many records carry this pair.
    pub occurrences: u64,
    /// Mapping multiplicity of the original value.
    pub mapping_type: MappingKind,
}

#[derive(Default)]
struct Running {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Running {
    fn push(&mut self, value: f64) {
        self.count += 1;
        let d = value - self.mean;
        self.mean += d / self.count as f64;
        self.m2 += d * (value - self.mean);
    }

    fn sample_std(&self) -> Option<f64> {
        if self.count < 2 {
            None
        } else {
            Some((self.m2 / (self.count - 1) as f64).max(0.0).sqrt())
        }
    }
}

struct Group {
    target: Running,
    delta: Running,
    min: u64,
    max: u64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Group records by original value, ascending.
pub fn mapping_summary(dataset: &Dataset) -> Vec<MappingSummaryRow> {
    let mut groups: BTreeMap<u64, Group> = BTreeMap::new();
    let triples = dataset
        .original()
        .iter()
        .zip(dataset.target().iter())
        .zip(dataset.delta().iter());

    for ((original, target), delta) in triples {
        let group = groups.entry(original).or_insert_with(|| Group {
            target: Running::default(),
            delta: Running::default(),
            min: target,
            max: target,
        });
        group.target.push(target as f64);
        group.delta.push(delta as f64);
        group.min = group.min.min(target);
        group.max = group.max.max(target);
    }

    groups
        .into_iter()
        .map(|(original_value, g)| MappingSummaryRow {
            original_value,
            target_value_count: g.target.count,
            target_value_mean: round2(g.target.mean),
            target_value_std: g.target.sample_std().map(round2),
            target_value_min: g.min,
            target_value_max: g.max,
            delta_mean: round2(g.delta.mean),
            delta_std: g.delta.sample_std().map(round2),
        })
        .collect()
}

/// Distinct `(original, target)` pairs, ordered by original then target.
pub fn unique_mappings(dataset: &Dataset) -> Vec<UniqueMapping> {
    let mut pairs: BTreeMap<(u64, u64), u64> = BTreeMap::new();
    for (original, target) in dataset.original().iter().zip(dataset.target().iter()) {
        *pairs.entry((original, target)).or_insert(0) += 1;
    }

    let mut targets_per_original: BTreeMap<u64, usize> = BTreeMap::new();
    for &(original, _) in pairs.keys() {
        *targets_per_original.entry(original).or_insert(0) += 1;
    }

    pairs
        .into_iter()
        .map(|((original_value, target_value), occurrences)| {
            let mapping_type = if targets_per_original.get(&original_value) == Some(&1) {
                MappingKind::OneToOne
            } else {
                MappingKind::OneToMany
            };
            UniqueMapping {
                original_value,
                target_value,
                delta: (target_value as i128 - original_value as i128) as i64,
                occurrences,
                mapping_type,
            }
        })
        .collect()
}

/// Write summary rows as UTF-8 CSV with a header row.
pub fn write_mapping_summary_to<W: Write>(rows: &[MappingSummaryRow], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()
        .map_err(|e| ValmapError::Csv(csv::Error::from(e)))?;
    Ok(())
}

/// Write summary rows to a CSV file.
pub fn write_mapping_summary(rows: &[MappingSummaryRow], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| ValmapError::io(path, e))?;
    write_mapping_summary_to(rows, BufWriter::new(file))
}

/// Parse summary rows from CSV produced by [`write_mapping_summary_to`].
pub fn read_mapping_summary_from<R: Read>(reader: R) -> Result<Vec<MappingSummaryRow>> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for row in csv.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Parse summary rows from a CSV file.
pub fn read_mapping_summary(path: impl AsRef<Path>) -> Result<Vec<MappingSummaryRow>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ValmapError::io(path, e))?;
    read_mapping_summary_from(file)
}
