//! The single observed transformation event.

use serde::{Deserialize, Serialize};

/// One original → target mapping taken from a log line.
///
/// `delta` is always `target - original`. `delta_percent` is
/// `delta / original * 100`, or 0 when the original value is 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    /// Source line number (1-indexed).
    pub line_number: u64,
    /// Running element index, when the grammar carries one.
    pub index: Option<u64>,
    /// 2-D element position `(x, y)`, when the grammar carries one.
    pub position: Option<(u64, u64)>,
    /// Value before the transformation.
    pub original: u64,
    /// Value after the transformation.
    pub target: u64,
    /// `target - original`.
    pub delta: i64,
    /// Relative change in percent.
    pub delta_percent: f64,
}

impl MappingRecord {
    /// Build a record, deriving delta and percent from the two values.
    pub fn derived(line_number: u64, original: u64, target: u64) -> Option<Self> {
        let delta = signed_delta(original, target)?;
        Some(Self {
            line_number,
            index: None,
            position: None,
            original,
            target,
            delta,
            delta_percent: percent_of(delta, original),
        })
    }

    /// Attach an element index and position.
    pub(crate) fn with_location(mut self, index: u64, x: u64, y: u64) -> Self {
        self.index = Some(index);
        self.position = Some((x, y));
        self
    }
}

/// `target - original` as a signed value, if it fits in `i64`.
pub fn signed_delta(original: u64, target: u64) -> Option<i64> {
    let diff = target as i128 - original as i128;
    i64::try_from(diff).ok()
}

/// `delta / original * 100`, guarded against a zero original.
pub fn percent_of(delta: i64, original: u64) -> f64 {
    if original == 0 {
        0.0
    } else {
        delta as f64 / original as f64 * 100.0
    }
}
