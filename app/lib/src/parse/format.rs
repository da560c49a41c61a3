//! Known log grammars and format detection.
//!
//! Three line shapes are recognized:
//!
//! - **Pixel mapping**: `[12]位置(3,4)原值100→新值120(变化:20,20.00%)`
//! - **DICOM mapping**: `[12] 位置(3,4) 原值100 → 新值120 (变化: 20, 20.00%)`,
//!   usually preceded by a `===完整16位DICOM像素映射数据===` header
//! - **Simple mapping**: any line containing `原值100→新值120`, with optional
//!   whitespace around the arrow
//!
//! Detection looks at a short prefix of the file and checks the most
//! specific grammar first, so annotated lines are never mistaken for the
//! simple shape they also contain.

use std::fmt;

use lazy_static::lazy_static;
use log::debug;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::dataset::MappingRecord;

/// Header line that marks a DICOM pixel mapping dump.
pub const DICOM_HEADER: &str = "===完整16位DICOM像素映射数据===";

const ORIGINAL_MARK: &str = "原值";
const ARROW: &str = "→";
const DICOM_POSITION_MARK: &str = "] 位置(";
const PIXEL_POSITION_MARK: &str = "]位置(";

lazy_static! {
    static ref PIXEL_RE: Regex = Regex::new(
        r"\[(\d+)\]位置\((\d+),(\d+)\)原值(\d+)→新值(\d+)\(变化:([-\d]+),([-\d.]+)%\)"
    )
    .unwrap();
    static ref DICOM_RE: Regex = Regex::new(
        r"\[(\d+)\] 位置\((\d+),(\d+)\) 原值(\d+) → 新值(\d+) \(变化: ([-\d]+), ([-\d.]+)%\)"
    )
    .unwrap();
    static ref SIMPLE_RE: Regex = Regex::new(r"原值(\d+)\s*→\s*新值(\d+)").unwrap();
}

/// A supported log line grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Compact annotated lines with index, position, delta and percent.
    PixelMapping,
    /// Free-form lines carrying only original and target values.
    SimpleMapping,
    /// Spaced annotated lines from DICOM dumps.
    DicomFormat,
    /// No grammar matched the file prefix.
    Unknown,
}

impl LogFormat {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::PixelMapping => "pixel_mapping",
            LogFormat::SimpleMapping => "simple_mapping",
            LogFormat::DicomFormat => "dicom_format",
            LogFormat::Unknown => "unknown",
        }
    }

    /// Whether this format can produce records.
    pub fn is_known(&self) -> bool {
        !matches!(self, LogFormat::Unknown)
    }

    /// Parse one line into a record.
    ///
    /// Returns `None` for lines that do not match or carry numbers that do
    /// not fit. A recorded change that disagrees with `target - original` is
    /// replaced by the recomputed one.
    pub fn parse_line(&self, line: &str, line_number: u64) -> Option<MappingRecord> {
        let line = line.trim();
        match self {
            LogFormat::PixelMapping => annotated(&PIXEL_RE, line, line_number),
            LogFormat::DicomFormat => annotated(&DICOM_RE, line, line_number),
            LogFormat::SimpleMapping => {
                let caps = SIMPLE_RE.captures(line)?;
                MappingRecord::derived(line_number, number(&caps, 1)?, number(&caps, 2)?)
            }
            LogFormat::Unknown => None,
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, group: usize) -> Option<T> {
    caps.get(group)?.as_str().parse().ok()
}

fn annotated(re: &Regex, line: &str, line_number: u64) -> Option<MappingRecord> {
    let caps = re.captures(line)?;
    let index = number(&caps, 1)?;
    let x = number(&caps, 2)?;
    let y = number(&caps, 3)?;
    let original: u64 = number(&caps, 4)?;
    let target: u64 = number(&caps, 5)?;
    let recorded_delta: i64 = number(&caps, 6)?;
    let recorded_percent: f64 = number(&caps, 7)?;

    let mut record =
        MappingRecord::derived(line_number, original, target)?.with_location(index, x, y);
    if record.delta != recorded_delta {
        debug!(
            "Line {}: recorded change {} disagrees with {} -> {}; using {}",
            line_number, recorded_delta, original, target, record.delta
        );
    } else if recorded_percent.is_finite() {
        record.delta_percent = recorded_percent;
    }
    Some(record)
}

/// Classify a file prefix by its marker substrings.
///
/// Checks DICOM first (header or spaced position marker), then the compact
/// pixel shape, then the simple shape.
pub fn detect_format_in<I, S>(lines: I) -> LogFormat
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut dicom = false;
    let mut pixel = false;
    let mut simple = false;

    for line in lines {
        let line = line.as_ref().trim();
        let mapping = line.contains(ORIGINAL_MARK) && line.contains(ARROW);
        if line.contains(DICOM_HEADER) || (mapping && line.contains(DICOM_POSITION_MARK)) {
            dicom = true;
        }
        if mapping && line.contains(PIXEL_POSITION_MARK) {
            pixel = true;
        }
        if mapping {
            simple = true;
        }
    }

    if dicom {
        LogFormat::DicomFormat
    } else if pixel {
        LogFormat::PixelMapping
    } else if simple {
        LogFormat::SimpleMapping
    } else {
        LogFormat::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL_LINE: &str = "[7]位置(3,4)原值100→新值120(变化:20,20.00%)";
    const DICOM_LINE: &str = "[7] 位置(3,4) 原值100 → 新值80 (变化: -20, -20.00%)";

    #[test]
    fn test_parse_pixel_line() {
        let record = LogFormat::PixelMapping.parse_line(PIXEL_LINE, 5).unwrap();
        assert_eq!(record.line_number, 5);
        assert_eq!(record.index, Some(7));
        assert_eq!(record.position, Some((3, 4)));
        assert_eq!(record.original, 100);
        assert_eq!(record.target, 120);
        assert_eq!(record.delta, 20);
        assert_eq!(record.delta_percent, 20.0);
    }

    #[test]
    fn test_parse_dicom_line() {
        let record = LogFormat::DicomFormat.parse_line(DICOM_LINE, 2).unwrap();
        assert_eq!(record.delta, -20);
        assert_eq!(record.delta_percent, -20.0);
    }

    #[test]
    fn test_parse_simple_line_derives_delta() {
        let record = LogFormat::SimpleMapping
            .parse_line("  pixel 原值 → 原值0 → 新值15 ok  ", 9)
            .unwrap();
        assert_eq!(record.original, 0);
        assert_eq!(record.target, 15);
        assert_eq!(record.delta, 15);
        assert_eq!(record.delta_percent, 0.0);
        assert_eq!(record.index, None);
    }

    #[test]
    fn test_inconsistent_change_is_recomputed() {
        let record = LogFormat::PixelMapping
            .parse_line("[7]位置(1,2)原值100→新值150(变化:40,40.00%)", 3)
            .unwrap();
        assert_eq!(record.line_number, 3);
        assert_eq!(record.position, Some((1, 2)));
        assert_eq!((record.original, record.target), (100, 150));
        assert_eq!(record.delta, 50);
        assert_eq!(record.delta_percent, 50.0);

        let record = LogFormat::DicomFormat
            .parse_line("[0] 位置(0,0) 原值200 → 新值100 (变化: 7, 3.50%)", 1)
            .unwrap();
        assert_eq!(record.delta, -100);
        assert_eq!(record.delta_percent, -50.0);
    }

    #[test]
    fn test_simple_grammar_accepts_annotated_lines() {
        let record = LogFormat::SimpleMapping.parse_line(DICOM_LINE, 1).unwrap();
        assert_eq!((record.original, record.target), (100, 80));
    }

    #[test]
    fn test_malformed_lines_are_dropped() {
        assert!(LogFormat::PixelMapping.parse_line("garbage", 1).is_none());
        // delta field is just a sign
        assert!(LogFormat::PixelMapping
            .parse_line("[7]位置(3,4)原值100→新值120(变化:-,20.00%)", 1)
            .is_none());
        // value overflows u64
        assert!(LogFormat::SimpleMapping
            .parse_line("原值99999999999999999999→新值1", 1)
            .is_none());
        assert!(LogFormat::Unknown.parse_line(PIXEL_LINE, 1).is_none());
    }

    #[test]
    fn test_detect_formats() {
        assert_eq!(
            detect_format_in([DICOM_HEADER, "", DICOM_LINE]),
            LogFormat::DicomFormat
        );
        assert_eq!(detect_format_in([DICOM_LINE]), LogFormat::DicomFormat);
        assert_eq!(
            detect_format_in(["# header", PIXEL_LINE]),
            LogFormat::PixelMapping
        );
        assert_eq!(
            detect_format_in(["原值5→新值6"]),
            LogFormat::SimpleMapping
        );
        assert_eq!(
            detect_format_in(["nothing", "to see"]),
            LogFormat::Unknown
        );
        assert_eq!(detect_format_in(Vec::<String>::new()), LogFormat::Unknown);
    }

    #[test]
    fn test_format_names() {
        assert_eq!(LogFormat::DicomFormat.to_string(), "dicom_format");
        assert_eq!(
            serde_json::to_string(&LogFormat::PixelMapping).unwrap(),
            "\"pixel_mapping\""
        );
        assert!(!LogFormat::Unknown.is_known());
    }
}
