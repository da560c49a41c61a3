//! Quick file inspection without building a dataset.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::IngestConfig;
use crate::error::{Result, ValmapError};
use crate::parse::reader::{detect_format, open_records};
use crate::parse::LogFormat;

/// Number of records parsed to estimate the record density of a file.
const ESTIMATE_RECORDS: usize = 1_000;

/// Basic facts about a log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Inspected file.
    pub path: PathBuf,
    /// Size on disk in bytes.
    pub file_size: u64,
    /// Number of lines in the file.
    pub total_lines: u64,
    /// Detected grammar.
    pub format: LogFormat,
    /// Estimated number of lines that produce a record.
    pub estimated_records: u64,
}

/// Count lines, detect the grammar and estimate the record count.
///
/// The estimate scales the record density of the lines needed to parse the
/// first 1,000 records up to the whole file.
pub fn inspect_file(path: impl AsRef<Path>, config: &IngestConfig) -> Result<FileInfo> {
    let path = path.as_ref();
    let file_size = std::fs::metadata(path)
        .map_err(|e| ValmapError::io(path, e))?
        .len();

    let total_lines = count_lines(path)?;
    let format = detect_format(path, config.detect_lines)?;

    let estimated_records = if format.is_known() && total_lines > 0 {
        let mut records = open_records(path, format)?;
        let mut parsed = 0u64;
        for record in records.by_ref().take(ESTIMATE_RECORDS) {
            record?;
            parsed += 1;
        }
        let scanned = records.lines_read().max(1);
        if parsed == 0 {
            0
        } else {
            (total_lines as f64 * parsed as f64 / scanned as f64).round() as u64
        }
    } else {
        0
    };

    Ok(FileInfo {
        path: path.to_path_buf(),
        file_size,
        total_lines,
        format,
        estimated_records,
    })
}

fn count_lines(path: &Path) -> Result<u64> {
    let file = File::open(path).map_err(|e| ValmapError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut lines = 0u64;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| ValmapError::io(path, e))?;
        if n == 0 {
            break;
        }
        lines += 1;
    }
    Ok(lines)
}
