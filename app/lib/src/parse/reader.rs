//! Line-by-line record streaming.
//!
//! [`RecordReader`] scans its input exactly once and yields a record for
//! every line its grammar accepts. Lines that do not match are skipped
//! silently. An I/O or encoding failure is yielded once and ends the stream.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use crate::dataset::MappingRecord;
use crate::error::{Result, ValmapError};
use crate::parse::format::{detect_format_in, LogFormat};

/// Default buffer size for reading logs (64 KB).
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Lazy, finite, non-restartable sequence of records from a log.
pub struct RecordReader<R: BufRead> {
    reader: R,
    format: LogFormat,
    path: PathBuf,
    line: String,
    line_number: u64,
    done: bool,
}

impl<R: BufRead> RecordReader<R> {
    /// Wrap a buffered reader.
    ///
    /// `path` is used only to label errors.
    pub fn new(reader: R, format: LogFormat, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            format,
            path: path.into(),
            line: String::new(),
            line_number: 0,
            done: false,
        }
    }

    /// Grammar used to parse lines.
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Number of lines consumed so far.
    pub fn lines_read(&self) -> u64 {
        self.line_number
    }

    fn fail(&mut self, error: std::io::Error) -> ValmapError {
        self.done = true;
        if error.kind() == ErrorKind::InvalidData {
            ValmapError::InvalidEncoding {
                path: self.path.clone(),
                line: self.line_number as usize + 1,
            }
        } else {
            ValmapError::io(self.path.clone(), error)
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<MappingRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.line_number += 1;
                    if let Some(record) = self.format.parse_line(&self.line, self.line_number) {
                        return Some(Ok(record));
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(self.fail(e))),
            }
        }
        None
    }
}

impl<R: BufRead> std::iter::FusedIterator for RecordReader<R> {}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| ValmapError::io(path, e))?;
    Ok(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, file))
}

/// Open a log file as a record stream using the given grammar.
pub fn open_records(path: impl AsRef<Path>, format: LogFormat) -> Result<RecordReader<BufReader<File>>> {
    let path = path.as_ref();
    Ok(RecordReader::new(open(path)?, format, path))
}

/// Read up to `max_lines` leading lines of a file and classify them.
pub fn detect_format(path: impl AsRef<Path>, max_lines: usize) -> Result<LogFormat> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    let mut lines = Vec::with_capacity(max_lines);
    let mut line = String::new();

    while lines.len() < max_lines {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => lines.push(line.clone()),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(ValmapError::InvalidEncoding {
                    path: path.to_path_buf(),
                    line: lines.len() + 1,
                })
            }
            Err(e) => return Err(ValmapError::io(path, e)),
        }
    }

    Ok(detect_format_in(&lines))
}
