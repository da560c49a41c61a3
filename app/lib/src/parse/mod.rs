//! Log format detection and line parsing.
//!
//! This module turns raw mapping-log lines into [`MappingRecord`]s. It does
//! no aggregation: [`RecordReader`] is a plain streaming iterator and the
//! [`DatasetBuilder`] decides what to keep.
//!
//! [`MappingRecord`]: crate::dataset::MappingRecord
//! [`DatasetBuilder`]: crate::dataset::DatasetBuilder

mod format;
mod inspect;
mod reader;

pub use format::{detect_format_in, LogFormat, DICOM_HEADER};
pub use inspect::{inspect_file, FileInfo};
pub use reader::{detect_format, open_records, RecordReader};
