//! Integration tests for log detection and dataset building.

use std::io::Write;

use tempfile::NamedTempFile;
use valmap::{
    detect_format, inspect_file, DatasetBuilder, IngestConfig, LoadOutcome, LogFormat, ValmapError,
};

fn write_log(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn simple_log(n: u64) -> NamedTempFile {
    let text: String = (0..n).map(|v| format!("原值{}→新值{}\n", v, v + 10)).collect();
    write_log(&text)
}

#[test]
fn test_pixel_log_keeps_location() {
    let log = write_log(
        "[0]位置(3,4)原值100→新值120(变化:20,20.00%)\n\
         [1]位置(5,6)原值200→新值180(变化:-20,-10.00%)\n",
    );
    assert_eq!(detect_format(log.path(), 10).unwrap(), LogFormat::PixelMapping);

    let (dataset, stats) = DatasetBuilder::new()
        .build(log.path())
        .unwrap()
        .into_result(log.path())
        .unwrap();
    assert_eq!(stats.format, LogFormat::PixelMapping);
    assert_eq!(dataset.len(), 2);

    let second = dataset.record(1).unwrap();
    assert_eq!(second.original, 200);
    assert_eq!(second.target, 180);
    assert_eq!(second.delta, -20);
    assert_eq!(second.index, Some(1));
    assert!(dataset.position().is_some());
}

#[test]
fn test_dicom_log_with_header() {
    let log = write_log(
        "===完整16位DICOM像素映射数据===\n\
         [0] 位置(0,0) 原值1000 → 新值1010 (变化: 10, 1.00%)\n\
         [1] 位置(0,1) 原值2000 → 新值2010 (变化: 10, 0.50%)\n\
         [2] 位置(0,2) 原值3000 → 新值3010 (变化: 10, 0.33%)\n",
    );
    let (dataset, stats) = DatasetBuilder::new()
        .build(log.path())
        .unwrap()
        .into_result(log.path())
        .unwrap();
    assert_eq!(stats.format, LogFormat::DicomFormat);
    assert_eq!(dataset.len(), 3);
    assert!(dataset.delta().iter().all(|d| d == 10));
}

#[test]
fn test_simple_log_skips_noise_lines() {
    let log = write_log("开始处理\n原值5→新值7\n# comment\n原值6 → 新值8\n结束\n");
    let (dataset, stats) = DatasetBuilder::new()
        .build(log.path())
        .unwrap()
        .into_result(log.path())
        .unwrap();
    assert_eq!(stats.format, LogFormat::SimpleMapping);
    assert_eq!(stats.lines_read, 5);
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.record(0).unwrap().line_number, 2);
    assert_eq!(dataset.record(1).unwrap().line_number, 4);
}

#[test]
fn test_inconsistent_delta_is_kept() {
    let log = write_log(
        "[0]位置(0,0)原值100→新值120(变化:20,20.00%)\n\
         [1]位置(0,1)原值100→新值120(变化:25,25.00%)\n",
    );
    let (dataset, _) = DatasetBuilder::new()
        .build(log.path())
        .unwrap()
        .into_result(log.path())
        .unwrap();
    assert_eq!(dataset.len(), 2);
    assert!(dataset.delta().iter().all(|d| d == 20));
}

#[test]
fn test_sampling_and_cap() {
    let log = simple_log(1_000);

    let config = IngestConfig::new().with_sample_rate(0.1);
    let (dataset, stats) = DatasetBuilder::with_config(config)
        .build(log.path())
        .unwrap()
        .into_result(log.path())
        .unwrap();
    assert_eq!(dataset.len(), 100);
    assert_eq!(stats.records_parsed, 1_000);
    assert_eq!(dataset.original().get(1), Some(10));

    let config = IngestConfig::new().with_max_records(Some(42));
    let (dataset, _) = DatasetBuilder::with_config(config)
        .build(log.path())
        .unwrap()
        .into_result(log.path())
        .unwrap();
    assert_eq!(dataset.len(), 42);
}

#[test]
fn test_small_chunks_match_one_chunk() {
    let log = simple_log(1_003);
    let build = |chunk_size| {
        DatasetBuilder::with_config(IngestConfig::new().with_chunk_size(chunk_size))
            .build(log.path())
            .unwrap()
            .into_result(log.path())
            .unwrap()
    };
    let (chunked, stats) = build(100);
    let (whole, _) = build(100_000);
    assert_eq!(stats.chunks, 11);
    assert_eq!(chunked, whole);
}

#[test]
fn test_unknown_format_is_unrecognized() {
    let log = write_log("hello\nworld\n");
    let outcome = DatasetBuilder::new().build(log.path()).unwrap();
    assert!(matches!(outcome, LoadOutcome::NoData { .. }));
    assert_eq!(outcome.stats().format, LogFormat::Unknown);

    let err = outcome.into_result(log.path()).unwrap_err();
    match &err {
        ValmapError::UnrecognizedFormat { path } => assert_eq!(path, log.path()),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_recoverable());
}

#[test]
fn test_known_format_without_records_is_no_data() {
    let log = write_log("原值1→新值2\n");
    let config = IngestConfig::new().with_max_records(Some(0));
    let outcome = DatasetBuilder::with_config(config).build(log.path()).unwrap();
    assert_eq!(outcome.stats().format, LogFormat::SimpleMapping);

    let err = outcome.into_result(log.path()).unwrap_err();
    assert!(matches!(err, ValmapError::NoData { .. }));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = DatasetBuilder::new().build("/no/such/mapping.log").unwrap_err();
    match err {
        ValmapError::Io { path, .. } => assert!(path.ends_with("mapping.log")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_invalid_utf8_is_reported() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"\xff\xfe\xfd\n").unwrap();
    file.flush().unwrap();
    let err = DatasetBuilder::new().build(file.path()).unwrap_err();
    assert!(matches!(err, ValmapError::InvalidEncoding { .. }));
}

#[test]
fn test_inspect_estimates_records() {
    let mut text = String::new();
    for v in 0..400 {
        text.push_str(&format!("原值{}→新值{}\n", v, v + 1));
        text.push_str("noise\n");
    }
    let log = write_log(&text);
    let info = inspect_file(log.path(), &IngestConfig::default()).unwrap();
    assert_eq!(info.total_lines, 800);
    assert_eq!(info.format, LogFormat::SimpleMapping);
    assert_eq!(info.estimated_records, 400);
    assert_eq!(info.file_size, text.len() as u64);
}
