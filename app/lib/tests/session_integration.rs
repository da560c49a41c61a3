//! Integration tests for the analysis session.

use std::io::Write;
use std::sync::Mutex;

use proptest::prelude::*;
use tempfile::NamedTempFile;
use valmap::{
    read_mapping_summary, AnalysisKind, IngestConfig, MappingKind, NoProgress, Operation,
    ProgressEvent, Session, SummaryKind, ValmapConfig, ValmapError,
};

fn write_log(lines: impl IntoIterator<Item = String>) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();
    file
}

fn loaded_session(lines: impl IntoIterator<Item = String>) -> (Session, NamedTempFile) {
    let log = write_log(lines);
    let session = Session::new();
    session.load(log.path(), &NoProgress).unwrap();
    (session, log)
}

#[test]
fn test_load_reports_progress_events() {
    let log = write_log((0..50).map(|v| format!("原值{}→新值{}", v, v * 2)));
    let events = Mutex::new(Vec::new());
    let observer = |event: &ProgressEvent<'_>| {
        let tag = match event {
            ProgressEvent::Started { .. } => "started",
            ProgressEvent::Step { .. } => "step",
            ProgressEvent::Completed { .. } => "completed",
            ProgressEvent::Failed { .. } => "failed",
        };
        events.lock().unwrap().push(tag);
    };

    let summary = Session::new().load(log.path(), &observer).unwrap();
    assert_eq!(summary.records, 50);

    let events = events.into_inner().unwrap();
    assert_eq!(events.first(), Some(&"started"));
    assert_eq!(events.last(), Some(&"completed"));
    assert!(events.contains(&"step"));
}

#[test]
fn test_failed_load_emits_failed_event() {
    let log = write_log(["no mappings here".to_string()]);
    let failed = Mutex::new(None);
    let observer = |event: &ProgressEvent<'_>| {
        if let ProgressEvent::Failed { operation, .. } = event {
            *failed.lock().unwrap() = Some(*operation);
        }
    };

    let session = Session::new();
    let err = session.load(log.path(), &observer).unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(failed.into_inner().unwrap(), Some(Operation::Load));
    assert!(session.current().is_none());
}

#[test]
fn test_comprehensive_summary_for_constant_offset() {
    let (session, _log) = loaded_session((0..200).map(|v| format!("原值{}→新值{}", v, v + 9)));
    let report = session.analyze(AnalysisKind::Comprehensive, &NoProgress).unwrap();
    assert!(report.basic_statistics.is_some());
    assert!(report.model_fitting.is_some());

    let summary = session.summary().unwrap();
    assert_eq!(summary.algorithm_type, SummaryKind::GlobalConstant);
    assert_eq!(summary.data_overview.total_records, 200);
    assert_eq!(summary.data_overview.unique_original_values, 200);
}

#[test]
fn test_summary_for_linear_mapping() {
    let (session, _log) = loaded_session((0..200).map(|v| format!("原值{}→新值{}", v, 2 * v + 1)));
    session.analyze(AnalysisKind::Comprehensive, &NoProgress).unwrap();
    let summary = session.summary().unwrap();
    assert_eq!(summary.algorithm_type, SummaryKind::Linear);
    assert!((summary.confidence - 1.0).abs() < 1e-9);
}

#[test]
fn test_summary_needs_comprehensive_analysis() {
    let (session, _log) = loaded_session((0..20).map(|v| format!("原值{}→新值{}", v, v)));
    assert!(session.summary().is_err());

    session.analyze(AnalysisKind::Linear, &NoProgress).unwrap();
    assert!(session.summary().is_err());
    let report = session.last_analysis().unwrap();
    assert!(report.linear_analysis.is_some());
    assert!(report.piecewise_analysis.is_none());
}

#[test]
fn test_reload_clears_last_analysis() {
    let (session, _log) = loaded_session((0..20).map(|v| format!("原值{}→新值{}", v, v)));
    session.analyze(AnalysisKind::Piecewise, &NoProgress).unwrap();
    assert!(session.last_analysis().is_some());

    let other = write_log((0..30).map(|v| format!("原值{}→新值{}", v, v + 1)));
    session.load(other.path(), &NoProgress).unwrap();
    assert!(session.last_analysis().is_none());
    assert_eq!(session.statistics().total_records, 30);
}

#[test]
fn test_operations_without_data() {
    let session = Session::new();
    assert!(matches!(
        session.derive_algorithm(&NoProgress),
        Err(ValmapError::NoData { .. })
    ));
    assert!(session.unique_mappings().is_err());
    assert_eq!(session.memory_usage().total_bytes, 0);
    assert_eq!(session.statistics().total_records, 0);
}

#[test]
fn test_unique_mappings_tag_multiplicity() {
    let (session, _log) = loaded_session(
        ["原值1→新值2", "原值1→新值2", "原值3→新值4", "原值3→新值5"]
            .iter()
            .map(|s| s.to_string()),
    );
    let mappings = session.unique_mappings().unwrap();
    assert_eq!(mappings.len(), 3);

    let one = mappings.iter().find(|m| m.original_value == 1).unwrap();
    assert_eq!(one.occurrences, 2);
    assert_eq!(one.mapping_type, MappingKind::OneToOne);
    assert!(mappings
        .iter()
        .filter(|m| m.original_value == 3)
        .all(|m| m.mapping_type == MappingKind::OneToMany));
}

#[test]
fn test_compare_with_loaded_dataset() {
    let (session, _log) = loaded_session((0..300).map(|v| format!("原值{}→新值{}", v, v + 2)));
    let other = write_log((0..300).map(|v| format!("原值{}→新值{}", v, v + 2)));
    let other = session.read_dataset(other.path()).unwrap();
    let report = session.compare_with(&other, &NoProgress).unwrap();
    assert!(report.algorithm_similarity.value().unwrap().is_similar);
}

#[test]
fn test_sampled_session_config() {
    let log = write_log((0..1_000).map(|v| format!("原值{}→新值{}", v, v)));
    let config = ValmapConfig::new()
        .with_ingest(IngestConfig::new().with_sample_rate(0.5))
        .with_visualization_sample(100);
    let session = Session::with_config(config);
    let summary = session.load(log.path(), &NoProgress).unwrap();
    assert_eq!(summary.records, 500);

    let loaded = session.current().unwrap();
    assert_eq!(loaded.sample.len(), 100);
    let usage = session.memory_usage();
    assert_eq!(usage.total_bytes, usage.dataset_bytes + usage.sample_bytes);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_export_round_trips(pairs in prop::collection::vec((0u64..50, 0u64..1_000), 1..200)) {
        let log = write_log(pairs.iter().map(|(o, t)| format!("原值{}→新值{}", o, t)));
        let session = Session::new();
        session.load(log.path(), &NoProgress).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("summary.csv");
        let written = session.export_mapping_summary(&out).unwrap();

        let rows = read_mapping_summary(&out).unwrap();
        prop_assert_eq!(rows.len(), written);
        prop_assert_eq!(rows, session.mapping_summary().unwrap());
    }
}
