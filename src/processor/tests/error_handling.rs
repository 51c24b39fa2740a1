//! Skipped files, dropped rows and cancellation

use super::{load, point_stat_contents, spec_for, stat_line, write_file, STAT_HEADER_LINE};
use crate::processor::LoadProcessor;
use crate::store::MemoryDatabase;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_empty_and_header_only_files_load_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let empty = write_file(&temp_dir, "empty.stat", "");
    let header_only = write_file(&temp_dir, "header.stat", &format!("{}\n", STAT_HEADER_LINE));
    let db = MemoryDatabase::new();

    let stats = load(&db, spec_for(vec![empty, header_only])).await;

    assert_eq!(stats.files_seen, 2);
    assert_eq!(stats.files_skipped, 2);
    assert_eq!(stats.files_loaded, 0);
    assert_eq!(db.row_count("data_file"), 0);
    assert_eq!(db.row_count("line_data_fho"), 0);
    assert_eq!(db.row_count("instance_info"), 0);
}

#[tokio::test]
async fn test_missing_and_unrecognized_files_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let good = write_file(&temp_dir, "a.stat", &point_stat_contents());
    let notes = write_file(&temp_dir, "notes.md", "not MET output");
    let missing = temp_dir.path().join("gone.stat");
    let db = MemoryDatabase::new();

    let stats = load(&db, spec_for(vec![good, notes, missing])).await;

    assert_eq!(stats.files_skipped, 2);
    assert_eq!(stats.files_loaded, 1);
    assert_eq!(db.row_count("line_data_fho"), 2);
}

#[tokio::test]
async fn test_unwanted_line_types_are_pruned() {
    let temp_dir = TempDir::new().unwrap();
    let contents = [
        STAT_HEADER_LINE.to_string(),
        stat_line("FHO", "10 0.5 0.4 0.6"),
        stat_line("XYZ", "1 2 3"),
        stat_line("MPR", "1 1 1 40.0 -100.0 NA NA 273.1 272.9"),
        stat_line("CTC", "10 2 3 1 4 NA"),
    ]
    .join("\n");
    let file = write_file(&temp_dir, "a.stat", &contents);
    let db = MemoryDatabase::new();

    let mut spec = spec_for(vec![file]);
    spec.line_types = vec!["FHO".into(), "MPR".into(), "XYZ".into()];
    let stats = load(&db, spec).await;

    // XYZ is unknown, MPR needs load_mpr and CTC is outside the allow-list
    assert_eq!(stats.rows_pruned, 3);
    assert_eq!(db.row_count("line_data_fho"), 1);
    assert_eq!(db.row_count("line_data_mpr"), 0);
    assert_eq!(db.row_count("line_data_ctc"), 0);
}

#[tokio::test]
async fn test_cancelled_load_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_file(&temp_dir, "a.stat", &point_stat_contents());
    let db = MemoryDatabase::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = LoadProcessor::new(db.clone(), spec_for(vec![file]))
        .with_progress(false)
        .with_cancellation(cancel)
        .process()
        .await
        .unwrap_err();

    assert_eq!(err.category(), "cancelled");
    assert_eq!(db.row_count("data_file"), 0);
    assert_eq!(db.row_count("stat_header"), 0);
}

#[tokio::test]
async fn test_oversized_counters_and_leads_drop_only_their_rows() {
    let temp_dir = TempDir::new().unwrap();
    let good = write_file(&temp_dir, "a.stat", &point_stat_contents());
    let contents = [
        STAT_HEADER_LINE.to_string(),
        stat_line("FHO", "10 0.5 0.4 0.6"),
        stat_line("MCTC", "10 5000000000"),
        stat_line("RHIST", "10 1e20"),
        stat_line("FHO", "10 0.5 0.4 0.6").replacen("120000", "999999999999999999", 1),
    ]
    .join("\n");
    let bad = write_file(&temp_dir, "b.stat", &contents);
    let db = MemoryDatabase::new();

    let stats = load(&db, spec_for(vec![good, bad])).await;

    assert_eq!(stats.files_loaded, 2);
    assert_eq!(stats.rows_skipped, 3);
    assert_eq!(db.row_count("line_data_fho"), 3);
    assert_eq!(db.row_count("line_data_mctc"), 0);
    assert_eq!(db.row_count("line_data_rhist"), 0);
    assert_eq!(db.row_count("line_data_ctc"), 1);
}
