//! Index maintenance around and instead of a load

use super::{load, point_stat_contents, spec_for, write_file};
use crate::processor::LoadProcessor;
use crate::store::MemoryDatabase;
use tempfile::TempDir;

#[tokio::test]
async fn test_index_only_run_inserts_no_rows() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_file(&temp_dir, "a.stat", &point_stat_contents());
    let db = MemoryDatabase::new();
    db.seed_index("line_data_fho", "PRIMARY");
    db.seed_index("line_data_fho", "line_data_fho_stat_header_id_fk");

    let mut spec = spec_for(vec![file]);
    spec.flags.apply_indexes = true;
    let report = LoadProcessor::new(db.clone(), spec)
        .with_progress(false)
        .process_indexes()
        .await
        .unwrap();

    assert_eq!(db.index_count("line_data_fho"), 5);
    assert_eq!(report.skipped, 0);
    assert_eq!(db.row_count("data_file"), 0);
    assert_eq!(db.row_count("line_data_fho"), 0);

    // a second pass finds every index in place
    let mut spec = spec_for(Vec::new());
    spec.flags.apply_indexes = true;
    let report = LoadProcessor::new(db.clone(), spec)
        .with_progress(false)
        .process_indexes()
        .await
        .unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(db.index_count("line_data_fho"), 5);
}

#[tokio::test]
async fn test_indexes_dropped_before_and_applied_after_load() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_file(&temp_dir, "a.stat", &point_stat_contents());
    let db = MemoryDatabase::new();
    db.seed_index("line_data_fho", "line_data_fho_fcst_lead_idx");

    let mut spec = spec_for(vec![file]);
    spec.flags.drop_indexes = true;
    spec.flags.apply_indexes = true;
    load(&db, spec).await;

    assert_eq!(db.row_count("line_data_fho"), 2);
    assert_eq!(db.index_count("line_data_fho"), 3);
}
