//! Pipeline tests for the load processor
//!
//! Fixture files are written to temporary directories and loaded into a
//! `MemoryDatabase`.

pub mod error_handling;
pub mod index_gating;
pub mod object_files;

use crate::config::{ConnectionSpec, LoadSpec};
use crate::models::LoadStats;
use crate::processor::LoadProcessor;
use crate::store::MemoryDatabase;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const STAT_HEADER_LINE: &str = "VERSION MODEL DESC FCST_LEAD FCST_VALID_BEG FCST_VALID_END \
    OBS_LEAD OBS_VALID_BEG OBS_VALID_END FCST_VAR FCST_UNITS FCST_LEV OBS_VAR OBS_UNITS OBS_LEV \
    OBTYPE VX_MASK INTERP_MTHD INTERP_PNTS FCST_THRESH OBS_THRESH COV_THRESH ALPHA LINE_TYPE";

/// One long-form stat line with a fixed context
pub fn stat_line(line_type: &str, data: &str) -> String {
    format!(
        "V12.0 GFS NA 120000 20120409_120000 20120409_120000 000000 20120409_120000 \
         20120409_120000 TMP K P850 TMP K P850 ADPUPA FULL BILIN 4 >273.0 >273.0 NA NA {} {}",
        line_type, data
    )
}

/// A point-stat file: two FHO lines, one CTC and one PCT with three thresholds
pub fn point_stat_contents() -> String {
    [
        STAT_HEADER_LINE.to_string(),
        stat_line("FHO", "10 0.5 0.4 0.6"),
        stat_line("FHO", "12 0.5 0.4 0.6"),
        stat_line("CTC", "10 2 3 1 4 NA"),
        stat_line("PCT", "20 3 0.0 3 7 0.5 4 6 1.0"),
    ]
    .join("\n")
        + "\n"
}

pub fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

pub fn spec_for(files: Vec<PathBuf>) -> LoadSpec {
    LoadSpec::new(ConnectionSpec::new("localhost", "mv_test", "user", "pw").unwrap())
        .with_files(files)
}

pub async fn load(db: &MemoryDatabase, spec: LoadSpec) -> LoadStats {
    LoadProcessor::new(db.clone(), spec)
        .with_progress(false)
        .process()
        .await
        .unwrap()
}

/// Distinct non-null values of one column
pub fn ids(db: &MemoryDatabase, table: &str, column: &str) -> BTreeSet<String> {
    db.column_values(table, column).into_iter().flatten().collect()
}
