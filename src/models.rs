//! Core data structures for MET loading.
//!
//! Defines file kinds, the parsed row records of every file family, header
//! keys used for de-duplication, and load statistics.

use crate::constants::{data_file_lu, NA};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Input file kinds recognised by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Stat,
    Vsdb,
    ModeCts,
    ModeObj,
    Mtd2d,
    Mtd3dSingleSimple,
    Mtd3dSingleCluster,
    Mtd3dPairSimple,
    Mtd3dPairCluster,
    Tcst,
}

/// Parser family a file kind belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFamily {
    Stat,
    Vsdb,
    Mode,
    Mtd,
    Tcst,
}

impl FileKind {
    /// Classify a file by its basename; `None` means the file is not loadable
    pub fn classify(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();

        if name.ends_with(".stat") {
            Some(FileKind::Stat)
        } else if name.ends_with(".vsdb") {
            Some(FileKind::Vsdb)
        } else if name.ends_with(".tcst") {
            Some(FileKind::Tcst)
        } else if name.starts_with("mode") && name.ends_with("cts.txt") {
            Some(FileKind::ModeCts)
        } else if name.ends_with("obj.txt") {
            Some(FileKind::ModeObj)
        } else if name.ends_with("2d.txt") {
            Some(FileKind::Mtd2d)
        } else if name.ends_with("3d_single_simple.txt") {
            Some(FileKind::Mtd3dSingleSimple)
        } else if name.ends_with("3d_single_cluster.txt") {
            Some(FileKind::Mtd3dSingleCluster)
        } else if name.ends_with("3d_pair_simple.txt") {
            Some(FileKind::Mtd3dPairSimple)
        } else if name.ends_with("3d_pair_cluster.txt") {
            Some(FileKind::Mtd3dPairCluster)
        } else {
            None
        }
    }

    pub fn family(&self) -> FileFamily {
        match self {
            FileKind::Stat => FileFamily::Stat,
            FileKind::Vsdb => FileFamily::Vsdb,
            FileKind::ModeCts | FileKind::ModeObj => FileFamily::Mode,
            FileKind::Mtd2d
            | FileKind::Mtd3dSingleSimple
            | FileKind::Mtd3dSingleCluster
            | FileKind::Mtd3dPairSimple
            | FileKind::Mtd3dPairCluster => FileFamily::Mtd,
            FileKind::Tcst => FileFamily::Tcst,
        }
    }

    /// Code stored in `data_file.data_file_lu_id`
    pub fn data_file_lu_id(&self) -> i32 {
        match self {
            FileKind::Stat => data_file_lu::STAT,
            FileKind::Vsdb => data_file_lu::VSDB_POINT_STAT,
            FileKind::ModeCts => data_file_lu::MODE_CTS,
            FileKind::ModeObj => data_file_lu::MODE_OBJ,
            FileKind::Mtd2d => data_file_lu::MTD_2D,
            FileKind::Mtd3dSingleSimple => data_file_lu::MTD_3D_SS,
            FileKind::Mtd3dSingleCluster => data_file_lu::MTD_3D_SC,
            FileKind::Mtd3dPairSimple => data_file_lu::MTD_3D_PS,
            FileKind::Mtd3dPairCluster => data_file_lu::MTD_3D_PC,
            FileKind::Tcst => data_file_lu::TCST,
        }
    }

    pub fn is_mtd_pair(&self) -> bool {
        matches!(self, FileKind::Mtd3dPairSimple | FileKind::Mtd3dPairCluster)
    }
}

/// One `data_file` row before its id is known
#[derive(Debug, Clone)]
pub struct DataFileRecord {
    pub kind: FileKind,
    pub filename: String,
    pub path: String,
    pub load_date: NaiveDateTime,
    pub mod_date: Option<NaiveDateTime>,
}

impl DataFileRecord {
    pub fn new(
        kind: FileKind,
        file_path: &Path,
        load_date: NaiveDateTime,
        mod_date: Option<NaiveDateTime>,
    ) -> Self {
        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let path = file_path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            kind,
            filename,
            path,
            load_date,
            mod_date,
        }
    }

    pub fn full_path(&self) -> PathBuf {
        Path::new(&self.path).join(&self.filename)
    }
}

/// Unique identity tuple of a header row; `None` compares with IS NULL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeaderKey(pub Vec<Option<String>>);

/// Context fields that identify a `stat_header` row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatHeaderKey {
    pub version: String,
    pub model: String,
    pub descr: String,
    pub fcst_var: String,
    pub fcst_units: String,
    pub fcst_lev: String,
    pub obs_var: String,
    pub obs_units: String,
    pub obs_lev: String,
    pub obtype: String,
    pub vx_mask: String,
    pub interp_mthd: String,
    pub interp_pnts: String,
    pub fcst_thresh: String,
    pub obs_thresh: String,
}

impl StatHeaderKey {
    /// A key with every field set to `NA`
    pub fn na() -> Self {
        Self {
            version: NA.to_string(),
            model: NA.to_string(),
            descr: NA.to_string(),
            fcst_var: NA.to_string(),
            fcst_units: NA.to_string(),
            fcst_lev: NA.to_string(),
            obs_var: NA.to_string(),
            obs_units: NA.to_string(),
            obs_lev: NA.to_string(),
            obtype: NA.to_string(),
            vx_mask: NA.to_string(),
            interp_mthd: NA.to_string(),
            interp_pnts: NA.to_string(),
            fcst_thresh: NA.to_string(),
            obs_thresh: NA.to_string(),
        }
    }

    /// Values in `STAT_HEADER_KEY_COLUMNS` order
    pub fn key(&self) -> HeaderKey {
        HeaderKey(
            [
                &self.version,
                &self.model,
                &self.descr,
                &self.fcst_var,
                &self.fcst_units,
                &self.fcst_lev,
                &self.obs_var,
                &self.obs_units,
                &self.obs_lev,
                &self.obtype,
                &self.vx_mask,
                &self.interp_mthd,
                &self.interp_pnts,
                &self.fcst_thresh,
                &self.obs_thresh,
            ]
            .into_iter()
            .map(|v| Some(v.clone()))
            .collect(),
        )
    }

    /// Mutable access by lower-case column name
    pub fn field_mut(&mut self, column: &str) -> Option<&mut String> {
        Some(match column {
            "version" => &mut self.version,
            "model" => &mut self.model,
            "descr" => &mut self.descr,
            "fcst_var" => &mut self.fcst_var,
            "fcst_units" => &mut self.fcst_units,
            "fcst_lev" => &mut self.fcst_lev,
            "obs_var" => &mut self.obs_var,
            "obs_units" => &mut self.obs_units,
            "obs_lev" => &mut self.obs_lev,
            "obtype" => &mut self.obtype,
            "vx_mask" => &mut self.vx_mask,
            "interp_mthd" => &mut self.interp_mthd,
            "interp_pnts" => &mut self.interp_pnts,
            "fcst_thresh" => &mut self.fcst_thresh,
            "obs_thresh" => &mut self.obs_thresh,
            _ => return None,
        })
    }
}

/// One canonical stat line, from a `.stat` file or a rewritten VSDB record
#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    /// Position of the source file within the load batch
    pub file_row: usize,
    pub line_num: usize,
    pub header: StatHeaderKey,
    pub fcst_lead: Option<i64>,
    pub fcst_valid_beg: Option<NaiveDateTime>,
    pub fcst_valid_end: Option<NaiveDateTime>,
    pub fcst_init_beg: Option<NaiveDateTime>,
    pub obs_lead: Option<i64>,
    pub obs_valid_beg: Option<NaiveDateTime>,
    pub obs_valid_end: Option<NaiveDateTime>,
    pub fcst_perc: Option<f64>,
    pub obs_perc: Option<f64>,
    pub cov_thresh: Option<String>,
    pub alpha: Option<String>,
    pub line_type: String,
    /// Positional fields after `LINE_TYPE`; `None` where the file had `NA`
    pub data: Vec<Option<String>>,
}

/// Ordered named fields of one MODE or MTD line
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<Vec<String>>,
    values: Vec<Option<String>>,
}

impl Record {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<Option<String>>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.values.get(index).and_then(|v| v.as_deref())
    }

    /// Overwrite an existing column; returns false when the column is unknown
    pub fn set(&mut self, column: &str, value: Option<String>) -> bool {
        match self.columns.iter().position(|c| c == column) {
            Some(index) if index < self.values.len() => {
                self.values[index] = value;
                true
            }
            _ => false,
        }
    }
}

/// One MODE CTS or object line
#[derive(Debug, Clone, PartialEq)]
pub struct ModeRow {
    pub file_row: usize,
    pub line_num: usize,
    pub kind: FileKind,
    pub line_type_lu_id: i32,
    pub header: HeaderKey,
    pub record: Record,
}

/// One MTD object line, possibly a synthesized revision row
#[derive(Debug, Clone, PartialEq)]
pub struct MtdRow {
    pub file_row: usize,
    pub line_num: usize,
    pub kind: FileKind,
    pub line_type_lu_id: i32,
    pub revision_id: Option<i64>,
    pub header: HeaderKey,
    pub record: Record,
}

/// Context fields that identify a `tcst_header` row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TcstHeaderKey {
    pub version: String,
    pub amodel: String,
    pub bmodel: String,
    pub descr: String,
    pub storm_id: String,
    pub basin: String,
    pub cyclone: String,
    pub storm_name: String,
    pub init_mask: String,
    pub valid_mask: String,
}

impl TcstHeaderKey {
    pub fn key(&self) -> HeaderKey {
        HeaderKey(
            [
                &self.version,
                &self.amodel,
                &self.bmodel,
                &self.descr,
                &self.storm_id,
                &self.basin,
                &self.cyclone,
                &self.storm_name,
                &self.init_mask,
                &self.valid_mask,
            ]
            .into_iter()
            .map(|v| Some(v.clone()))
            .collect(),
        )
    }
}

/// One tropical-cyclone line
#[derive(Debug, Clone, PartialEq)]
pub struct TcstRow {
    pub file_row: usize,
    pub line_num: usize,
    pub header: TcstHeaderKey,
    pub fcst_init: Option<NaiveDateTime>,
    pub fcst_lead: Option<i64>,
    pub fcst_valid: Option<NaiveDateTime>,
    pub line_type: String,
    pub data: Vec<Option<String>>,
}

/// Everything parsed from one input file
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub record: DataFileRecord,
    pub content: ParsedContent,
    /// Rows skipped with a warning
    pub row_issues: usize,
}

#[derive(Debug, Clone)]
pub enum ParsedContent {
    Stat(Vec<StatRow>),
    Mode(Vec<ModeRow>),
    Mtd(Vec<MtdRow>),
    Tcst(Vec<TcstRow>),
}

impl ParsedContent {
    pub fn len(&self) -> usize {
        match self {
            ParsedContent::Stat(rows) => rows.len(),
            ParsedContent::Mode(rows) => rows.len(),
            ParsedContent::Mtd(rows) => rows.len(),
            ParsedContent::Tcst(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parsed files of one load, concatenated per family
#[derive(Debug, Default)]
pub struct LoadBatch {
    pub files: Vec<DataFileRecord>,
    pub stat: Vec<StatRow>,
    pub mode: Vec<ModeRow>,
    pub mtd: Vec<MtdRow>,
    pub tcst: Vec<TcstRow>,
}

impl LoadBatch {
    /// Append a parsed file, stamping its rows with the file's batch position
    pub fn push(&mut self, parsed: ParsedFile) {
        let file_row = self.files.len();
        self.files.push(parsed.record);
        match parsed.content {
            ParsedContent::Stat(rows) => self.stat.extend(rows.into_iter().map(|mut r| {
                r.file_row = file_row;
                r
            })),
            ParsedContent::Mode(rows) => self.mode.extend(rows.into_iter().map(|mut r| {
                r.file_row = file_row;
                r
            })),
            ParsedContent::Mtd(rows) => self.mtd.extend(rows.into_iter().map(|mut r| {
                r.file_row = file_row;
                r
            })),
            ParsedContent::Tcst(rows) => self.tcst.extend(rows.into_iter().map(|mut r| {
                r.file_row = file_row;
                r
            })),
        }
    }

    /// Drop the given files and every row that came from them
    pub fn retain_files(&mut self, keep: &[bool]) {
        let mut remap = Vec::with_capacity(keep.len());
        let mut next = 0;
        for kept in keep {
            remap.push(if *kept {
                next += 1;
                Some(next - 1)
            } else {
                None
            });
        }

        let mut position = 0;
        self.files.retain(|_| {
            let kept = keep.get(position).copied().unwrap_or(true);
            position += 1;
            kept
        });

        let new_row = |file_row: usize| remap.get(file_row).copied().flatten();
        self.stat.retain_mut(|r| match new_row(r.file_row) {
            Some(row) => {
                r.file_row = row;
                true
            }
            None => false,
        });
        self.mode.retain_mut(|r| match new_row(r.file_row) {
            Some(row) => {
                r.file_row = row;
                true
            }
            None => false,
        });
        self.mtd.retain_mut(|r| match new_row(r.file_row) {
            Some(row) => {
                r.file_row = row;
                true
            }
            None => false,
        });
        self.tcst.retain_mut(|r| match new_row(r.file_row) {
            Some(row) => {
                r.file_row = row;
                true
            }
            None => false,
        });
    }

    pub fn row_count(&self) -> usize {
        self.stat.len() + self.mode.len() + self.mtd.len() + self.tcst.len()
    }
}

/// A row-level problem; the row is skipped and the load continues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    pub reason: String,
}

impl RowIssue {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for RowIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Loader statistics reported at the end of a run
#[derive(Debug, Default, Clone)]
pub struct LoadStats {
    pub files_seen: usize,
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub files_duplicate: usize,
    pub rows_skipped: usize,
    pub rows_pruned: usize,
    pub revision_rows: usize,
    pub warnings: usize,
    pub rows_written: BTreeMap<String, u64>,
    pub processing_time_ms: u128,
}

impl LoadStats {
    pub fn record_write(&mut self, table: &str, rows: u64) {
        *self.rows_written.entry(table.to_string()).or_default() += rows;
    }

    pub fn total_rows(&self) -> u64 {
        self.rows_written.values().sum()
    }
}

/// Shortest decimal rendering of a number, with float noise rounded away
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let text = format!("{:.6}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Turn a MET `NA` field into `None`
pub fn na_to_none(raw: &str) -> Option<String> {
    if raw == NA {
        None
    } else {
        Some(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_file_kinds() {
        let cases = [
            ("point_stat_120000L_20120409_120000V.stat", Some(FileKind::Stat)),
            ("gfs_2012040100.vsdb", Some(FileKind::Vsdb)),
            ("tc_pairs.tcst", Some(FileKind::Tcst)),
            ("mode_120000L_20120409_120000V_cts.txt", Some(FileKind::ModeCts)),
            ("mode_120000L_20120409_120000V_obj.txt", Some(FileKind::ModeObj)),
            ("mtd_20120409_120000V_2d.txt", Some(FileKind::Mtd2d)),
            ("MTD_X_3D_SINGLE_SIMPLE.TXT", Some(FileKind::Mtd3dSingleSimple)),
            ("mtd_3d_single_cluster.txt", Some(FileKind::Mtd3dSingleCluster)),
            ("mtd_3d_pair_simple.txt", Some(FileKind::Mtd3dPairSimple)),
            ("mtd_3d_pair_cluster.txt", Some(FileKind::Mtd3dPairCluster)),
            ("readme.txt", None),
            ("grid_stat.nc", None),
        ];
        for (name, expected) in cases {
            assert_eq!(FileKind::classify(Path::new(name)), expected, "{}", name);
        }
    }

    #[test]
    fn test_mode_cts_requires_mode_prefix() {
        assert_eq!(FileKind::classify(Path::new("wavelet_cts.txt")), None);
    }

    #[test]
    fn test_data_file_lu_ids_are_distinct() {
        let kinds = [
            FileKind::Stat,
            FileKind::Vsdb,
            FileKind::ModeCts,
            FileKind::ModeObj,
            FileKind::Mtd2d,
            FileKind::Mtd3dSingleSimple,
            FileKind::Mtd3dSingleCluster,
            FileKind::Mtd3dPairSimple,
            FileKind::Mtd3dPairCluster,
            FileKind::Tcst,
        ];
        let mut ids: Vec<_> = kinds.iter().map(|k| k.data_file_lu_id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), kinds.len());
        assert_eq!(FileKind::ModeCts.data_file_lu_id(), 2);
        assert_eq!(FileKind::Mtd2d.data_file_lu_id(), 9);
    }

    #[test]
    fn test_record_get_and_set() {
        let columns = Arc::new(vec!["object_id".to_string(), "area".to_string()]);
        let mut record = Record::new(columns, vec![Some("F001".into()), None]);
        assert_eq!(record.get("object_id"), Some("F001"));
        assert_eq!(record.get("area"), None);
        assert!(record.set("area", Some("12".into())));
        assert!(!record.set("volume", Some("1".into())));
        assert_eq!(record.get("area"), Some("12"));
    }

    #[test]
    fn test_retain_files_renumbers_rows() {
        let file = DataFileRecord::new(
            FileKind::Stat,
            Path::new("/data/a.stat"),
            NaiveDateTime::default(),
            None,
        );
        let row = |file_row| TcstRow {
            file_row,
            line_num: 2,
            header: TcstHeaderKey {
                version: "V1".into(),
                amodel: "A".into(),
                bmodel: "B".into(),
                descr: NA.into(),
                storm_id: "AL01".into(),
                basin: "AL".into(),
                cyclone: "01".into(),
                storm_name: "ONE".into(),
                init_mask: NA.into(),
                valid_mask: NA.into(),
            },
            fcst_init: None,
            fcst_lead: Some(0),
            fcst_valid: None,
            line_type: "TCMPR".into(),
            data: Vec::new(),
        };
        let mut batch = LoadBatch {
            files: vec![file.clone(), file.clone(), file],
            tcst: vec![row(0), row(1), row(2)],
            ..Default::default()
        };
        batch.retain_files(&[true, false, true]);
        assert_eq!(batch.files.len(), 2);
        let rows: Vec<_> = batch.tcst.iter().map(|r| r.file_row).collect();
        assert_eq!(rows, vec![0, 1]);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0.05), "0.05");
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(12.3 - 11.1), "1.2");
        assert_eq!(format_number(-0.0000001), "0");
    }
}
