//! File parsers for the MET output families.
//!
//! Each parser turns the text of one file into typed rows. Row-level problems
//! are logged and the row skipped; a file that yields no rows is reported as
//! an input-file error so the caller can skip it with a single warning.

pub mod mode;
pub mod mtd;
pub mod stat;
pub mod tcst;
pub mod vsdb;

use crate::constants::{NA, SQL_NULL};
use crate::error::{LoadError, Result};
use crate::models::{
    DataFileRecord, FileFamily, HeaderKey, ParsedContent, ParsedFile, Record, RowIssue,
};
use crate::timestamp::{format_sql, init_from_valid, parse_lead, DateCache};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-file parse state
pub struct ParseContext<'a> {
    pub path: &'a Path,
    pub dates: &'a mut DateCache,
    pub row_issues: usize,
}

impl<'a> ParseContext<'a> {
    pub fn new(path: &'a Path, dates: &'a mut DateCache) -> Self {
        Self {
            path,
            dates,
            row_issues: 0,
        }
    }

    /// Log and count a skipped row
    pub fn skip_row(&mut self, line_num: usize, reason: impl std::fmt::Display) {
        warn!("Skipping {}:{}: {}", self.path.display(), line_num, reason);
        self.row_issues += 1;
    }
}

/// Parse one file's contents according to its kind
pub fn parse_file(
    record: DataFileRecord,
    contents: &str,
    dates: &mut DateCache,
) -> Result<ParsedFile> {
    let path = record.full_path();
    if contents.trim().is_empty() {
        return Err(LoadError::input_file(&path, "file is empty"));
    }

    let mut ctx = ParseContext::new(&path, dates);
    let content = match record.kind.family() {
        FileFamily::Stat => ParsedContent::Stat(stat::parse_stat(&mut ctx, contents)?),
        FileFamily::Vsdb => ParsedContent::Stat(vsdb::parse_vsdb(&mut ctx, contents)?),
        FileFamily::Mode => ParsedContent::Mode(mode::parse_mode(&mut ctx, record.kind, contents)?),
        FileFamily::Mtd => ParsedContent::Mtd(mtd::parse_mtd(&mut ctx, record.kind, contents)?),
        FileFamily::Tcst => ParsedContent::Tcst(tcst::parse_tcst(&mut ctx, contents)?),
    };

    if content.is_empty() {
        return Err(LoadError::input_file(&path, "no data lines"));
    }

    debug!(
        "Parsed {} rows from {} ({} skipped)",
        content.len(),
        path.display(),
        ctx.row_issues
    );

    let row_issues = ctx.row_issues;
    Ok(ParsedFile {
        record,
        content,
        row_issues,
    })
}

/// Non-blank lines with their 1-based physical line numbers
pub(crate) fn numbered_lines(contents: &str) -> impl Iterator<Item = (usize, &str)> {
    contents
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(_, line)| !line.trim().is_empty())
}

/// A whitespace-delimited file with a named header line
#[derive(Debug, Clone)]
pub(crate) struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawLine>,
}

#[derive(Debug, Clone)]
pub(crate) struct RawLine {
    pub line_num: usize,
    pub values: Vec<Option<String>>,
}

impl RawTable {
    /// Read the header from the first line (lower-cased) and every data line.
    ///
    /// The header field `DESC` is named `descr`; the column following
    /// `intensity_90` is named `intensity_nn` whatever its spelling.
    pub fn read(ctx: &mut ParseContext<'_>, contents: &str) -> Result<Self> {
        let mut lines = numbered_lines(contents);
        let (_, header) = lines
            .next()
            .ok_or_else(|| LoadError::input_file(ctx.path, "file is empty"))?;

        let mut columns: Vec<String> = header
            .split_whitespace()
            .map(|name| match name.to_lowercase().as_str() {
                "desc" => "descr".to_string(),
                other => other.to_string(),
            })
            .collect();
        if columns.is_empty() {
            return Err(LoadError::input_file(ctx.path, "empty header"));
        }
        if let Some(i) = columns.iter().position(|c| c == "intensity_90") {
            if let Some(next) = columns.get_mut(i + 1) {
                *next = "intensity_nn".to_string();
            }
        }

        let mut rows = Vec::new();
        for (line_num, line) in lines {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.first().is_some_and(|f| f.eq_ignore_ascii_case("VERSION")) {
                continue;
            }
            if fields.len() < columns.len() {
                ctx.skip_row(
                    line_num,
                    format!("expected {} fields, found {}", columns.len(), fields.len()),
                );
                continue;
            }
            rows.push(RawLine {
                line_num,
                values: fields
                    .iter()
                    .take(columns.len())
                    .map(|f| Some(f.to_string()))
                    .collect(),
            });
        }

        Ok(Self { columns, rows })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Add a column filled with `default` unless it already exists
    pub fn ensure_column(&mut self, column: &str, default: Option<&str>) {
        if self.has_column(column) {
            return;
        }
        self.columns.push(column.to_string());
        for row in &mut self.rows {
            row.values.push(default.map(str::to_string));
        }
    }

    pub fn require_columns(&self, path: &Path, columns: &[&str]) -> Result<()> {
        for column in columns {
            if !self.has_column(column) {
                return Err(LoadError::parse(
                    path,
                    1,
                    format!("header has no {} column", column.to_uppercase()),
                ));
            }
        }
        Ok(())
    }

    /// Coerce an `NA` lead to zero so init times can be derived
    pub fn zero_na(&mut self, column: &str) {
        if let Some(i) = self.columns.iter().position(|c| c == column) {
            for row in &mut self.rows {
                if row.values[i].as_deref() == Some(NA) {
                    row.values[i] = Some("0".to_string());
                }
            }
        }
    }

    pub fn into_records(self) -> Vec<(usize, Record)> {
        let columns = Arc::new(self.columns);
        self.rows
            .into_iter()
            .map(|row| (row.line_num, Record::new(Arc::clone(&columns), row.values)))
            .collect()
    }
}

/// Rewrite `fcst_valid`/`obs_valid` for the store and derive `fcst_init`
pub(crate) fn resolve_times(
    ctx: &mut ParseContext<'_>,
    record: &mut Record,
) -> std::result::Result<(), RowIssue> {
    let lead = match record.get("fcst_lead") {
        Some(raw) => parse_lead(raw)?.unwrap_or(0),
        None => 0,
    };
    let fcst_valid = match record.get("fcst_valid") {
        Some(raw) => ctx.dates.parse(raw)?,
        None => None,
    };
    let obs_valid = match record.get("obs_valid") {
        Some(raw) => ctx.dates.parse(raw)?,
        None => None,
    };
    record.set("fcst_valid", fcst_valid.as_ref().map(format_sql));
    record.set("obs_valid", obs_valid.as_ref().map(format_sql));
    record.set(
        "fcst_init",
        init_from_valid(fcst_valid, lead)?.as_ref().map(format_sql),
    );
    Ok(())
}

/// Header identity of a named record; `\N` compares as NULL
pub(crate) fn header_key(record: &Record, columns: &[&str]) -> HeaderKey {
    HeaderKey(
        columns
            .iter()
            .map(|c| record.get(c).filter(|v| *v != SQL_NULL).map(str::to_string))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileKind;
    use chrono::NaiveDateTime;
    use std::path::PathBuf;

    fn record(name: &str) -> DataFileRecord {
        let path = PathBuf::from("/data").join(name);
        let kind = FileKind::classify(&path).unwrap();
        DataFileRecord::new(kind, &path, NaiveDateTime::default(), None)
    }

    #[test]
    fn test_empty_file_is_input_error() {
        let mut dates = DateCache::new();
        let err = parse_file(record("a.stat"), "  \n\n", &mut dates).unwrap_err();
        assert_eq!(err.category(), "input-file");
    }

    #[test]
    fn test_header_only_file_is_input_error() {
        let mut dates = DateCache::new();
        let header = "VERSION MODEL DESC FCST_LEAD FCST_VALID_BEG FCST_VALID_END OBS_LEAD \
                      OBS_VALID_BEG OBS_VALID_END FCST_VAR FCST_UNITS FCST_LEV OBS_VAR OBS_UNITS \
                      OBS_LEV OBTYPE VX_MASK INTERP_MTHD INTERP_PNTS FCST_THRESH OBS_THRESH \
                      COV_THRESH ALPHA LINE_TYPE\n";
        let err = parse_file(record("a.stat"), header, &mut dates).unwrap_err();
        assert!(err.to_string().contains("no data lines"));
    }

    #[test]
    fn test_raw_table_renames_columns() {
        let path = PathBuf::from("x_obj.txt");
        let mut dates = DateCache::new();
        let mut ctx = ParseContext::new(&path, &mut dates);
        let table = RawTable::read(
            &mut ctx,
            "VERSION DESC INTENSITY_90 INTENSITY_99 INTEREST\nV12.0 NA 1 2 0.5\nV12.0 NA 1\n",
        )
        .unwrap();
        assert_eq!(
            table.columns,
            vec!["version", "descr", "intensity_90", "intensity_nn", "interest"]
        );
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].line_num, 2);
        assert_eq!(ctx.row_issues, 1);
    }

    #[test]
    fn test_ensure_column_and_zero_na() {
        let path = PathBuf::from("x_obj.txt");
        let mut dates = DateCache::new();
        let mut ctx = ParseContext::new(&path, &mut dates);
        let mut table = RawTable::read(&mut ctx, "FCST_LEAD\nNA\n120000\n").unwrap();
        table.ensure_column("n_valid", Some("\\N"));
        table.zero_na("fcst_lead");
        assert_eq!(table.rows[0].values, vec![Some("0".into()), Some("\\N".into())]);
        assert_eq!(table.rows[1].values[0], Some("120000".into()));
    }
}
