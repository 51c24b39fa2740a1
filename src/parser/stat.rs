//! Parser for MET `.stat` files.
//!
//! Three header layouts exist: short (no DESC), mid (DESC) and long (DESC
//! plus FCST_UNITS/OBS_UNITS). Missing columns are filled with `NA` so that
//! every row lands in the same canonical shape.

use super::{numbered_lines, ParseContext};
use crate::constants::{MAX_COL, NA, STAT_LONG_HEADER};
use crate::error::{LoadError, Result};
use crate::models::{na_to_none, RowIssue, StatHeaderKey, StatRow};
use crate::timestamp::{init_from_valid, parse_lead};
use tracing::debug;

/// Header layout detected from the first line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatLayout {
    Short,
    Mid,
    Long,
}

impl StatLayout {
    pub fn detect(header: &str) -> Self {
        let upper = header.to_uppercase();
        if upper.contains("FCST_UNITS") {
            StatLayout::Long
        } else if upper.contains("DESC") {
            StatLayout::Mid
        } else {
            StatLayout::Short
        }
    }

    /// Named header fields present in this layout, in file order
    pub fn columns(&self) -> Vec<&'static str> {
        STAT_LONG_HEADER
            .iter()
            .copied()
            .filter(|c| match self {
                StatLayout::Long => true,
                StatLayout::Mid => *c != "fcst_units" && *c != "obs_units",
                StatLayout::Short => !matches!(*c, "descr" | "fcst_units" | "obs_units"),
            })
            .collect()
    }

    /// Header width counted through the first data column
    pub fn width(&self) -> usize {
        self.columns().len() + 1
    }
}

pub fn parse_stat(ctx: &mut ParseContext<'_>, contents: &str) -> Result<Vec<StatRow>> {
    let mut lines = numbered_lines(contents);
    let (_, header) = lines
        .next()
        .ok_or_else(|| LoadError::input_file(ctx.path, "file is empty"))?;
    if !header.trim_start().to_uppercase().starts_with("VERSION") {
        return Err(LoadError::input_file(ctx.path, "empty header"));
    }

    let layout = StatLayout::detect(header);
    let columns = layout.columns();
    debug!(
        "{} uses the {:?} stat layout ({} columns)",
        ctx.path.display(),
        layout,
        layout.width()
    );

    let mut rows = Vec::new();
    for (line_num, line) in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first().is_some_and(|f| f.eq_ignore_ascii_case("VERSION")) {
            continue;
        }
        match stat_row(ctx, &columns, &fields, line_num) {
            Ok(row) => rows.push(row),
            Err(issue) => ctx.skip_row(line_num, issue),
        }
    }
    Ok(rows)
}

fn stat_row(
    ctx: &mut ParseContext<'_>,
    columns: &[&str],
    fields: &[&str],
    line_num: usize,
) -> std::result::Result<StatRow, RowIssue> {
    if fields.len() < columns.len() {
        return Err(RowIssue::new(format!(
            "expected at least {} fields, found {}",
            columns.len(),
            fields.len()
        )));
    }
    let data_len = fields.len() - columns.len();
    if data_len > MAX_COL {
        return Err(RowIssue::new(format!(
            "{} data fields exceed the {} supported",
            data_len, MAX_COL
        )));
    }

    let mut header = StatHeaderKey::na();
    let mut row = StatRow {
        file_row: 0,
        line_num,
        header: StatHeaderKey::na(),
        fcst_lead: None,
        fcst_valid_beg: None,
        fcst_valid_end: None,
        fcst_init_beg: None,
        obs_lead: None,
        obs_valid_beg: None,
        obs_valid_end: None,
        fcst_perc: None,
        obs_perc: None,
        cov_thresh: None,
        alpha: None,
        line_type: String::new(),
        data: fields[columns.len()..].iter().map(|f| na_to_none(f)).collect(),
    };

    for (column, value) in columns.iter().zip(fields) {
        match *column {
            "fcst_lead" => row.fcst_lead = parse_lead(value)?,
            "obs_lead" => row.obs_lead = parse_lead(value)?,
            "fcst_valid_beg" => row.fcst_valid_beg = ctx.dates.parse(value)?,
            "fcst_valid_end" => row.fcst_valid_end = ctx.dates.parse(value)?,
            "obs_valid_beg" => row.obs_valid_beg = ctx.dates.parse(value)?,
            "obs_valid_end" => row.obs_valid_end = ctx.dates.parse(value)?,
            "cov_thresh" => row.cov_thresh = na_to_none(value),
            "alpha" => row.alpha = na_to_none(value),
            "line_type" => row.line_type = value.to_uppercase(),
            other => {
                if let Some(field) = header.field_mut(other) {
                    *field = value.to_string();
                }
            }
        }
    }

    if row.line_type.is_empty() || row.line_type == NA {
        return Err(RowIssue::new("missing LINE_TYPE"));
    }
    row.fcst_init_beg = init_from_valid(row.fcst_valid_beg, row.fcst_lead.unwrap_or(0))?;
    row.header = header;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::DateCache;
    use std::path::PathBuf;

    const LONG_HEADER: &str = "VERSION MODEL DESC FCST_LEAD FCST_VALID_BEG FCST_VALID_END \
        OBS_LEAD OBS_VALID_BEG OBS_VALID_END FCST_VAR FCST_UNITS FCST_LEV OBS_VAR OBS_UNITS \
        OBS_LEV OBTYPE VX_MASK INTERP_MTHD INTERP_PNTS FCST_THRESH OBS_THRESH COV_THRESH ALPHA \
        LINE_TYPE";
    const MID_HEADER: &str = "VERSION MODEL DESC FCST_LEAD FCST_VALID_BEG FCST_VALID_END \
        OBS_LEAD OBS_VALID_BEG OBS_VALID_END FCST_VAR FCST_LEV OBS_VAR OBS_LEV OBTYPE VX_MASK \
        INTERP_MTHD INTERP_PNTS FCST_THRESH OBS_THRESH COV_THRESH ALPHA LINE_TYPE";
    const SHORT_HEADER: &str = "VERSION MODEL FCST_LEAD FCST_VALID_BEG FCST_VALID_END \
        OBS_LEAD OBS_VALID_BEG OBS_VALID_END FCST_VAR FCST_LEV OBS_VAR OBS_LEV OBTYPE VX_MASK \
        INTERP_MTHD INTERP_PNTS FCST_THRESH OBS_THRESH COV_THRESH ALPHA LINE_TYPE";

    fn parse(contents: &str) -> (Vec<StatRow>, usize) {
        let path = PathBuf::from("point_stat.stat");
        let mut dates = DateCache::new();
        let mut ctx = ParseContext::new(&path, &mut dates);
        let rows = parse_stat(&mut ctx, contents).unwrap();
        (rows, ctx.row_issues)
    }

    #[test]
    fn test_layout_widths() {
        assert_eq!(StatLayout::detect(SHORT_HEADER).width(), 22);
        assert_eq!(StatLayout::detect(MID_HEADER).width(), 23);
        assert_eq!(StatLayout::detect(LONG_HEADER).width(), 25);
    }

    #[test]
    fn test_three_layouts_share_canonical_shape() {
        let long = format!(
            "{}\nV12.0 GFS NA 120000 20120409_120000 20120409_120000 000000 20120409_120000 \
             20120409_120000 TMP K P850 TMP K P850 ADPUPA FULL BILIN 4 >273.0 >273.0 NA NA FHO \
             10 0.5 0.4 0.6\n",
            LONG_HEADER
        );
        let mid = format!(
            "{}\nV12.0 GFS NA 120000 20120409_120000 20120409_120000 000000 20120409_120000 \
             20120409_120000 TMP P850 TMP P850 ADPUPA FULL BILIN 4 >273.0 >273.0 NA NA FHO \
             10 0.5 0.4 0.6\n",
            MID_HEADER
        );
        let short = format!(
            "{}\nV12.0 GFS 120000 20120409_120000 20120409_120000 000000 20120409_120000 \
             20120409_120000 TMP P850 TMP P850 ADPUPA FULL BILIN 4 >273.0 >273.0 NA NA FHO \
             10 0.5 0.4 0.6\n",
            SHORT_HEADER
        );

        let (long_rows, _) = parse(&long);
        let (mid_rows, _) = parse(&mid);
        let (short_rows, _) = parse(&short);
        assert_eq!(long_rows.len(), 1);
        assert_eq!(long_rows[0].header.fcst_units, "K");
        assert_eq!(mid_rows[0].header.fcst_units, NA);
        assert_eq!(short_rows[0].header.descr, NA);
        for rows in [&long_rows, &mid_rows, &short_rows] {
            assert_eq!(rows[0].line_type, "FHO");
            assert_eq!(rows[0].line_num, 2);
            assert_eq!(rows[0].fcst_lead, Some(120000));
            assert_eq!(rows[0].data.len(), 4);
            assert_eq!(rows[0].data[0].as_deref(), Some("10"));
            assert_eq!(rows[0].header.interp_pnts, "4");
            assert_eq!(rows[0].alpha, None);
        }
    }

    #[test]
    fn test_repeated_header_counts_toward_line_num() {
        let body = "V12.0 GFS 0 20120409_120000 20120409_120000 0 20120409_120000 \
                    20120409_120000 TMP P850 TMP P850 ADPUPA FULL BILIN 4 NA NA NA NA SL1L2 \
                    10 1 2 3 4 5 NA";
        let contents = format!("{h}\n{b}\n{h}\n{b}\n", h = SHORT_HEADER, b = body);
        let (rows, issues) = parse(&contents);
        assert_eq!(issues, 0);
        let lines: Vec<_> = rows.iter().map(|r| r.line_num).collect();
        assert_eq!(lines, vec![2, 4]);
        assert_eq!(rows[0].data[6], None);
    }

    #[test]
    fn test_bad_timestamp_skips_row() {
        let body = "V12.0 GFS 0 2012-04-09 20120409_120000 0 20120409_120000 20120409_120000 \
                    TMP P850 TMP P850 ADPUPA FULL BILIN 4 NA NA NA NA SL1L2 10";
        let (rows, issues) = parse(&format!("{}\n{}\n", SHORT_HEADER, body));
        assert!(rows.is_empty());
        assert_eq!(issues, 1);
    }

    #[test]
    fn test_out_of_range_lead_skips_only_that_row() {
        let body = |lead: &str| {
            format!(
                "V12.0 GFS {} 20120409_120000 20120409_120000 0 20120409_120000 \
                 20120409_120000 TMP P850 TMP P850 ADPUPA FULL BILIN 4 NA NA NA NA FHO \
                 10 0.5 0.4 0.6",
                lead
            )
        };
        let contents = format!(
            "{}\n{}\n{}\n",
            SHORT_HEADER,
            body("999999999999999999"),
            body("120000")
        );
        let (rows, issues) = parse(&contents);
        assert_eq!(issues, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line_num, 3);
    }

    #[test]
    fn test_missing_header_is_input_error() {
        let path = PathBuf::from("point_stat.stat");
        let mut dates = DateCache::new();
        let mut ctx = ParseContext::new(&path, &mut dates);
        let err = parse_stat(&mut ctx, "V12.0 GFS 0\n").unwrap_err();
        assert_eq!(err.category(), "input-file");
    }
}
