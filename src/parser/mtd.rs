//! Parser for MTD 2D and 3D object files.
//!
//! 2D files whose context fields are constant over every row form a revision
//! set; consecutive rows of the same object then yield synthesized difference
//! rows that are appended after the originals.

use super::{header_key, resolve_times, ParseContext, RawTable};
use crate::constants::{
    line_type_lu, MODE_TEXT_OPTIONAL, MTD_HEADER_KEY_COLUMNS, MTD_NULLABLE_OPTIONAL,
    MTD_REVISION_CONTEXT, MTD_REVISION_DIFF_FIELDS, NA, REVISION_AXIS_ANG, REVISION_PREFIX,
    SQL_NULL,
};
use crate::error::Result;
use crate::models::{format_number, FileKind, MtdRow};
use tracing::debug;

const REQUIRED: &[&str] = &[
    "version",
    "model",
    "fcst_lead",
    "fcst_valid",
    "obs_lead",
    "obs_valid",
    "t_delta",
    "fcst_rad",
    "fcst_thr",
    "obs_rad",
    "obs_thr",
    "fcst_var",
    "fcst_lev",
    "obs_var",
    "obs_lev",
    "object_id",
    "object_cat",
];

pub fn parse_mtd(ctx: &mut ParseContext<'_>, kind: FileKind, contents: &str) -> Result<Vec<MtdRow>> {
    let mut table = RawTable::read(ctx, contents)?;
    table.require_columns(ctx.path, REQUIRED)?;

    for column in MTD_NULLABLE_OPTIONAL {
        table.ensure_column(column, Some(SQL_NULL));
    }
    for column in MODE_TEXT_OPTIONAL {
        table.ensure_column(column, Some(NA));
    }
    table.zero_na("fcst_lead");
    table.ensure_column("fcst_init", None);

    let line_type_lu_id = match kind {
        FileKind::Mtd2d => line_type_lu::MTD_2D,
        k if k.is_mtd_pair() => line_type_lu::MTD_3D_PAIR,
        _ => line_type_lu::MTD_3D_SINGLE,
    };

    let mut rows = Vec::new();
    for (line_num, mut record) in table.into_records() {
        if let Err(issue) = resolve_times(ctx, &mut record) {
            ctx.skip_row(line_num, issue);
            continue;
        }
        rows.push(MtdRow {
            file_row: 0,
            line_num,
            kind,
            line_type_lu_id,
            revision_id: None,
            header: header_key(&record, MTD_HEADER_KEY_COLUMNS),
            record,
        });
    }

    if kind == FileKind::Mtd2d && is_revision_set(&rows) {
        let revisions = revision_rows(&rows);
        debug!(
            "{} is a revision set, synthesized {} revision rows",
            ctx.path.display(),
            revisions.len()
        );
        rows.extend(revisions);
    }
    Ok(rows)
}

/// Every context field holds a single value across the file
pub fn is_revision_set(rows: &[MtdRow]) -> bool {
    let Some(first) = rows.first() else {
        return false;
    };
    MTD_REVISION_CONTEXT.iter().all(|field| {
        let expected = first.record.get(field);
        rows.iter().all(|r| r.record.get(field) == expected)
    })
}

/// Difference rows for runs of consecutive rows sharing an object id.
///
/// Row `i >= 2` whose object id equals that of row `i - 1` yields
/// `row[i-1] - row[i-2]`. The revision counter starts at one and advances
/// whenever a new run of qualifying rows begins.
pub fn revision_rows(rows: &[MtdRow]) -> Vec<MtdRow> {
    let mut synthesized = Vec::new();
    let mut revision = 0;
    let mut in_run = false;

    for i in 2..rows.len() {
        let same_object = rows[i].record.get("object_id") == rows[i - 1].record.get("object_id");
        if !same_object {
            in_run = false;
            continue;
        }
        if !in_run {
            revision += 1;
            in_run = true;
        }
        synthesized.push(difference_row(&rows[i - 1], &rows[i - 2], revision));
    }
    synthesized
}

fn difference_row(current: &MtdRow, previous: &MtdRow, revision: i64) -> MtdRow {
    let mut row = current.clone();
    for var in ["fcst_var", "obs_var"] {
        let renamed = format!("{}{}", REVISION_PREFIX, current.record.get(var).unwrap_or(NA));
        row.record.set(var, Some(renamed));
    }
    for field in MTD_REVISION_DIFF_FIELDS {
        let a = current.record.get(field).and_then(|v| v.parse::<f64>().ok());
        let b = previous.record.get(field).and_then(|v| v.parse::<f64>().ok());
        let value = match (a, b) {
            (Some(a), Some(b)) => format_number(a - b),
            _ => NA.to_string(),
        };
        row.record.set(field, Some(value));
    }
    row.record.set("axis_ang", Some(REVISION_AXIS_ANG.to_string()));
    row.revision_id = Some(revision);
    row.line_num = 0;
    row.header = header_key(&row.record, MTD_HEADER_KEY_COLUMNS);
    row
}
