//! Parser for MODE CTS and object files.

use super::{header_key, resolve_times, ParseContext, RawTable};
use crate::constants::{
    line_type_lu, MODE_HEADER_KEY_COLUMNS, MODE_NULLABLE_OPTIONAL, MODE_TEXT_OPTIONAL, NA,
    SQL_NULL,
};
use crate::error::Result;
use crate::models::{FileKind, ModeRow};

/// Header columns every MODE file must carry
const REQUIRED: &[&str] = &[
    "version",
    "model",
    "fcst_lead",
    "fcst_valid",
    "fcst_accum",
    "obs_lead",
    "obs_valid",
    "obs_accum",
    "fcst_rad",
    "fcst_thr",
    "obs_rad",
    "obs_thr",
    "fcst_var",
    "fcst_lev",
    "obs_var",
    "obs_lev",
];

pub fn parse_mode(
    ctx: &mut ParseContext<'_>,
    kind: FileKind,
    contents: &str,
) -> Result<Vec<ModeRow>> {
    let mut table = RawTable::read(ctx, contents)?;
    table.require_columns(ctx.path, REQUIRED)?;
    match kind {
        FileKind::ModeCts => table.require_columns(ctx.path, &["field"])?,
        _ => table.require_columns(ctx.path, &["object_id", "object_cat"])?,
    }

    for column in MODE_NULLABLE_OPTIONAL {
        table.ensure_column(column, Some(SQL_NULL));
    }
    for column in MODE_TEXT_OPTIONAL {
        table.ensure_column(column, Some(NA));
    }
    table.zero_na("fcst_lead");
    table.ensure_column("fcst_init", None);

    let mut rows = Vec::new();
    for (line_num, mut record) in table.into_records() {
        if let Err(issue) = resolve_times(ctx, &mut record) {
            ctx.skip_row(line_num, issue);
            continue;
        }

        let line_type_lu_id = match kind {
            FileKind::ModeCts => line_type_lu::MODE_CTS,
            _ if record.get("object_id").is_some_and(|id| id.contains('_')) => {
                line_type_lu::MODE_PAIR
            }
            _ => line_type_lu::MODE_SINGLE,
        };

        rows.push(ModeRow {
            file_row: 0,
            line_num,
            kind,
            line_type_lu_id,
            header: header_key(&record, MODE_HEADER_KEY_COLUMNS),
            record,
        });
    }
    Ok(rows)
}
