//! Parser for tropical-cyclone `.tcst` files.

use super::{numbered_lines, ParseContext};
use crate::constants::NA;
use crate::error::{LoadError, Result};
use crate::models::{na_to_none, RowIssue, TcstHeaderKey, TcstRow};
use crate::timestamp::parse_lead;

/// Leading columns of the long form; the short form has no `descr`
const TCST_HEADER: &[&str] = &[
    "version",
    "amodel",
    "bmodel",
    "descr",
    "storm_id",
    "basin",
    "cyclone",
    "storm_name",
    "init",
    "lead",
    "valid",
    "init_mask",
    "valid_mask",
    "line_type",
];

pub fn parse_tcst(ctx: &mut ParseContext<'_>, contents: &str) -> Result<Vec<TcstRow>> {
    let mut lines = numbered_lines(contents);
    let (_, header) = lines
        .next()
        .ok_or_else(|| LoadError::input_file(ctx.path, "file is empty"))?;
    if !header.trim_start().to_uppercase().starts_with("VERSION") {
        return Err(LoadError::input_file(ctx.path, "empty header"));
    }

    let has_descr = header
        .split_whitespace()
        .any(|c| matches!(c.to_uppercase().as_str(), "DESC" | "DESCR"));
    let columns: Vec<&str> = TCST_HEADER
        .iter()
        .copied()
        .filter(|c| has_descr || *c != "descr")
        .collect();

    let mut rows = Vec::new();
    for (line_num, line) in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first().is_some_and(|f| f.eq_ignore_ascii_case("VERSION")) {
            continue;
        }
        match tcst_row(ctx, &columns, &fields, line_num) {
            Ok(row) => rows.push(row),
            Err(issue) => ctx.skip_row(line_num, issue),
        }
    }
    Ok(rows)
}

fn tcst_row(
    ctx: &mut ParseContext<'_>,
    columns: &[&str],
    fields: &[&str],
    line_num: usize,
) -> std::result::Result<TcstRow, RowIssue> {
    if fields.len() < columns.len() {
        return Err(RowIssue::new(format!(
            "expected at least {} fields, found {}",
            columns.len(),
            fields.len()
        )));
    }

    let mut header = TcstHeaderKey {
        version: NA.to_string(),
        amodel: NA.to_string(),
        bmodel: NA.to_string(),
        descr: NA.to_string(),
        storm_id: NA.to_string(),
        basin: NA.to_string(),
        cyclone: NA.to_string(),
        storm_name: NA.to_string(),
        init_mask: NA.to_string(),
        valid_mask: NA.to_string(),
    };
    let mut row = TcstRow {
        file_row: 0,
        line_num,
        header: header.clone(),
        fcst_init: None,
        fcst_lead: None,
        fcst_valid: None,
        line_type: String::new(),
        data: fields[columns.len()..].iter().map(|f| na_to_none(f)).collect(),
    };

    for (column, value) in columns.iter().zip(fields) {
        let value = value.to_string();
        match *column {
            "version" => header.version = value,
            "amodel" => header.amodel = value,
            "bmodel" => header.bmodel = value,
            "descr" => header.descr = value,
            "storm_id" => header.storm_id = value,
            "basin" => header.basin = value,
            "cyclone" => header.cyclone = value,
            "storm_name" => header.storm_name = value,
            "init_mask" => header.init_mask = value,
            "valid_mask" => header.valid_mask = value,
            "init" => row.fcst_init = ctx.dates.parse(&value)?,
            "lead" => row.fcst_lead = parse_lead(&value)?,
            "valid" => row.fcst_valid = ctx.dates.parse(&value)?,
            "line_type" => row.line_type = value.to_uppercase(),
            _ => {}
        }
    }

    row.header = header;
    Ok(row)
}
