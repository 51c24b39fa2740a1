//! Parser for legacy VSDB records.
//!
//! VSDB lines are rewritten into canonical stat rows: line types are renamed
//! to their MET equivalents, thresholds and ensemble sizes are lifted out of
//! the line type and model fields, and the numeric payload is reshaped into
//! the positional layout of the target line type.

use super::{numbered_lines, ParseContext};
use crate::constants::{
    ECON_POINTS, NA, VSDB_ENSEMBLE_LINE_TYPES, VSDB_HEADER, VSDB_RENAMES, X_POINTS_ECON,
};
use crate::error::Result;
use crate::models::{format_number, na_to_none, RowIssue, StatHeaderKey, StatRow};
use crate::schema::stat_schema;
use crate::timestamp::parse_vsdb_valid;
use regex::Regex;
use std::sync::LazyLock;

/// A negative number glued to the preceding value, e.g. `12.5-3.0`
static GLUED_NEGATIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)-(\d)").expect("static pattern"));

pub fn parse_vsdb(ctx: &mut ParseContext<'_>, contents: &str) -> Result<Vec<StatRow>> {
    let ensemble_tail = ctx
        .path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .and_then(|dir| dir.rfind('_').map(|i| dir[i..].to_string()));

    let mut rows = Vec::new();
    for (line_num, line) in numbered_lines(contents) {
        match vsdb_row(line, line_num, ensemble_tail.as_deref()) {
            Ok(row) => rows.push(row),
            Err(issue) => ctx.skip_row(line_num, issue),
        }
    }
    Ok(rows)
}

/// Drop the `=` separator and restore spaces before glued negative values
pub fn normalize_line(line: &str) -> String {
    match line.split_once('=') {
        Some((left, right)) => {
            let right = GLUED_NEGATIVE.replace_all(right, "$1 -$2");
            format!("{} {}", left, right)
        }
        None => line.to_string(),
    }
}

/// Canonical line type for a VSDB line type
pub fn canonical_line_type(vsdb_type: &str) -> &str {
    VSDB_RENAMES
        .iter()
        .find(|(from, _)| *from == vsdb_type)
        .map(|(_, to)| *to)
        .unwrap_or(vsdb_type)
}

fn vsdb_row(
    line: &str,
    line_num: usize,
    ensemble_tail: Option<&str>,
) -> std::result::Result<StatRow, RowIssue> {
    let normalized = normalize_line(line);
    let fields: Vec<&str> = normalized.split_whitespace().collect();
    if fields.len() < VSDB_HEADER.len() {
        return Err(RowIssue::new(format!(
            "expected at least {} VSDB fields, found {}",
            VSDB_HEADER.len(),
            fields.len()
        )));
    }

    let mut vsdb_type = fields[6].to_uppercase();
    let mut fcst_thresh = NA.to_string();
    if vsdb_type.starts_with('F') && vsdb_type.len() > 3 && vsdb_type.is_char_boundary(3) {
        fcst_thresh = vsdb_type[3..].to_string();
        vsdb_type.truncate(3);
    }

    let mut model = fields[1].to_string();
    if let Some(tail) = ensemble_tail {
        if VSDB_ENSEMBLE_LINE_TYPES.contains(&vsdb_type.as_str()) {
            model = match model.split_once('/') {
                Some((first, rest)) => format!("{}{}/{}", first, tail, rest),
                None => format!("{}{}", model, tail),
            };
        }
    }

    let mut n_var: Option<usize> = None;
    if let Some((base, suffix)) = model.split_once('/') {
        let members = suffix.trim().parse::<usize>().map_err(|_| {
            RowIssue::new(format!("model '{}' has a non-numeric member count", model))
        })?;
        n_var = Some(match vsdb_type.as_str() {
            "RELI" | "HIST" => members + 1,
            _ => members,
        });
        if vsdb_type == "RELI" {
            fcst_thresh = format!("==1/{}", members);
        }
        model = base.to_string();
    }
    if vsdb_type == "ECON" {
        n_var = Some(ECON_POINTS);
    }

    let line_type = canonical_line_type(&vsdb_type).to_string();

    let lead_hours = fields[2]
        .parse::<i64>()
        .map_err(|_| RowIssue::new(format!("VSDB lead '{}' is not an integer", fields[2])))?;
    let valid = parse_vsdb_valid(fields[3])?;

    let fcst_var = fields[7].to_string();
    let fcst_lev = fields[8].to_string();
    let header = StatHeaderKey {
        version: fields[0].to_string(),
        model,
        obs_var: fcst_var.clone(),
        obs_lev: fcst_lev.clone(),
        fcst_var,
        fcst_lev,
        obtype: fields[4].to_string(),
        vx_mask: fields[5].to_string(),
        fcst_thresh,
        ..StatHeaderKey::na()
    };

    let payload: Vec<Option<String>> = fields[VSDB_HEADER.len()..]
        .iter()
        .map(|f| na_to_none(f))
        .collect();
    let data = shape_payload(&line_type, &payload, n_var)?;

    Ok(StatRow {
        file_row: 0,
        line_num,
        header,
        fcst_lead: Some(lead_hours * 10000),
        fcst_valid_beg: Some(valid),
        fcst_valid_end: Some(valid),
        fcst_init_beg: None,
        obs_lead: None,
        obs_valid_beg: Some(valid),
        obs_valid_end: Some(valid),
        fcst_perc: None,
        obs_perc: None,
        cov_thresh: None,
        alpha: None,
        line_type,
        data,
    })
}

fn number(payload: &[Option<String>], index: usize, what: &str) -> std::result::Result<f64, RowIssue> {
    payload
        .get(index)
        .cloned()
        .flatten()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| RowIssue::new(format!("VSDB {} value {} is missing or not numeric", what, index)))
}

fn optional_number(payload: &[Option<String>], index: usize) -> Option<f64> {
    payload
        .get(index)
        .cloned()
        .flatten()
        .and_then(|v| v.parse::<f64>().ok())
}

fn require_n_var(line_type: &str, n_var: Option<usize>) -> std::result::Result<usize, RowIssue> {
    n_var.ok_or_else(|| {
        RowIssue::new(format!("VSDB {} record has no member count in its model", line_type))
    })
}

/// Place payload values into named columns of a line type without a block
fn place(line_type: &str, values: &[(&str, Option<String>)]) -> Vec<Option<String>> {
    let Some(schema) = stat_schema(line_type) else {
        return values.iter().map(|(_, v)| v.clone()).collect();
    };
    let mut data = vec![None; schema.fixed.len()];
    for (column, value) in values {
        if let Some(i) = schema.index_of(column) {
            data[i] = value.clone();
        }
    }
    data
}

fn named(payload: &[Option<String>], columns: &[&'static str]) -> Vec<(&'static str, Option<String>)> {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| (*c, payload.get(i).cloned().flatten()))
        .collect()
}

/// Reshape a VSDB payload into the positional data of a canonical line type
pub fn shape_payload(
    line_type: &str,
    payload: &[Option<String>],
    n_var: Option<usize>,
) -> std::result::Result<Vec<Option<String>>, RowIssue> {
    match line_type {
        "CTC" => {
            let total = number(payload, 0, "CTC")?;
            let f_rate = number(payload, 1, "CTC")?;
            let h_rate = number(payload, 2, "CTC")?;
            let o_rate = number(payload, 3, "CTC")?;
            let total = total.round();
            let fy = (total * f_rate).round();
            let oy = (total * o_rate).round();
            let fy_oy = (total * h_rate).round();
            Ok(place(
                "CTC",
                &[
                    ("total", Some(format_number(total))),
                    ("fy_oy", Some(format_number(fy_oy))),
                    ("fy_on", Some(format_number(fy - fy_oy))),
                    ("fn_oy", Some(format_number(oy - fy_oy))),
                    ("fn_on", Some(format_number(total - fy - oy + fy_oy))),
                ],
            ))
        }
        "NBRCNT" => {
            let first = number(payload, 1, "FSS")?;
            let second = number(payload, 2, "FSS")?;
            let third = number(payload, 3, "FSS")?;
            let denominator = second + third;
            let fss = (denominator != 0.0).then(|| format_number(1.0 - first / denominator));
            Ok(place(
                "NBRCNT",
                &[("total", payload.first().cloned().flatten()), ("fss", fss)],
            ))
        }
        "PCT" => {
            let n_var = require_n_var(line_type, n_var)?;
            if n_var < 2 {
                return Err(RowIssue::new("VSDB RELI record needs at least two bins"));
            }
            if payload.len() < 1 + 2 * n_var {
                return Err(RowIssue::new(format!(
                    "VSDB RELI record has {} values, {} bins need {}",
                    payload.len(),
                    n_var,
                    1 + 2 * n_var
                )));
            }
            let mut total = 0.0;
            let mut block = Vec::with_capacity(3 * n_var);
            for i in 0..n_var {
                let oy = number(payload, 1 + 2 * i, "RELI")?;
                let subtotal = number(payload, 2 + 2 * i, "RELI")?;
                total += subtotal;
                block.push(Some(format_number(i as f64 / (n_var - 1) as f64)));
                block.push(Some(format_number(oy)));
                block.push(Some(format_number(subtotal - oy)));
            }
            let mut data = vec![Some(format_number(total)), Some((n_var + 1).to_string())];
            data.extend(block);
            Ok(data)
        }
        "RHIST" => {
            let n_var = require_n_var(line_type, n_var)?;
            let mut data = vec![payload.first().cloned().flatten(), Some(n_var.to_string())];
            for i in 0..n_var {
                data.push(optional_number(payload, 1 + i).map(|v| format_number(v * 100.0)));
            }
            Ok(data)
        }
        "RELP" => {
            let n_var = require_n_var(line_type, n_var)?;
            let mut data = vec![payload.first().cloned().flatten(), Some(n_var.to_string())];
            data.extend((0..n_var).map(|i| payload.get(1 + i).cloned().flatten()));
            Ok(data)
        }
        "ECLV" => {
            let mut data = vec![
                payload.first().cloned().flatten(),
                None,
                None,
                Some(ECON_POINTS.to_string()),
            ];
            for (i, x) in X_POINTS_ECON.iter().enumerate() {
                data.push(Some(format_number(*x)));
                data.push(payload.get(1 + i).cloned().flatten());
            }
            Ok(data)
        }
        "PSTD" => {
            let mut values = named(
                payload,
                &["total", "brier", "bss", "reliability", "resolution", "uncertainty"],
            );
            values.push(("n_thresh", Some("0".to_string())));
            Ok(place("PSTD", &values))
        }
        "CNT" => Ok(place("CNT", &named(payload, &["total", "rmse"]))),
        "ENSCNT" => {
            let values = named(
                payload,
                &["total", "rpsf", "rpscl", "rpss", "crpsf", "crpscl", "crpss"],
            );
            Ok(place("ENSCNT", &values))
        }
        _ => Ok(payload.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::stat_schema;
    use crate::timestamp::DateCache;
    use std::path::PathBuf;

    fn parse_in(dir: &str, contents: &str) -> (Vec<StatRow>, usize) {
        let path = PathBuf::from(format!("/vsdb/{}/gfs_2012040100.vsdb", dir));
        let mut dates = DateCache::new();
        let mut ctx = ParseContext::new(&path, &mut dates);
        let rows = parse_vsdb(&mut ctx, contents).unwrap();
        (rows, ctx.row_issues)
    }

    fn values(data: &[Option<String>]) -> Vec<f64> {
        data.iter()
            .map(|v| v.as_deref().unwrap().parse::<f64>().unwrap())
            .collect()
    }

    #[test]
    fn test_normalize_line() {
        assert_eq!(
            normalize_line("V01 GFS 24 2012040100 ADPUPA G104 SL1L2 T P850 = 10 1.5-2.0 3"),
            "V01 GFS 24 2012040100 ADPUPA G104 SL1L2 T P850   10 1.5 -2.0 3"
        );
        assert_eq!(normalize_line("V01 GFS-1 24"), "V01 GFS-1 24");
    }

    #[test]
    fn test_sl1l2_is_positional() {
        let (rows, _) = parse_in(
            "gfs",
            "V01 GFS 24 2012040100 ADPUPA G104/NWC SL1L2 T P850 = 100 1.0 2.0 3.0 4.0 5.0\n",
        );
        let row = &rows[0];
        assert_eq!(row.line_type, "SL1L2");
        assert_eq!(row.fcst_lead, Some(240000));
        assert_eq!(row.header.obs_var, "T");
        assert_eq!(row.header.obs_lev, "P850");
        assert_eq!(row.obs_valid_beg, row.fcst_valid_beg);
        assert_eq!(row.data[0].as_deref(), Some("100"));
        assert_eq!(row.data[5].as_deref(), Some("5.0"));
    }

    #[test]
    fn test_fho_becomes_ctc_summing_to_total() {
        let (rows, _) = parse_in(
            "gfs",
            "V01 GFS 24 2012040100 ADPUPA G104 FHO>0.2 APCP/24 SFC = 100 0.3 0.2 0.25\n",
        );
        let row = &rows[0];
        assert_eq!(row.line_type, "CTC");
        assert_eq!(row.header.fcst_thresh, ">0.2");
        let schema = stat_schema("CTC").unwrap();
        let cells: Vec<f64> = ["fy_oy", "fy_on", "fn_oy", "fn_on"]
            .iter()
            .map(|c| {
                row.data[schema.index_of(c).unwrap()]
                    .as_deref()
                    .unwrap()
                    .parse::<f64>()
                    .unwrap()
            })
            .collect();
        assert_eq!(cells, vec![20.0, 10.0, 5.0, 65.0]);
        assert_eq!(cells.iter().sum::<f64>(), 100.0);
    }

    #[test]
    fn test_fss_becomes_nbrcnt() {
        let (rows, _) = parse_in(
            "gfs",
            "V01 GFS 24 2012040100 ANLYS G104 FSS<5 APCP/03 SFC = 50 0.1 0.2 0.3\n",
        );
        let row = &rows[0];
        assert_eq!(row.line_type, "NBRCNT");
        assert_eq!(row.header.fcst_thresh, "<5");
        assert_eq!(row.data[4].as_deref(), Some("0.8"));
    }

    #[test]
    fn test_reli_becomes_pct_triples() {
        let (rows, _) = parse_in(
            "gefs_20m",
            "V01 GEFS/2 24 2012040100 ADPUPA G104 RELI T P850 = 99 1 10 2 20 3 30\n",
        );
        let row = &rows[0];
        assert_eq!(row.line_type, "PCT");
        assert_eq!(row.header.model, "GEFS_20m");
        assert_eq!(row.header.fcst_thresh, "==1/2");
        assert_eq!(row.data[0].as_deref(), Some("60"));
        assert_eq!(row.data[1].as_deref(), Some("4"));
        assert_eq!(values(&row.data[2..]), vec![0.0, 1.0, 9.0, 0.5, 2.0, 18.0, 1.0, 3.0, 27.0]);
    }

    #[test]
    fn test_hist_becomes_scaled_rhist() {
        let (rows, _) = parse_in(
            "gefs",
            "V01 GEFS/2 24 2012040100 ADPUPA G104 HIST T P850 = 10 0.2 0.5 0.3\n",
        );
        let row = &rows[0];
        assert_eq!(row.line_type, "RHIST");
        assert_eq!(row.data[1].as_deref(), Some("3"));
        assert_eq!(values(&row.data[2..]), vec![20.0, 50.0, 30.0]);
    }

    #[test]
    fn test_econ_doubles_into_points() {
        let mut line = String::from("V01 GEFS/20 24 2012040100 ADPUPA G104 ECON T P850 = 10");
        for i in 0..ECON_POINTS {
            line.push_str(&format!(" 0.{}", i));
        }
        let (rows, _) = parse_in("gefs", &line);
        let row = &rows[0];
        assert_eq!(row.line_type, "ECLV");
        assert_eq!(row.data[3].as_deref(), Some("18"));
        assert_eq!(row.data.len(), 4 + 2 * ECON_POINTS);
        assert_eq!(row.data[4].as_deref(), Some("0.952381"));
        assert_eq!(row.data[5].as_deref(), Some("0.0"));
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let (rows, issues) = parse_in(
            "gfs",
            "V01 GFS 24\nV01 GFS xx 2012040100 ADPUPA G104 SL1L2 T P850 = 1\n\
             V01 GFS 24 2012040100 ADPUPA G104 FHO>1 T P850 = 10 NA 0.1 0.1\n",
        );
        assert!(rows.is_empty());
        assert_eq!(issues, 3);
    }
}
