//! Post-processing of concatenated stat rows before they are written.
//!
//! Normalizes thresholds, alpha and leads, applies the line-type specific
//! counter and derived-value fixes, prunes rows the load does not want and
//! derives `fcst_init_beg`.

use crate::config::LoadSpec;
use crate::constants::{ALPHA_LINE_TYPES, DECREMENTED_COUNTER_LINE_TYPES, MISSING_NUMERIC, NA};
use crate::models::{format_number, DataFileRecord, StatRow};
use crate::schema::stat_schema;
use crate::timestamp::init_from_valid;
use tracing::{debug, info, warn};

/// Row-selection options of one load
#[derive(Debug, Clone, Default)]
pub struct PostProcessor {
    pub load_mpr: bool,
    pub load_orank: bool,
    /// Upper-case allow-list; empty means every known line type
    pub line_types: Vec<String>,
}

/// Rows surviving post-processing plus what happened to the rest
#[derive(Debug, Default)]
pub struct PostProcessed {
    pub rows: Vec<StatRow>,
    pub pruned: usize,
    pub warnings: usize,
}

impl PostProcessor {
    pub fn from_spec(spec: &LoadSpec) -> Self {
        Self {
            load_mpr: spec.flags.load_mpr,
            load_orank: spec.flags.load_orank,
            line_types: spec.line_types.clone(),
        }
    }

    /// Run every post-processing step over the stat rows of a batch
    ///
    /// # Arguments
    ///
    /// * `rows` - Stat rows of all parsed files, in batch order
    /// * `files` - Data files of the batch, indexed by each row's `file_row`
    ///
    /// # Returns
    ///
    /// The rows to write, with counts of pruned rows and emitted warnings
    pub fn run(&self, rows: Vec<StatRow>, files: &[DataFileRecord]) -> PostProcessed {
        let mut result = PostProcessed::default();
        let total = rows.len();

        for mut row in rows {
            let origin = origin(files, &row);
            if !self.keep(&row, &origin) {
                result.pruned += 1;
                continue;
            }
            extract_thresholds(&mut row);
            result.warnings += check_alpha(&row, &origin);
            normalize_fields(&mut row);
            decrement_counter(&mut row);
            complete_rps(&mut row);
            match init_from_valid(row.fcst_valid_beg, row.fcst_lead.unwrap_or(0)) {
                Ok(init) => row.fcst_init_beg = init,
                Err(issue) => {
                    warn!("Dropping {}: {}", origin, issue);
                    result.pruned += 1;
                    continue;
                }
            }
            result.rows.push(row);
        }

        info!(
            "Post-processing complete: {} -> {} stat rows ({} pruned, {} warnings)",
            total,
            result.rows.len(),
            result.pruned,
            result.warnings
        );
        result
    }

    fn keep(&self, row: &StatRow, origin: &str) -> bool {
        if stat_schema(&row.line_type).is_none() {
            warn!("Dropping {} with unknown line type {}", origin, row.line_type);
            return false;
        }
        match row.line_type.as_str() {
            "MPR" if !self.load_mpr => return false,
            "ORANK" if !self.load_orank => return false,
            _ => {}
        }
        if !self.line_types.is_empty() && !self.line_types.contains(&row.line_type) {
            debug!("Line type {} is not in the allow-list", row.line_type);
            return false;
        }
        true
    }
}

/// `<file>:<line>` of a row for diagnostics
fn origin(files: &[DataFileRecord], row: &StatRow) -> String {
    match files.get(row.file_row) {
        Some(file) => format!("{}:{}", file.full_path().display(), row.line_num),
        None => format!("line {}", row.line_num),
    }
}

/// Move a parenthesized percentile out of each threshold
pub fn extract_thresholds(row: &mut StatRow) {
    if let Some((thresh, perc)) = split_percentile(&row.header.fcst_thresh) {
        row.header.fcst_thresh = thresh;
        row.fcst_perc = perc;
    }
    if let Some((thresh, perc)) = split_percentile(&row.header.obs_thresh) {
        row.header.obs_thresh = thresh;
        row.obs_perc = perc;
    }
}

fn split_percentile(thresh: &str) -> Option<(String, Option<f64>)> {
    let open = thresh.find('(')?;
    let close = open + thresh[open..].find(')')?;
    let perc = thresh[open + 1..close].trim().parse::<f64>().ok();
    let stripped = format!("{}{}", &thresh[..open], &thresh[close + 1..]);
    Some((stripped, perc))
}

/// Warn when alpha presence does not match the line type; returns the warning count
fn check_alpha(row: &StatRow, origin: &str) -> usize {
    let expects_alpha = ALPHA_LINE_TYPES.contains(&row.line_type.as_str());
    match (&row.alpha, expects_alpha) {
        (None, true) => {
            warn!("{} ({}) should carry an ALPHA value", origin, row.line_type);
            1
        }
        (Some(alpha), false) => {
            warn!(
                "{} ({}) carries ALPHA {} it does not use",
                origin, row.line_type, alpha
            );
            1
        }
        _ => 0,
    }
}

fn normalize_fields(row: &mut StatRow) {
    row.alpha = Some(match row.alpha.as_deref() {
        Some(raw) => raw
            .parse::<f64>()
            .map(format_number)
            .unwrap_or_else(|_| raw.to_string()),
        None => MISSING_NUMERIC.to_string(),
    });
    if row.cov_thresh.is_none() {
        row.cov_thresh = Some(MISSING_NUMERIC.to_string());
    }
    row.fcst_lead = Some(row.fcst_lead.unwrap_or(0));
    row.obs_lead = Some(row.obs_lead.unwrap_or(0));
    if row.header.interp_pnts == NA {
        row.header.interp_pnts = "0".to_string();
    }
}

/// Store the closing-threshold count for PCT, PJC and PRC
fn decrement_counter(row: &mut StatRow) {
    if !DECREMENTED_COUNTER_LINE_TYPES.contains(&row.line_type.as_str()) {
        return;
    }
    if let Some(Some(raw)) = row.data.get_mut(1) {
        if let Ok(n) = raw.parse::<i64>() {
            *raw = n.saturating_sub(1).max(0).to_string();
        }
    }
}

/// Fill a missing `rps_comp` as `1 - rps`
fn complete_rps(row: &mut StatRow) {
    if row.line_type != "RPS" {
        return;
    }
    let Some(schema) = stat_schema("RPS") else {
        return;
    };
    let (Some(rps_at), Some(comp_at)) = (schema.index_of("rps"), schema.index_of("rps_comp"))
    else {
        return;
    };
    let rps = row
        .data
        .get(rps_at)
        .cloned()
        .flatten()
        .and_then(|v| v.parse::<f64>().ok());
    let Some(rps) = rps else {
        return;
    };
    if row.data.len() <= comp_at {
        row.data.resize(comp_at + 1, None);
    }
    if row.data[comp_at].is_none() {
        row.data[comp_at] = Some(format_number(1.0 - rps));
    }
}
