//! Wide-to-long reshaping of stat line data.
//!
//! A wide frame holds one line type: context columns, count columns and one
//! column per statistic (plus `_ncl`/`_ncu`/`_bcl`/`_bcu` companions for the
//! confidence family). The long frame keeps the context and count columns and
//! collapses every statistic into `stat_name, stat_value, stat_ncl, stat_ncu,
//! stat_bcl, stat_bcu`.

use crate::config::LoadSpec;
use crate::constants::{
    CONFIDENCE_REFORMAT_LINE_TYPES, CONFIDENCE_SUFFIXES, NA, SIMPLE_REFORMAT_LINE_TYPES,
    STAT_HEADER_KEY_COLUMNS,
};
use crate::error::Result;
use crate::models::{format_number, LoadStats, StatRow};
use crate::postprocess::PostProcessor;
use crate::processor::discovery::FileDiscovery;
use crate::processor::frames::{column_names, frame_rows, owned, string_frame};
use crate::processor::streaming::StreamingParser;
use crate::schema::stat_schema;
use crate::timestamp::format_sql;

use polars::prelude::*;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Statistic columns of the long form
pub const LONG_STAT_COLUMNS: [&str; 6] = [
    "stat_name",
    "stat_value",
    "stat_ncl",
    "stat_ncu",
    "stat_bcl",
    "stat_bcu",
];

/// Count columns carried through unchanged
const PRESERVED_COUNT_COLUMNS: &[&str] = &[
    "total", "ec_value", "n_cat", "n_thresh", "n_ens", "n_bin", "bin_i", "bin_n", "n_prob",
    "n_pnt",
];

/// Context columns of a wide frame after the header key
const CONTEXT_COLUMNS: &[&str] = &[
    "fcst_lead",
    "fcst_valid_beg",
    "fcst_valid_end",
    "fcst_init_beg",
    "obs_lead",
    "obs_valid_beg",
    "obs_valid_end",
    "fcst_perc",
    "obs_perc",
    "line_type",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReformatFamily {
    Simple,
    Confidence,
}

impl ReformatFamily {
    pub fn of(line_type: &str) -> Option<Self> {
        if SIMPLE_REFORMAT_LINE_TYPES.contains(&line_type) {
            Some(Self::Simple)
        } else if CONFIDENCE_REFORMAT_LINE_TYPES.contains(&line_type) {
            Some(Self::Confidence)
        } else {
            None
        }
    }
}

fn is_companion(column: &str) -> bool {
    CONFIDENCE_SUFFIXES.iter().any(|suffix| column.ends_with(suffix))
}

/// Wide frame of the rows of one line type; `None` for an unknown line type
pub fn wide_frame(line_type: &str, rows: &[StatRow]) -> Result<Option<DataFrame>> {
    let Some(schema) = stat_schema(line_type) else {
        return Ok(None);
    };

    let mut columns = owned(STAT_HEADER_KEY_COLUMNS);
    columns.extend(owned(CONTEXT_COLUMNS));
    if schema.has_alpha {
        columns.push("alpha".to_string());
    }
    if schema.has_cov_thresh {
        columns.push("cov_thresh".to_string());
    }
    columns.extend(owned(schema.fixed));

    let mut cells = Vec::new();
    for row in rows.iter().filter(|r| r.line_type == line_type) {
        let split = match schema.split(&row.data) {
            Ok(split) => split,
            Err(issue) => {
                warn!("Skipping stat line {}: {}", row.line_num, issue);
                continue;
            }
        };
        let mut out: Vec<Option<String>> =
            row.header.key().0.into_iter().map(|v| v.filter(|v| v != NA)).collect();
        out.extend([
            row.fcst_lead.map(|v| v.to_string()),
            row.fcst_valid_beg.as_ref().map(format_sql),
            row.fcst_valid_end.as_ref().map(format_sql),
            row.fcst_init_beg.as_ref().map(format_sql),
            row.obs_lead.map(|v| v.to_string()),
            row.obs_valid_beg.as_ref().map(format_sql),
            row.obs_valid_end.as_ref().map(format_sql),
            row.fcst_perc.map(format_number),
            row.obs_perc.map(format_number),
            Some(row.line_type.clone()),
        ]);
        if schema.has_alpha {
            out.push(row.alpha.clone());
        }
        if schema.has_cov_thresh {
            out.push(row.cov_thresh.clone());
        }
        out.extend(split.fixed);
        cells.push(out);
    }

    Ok(Some(string_frame(&columns, cells)?))
}

/// Collapse the statistic columns of a wide frame into long rows
///
/// # Arguments
///
/// * `line_type` - Line type every row of `df` belongs to
/// * `df` - Wide frame as built by [`wide_frame`]
///
/// # Returns
///
/// The long frame, or `None` when the line type has no reformat family
pub fn reformat_frame(line_type: &str, df: &DataFrame) -> Result<Option<DataFrame>> {
    let (Some(family), Some(schema)) = (ReformatFamily::of(line_type), stat_schema(line_type))
    else {
        return Ok(None);
    };

    let names = column_names(df);
    let is_stat = |column: &str| {
        schema.fixed.contains(&column)
            && !PRESERVED_COUNT_COLUMNS.contains(&column)
            && !(family == ReformatFamily::Confidence && is_companion(column))
    };
    let position = |column: &str| names.iter().position(|n| n == column);

    let kept: Vec<usize> = (0..names.len())
        .filter(|&i| {
            let name = names[i].as_str();
            !is_stat(name) && !(family == ReformatFamily::Confidence && is_companion(name))
        })
        .collect();
    let stats: Vec<(String, usize, [Option<usize>; 4])> = names
        .iter()
        .enumerate()
        .filter(|(_, name)| is_stat(name.as_str()))
        .map(|(i, name)| {
            let companions = match family {
                ReformatFamily::Simple => [None; 4],
                ReformatFamily::Confidence => {
                    CONFIDENCE_SUFFIXES.map(|suffix| position(&format!("{}{}", name, suffix)))
                }
            };
            (name.to_uppercase(), i, companions)
        })
        .collect();

    let mut columns: Vec<String> = kept.iter().map(|&i| names[i].clone()).collect();
    columns.extend(owned(&LONG_STAT_COLUMNS));

    let mut long_rows = Vec::new();
    for row in frame_rows(df)? {
        for (stat_name, index, companions) in &stats {
            let mut out: Vec<Option<String>> = kept.iter().map(|&i| row[i].clone()).collect();
            out.push(Some(stat_name.clone()));
            out.push(row[*index].clone());
            out.extend(companions.iter().map(|c| c.and_then(|i| row[i].clone())));
            long_rows.push(out);
        }
    }

    debug!(
        "Reformatted {} {} rows into {} long rows",
        df.height(),
        line_type,
        long_rows.len()
    );
    Ok(Some(string_frame(&columns, long_rows)?))
}

/// Write a long frame as `<LINE_TYPE>.txt`, tab separated, nulls as `NA`
pub fn write_long_form(dir: &Path, line_type: &str, df: &mut DataFrame) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.txt", line_type));
    let mut file = File::create(&path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b'\t')
        .with_null_value(NA.to_string())
        .finish(df)?;
    Ok(path)
}

/// One exported line type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub line_type: String,
    pub path: PathBuf,
    pub rows: usize,
}

/// Write one long-form file per reformattable line type present in `rows`
pub fn export_long_form(rows: &[StatRow], dir: &Path) -> Result<Vec<ExportedFile>> {
    let line_types: BTreeSet<&str> = rows.iter().map(|r| r.line_type.as_str()).collect();
    let mut exported = Vec::new();

    for line_type in line_types {
        let Some(wide) = wide_frame(line_type, rows)? else {
            continue;
        };
        let Some(mut long) = reformat_frame(line_type, &wide)? else {
            debug!("No long form for {}", line_type);
            continue;
        };
        let path = write_long_form(dir, line_type, &mut long)?;
        info!("Wrote {} long rows to {}", long.height(), path.display());
        exported.push(ExportedFile {
            line_type: line_type.to_string(),
            path,
            rows: long.height(),
        });
    }
    Ok(exported)
}

/// Parse the file set of a load and export it in long form, skipping the store
pub async fn reformat_files(
    spec: &LoadSpec,
    dir: &Path,
    cancel: CancellationToken,
    show_progress: bool,
) -> Result<Vec<ExportedFile>> {
    let discovery = FileDiscovery::from_spec(spec).discover();
    let mut stats = LoadStats::default();
    let parser = StreamingParser::new(cancel)
        .with_progress(show_progress)
        .with_verbose(spec.flags.verbose);
    let batch = parser
        .parse_all(discovery.files, chrono::Local::now().naive_local(), &mut stats)
        .await?;
    let processed = PostProcessor::from_spec(spec).run(batch.stat, &batch.files);
    export_long_form(&processed.rows, dir)
}
