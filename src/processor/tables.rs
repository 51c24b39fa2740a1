//! Assembly of store-bound tables from parsed rows and assigned ids.
//!
//! Header ids and data file ids are resolved before this stage; here every
//! row is laid out in the column order of its target table. Parent line-data
//! tables sort before their companion tables so they are written first.

use super::dedup::{DataFileId, HeaderAssignment, HeaderTable, NewHeader};
use super::frames::{attribute_cell, date_cell, int_cell, key_cell, owned, TableRows};
use crate::constants::{
    MODE_CTS_COLUMNS, MODE_PAIR_COLUMNS, MODE_SINGLE_COLUMNS, MTD_2D_COLUMNS,
    MTD_3D_PAIR_COLUMNS, MTD_3D_SINGLE_COLUMNS, NA, OBJECT_TEXT_COLUMNS, SQL_NULL,
    STAT_COMMON_COLUMNS, TCST_COMMON_COLUMNS,
};
use crate::error::Result;
use crate::models::{format_number, DataFileRecord, FileKind, ModeRow, MtdRow, StatRow, TcstRow};
use crate::schema::{stat_schema, tcst_schema, BlockShape, LineTypeSchema, SplitRow};
use crate::store::Store;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Tables produced from one family of rows
#[derive(Debug, Default)]
pub struct Built {
    pub tables: Vec<TableRows>,
    /// Rows dropped with a warning while laying out
    pub skipped: usize,
}

/// Next free id per table, probed from the store
#[derive(Debug, Default)]
pub struct NextIds(HashMap<&'static str, i64>);

impl NextIds {
    pub async fn probe<S: Store>(
        store: &mut S,
        id_column: &str,
        tables: BTreeSet<&'static str>,
    ) -> Result<Self> {
        let mut next = HashMap::new();
        for table in tables {
            next.insert(table, store.max_id(table, id_column).await? + 1);
        }
        Ok(Self(next))
    }

    fn take(&mut self, table: &'static str) -> i64 {
        let id = self.0.entry(table).or_insert(1);
        *id += 1;
        *id - 1
    }
}

/// Parent tables of the variable-length stat line types present in `rows`
pub fn stat_block_tables(rows: &[StatRow]) -> BTreeSet<&'static str> {
    rows.iter()
        .filter_map(|r| stat_schema(&r.line_type))
        .filter(|s| s.block.is_some())
        .map(|s| s.table)
        .collect()
}

pub fn tcst_block_tables(rows: &[TcstRow]) -> BTreeSet<&'static str> {
    rows.iter()
        .filter_map(|r| tcst_schema(&r.line_type))
        .filter(|s| s.block.is_some())
        .map(|s| s.table)
        .collect()
}

/// `data_file` rows for files that were not loaded before
pub fn data_file_rows(files: &[DataFileRecord], ids: &[DataFileId]) -> TableRows {
    let mut table = TableRows::new(
        "data_file",
        owned(&[
            "data_file_id",
            "data_file_lu_id",
            "filename",
            "path",
            "load_date",
            "mod_date",
        ]),
    );
    for (file, id) in files.iter().zip(ids) {
        if let DataFileId::New(id) = id {
            table.push(vec![
                int_cell(id),
                int_cell(file.kind.data_file_lu_id()),
                Some(file.filename.clone()),
                Some(file.path.clone()),
                date_cell(Some(file.load_date)),
                date_cell(file.mod_date),
            ]);
        }
    }
    table
}

/// New header rows: id, the `extra` columns, then the identity tuple
fn header_rows(
    header: &HeaderTable,
    assignment: &HeaderAssignment,
    extra: &[&str],
    extra_cells: impl Fn(&NewHeader) -> Vec<Option<String>>,
) -> TableRows {
    let mut columns = vec![header.id_column.to_string()];
    columns.extend(owned(extra));
    columns.extend(owned(header.key_columns));

    let mut table = TableRows::new(header.table, columns);
    for new in &assignment.new_headers {
        let mut row = vec![int_cell(new.id)];
        row.extend(extra_cells(new));
        row.extend(new.key.0.iter().map(key_cell));
        table.push(row);
    }
    table
}

pub fn stat_header_rows(header: &HeaderTable, assignment: &HeaderAssignment) -> TableRows {
    header_rows(header, assignment, &[], |_| Vec::new())
}

pub fn tcst_header_rows(header: &HeaderTable, assignment: &HeaderAssignment) -> TableRows {
    header_rows(header, assignment, &[], |_| Vec::new())
}

/// `mode_header` rows; lookup code, file and line come from the first row of each tuple
pub fn mode_header_rows(
    header: &HeaderTable,
    assignment: &HeaderAssignment,
    rows: &[ModeRow],
    data_file_ids: &[i64],
) -> TableRows {
    header_rows(
        header,
        assignment,
        &["line_type_lu_id", "data_file_id", "linenumber"],
        |new| {
            let row = &rows[new.first_row];
            vec![
                int_cell(row.line_type_lu_id),
                file_cell(data_file_ids, row.file_row),
                int_cell(row.line_num),
            ]
        },
    )
}

pub fn mtd_header_rows(
    header: &HeaderTable,
    assignment: &HeaderAssignment,
    rows: &[MtdRow],
    data_file_ids: &[i64],
) -> TableRows {
    header_rows(
        header,
        assignment,
        &["line_type_lu_id", "data_file_id", "revision_id", "linenumber"],
        |new| {
            let row = &rows[new.first_row];
            vec![
                int_cell(row.line_type_lu_id),
                file_cell(data_file_ids, row.file_row),
                Some(
                    row.revision_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| SQL_NULL.to_string()),
                ),
                int_cell(row.line_num),
            ]
        },
    )
}

fn file_cell(data_file_ids: &[i64], file_row: usize) -> Option<String> {
    Some(
        data_file_ids
            .get(file_row)
            .map(|id| id.to_string())
            .unwrap_or_else(|| SQL_NULL.to_string()),
    )
}

/// Groups rows by target table, keeping tables in name order
#[derive(Default)]
struct TableSet(BTreeMap<&'static str, TableRows>);

impl TableSet {
    fn push(&mut self, table: &'static str, columns: impl FnOnce() -> Vec<String>, row: Vec<Option<String>>) {
        self.0
            .entry(table)
            .or_insert_with(|| TableRows::new(table, columns()))
            .push(row);
    }

    /// Companion rows of one parent line-data row
    fn push_block(&mut self, schema: &LineTypeSchema, line_data_id: i64, split: SplitRow) {
        let Some(block) = schema.block else {
            return;
        };
        let columns = || {
            let mut columns = owned(&["line_data_id", "i_value"]);
            if block.shape == BlockShape::Square {
                columns.push("j_value".to_string());
            }
            columns.extend(owned(block.columns));
            columns
        };
        let n = split.counter.max(1);
        for (k, values) in split.block.into_iter().enumerate() {
            let mut row = vec![int_cell(line_data_id)];
            match block.shape {
                BlockShape::Linear => row.push(int_cell(k + 1)),
                BlockShape::Square => {
                    row.push(int_cell(k / n + 1));
                    row.push(int_cell(k % n + 1));
                }
            }
            row.extend(values);
            self.push(block.table, columns, row);
        }
    }

    fn into_built(self, skipped: usize) -> Built {
        Built {
            tables: self.0.into_values().collect(),
            skipped,
        }
    }
}

/// Column layout of a stat line-data table
pub fn stat_columns(schema: &LineTypeSchema) -> Vec<String> {
    let mut columns = Vec::new();
    if schema.block.is_some() {
        columns.push("line_data_id".to_string());
    }
    columns.extend(owned(STAT_COMMON_COLUMNS));
    if schema.has_alpha {
        columns.push("alpha".to_string());
    }
    if schema.has_cov_thresh {
        columns.push("cov_thresh".to_string());
    }
    columns.extend(owned(schema.fixed));
    columns
}

pub fn tcst_columns(schema: &LineTypeSchema) -> Vec<String> {
    let mut columns = Vec::new();
    if schema.block.is_some() {
        columns.push("line_data_id".to_string());
    }
    columns.extend(owned(TCST_COMMON_COLUMNS));
    columns.extend(owned(schema.fixed));
    columns
}

fn perc_cell(value: Option<f64>) -> Option<String> {
    value.map(format_number)
}

/// Lay out stat rows into their line-data and companion tables
///
/// # Arguments
///
/// * `rows` - Post-processed stat rows
/// * `headers` - `stat_header` ids of the batch
/// * `data_file_ids` - `data_file_id` by batch file position
/// * `next_ids` - Next `line_data_id` of each variable-length table
pub fn stat_line_data(
    rows: &[StatRow],
    headers: &HeaderAssignment,
    data_file_ids: &[i64],
    next_ids: &mut NextIds,
) -> Built {
    let mut tables = TableSet::default();
    let mut skipped = 0;

    for row in rows {
        let Some(schema) = stat_schema(&row.line_type) else {
            continue;
        };
        let split = match schema.split(&row.data) {
            Ok(split) => split,
            Err(issue) => {
                warn!("Skipping stat line {}: {}", row.line_num, issue);
                skipped += 1;
                continue;
            }
        };
        let (Some(header_id), Some(data_file_id)) = (
            headers.id_of(&row.header.key()),
            data_file_ids.get(row.file_row),
        ) else {
            warn!("Skipping stat line {}: unresolved keys", row.line_num);
            skipped += 1;
            continue;
        };

        let line_data_id = schema.block.map(|_| next_ids.take(schema.table));
        let mut cells = Vec::with_capacity(schema.fixed.len() + STAT_COMMON_COLUMNS.len() + 3);
        if let Some(id) = line_data_id {
            cells.push(int_cell(id));
        }
        cells.extend([
            int_cell(header_id),
            int_cell(data_file_id),
            int_cell(row.line_num),
            row.fcst_lead.map(|v| v.to_string()),
            date_cell(row.fcst_valid_beg),
            date_cell(row.fcst_valid_end),
            date_cell(row.fcst_init_beg),
            row.obs_lead.map(|v| v.to_string()),
            date_cell(row.obs_valid_beg),
            date_cell(row.obs_valid_end),
            perc_cell(row.fcst_perc),
            perc_cell(row.obs_perc),
        ]);
        if schema.has_alpha {
            cells.push(row.alpha.clone());
        }
        if schema.has_cov_thresh {
            cells.push(row.cov_thresh.clone());
        }
        cells.extend(split.fixed.iter().cloned());

        tables.push(schema.table, || stat_columns(schema), cells);
        if let Some(id) = line_data_id {
            tables.push_block(schema, id, split);
        }
    }

    debug!("Laid out {} stat rows ({} skipped)", rows.len() - skipped, skipped);
    tables.into_built(skipped)
}

pub fn tcst_line_data(
    rows: &[TcstRow],
    headers: &HeaderAssignment,
    data_file_ids: &[i64],
    next_ids: &mut NextIds,
) -> Built {
    let mut tables = TableSet::default();
    let mut skipped = 0;

    for row in rows {
        let Some(schema) = tcst_schema(&row.line_type) else {
            warn!(
                "Dropping TCST line {} with unknown line type {}",
                row.line_num, row.line_type
            );
            skipped += 1;
            continue;
        };
        let split = match schema.split(&row.data) {
            Ok(split) => split,
            Err(issue) => {
                warn!("Skipping TCST line {}: {}", row.line_num, issue);
                skipped += 1;
                continue;
            }
        };
        let (Some(header_id), Some(data_file_id)) = (
            headers.id_of(&row.header.key()),
            data_file_ids.get(row.file_row),
        ) else {
            warn!("Skipping TCST line {}: unresolved keys", row.line_num);
            skipped += 1;
            continue;
        };

        let line_data_id = schema.block.map(|_| next_ids.take(schema.table));
        let mut cells = Vec::new();
        if let Some(id) = line_data_id {
            cells.push(int_cell(id));
        }
        cells.extend([
            int_cell(header_id),
            int_cell(data_file_id),
            int_cell(row.line_num),
            row.fcst_lead.map(|v| v.to_string()),
            date_cell(row.fcst_valid),
            date_cell(row.fcst_init),
        ]);
        cells.extend(split.fixed.iter().cloned());

        tables.push(schema.table, || tcst_columns(schema), cells);
        if let Some(id) = line_data_id {
            tables.push_block(schema, id, split);
        }
    }
    tables.into_built(skipped)
}

/// Stored column name to the MET header spelling
fn source_column(column: &str) -> &str {
    match column {
        "base_rate" => "baser",
        other => other,
    }
}

fn object_cells(record: &crate::models::Record, columns: &[&str]) -> Vec<Option<String>> {
    columns
        .iter()
        .map(|column| {
            let value = record.get(source_column(column));
            if OBJECT_TEXT_COLUMNS.contains(column) {
                Some(value.unwrap_or(NA).to_string())
            } else {
                attribute_cell(value)
            }
        })
        .collect()
}

fn flag(value: bool) -> Option<String> {
    Some(if value { "1" } else { "0" }.to_string())
}

/// `fcst_flag`, `simple_flag` and `matched_flag` of an object row
fn object_flags(object_id: &str, object_cat: &str, with_fcst: bool) -> Vec<Option<String>> {
    let mut flags = Vec::with_capacity(3);
    if with_fcst {
        flags.push(flag(object_id.starts_with('F') || object_id.starts_with("CF")));
    }
    flags.push(flag(!object_id.starts_with('C')));
    flags.push(flag(!object_cat.ends_with("000")));
    flags
}

fn object_columns(prefix: &[&str], attributes: &[&str], with_fcst: bool) -> Vec<String> {
    let mut columns = owned(prefix);
    columns.extend(owned(attributes));
    if with_fcst {
        columns.push("fcst_flag".to_string());
    }
    columns.extend(owned(&["simple_flag", "matched_flag"]));
    columns
}

/// Lay out MODE rows into `mode_cts`, `mode_obj_single` and `mode_obj_pair`
///
/// Pair rows reference the two single objects named by their id halves in
/// the same file and header.
pub fn mode_tables(rows: &[ModeRow], headers: &HeaderAssignment, next_ids: &mut NextIds) -> Built {
    let mut tables = TableSet::default();
    let mut skipped = 0;
    let mut singles: HashMap<(usize, i64, &str), i64> = HashMap::new();

    let resolved = rows.iter().filter_map(|row| match headers.id_of(&row.header) {
        Some(id) => Some((row, id)),
        None => {
            warn!("Skipping MODE line {}: unresolved header", row.line_num);
            None
        }
    });
    let resolved: Vec<_> = resolved.collect();
    skipped += rows.len() - resolved.len();

    for (row, header_id) in &resolved {
        if row.kind == FileKind::ModeCts {
            let mut cells = vec![int_cell(header_id)];
            cells.extend(object_cells(&row.record, MODE_CTS_COLUMNS));
            tables.push(
                "mode_cts",
                || {
                    let mut columns = owned(&["mode_header_id"]);
                    columns.extend(owned(MODE_CTS_COLUMNS));
                    columns
                },
                cells,
            );
            continue;
        }
        let object_id = row.record.get("object_id").unwrap_or(NA);
        if object_id.contains('_') {
            continue;
        }
        let id = next_ids.take("mode_obj_single");
        singles.insert((row.file_row, *header_id, object_id), id);

        let mut cells = vec![int_cell(id), int_cell(header_id)];
        cells.extend(object_cells(&row.record, MODE_SINGLE_COLUMNS));
        cells.extend(object_flags(
            object_id,
            row.record.get("object_cat").unwrap_or(NA),
            true,
        ));
        tables.push(
            "mode_obj_single",
            || object_columns(&["mode_obj_id", "mode_header_id"], MODE_SINGLE_COLUMNS, true),
            cells,
        );
    }

    for (row, header_id) in &resolved {
        let object_id = row.record.get("object_id").unwrap_or(NA);
        if row.kind != FileKind::ModeObj || !object_id.contains('_') {
            continue;
        }
        let Some((fcst, obs)) = object_id.split_once('_') else {
            continue;
        };
        let lookup = |half: &str| singles.get(&(row.file_row, *header_id, half)).copied();
        let (Some(fcst_id), Some(obs_id)) = (lookup(fcst), lookup(obs)) else {
            warn!(
                "Skipping MODE line {}: pair {} has no matching single objects",
                row.line_num, object_id
            );
            skipped += 1;
            continue;
        };

        let mut cells = vec![int_cell(obs_id), int_cell(fcst_id), int_cell(header_id)];
        cells.extend(object_cells(&row.record, MODE_PAIR_COLUMNS));
        cells.extend(object_flags(
            object_id,
            row.record.get("object_cat").unwrap_or(NA),
            false,
        ));
        tables.push(
            "mode_obj_pair",
            || {
                object_columns(
                    &["mode_obj_obs_id", "mode_obj_fcst_id", "mode_header_id"],
                    MODE_PAIR_COLUMNS,
                    false,
                )
            },
            cells,
        );
    }

    tables.into_built(skipped)
}

/// Lay out MTD rows, revision rows included, into the three object tables
pub fn mtd_tables(rows: &[MtdRow], headers: &HeaderAssignment) -> Built {
    let mut tables = TableSet::default();
    let mut skipped = 0;

    for row in rows {
        let Some(header_id) = headers.id_of(&row.header) else {
            warn!("Skipping MTD line {}: unresolved header", row.line_num);
            skipped += 1;
            continue;
        };
        let (table, attributes, with_fcst): (&'static str, &[&str], bool) = match row.kind {
            FileKind::Mtd2d => ("mtd_2d_obj", MTD_2D_COLUMNS, true),
            kind if kind.is_mtd_pair() => ("mtd_3d_obj_pair", MTD_3D_PAIR_COLUMNS, false),
            _ => ("mtd_3d_obj_single", MTD_3D_SINGLE_COLUMNS, true),
        };

        let mut cells = vec![int_cell(header_id)];
        cells.extend(object_cells(&row.record, attributes));
        cells.extend(object_flags(
            row.record.get("object_id").unwrap_or(NA),
            row.record.get("object_cat").unwrap_or(NA),
            with_fcst,
        ));
        tables.push(
            table,
            || object_columns(&["mtd_header_id"], attributes, with_fcst),
            cells,
        );
    }
    tables.into_built(skipped)
}
