//! DataFrame boundary for store-bound tables.
//!
//! Every table written by a load is assembled as rows of optional strings,
//! then turned into a polars `DataFrame` of string columns. The frame is the
//! unit the bulk writer serializes or binds.

use crate::constants::{NA, SQL_NULL};
use crate::error::Result;
use crate::timestamp::format_sql;
use chrono::NaiveDateTime;
use polars::prelude::*;

/// Rows destined for one table
#[derive(Debug, Clone)]
pub struct TableRows {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl TableRows {
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<Option<String>>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_frame(self) -> Result<DataFrame> {
        string_frame(&self.columns, self.rows)
    }
}

/// Build a frame of nullable string columns from row-major cells
pub fn string_frame(columns: &[String], rows: Vec<Vec<Option<String>>>) -> Result<DataFrame> {
    let mut data: Vec<Vec<Option<String>>> = columns
        .iter()
        .map(|_| Vec::with_capacity(rows.len()))
        .collect();
    for row in rows {
        for (column, value) in data.iter_mut().zip(row) {
            column.push(value);
        }
    }
    let columns = columns
        .iter()
        .zip(data)
        .map(|(name, values)| Column::new(name.as_str().into(), values))
        .collect::<Vec<_>>();
    Ok(DataFrame::new(columns)?)
}

/// Row-major cells of a string frame
pub fn frame_rows(df: &DataFrame) -> Result<Vec<Vec<Option<String>>>> {
    let columns = df
        .get_columns()
        .iter()
        .map(|c| c.str().cloned())
        .collect::<PolarsResult<Vec<_>>>()?;
    Ok((0..df.height())
        .map(|i| {
            columns
                .iter()
                .map(|c| c.get(i).map(str::to_string))
                .collect()
        })
        .collect())
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// A timestamp cell; a missing time is stored as NULL
pub fn date_cell(value: Option<NaiveDateTime>) -> Option<String> {
    Some(match value {
        Some(v) => format_sql(&v),
        None => SQL_NULL.to_string(),
    })
}

/// A header tuple cell; `None` (NULL in the identity) is stored as NULL
pub fn key_cell(value: &Option<String>) -> Option<String> {
    Some(value.clone().unwrap_or_else(|| SQL_NULL.to_string()))
}

/// A numeric MODE/MTD attribute: `NA` becomes the missing sentinel, an absent
/// column becomes NULL
pub fn attribute_cell(value: Option<&str>) -> Option<String> {
    match value {
        None | Some(SQL_NULL) => Some(SQL_NULL.to_string()),
        Some(NA) => None,
        Some(v) => Some(v.to_string()),
    }
}

pub fn int_cell(value: impl ToString) -> Option<String> {
    Some(value.to_string())
}

pub fn owned(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}
