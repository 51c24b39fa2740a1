//! In-process store used by the pipeline tests.
//!
//! Tables are created on first insert and grow columns as inserts name new
//! ones. A session works on its own copy of the tables and publishes it on
//! commit, so an uncommitted session leaves no trace.

use super::{Database, IndexDef, IndexOutcome, Store, StoreCapabilities};
use crate::constants::{BULK_SEPARATOR, SQL_NULL};
use crate::error::{LoadError, Result};
use async_trait::async_trait;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
    indexes: BTreeSet<String>,
}

impl Table {
    fn column_index(&mut self, column: &str) -> usize {
        match self.columns.iter().position(|c| c == column) {
            Some(i) => i,
            None => {
                self.columns.push(column.to_string());
                for row in &mut self.rows {
                    row.push(None);
                }
                self.columns.len() - 1
            }
        }
    }

    fn insert(&mut self, columns: &[String], rows: &[Vec<Option<String>>]) -> u64 {
        let positions: Vec<usize> = columns.iter().map(|c| self.column_index(c)).collect();
        for row in rows {
            let mut stored = vec![None; self.columns.len()];
            for (position, value) in positions.iter().zip(row) {
                stored[*position] = value.clone();
            }
            self.rows.push(stored);
        }
        rows.len() as u64
    }

    fn get(&self, row: &[Option<String>], column: &str) -> Option<String> {
        let i = self.columns.iter().position(|c| c == column)?;
        row.get(i).cloned().flatten()
    }
}

type Tables = BTreeMap<String, Table>;

/// Shared in-memory database
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    local_infile: bool,
}

fn poisoned() -> LoadError {
    LoadError::write("memory", "store lock poisoned")
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise LOCAL INFILE support from the server side
    pub fn with_local_infile(mut self, enabled: bool) -> Self {
        self.local_infile = enabled;
        self
    }

    fn snapshot(&self) -> Result<Tables> {
        Ok(self.tables.lock().map_err(|_| poisoned())?.clone())
    }

    /// Rows currently committed to `table`
    pub fn row_count(&self, table: &str) -> usize {
        self.snapshot()
            .ok()
            .and_then(|t| t.get(table).map(|t| t.rows.len()))
            .unwrap_or(0)
    }

    /// Committed values of one column in insertion order
    pub fn column_values(&self, table: &str, column: &str) -> Vec<Option<String>> {
        let Ok(tables) = self.snapshot() else {
            return Vec::new();
        };
        let Some(t) = tables.get(table) else {
            return Vec::new();
        };
        t.rows.iter().map(|row| t.get(row, column)).collect()
    }

    /// Committed rows of `table` as column-name maps
    pub fn rows(&self, table: &str) -> Vec<BTreeMap<String, Option<String>>> {
        let Ok(tables) = self.snapshot() else {
            return Vec::new();
        };
        let Some(t) = tables.get(table) else {
            return Vec::new();
        };
        t.rows
            .iter()
            .map(|row| t.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }

    pub fn index_count(&self, table: &str) -> usize {
        self.snapshot()
            .ok()
            .and_then(|t| t.get(table).map(|t| t.indexes.len()))
            .unwrap_or(0)
    }

    /// Register an index that exists before a load starts
    pub fn seed_index(&self, table: &str, name: &str) {
        if let Ok(mut tables) = self.tables.lock() {
            tables
                .entry(table.to_string())
                .or_default()
                .indexes
                .insert(name.to_string());
        }
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    type Session = MemorySession;

    async fn begin(&self) -> Result<MemorySession> {
        Ok(MemorySession {
            shared: Arc::clone(&self.tables),
            working: self.snapshot()?,
            local_infile: self.local_infile,
        })
    }
}

pub struct MemorySession {
    shared: Arc<Mutex<Tables>>,
    working: Tables,
    local_infile: bool,
}

/// Read a bulk file back into rows; `\N` cells become NULL
fn read_bulk_file(path: &Path) -> Result<Vec<Vec<Option<String>>>> {
    let df = CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|options| options.with_separator(BULK_SEPARATOR))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let columns = df
        .get_columns()
        .iter()
        .map(|c| c.str().cloned())
        .collect::<PolarsResult<Vec<_>>>()?;
    let rows = (0..df.height())
        .map(|i| {
            columns
                .iter()
                .map(|c| c.get(i).filter(|v| *v != SQL_NULL).map(str::to_string))
                .collect()
        })
        .collect();
    Ok(rows)
}

#[async_trait]
impl Store for MemorySession {
    async fn capabilities(&mut self) -> Result<StoreCapabilities> {
        Ok(StoreCapabilities {
            local_infile: self.local_infile,
        })
    }

    async fn max_id(&mut self, table: &str, id_column: &str) -> Result<i64> {
        let Some(t) = self.working.get(table) else {
            return Ok(0);
        };
        Ok(t.rows
            .iter()
            .filter_map(|row| t.get(row, id_column))
            .filter_map(|v| v.parse::<i64>().ok())
            .max()
            .unwrap_or(0))
    }

    async fn find_id(
        &mut self,
        table: &str,
        id_column: &str,
        key: &[(&str, Option<&str>)],
    ) -> Result<Option<i64>> {
        let Some(t) = self.working.get(table) else {
            return Ok(None);
        };
        let found = t.rows.iter().find(|row| {
            key.iter()
                .all(|(column, value)| t.get(row, column).as_deref() == *value)
        });
        Ok(found
            .and_then(|row| t.get(row, id_column))
            .and_then(|id| id.parse::<i64>().ok()))
    }

    async fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Option<String>>],
    ) -> Result<u64> {
        Ok(self
            .working
            .entry(table.to_string())
            .or_default()
            .insert(columns, rows))
    }

    async fn bulk_load(&mut self, table: &str, columns: &[String], path: &Path) -> Result<u64> {
        if !self.local_infile {
            return Err(LoadError::write(table, "LOCAL INFILE is disabled on this server"));
        }
        let rows = read_bulk_file(path)?;
        if let Some(row) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(LoadError::write(
                table,
                format!("bulk row has {} fields, expected {}", row.len(), columns.len()),
            ));
        }
        self.insert_rows(table, columns, &rows).await
    }

    async fn delete_all(&mut self, table: &str) -> Result<()> {
        if let Some(t) = self.working.get_mut(table) {
            t.rows.clear();
        }
        Ok(())
    }

    async fn create_index(&mut self, index: &IndexDef) -> Result<IndexOutcome> {
        let t = self.working.entry(index.table.clone()).or_default();
        if t.indexes.insert(index.name.clone()) {
            Ok(IndexOutcome::Applied)
        } else {
            Ok(IndexOutcome::AlreadyExists)
        }
    }

    async fn drop_index(&mut self, index: &IndexDef) -> Result<IndexOutcome> {
        let removed = self
            .working
            .get_mut(&index.table)
            .is_some_and(|t| t.indexes.remove(&index.name));
        if removed {
            Ok(IndexOutcome::Applied)
        } else {
            Ok(IndexOutcome::Missing)
        }
    }

    async fn commit(self) -> Result<()> {
        let mut shared = self.shared.lock().map_err(|_| poisoned())?;
        *shared = self.working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_uncommitted_session_is_discarded() {
        let db = MemoryDatabase::new();
        {
            let mut session = db.begin().await.unwrap();
            session
                .insert_rows("data_file", &cols(&["data_file_id"]), &[vec![Some("1".into())]])
                .await
                .unwrap();
        }
        assert_eq!(db.row_count("data_file"), 0);

        let mut session = db.begin().await.unwrap();
        session
            .insert_rows("data_file", &cols(&["data_file_id"]), &[vec![Some("1".into())]])
            .await
            .unwrap();
        session.commit().await.unwrap();
        assert_eq!(db.row_count("data_file"), 1);
    }

    #[tokio::test]
    async fn test_find_id_matches_null() {
        let db = MemoryDatabase::new();
        let mut session = db.begin().await.unwrap();
        session
            .insert_rows(
                "mode_header",
                &cols(&["mode_header_id", "model", "n_valid"]),
                &[
                    vec![Some("1".into()), Some("WRF".into()), Some("10".into())],
                    vec![Some("2".into()), Some("WRF".into()), None],
                ],
            )
            .await
            .unwrap();
        let id = session
            .find_id("mode_header", "mode_header_id", &[("model", Some("WRF")), ("n_valid", None)])
            .await
            .unwrap();
        assert_eq!(id, Some(2));
        assert_eq!(session.max_id("mode_header", "mode_header_id").await.unwrap(), 2);
        assert_eq!(session.max_id("stat_header", "stat_header_id").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bulk_load_reads_separator_and_nulls() {
        let db = MemoryDatabase::new().with_local_infile(true);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1$-9999$\\N").unwrap();
        writeln!(file, "2$\"a$b\"$x").unwrap();

        let mut session = db.begin().await.unwrap();
        let loaded = session
            .bulk_load("t", &cols(&["id", "value", "note"]), file.path())
            .await
            .unwrap();
        session.commit().await.unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(
            db.column_values("t", "value"),
            vec![Some("-9999".to_string()), Some("a$b".to_string())]
        );
        assert_eq!(db.column_values("t", "note"), vec![None, Some("x".to_string())]);
    }

    #[tokio::test]
    async fn test_indexes() {
        let db = MemoryDatabase::new();
        db.seed_index("line_data_fho", "existing");
        let mut session = db.begin().await.unwrap();
        let index = IndexDef::new("line_data_fho", &["fcst_lead"]);
        assert_eq!(session.create_index(&index).await.unwrap(), IndexOutcome::Applied);
        assert_eq!(session.create_index(&index).await.unwrap(), IndexOutcome::AlreadyExists);
        let other = IndexDef::new("line_data_fho", &["fcst_init_beg"]);
        assert_eq!(session.drop_index(&other).await.unwrap(), IndexOutcome::Missing);
        session.commit().await.unwrap();
        assert_eq!(db.index_count("line_data_fho"), 2);
    }
}
