//! Table writer with bulk-local and parametric-insert strategies.
//!
//! The bulk path serializes a frame to a `$`-separated temporary file (null
//! cells rendered as the missing sentinel) and loads it with one statement.
//! The parametric path binds the same cells in batched inserts. Both paths
//! store `\N` cells as SQL NULL.

use super::frames::{column_names, frame_rows};
use crate::constants::{BULK_SEPARATOR, MAX_BIND_PARAMETERS, MISSING_NUMERIC, SQL_NULL};
use crate::error::{LoadError, Result};
use crate::store::{Store, StoreCapabilities};
use polars::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    BulkLocal,
    Parametric,
}

impl WriteStrategy {
    /// Bulk loading needs both the client and the server to allow LOCAL INFILE
    pub fn select(client_local_infile: bool, capabilities: StoreCapabilities) -> Self {
        if client_local_infile && capabilities.local_infile {
            WriteStrategy::BulkLocal
        } else {
            WriteStrategy::Parametric
        }
    }
}

/// Writes frames into store tables
#[derive(Debug, Clone)]
pub struct BulkWriter {
    strategy: WriteStrategy,
    insert_size: usize,
    tmpdir: PathBuf,
    cancel: CancellationToken,
}

impl BulkWriter {
    pub fn new(
        strategy: WriteStrategy,
        insert_size: usize,
        tmpdir: PathBuf,
        cancel: CancellationToken,
    ) -> Self {
        info!("Writing with the {:?} strategy", strategy);
        Self {
            strategy,
            insert_size: insert_size.max(1),
            tmpdir,
            cancel,
        }
    }

    pub fn strategy(&self) -> WriteStrategy {
        self.strategy
    }

    /// Write every row of `df` into `table`; returns the rows written
    pub async fn write<S: Store>(&self, store: &mut S, table: &str, df: &mut DataFrame) -> Result<u64> {
        if df.height() == 0 {
            return Ok(0);
        }
        let written = match self.strategy {
            WriteStrategy::BulkLocal => self.write_bulk(store, table, df).await?,
            WriteStrategy::Parametric => self.write_parametric(store, table, df).await?,
        };
        debug!("Wrote {} rows to {}", written, table);
        Ok(written)
    }

    async fn write_bulk<S: Store>(&self, store: &mut S, table: &str, df: &mut DataFrame) -> Result<u64> {
        let mut file = NamedTempFile::new_in(&self.tmpdir).map_err(|e| {
            LoadError::write(
                table,
                format!("cannot create bulk file in {}: {}", self.tmpdir.display(), e),
            )
        })?;
        CsvWriter::new(file.as_file_mut())
            .include_header(false)
            .with_separator(BULK_SEPARATOR)
            .with_quote_char(b'"')
            .with_null_value(MISSING_NUMERIC.to_string())
            .finish(df)?;
        file.as_file_mut().flush()?;

        let columns = column_names(df);
        let loaded = store.bulk_load(table, &columns, file.path()).await?;
        self.check_cancelled(table)?;
        Ok(loaded)
    }

    async fn write_parametric<S: Store>(
        &self,
        store: &mut S,
        table: &str,
        df: &DataFrame,
    ) -> Result<u64> {
        let columns = column_names(df);
        let rows: Vec<Vec<Option<String>>> = frame_rows(df)?
            .into_iter()
            .map(|row| row.into_iter().map(bind_cell).collect())
            .collect();

        let chunk_size = chunk_size(self.insert_size, columns.len());
        let mut written = 0;
        for chunk in rows.chunks(chunk_size) {
            written += store.insert_rows(table, &columns, chunk).await?;
            self.check_cancelled(table)?;
        }
        Ok(written)
    }

    fn check_cancelled(&self, table: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LoadError::cancelled(format!("stopped while writing {}", table)));
        }
        Ok(())
    }
}

/// Cell as bound by the parametric path
fn bind_cell(value: Option<String>) -> Option<String> {
    match value {
        None => Some(MISSING_NUMERIC.to_string()),
        Some(v) if v == SQL_NULL => None,
        other => other,
    }
}

/// Rows per insert statement for a table of `columns` columns
pub fn chunk_size(insert_size: usize, columns: usize) -> usize {
    let limit = MAX_BIND_PARAMETERS / columns.max(1);
    insert_size.min(limit).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::frames::string_frame;
    use crate::store::{Database, MemoryDatabase};

    fn frame() -> DataFrame {
        let columns = vec!["id".to_string(), "value".to_string(), "note".to_string()];
        string_frame(
            &columns,
            vec![
                vec![Some("1".into()), None, Some("\\N".into())],
                vec![Some("2".into()), Some("a$b".into()), Some("x".into())],
                vec![Some("3".into()), Some("0.5".into()), Some("y".into())],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_strategy_needs_both_sides() {
        let on = StoreCapabilities { local_infile: true };
        let off = StoreCapabilities::default();
        assert_eq!(WriteStrategy::select(true, on), WriteStrategy::BulkLocal);
        assert_eq!(WriteStrategy::select(false, on), WriteStrategy::Parametric);
        assert_eq!(WriteStrategy::select(true, off), WriteStrategy::Parametric);
    }

    #[test]
    fn test_chunk_size_caps_parameters() {
        assert_eq!(chunk_size(1, 10), 1);
        assert_eq!(chunk_size(100_000, 100), 600);
        assert_eq!(chunk_size(0, 5), 1);
    }

    #[tokio::test]
    async fn test_both_strategies_store_the_same_cells() {
        let tmp = tempfile::tempdir().unwrap();
        for strategy in [WriteStrategy::BulkLocal, WriteStrategy::Parametric] {
            let db = MemoryDatabase::new().with_local_infile(true);
            let writer =
                BulkWriter::new(strategy, 2, tmp.path().to_path_buf(), CancellationToken::new());
            let mut session = db.begin().await.unwrap();
            let written = writer.write(&mut session, "t", &mut frame()).await.unwrap();
            session.commit().await.unwrap();

            assert_eq!(written, 3, "{:?}", strategy);
            assert_eq!(
                db.column_values("t", "value"),
                vec![
                    Some(MISSING_NUMERIC.to_string()),
                    Some("a$b".to_string()),
                    Some("0.5".to_string())
                ],
                "{:?}",
                strategy
            );
            assert_eq!(db.column_values("t", "note")[0], None, "{:?}", strategy);
        }
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_write_fails() {
        let db = MemoryDatabase::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let writer = BulkWriter::new(WriteStrategy::Parametric, 1, std::env::temp_dir(), cancel);
        let mut session = db.begin().await.unwrap();
        let err = writer.write(&mut session, "t", &mut frame()).await.unwrap_err();
        assert_eq!(err.category(), "cancelled");
    }
}
