//! Persistence seam for the loader.
//!
//! A `Database` hands out `Store` sessions; one session is one transaction
//! and nothing it writes is visible until `commit`. Dropping a session
//! without committing rolls it back.
//!
//! Cells are `Option<String>`: `None` is SQL NULL, everything else is bound
//! as text and converted by the server.

pub mod memory;
pub mod mysql;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub use memory::MemoryDatabase;
pub use mysql::MySqlDatabase;

/// Server-side features probed at the start of a load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// The session can run `LOAD DATA LOCAL INFILE`
    pub local_infile: bool,
}

/// A named index over one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
}

impl IndexDef {
    pub fn new(table: &str, columns: &[&str]) -> Self {
        Self {
            table: table.to_string(),
            name: format!("{}_{}_idx", table, columns.join("_")),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Result of an index statement that did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Applied,
    AlreadyExists,
    Missing,
}

#[async_trait]
pub trait Database: Send + Sync {
    type Session: Store;

    /// Open a session wrapping a fresh transaction
    async fn begin(&self) -> Result<Self::Session>;
}

#[async_trait]
pub trait Store: Send {
    async fn capabilities(&mut self) -> Result<StoreCapabilities>;

    /// Largest id in `table`, or 0 when it is empty
    async fn max_id(&mut self, table: &str, id_column: &str) -> Result<i64>;

    /// Id of the row matching every `(column, value)` pair; `None` values match NULL
    async fn find_id(
        &mut self,
        table: &str,
        id_column: &str,
        key: &[(&str, Option<&str>)],
    ) -> Result<Option<i64>>;

    /// Insert rows in a single statement; returns the affected row count
    async fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Option<String>>],
    ) -> Result<u64>;

    /// Load a `$`-separated file written by the bulk writer
    async fn bulk_load(&mut self, table: &str, columns: &[String], path: &Path) -> Result<u64>;

    async fn delete_all(&mut self, table: &str) -> Result<()>;

    async fn create_index(&mut self, index: &IndexDef) -> Result<IndexOutcome>;

    async fn drop_index(&mut self, index: &IndexDef) -> Result<IndexOutcome>;

    async fn commit(self) -> Result<()>;
}

/// Backtick-quote an identifier, refusing anything outside `[A-Za-z0-9_]`
pub(crate) fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(crate::error::LoadError::write(
            name,
            "identifier contains unsupported characters",
        ));
    }
    Ok(format!("`{}`", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_names() {
        let index = IndexDef::new("line_data_fho", &["fcst_lead"]);
        assert_eq!(index.name, "line_data_fho_fcst_lead_idx");
        assert_eq!(index.columns, vec!["fcst_lead"]);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("stat_header").unwrap(), "`stat_header`");
        assert!(quote_ident("x; DROP TABLE y").is_err());
        assert!(quote_ident("").is_err());
    }
}
