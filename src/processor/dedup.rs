//! Key assignment for `data_file` and the header tables.
//!
//! Ids are dense: each table continues from its current maximum. With the
//! header check enabled a tuple already in the store keeps its stored id;
//! otherwise every distinct tuple of the batch gets a fresh id.

use crate::constants::{
    MODE_HEADER_KEY_COLUMNS, MTD_HEADER_KEY_COLUMNS, STAT_HEADER_KEY_COLUMNS,
    TCST_HEADER_KEY_COLUMNS,
};
use crate::error::Result;
use crate::models::{DataFileRecord, HeaderKey};
use crate::store::Store;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A header table and the tuple that identifies its rows
#[derive(Debug, Clone, Copy)]
pub struct HeaderTable {
    pub table: &'static str,
    pub id_column: &'static str,
    pub key_columns: &'static [&'static str],
}

pub const STAT_HEADER: HeaderTable = HeaderTable {
    table: "stat_header",
    id_column: "stat_header_id",
    key_columns: STAT_HEADER_KEY_COLUMNS,
};

pub const MODE_HEADER: HeaderTable = HeaderTable {
    table: "mode_header",
    id_column: "mode_header_id",
    key_columns: MODE_HEADER_KEY_COLUMNS,
};

pub const MTD_HEADER: HeaderTable = HeaderTable {
    table: "mtd_header",
    id_column: "mtd_header_id",
    key_columns: MTD_HEADER_KEY_COLUMNS,
};

pub const TCST_HEADER: HeaderTable = HeaderTable {
    table: "tcst_header",
    id_column: "tcst_header_id",
    key_columns: TCST_HEADER_KEY_COLUMNS,
};

/// A header tuple not yet in the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewHeader {
    pub key: HeaderKey,
    pub id: i64,
    /// Batch index of the first row carrying this tuple
    pub first_row: usize,
}

#[derive(Debug, Default)]
pub struct HeaderAssignment {
    pub ids: HashMap<HeaderKey, i64>,
    pub new_headers: Vec<NewHeader>,
}

impl HeaderAssignment {
    pub fn id_of(&self, key: &HeaderKey) -> Option<i64> {
        self.ids.get(key).copied()
    }
}

/// Assign an id to every distinct header tuple
///
/// # Arguments
///
/// * `store` - Session used for id lookups
/// * `header` - Target header table
/// * `keys` - Header tuple of every row, in batch order
/// * `db_check` - Reuse ids of tuples already stored
pub async fn assign_headers<S: Store>(
    store: &mut S,
    header: &HeaderTable,
    keys: &[HeaderKey],
    db_check: bool,
) -> Result<HeaderAssignment> {
    let mut assignment = HeaderAssignment::default();
    if keys.is_empty() {
        return Ok(assignment);
    }
    let mut next_id = store.max_id(header.table, header.id_column).await? + 1;
    let mut reused = 0;

    for (row, key) in keys.iter().enumerate() {
        if assignment.ids.contains_key(key) {
            continue;
        }
        if db_check {
            let lookup: Vec<(&str, Option<&str>)> = header
                .key_columns
                .iter()
                .copied()
                .zip(key.0.iter().map(|v| v.as_deref()))
                .collect();
            if let Some(id) = store.find_id(header.table, header.id_column, &lookup).await? {
                assignment.ids.insert(key.clone(), id);
                reused += 1;
                continue;
            }
        }
        assignment.ids.insert(key.clone(), next_id);
        assignment.new_headers.push(NewHeader {
            key: key.clone(),
            id: next_id,
            first_row: row,
        });
        next_id += 1;
    }

    debug!(
        "{}: {} distinct tuples, {} new, {} already stored",
        header.table,
        assignment.ids.len(),
        assignment.new_headers.len(),
        reused
    );
    Ok(assignment)
}

/// Outcome of the `data_file` probe for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFileId {
    New(i64),
    Reused(i64),
    Duplicate,
}

impl DataFileId {
    pub fn id(&self) -> Option<i64> {
        match self {
            DataFileId::New(id) | DataFileId::Reused(id) => Some(*id),
            DataFileId::Duplicate => None,
        }
    }
}

/// Probe every file by `(path, filename)` and allocate ids for new ones
pub async fn assign_data_files<S: Store>(
    store: &mut S,
    files: &[DataFileRecord],
    force_dup_file: bool,
) -> Result<Vec<DataFileId>> {
    let mut next_id = store.max_id("data_file", "data_file_id").await? + 1;
    let mut ids = Vec::with_capacity(files.len());

    for file in files {
        let existing = store
            .find_id(
                "data_file",
                "data_file_id",
                &[
                    ("path", Some(file.path.as_str())),
                    ("filename", Some(file.filename.as_str())),
                ],
            )
            .await?;
        ids.push(match existing {
            Some(id) if force_dup_file => {
                debug!("Reloading {} as data_file {}", file.full_path().display(), id);
                DataFileId::Reused(id)
            }
            Some(_) => {
                warn!(
                    "Skipping {}: already loaded (set force_dup_file to reload)",
                    file.full_path().display()
                );
                DataFileId::Duplicate
            }
            None => {
                next_id += 1;
                DataFileId::New(next_id - 1)
            }
        });
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileKind;
    use crate::store::{Database, MemoryDatabase};
    use chrono::NaiveDateTime;
    use std::path::Path;

    fn key(values: &[Option<&str>]) -> HeaderKey {
        HeaderKey(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    const TEST_HEADER: HeaderTable = HeaderTable {
        table: "test_header",
        id_column: "test_header_id",
        key_columns: &["model", "n_valid"],
    };

    #[tokio::test]
    async fn test_ids_continue_from_max_and_reuse_stored() {
        let db = MemoryDatabase::new();
        let mut session = db.begin().await.unwrap();
        session
            .insert_rows(
                "test_header",
                &["test_header_id".into(), "model".into(), "n_valid".into()],
                &[vec![Some("4".into()), Some("WRF".into()), None]],
            )
            .await
            .unwrap();

        let keys = vec![
            key(&[Some("GFS"), Some("1")]),
            key(&[Some("WRF"), None]),
            key(&[Some("GFS"), Some("1")]),
            key(&[Some("NAM"), None]),
        ];
        let assigned = assign_headers(&mut session, &TEST_HEADER, &keys, true)
            .await
            .unwrap();
        assert_eq!(assigned.id_of(&keys[0]), Some(5));
        assert_eq!(assigned.id_of(&keys[1]), Some(4));
        assert_eq!(assigned.id_of(&keys[3]), Some(6));
        let firsts: Vec<_> = assigned.new_headers.iter().map(|h| h.first_row).collect();
        assert_eq!(firsts, vec![0, 3]);

        let unchecked = assign_headers(&mut session, &TEST_HEADER, &keys, false)
            .await
            .unwrap();
        assert_eq!(unchecked.id_of(&keys[1]), Some(6));
        assert_eq!(unchecked.new_headers.len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_data_files() {
        let db = MemoryDatabase::new();
        let mut session = db.begin().await.unwrap();
        session
            .insert_rows(
                "data_file",
                &["data_file_id".into(), "path".into(), "filename".into()],
                &[vec![Some("1".into()), Some("/data".into()), Some("a.stat".into())]],
            )
            .await
            .unwrap();

        let files: Vec<_> = ["/data/a.stat", "/data/b.stat"]
            .iter()
            .map(|p| {
                DataFileRecord::new(FileKind::Stat, Path::new(p), NaiveDateTime::default(), None)
            })
            .collect();
        let ids = assign_data_files(&mut session, &files, false).await.unwrap();
        assert_eq!(ids, vec![DataFileId::Duplicate, DataFileId::New(2)]);
        let ids = assign_data_files(&mut session, &files, true).await.unwrap();
        assert_eq!(ids, vec![DataFileId::Reused(1), DataFileId::New(2)]);
    }
}
