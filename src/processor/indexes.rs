//! Index catalogue and the apply/drop passes around a load.
//!
//! Each pass runs in its own session, outside the data transaction. An index
//! that already exists (on apply) or is missing (on drop) is logged and
//! skipped.

use crate::error::Result;
use crate::schema::{STAT_LINE_TYPES, TCST_LINE_TYPES};
use crate::store::{Database, IndexDef, IndexOutcome, Store};
use tracing::{info, warn};

/// Header tables and the selection fields indexed on each
const HEADER_INDEXES: &[(&str, &[&str])] = &[
    (
        "stat_header",
        &["model", "fcst_var", "fcst_lev", "obtype", "vx_mask", "fcst_thresh"],
    ),
    (
        "mode_header",
        &["model", "fcst_lead", "fcst_valid", "fcst_init", "fcst_var"],
    ),
    (
        "mtd_header",
        &["model", "fcst_lead", "fcst_valid", "fcst_init", "fcst_var"],
    ),
    ("tcst_header", &["amodel", "bmodel", "storm_id", "basin"]),
];

const STAT_LINE_DATA_INDEXED: &[&str] = &["fcst_lead", "fcst_valid_beg", "fcst_init_beg"];
const TCST_LINE_DATA_INDEXED: &[&str] = &["fcst_lead", "fcst_valid", "fcst_init"];

/// Every index managed by the loader
pub fn index_catalogue() -> Vec<IndexDef> {
    let stat = STAT_LINE_TYPES.iter().flat_map(|schema| {
        STAT_LINE_DATA_INDEXED
            .iter()
            .map(move |column| IndexDef::new(schema.table, &[*column]))
    });
    let tcst = TCST_LINE_TYPES.iter().flat_map(|schema| {
        TCST_LINE_DATA_INDEXED
            .iter()
            .map(move |column| IndexDef::new(schema.table, &[*column]))
    });
    let headers = HEADER_INDEXES.iter().flat_map(|(table, columns)| {
        columns
            .iter()
            .map(move |column| IndexDef::new(table, &[*column]))
    });
    stat.chain(tcst).chain(headers).collect()
}

/// Outcome counts of one index pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexReport {
    pub applied: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexPass {
    Apply,
    Drop,
}

/// Create every catalogued index
pub async fn apply_indexes<D: Database>(db: &D) -> Result<IndexReport> {
    run_pass(db, IndexPass::Apply).await
}

/// Drop every catalogued index
pub async fn drop_indexes<D: Database>(db: &D) -> Result<IndexReport> {
    run_pass(db, IndexPass::Drop).await
}

async fn run_pass<D: Database>(db: &D, pass: IndexPass) -> Result<IndexReport> {
    let mut session = db.begin().await?;
    let mut report = IndexReport::default();

    for index in index_catalogue() {
        let outcome = match pass {
            IndexPass::Apply => session.create_index(&index).await?,
            IndexPass::Drop => session.drop_index(&index).await?,
        };
        match outcome {
            IndexOutcome::Applied => report.applied += 1,
            IndexOutcome::AlreadyExists => {
                warn!("Index {} on {} already exists", index.name, index.table);
                report.skipped += 1;
            }
            IndexOutcome::Missing => {
                warn!("Index {} on {} does not exist", index.name, index.table);
                report.skipped += 1;
            }
        }
    }
    session.commit().await?;

    info!(
        "{:?} indexes: {} done, {} skipped",
        pass, report.applied, report.skipped
    );
    Ok(report)
}
