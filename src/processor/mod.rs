//! Load pipeline for MET output files.
//!
//! Discovers the input files, parses them concurrently, post-processes the
//! stat rows, then assigns ids and writes every table in one store session.
//! Index maintenance runs in separate sessions around the load.

pub mod dedup;
pub mod discovery;
pub mod frames;
pub mod indexes;
pub mod streaming;
pub mod tables;
pub mod writer;

#[cfg(test)]
mod tests;

use self::dedup::{
    assign_data_files, assign_headers, DataFileId, MODE_HEADER, MTD_HEADER, STAT_HEADER,
    TCST_HEADER,
};
use self::discovery::FileDiscovery;
use self::frames::{date_cell, int_cell, owned, TableRows};
use self::indexes::{apply_indexes, drop_indexes, IndexReport};
use self::streaming::StreamingParser;
use self::tables::{
    data_file_rows, mode_header_rows, mode_tables, mtd_header_rows, mtd_tables,
    stat_block_tables, stat_header_rows, stat_line_data, tcst_block_tables, tcst_header_rows,
    tcst_line_data, Built, NextIds,
};
use self::writer::{BulkWriter, WriteStrategy};

use crate::config::LoadSpec;
use crate::constants::SQL_NULL;
use crate::error::{LoadError, Result};
use crate::models::{LoadBatch, LoadStats};
use crate::postprocess::PostProcessor;
use crate::store::{Database, Store};

use chrono::NaiveDateTime;
use colored::*;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Drives one load against a database
pub struct LoadProcessor<D: Database> {
    db: D,
    spec: LoadSpec,
    tmpdir: PathBuf,
    cancel: CancellationToken,
    show_progress: bool,
}

impl<D: Database> LoadProcessor<D> {
    pub fn new(db: D, spec: LoadSpec) -> Self {
        Self {
            db,
            spec,
            tmpdir: std::env::temp_dir(),
            cancel: CancellationToken::new(),
            show_progress: true,
        }
    }

    /// Directory for bulk-load staging files
    pub fn with_tmpdir(mut self, tmpdir: PathBuf) -> Self {
        self.tmpdir = tmpdir;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Show the progress bar and the colored summary
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    /// Run the full load
    pub async fn process(&self) -> Result<LoadStats> {
        let start_time = Instant::now();
        let mut stats = LoadStats::default();
        self.announce("Starting MET load");

        if self.spec.flags.drop_indexes {
            self.step("Dropping indexes...");
            drop_indexes(&self.db).await?;
        }

        self.step("Discovering files...");
        let discovery = FileDiscovery::from_spec(&self.spec).discover();
        stats.files_skipped += discovery.skipped;
        self.detail("Found", discovery.files.len());

        self.step("Parsing files...");
        let load_date = chrono::Local::now().naive_local();
        let parser = StreamingParser::new(self.cancel.clone())
            .with_progress(self.show_progress)
            .with_verbose(self.spec.flags.verbose);
        let batch = parser
            .parse_all(discovery.files, load_date, &mut stats)
            .await?;

        self.step("Writing tables...");
        self.write_batch(batch, load_date, &mut stats).await?;

        if self.spec.flags.apply_indexes {
            self.step("Applying indexes...");
            apply_indexes(&self.db).await?;
        }

        stats.processing_time_ms = start_time.elapsed().as_millis();
        self.summary(&stats);
        Ok(stats)
    }

    /// Only drop and/or apply indexes, as the load flags ask
    pub async fn process_indexes(&self) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        if self.spec.flags.drop_indexes {
            let dropped = drop_indexes(&self.db).await?;
            report.applied += dropped.applied;
            report.skipped += dropped.skipped;
        }
        if self.spec.flags.apply_indexes {
            let applied = apply_indexes(&self.db).await?;
            report.applied += applied.applied;
            report.skipped += applied.skipped;
        }
        Ok(report)
    }

    /// Assign ids and write every table of the batch in one session
    async fn write_batch(
        &self,
        mut batch: LoadBatch,
        load_date: NaiveDateTime,
        stats: &mut LoadStats,
    ) -> Result<()> {
        let mut session = self.db.begin().await?;
        let capabilities = session.capabilities().await?;
        let writer = BulkWriter::new(
            WriteStrategy::select(self.spec.connection.local_infile, capabilities),
            self.spec.insert_size,
            self.tmpdir.clone(),
            self.cancel.clone(),
        );

        let file_ids = assign_data_files(&mut session, &batch.files, self.spec.flags.force_dup_file)
            .await?;
        let keep: Vec<bool> = file_ids.iter().map(|id| *id != DataFileId::Duplicate).collect();
        stats.files_duplicate += keep.iter().filter(|k| !**k).count();
        let new_files = data_file_rows(&batch.files, &file_ids);
        batch.retain_files(&keep);
        let data_file_ids: Vec<i64> = file_ids.iter().filter_map(|id| id.id()).collect();
        stats.files_loaded = batch.files.len();
        write_table(&writer, &mut session, new_files, stats).await?;

        let processed =
            PostProcessor::from_spec(&self.spec).run(std::mem::take(&mut batch.stat), &batch.files);
        stats.rows_pruned += processed.pruned;
        stats.warnings += processed.warnings;
        batch.stat = processed.rows;

        let flags = &self.spec.flags;

        if !batch.stat.is_empty() {
            let keys: Vec<_> = batch.stat.iter().map(|r| r.header.key()).collect();
            let headers =
                assign_headers(&mut session, &STAT_HEADER, &keys, flags.stat_header_db_check)
                    .await?;
            write_table(&writer, &mut session, stat_header_rows(&STAT_HEADER, &headers), stats)
                .await?;
            let mut next_ids =
                NextIds::probe(&mut session, "line_data_id", stat_block_tables(&batch.stat))
                    .await?;
            let built = stat_line_data(&batch.stat, &headers, &data_file_ids, &mut next_ids);
            write_built(&writer, &mut session, built, stats).await?;
        }

        if !batch.tcst.is_empty() {
            let keys: Vec<_> = batch.tcst.iter().map(|r| r.header.key()).collect();
            let headers =
                assign_headers(&mut session, &TCST_HEADER, &keys, flags.tcst_header_db_check)
                    .await?;
            write_table(&writer, &mut session, tcst_header_rows(&TCST_HEADER, &headers), stats)
                .await?;
            let mut next_ids =
                NextIds::probe(&mut session, "line_data_id", tcst_block_tables(&batch.tcst))
                    .await?;
            let built = tcst_line_data(&batch.tcst, &headers, &data_file_ids, &mut next_ids);
            write_built(&writer, &mut session, built, stats).await?;
        }

        if !batch.mode.is_empty() {
            let keys: Vec<_> = batch.mode.iter().map(|r| r.header.clone()).collect();
            let headers =
                assign_headers(&mut session, &MODE_HEADER, &keys, flags.mode_header_db_check)
                    .await?;
            let header_rows = mode_header_rows(&MODE_HEADER, &headers, &batch.mode, &data_file_ids);
            write_table(&writer, &mut session, header_rows, stats).await?;
            let mut next_ids =
                NextIds::probe(&mut session, "mode_obj_id", BTreeSet::from(["mode_obj_single"]))
                    .await?;
            let built = mode_tables(&batch.mode, &headers, &mut next_ids);
            write_built(&writer, &mut session, built, stats).await?;
        }

        if !batch.mtd.is_empty() {
            let keys: Vec<_> = batch.mtd.iter().map(|r| r.header.clone()).collect();
            let headers =
                assign_headers(&mut session, &MTD_HEADER, &keys, flags.mtd_header_db_check)
                    .await?;
            let header_rows = mtd_header_rows(&MTD_HEADER, &headers, &batch.mtd, &data_file_ids);
            write_table(&writer, &mut session, header_rows, stats).await?;
            write_built(&writer, &mut session, mtd_tables(&batch.mtd, &headers), stats).await?;
        }

        self.write_metadata(&writer, &mut session, stats).await?;
        if stats.files_loaded > 0 {
            self.write_instance_info(&writer, &mut session, load_date, stats)
                .await?;
        }

        if self.cancel.is_cancelled() {
            return Err(LoadError::cancelled("stopped before commit"));
        }
        session.commit().await?;
        info!(
            "Committed {} rows across {} tables",
            stats.total_rows(),
            stats.rows_written.len()
        );
        Ok(())
    }

    /// Replace the single `metadata` row when a group or description is configured
    async fn write_metadata<S: Store>(
        &self,
        writer: &BulkWriter,
        session: &mut S,
        stats: &mut LoadStats,
    ) -> Result<()> {
        if self.spec.group.is_none() && self.spec.description.is_none() {
            return Ok(());
        }
        session.delete_all("metadata").await?;
        let mut table = TableRows::new("metadata", owned(&["category", "description"]));
        table.push(vec![
            Some(self.spec.group.clone().unwrap_or_default()),
            Some(self.spec.description.clone().unwrap_or_default()),
        ]);
        write_table(writer, session, table, stats).await
    }

    async fn write_instance_info<S: Store>(
        &self,
        writer: &BulkWriter,
        session: &mut S,
        load_date: NaiveDateTime,
        stats: &mut LoadStats,
    ) -> Result<()> {
        let id = session.max_id("instance_info", "instance_info_id").await? + 1;
        let updater = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
        let null = || Some(SQL_NULL.to_string());
        let load_xml = if self.spec.flags.load_xml && !self.spec.raw_xml.is_empty() {
            Some(self.spec.raw_xml.clone())
        } else {
            null()
        };

        let mut table = TableRows::new(
            "instance_info",
            owned(&[
                "instance_info_id",
                "updater",
                "update_date",
                "update_detail",
                "load_xml",
            ]),
        );
        table.push(vec![
            int_cell(id),
            Some(updater),
            date_cell(Some(load_date)),
            self.spec.load_note.clone().or_else(null),
            load_xml,
        ]);
        write_table(writer, session, table, stats).await
    }

    fn announce(&self, message: &str) {
        if self.show_progress {
            println!("{}", message.bright_green().bold());
            println!(
                "  {} {}",
                "Database:".bright_cyan(),
                self.spec.connection.database
            );
        }
    }

    fn step(&self, message: &str) {
        debug!("{}", message);
        if self.show_progress {
            println!("\n{}", message.bright_yellow());
        }
    }

    fn detail(&self, label: &str, count: usize) {
        if self.show_progress {
            println!(
                "  {} {} files",
                label.bright_green(),
                count.to_string().bright_white().bold()
            );
        }
    }

    fn summary(&self, stats: &LoadStats) {
        if !self.show_progress {
            return;
        }
        println!("\n{}", "Processing Summary".bright_green().bold());
        println!(
            "  {} {}ms",
            "Time elapsed:".bright_cyan(),
            stats.processing_time_ms.to_string().bright_white()
        );
        println!(
            "  {} {}",
            "Files loaded:".bright_cyan(),
            stats.files_loaded.to_string().bright_white()
        );
        if stats.files_duplicate > 0 {
            println!(
                "  {} {}",
                "Files already loaded:".bright_cyan(),
                stats.files_duplicate.to_string().bright_white()
            );
        }
        if stats.files_skipped > 0 {
            println!(
                "  {} {}",
                "Files skipped:".bright_red(),
                stats.files_skipped.to_string().bright_red().bold()
            );
        }
        if stats.rows_skipped > 0 {
            println!(
                "  {} {}",
                "Rows skipped:".bright_red(),
                stats.rows_skipped.to_string().bright_red().bold()
            );
        }
        for (table, rows) in &stats.rows_written {
            println!("  {} {}", format!("{}:", table).bright_cyan(), rows);
        }
        println!(
            "  {} {}",
            "Total rows:".bright_cyan(),
            stats.total_rows().to_string().bright_white().bold()
        );
    }
}

async fn write_table<S: Store>(
    writer: &BulkWriter,
    session: &mut S,
    rows: TableRows,
    stats: &mut LoadStats,
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let table = rows.table.clone();
    let mut df = rows.into_frame()?;
    let written = writer.write(session, &table, &mut df).await?;
    stats.record_write(&table, written);
    Ok(())
}

async fn write_built<S: Store>(
    writer: &BulkWriter,
    session: &mut S,
    built: Built,
    stats: &mut LoadStats,
) -> Result<()> {
    stats.rows_skipped += built.skipped;
    for table in built.tables {
        write_table(writer, session, table, stats).await?;
    }
    Ok(())
}
