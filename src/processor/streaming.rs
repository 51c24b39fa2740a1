//! Concurrent parsing of the discovered input files.
//!
//! Files are parsed on the blocking pool in batches, each worker with its
//! own date cache. Results are collected in discovery order so rows within
//! and across files keep a stable order. Cancellation is checked between
//! batches.

use super::discovery::{modified_time, DiscoveredFile};
use crate::error::{LoadError, Result};
use crate::models::{DataFileRecord, LoadBatch, LoadStats, ParsedFile};
use crate::parser::parse_file;
use crate::timestamp::DateCache;

use chrono::NaiveDateTime;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Files handed to the workers between cancellation checks
const FILE_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct StreamingParser {
    concurrency: usize,
    cancel: CancellationToken,
    show_progress: bool,
    verbose: bool,
}

impl StreamingParser {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            concurrency: num_cpus::get().max(1),
            cancel,
            show_progress: true,
            verbose: false,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Log every parsed file at info level
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("Parsing files");
        pb
    }

    /// Parse every file into one batch
    ///
    /// Input-file problems skip the file with a warning; any other parser
    /// error aborts the load.
    pub async fn parse_all(
        &self,
        files: Vec<DiscoveredFile>,
        load_date: NaiveDateTime,
        stats: &mut LoadStats,
    ) -> Result<LoadBatch> {
        let pb = self.progress_bar(files.len());
        let mut batch = LoadBatch::default();

        for chunk in files.chunks(FILE_BATCH_SIZE) {
            if self.cancel.is_cancelled() {
                pb.abandon_with_message("Cancelled");
                return Err(LoadError::cancelled("stopped while parsing input files"));
            }

            let results = stream::iter(chunk.iter().cloned())
                .map(|file| {
                    let pb = pb.clone();
                    async move {
                        if let Some(name) = file.path.file_name() {
                            pb.set_message(format!("Parsing: {}", name.to_string_lossy()));
                        }
                        let path = file.path.clone();
                        let result = task::spawn_blocking(move || parse_one(file, load_date))
                            .await
                            .map_err(|e| LoadError::parse(&path, 0, format!("parser task failed: {}", e)))
                            .and_then(|r| r);
                        pb.inc(1);
                        (path, result)
                    }
                })
                .buffered(self.concurrency)
                .collect::<Vec<_>>()
                .await;

            for (path, result) in results {
                stats.files_seen += 1;
                match result {
                    Ok(parsed) => {
                        stats.rows_skipped += parsed.row_issues;
                        if self.verbose {
                            info!("Parsed {} ({} rows)", path.display(), parsed.content.len());
                        } else {
                            debug!("Parsed {} ({} rows)", path.display(), parsed.content.len());
                        }
                        batch.push(parsed);
                    }
                    Err(LoadError::InputFile { path, reason }) => {
                        warn!("Skipping {}: {}", path.display(), reason);
                        stats.files_skipped += 1;
                    }
                    Err(e) => {
                        pb.abandon_with_message("Failed");
                        return Err(e);
                    }
                }
            }
        }

        pb.finish_with_message("Parsing complete");
        stats.revision_rows = batch.mtd.iter().filter(|r| r.revision_id.is_some()).count();
        info!(
            "Parsed {} files into {} rows",
            batch.files.len(),
            batch.row_count()
        );
        Ok(batch)
    }
}

fn parse_one(file: DiscoveredFile, load_date: NaiveDateTime) -> Result<ParsedFile> {
    let bytes = std::fs::read(&file.path)
        .map_err(|e| LoadError::input_file(&file.path, format!("cannot read: {}", e)))?;
    let contents = String::from_utf8_lossy(&bytes);
    let record = DataFileRecord::new(file.kind, &file.path, load_date, modified_time(&file.path));
    let mut dates = DateCache::new();
    parse_file(record, &contents, &mut dates)
}
