//! Merge stage: flatten every stored page into one CSV table.
//!
//! The merge makes two passes over the Page Store, both in page-index order
//! and both holding at most one page document at a time:
//!
//! 1. a schema pass that collects the union of record field names in
//!    first-seen order, and
//! 2. a write pass that processes `chunk_size` files per batch, projects
//!    every record onto that schema and appends the batch to the table.
//!
//! Knowing the full schema up front lets the header be written once, with
//! the first batch, while still covering fields that only appear in later
//! pages. Each batch's rows live inside [`Merger::merge_batch`] and are
//! dropped when it returns.

use crate::config::Settings;
use crate::error::{ItemFailure, Stage, StageError, StageResult};
use crate::io::csv::TableWriter;
use crate::io::json::{PageContent, Record, read_page, value_to_text};
use crate::store::{PageStore, StoredPage};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOptions {
    /// Page files per batch. 0 is treated as 1.
    pub chunk_size: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Outcome of a merge run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub files_seen: usize,
    /// Files that contributed a `list` array (possibly empty).
    pub files_merged: usize,
    pub rows_written: u64,
    pub columns: Vec<String>,
    pub failures: Vec<ItemFailure>,
    /// The table, or `None` when no page held any rows.
    pub output: Option<PathBuf>,
}

/// Run the merge stage over the layout in `settings`.
///
/// # Errors
/// [`StageError::NoInput`] when the store holds no page files,
/// [`StageError::Unrecoverable`] when the store cannot be listed or the
/// table cannot be written.
pub fn run_merge(settings: &Settings, opts: &MergeOptions) -> StageResult<MergeReport> {
    let store = PageStore::new(settings.layout.raw_dir());
    Merger::new(&store, settings.layout.interim_table(), opts).run()
}

/// Ordered union of field names.
#[derive(Debug, Default)]
struct ColumnSet {
    names: Vec<String>,
    seen: HashSet<String>,
}

impl ColumnSet {
    fn absorb(&mut self, record: &Record) {
        for key in record.keys() {
            if !self.seen.contains(key) {
                self.seen.insert(key.clone());
                self.names.push(key.clone());
            }
        }
    }
}

/// Merges one Page Store into one table file.
pub struct Merger<'a> {
    store: &'a PageStore,
    output: PathBuf,
    chunk_size: usize,
}

impl<'a> Merger<'a> {
    pub fn new(store: &'a PageStore, output: impl Into<PathBuf>, opts: &MergeOptions) -> Self {
        Self {
            store,
            output: output.into(),
            chunk_size: opts.chunk_size.max(1),
        }
    }

    /// # Errors
    /// See [`run_merge`].
    pub fn run(&self) -> StageResult<MergeReport> {
        let pages = self
            .store
            .list()
            .map_err(|e| StageError::unrecoverable(Stage::Merge, e))?;
        if pages.is_empty() {
            warn!(dir = %self.store.dir().display(), "no files found to merge");
            return Err(StageError::NoInput(self.store.dir().to_path_buf()));
        }
        info!(
            files = pages.len(),
            chunk_size = self.chunk_size,
            output = %self.output.display(),
            "merging pages"
        );

        let columns = scan_columns(&pages);
        let mut report = MergeReport {
            files_seen: 0,
            columns: columns.clone(),
            ..MergeReport::default()
        };
        if columns.is_empty() {
            // Still walk the pages so every skipped file is reported.
            warn!("no record fields found, nothing to write");
        }

        let mut writer = TableWriter::new(&self.output, columns);
        // A table left by an earlier run must not outlive a merge that writes none.
        writer
            .discard_existing()
            .map_err(|e| StageError::unrecoverable(Stage::Merge, e))?;
        let batches = pages.len().div_ceil(self.chunk_size);
        for (n, batch) in pages.chunks(self.chunk_size).enumerate() {
            let written = self
                .merge_batch(batch, &mut writer, &mut report)
                .map_err(|e| StageError::unrecoverable(Stage::Merge, e))?;
            info!(
                batch = n + 1,
                batches,
                rows = written,
                files_seen = report.files_seen,
                rows_written = report.rows_written,
                "batch merged"
            );
        }

        if writer.started() {
            report.output = Some(self.output.clone());
            info!(
                output = %self.output.display(),
                rows = report.rows_written,
                columns = report.columns.len(),
                "merged dataset saved"
            );
        } else {
            warn!("no rows found in any page, no table written");
        }
        Ok(report)
    }

    fn merge_batch(
        &self,
        batch: &[StoredPage],
        writer: &mut TableWriter,
        report: &mut MergeReport,
    ) -> anyhow::Result<usize> {
        let mut rows: Vec<Vec<String>> = Vec::new();
        for page in batch {
            report.files_seen += 1;
            let Some(records) = load_records(&page.path, report) else {
                continue;
            };
            report.files_merged += 1;
            if writer.columns().is_empty() {
                // A row with zero columns has no CSV form.
                if !records.is_empty() {
                    let item = page.path.display().to_string();
                    warn!(file = %item, records = records.len(), "records have no fields, dropped");
                    report.failures.push(ItemFailure::new(
                        item,
                        format!("{} records have no fields", records.len()),
                    ));
                }
                continue;
            }
            rows.extend(records.iter().map(|r| project(r, writer.columns())));
        }
        let written = writer.append(&rows)?;
        report.rows_written += written as u64;
        Ok(written)
    }
}

/// Records of one page, or `None` after logging why the page was skipped.
fn load_records(path: &Path, report: &mut MergeReport) -> Option<Vec<Record>> {
    let item = path.display().to_string();
    match read_page(path) {
        Ok(PageContent::Records { records, malformed }) => {
            if malformed > 0 {
                warn!(file = %item, malformed, "skipping list items that are not objects");
                report.failures.push(ItemFailure::new(
                    item,
                    format!("{malformed} list items are not objects"),
                ));
            }
            Some(records)
        }
        Ok(PageContent::Unexpected(reason)) => {
            warn!(file = %item, reason, "unexpected JSON structure");
            report.failures.push(ItemFailure::new(item, reason));
            None
        }
        Err(e) => {
            let reason = format!("{e:#}");
            error!(file = %item, error = %reason, "error processing file");
            report.failures.push(ItemFailure::new(item, reason));
            None
        }
    }
}

/// Union of field names over all parseable pages, in first-seen order.
fn scan_columns(pages: &[StoredPage]) -> Vec<String> {
    let mut columns = ColumnSet::default();
    for page in pages {
        match read_page(&page.path) {
            Ok(PageContent::Records { records, .. }) => {
                records.iter().for_each(|r| columns.absorb(r));
            }
            Ok(PageContent::Unexpected(_)) | Err(_) => {
                debug!(file = %page.path.display(), "schema scan skipped file");
            }
        }
    }
    columns.names
}

fn project(record: &Record, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|c| record.get(c).map(value_to_text).unwrap_or_default())
        .collect()
}
