//! Pull stage: fetch a range of pages into the Page Store.
//!
//! Pages are requested one at a time in ascending order with a fixed delay
//! before each request. A page already on disk is skipped unless `force` is
//! set, so an interrupted pull can simply be run again. A failed page is
//! logged and left for the next run; it never aborts the current one.

use crate::config::Settings;
use crate::error::{ItemFailure, Stage, StageError, StageResult};
use crate::fetch::{Fetcher, Query};
use crate::store::PageStore;
use std::ops::Range;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Options for one pull run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullOptions {
    pub start_page: u32,
    /// Exclusive. `None` means one page in dev mode, otherwise every page
    /// the source reports.
    pub end_page: Option<u32>,
    /// Re-fetch pages that are already stored.
    pub force: bool,
}

/// Outcome of a pull run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullReport {
    pub range: Range<u32>,
    /// Pages fetched and written, in request order.
    pub fetched: Vec<u32>,
    /// Pages skipped because they were already stored.
    pub skipped: Vec<u32>,
    pub failures: Vec<ItemFailure>,
}

impl PullReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run the pull stage with the store and query described by `settings`.
///
/// # Errors
/// [`StageError::Config`] for an empty or inverted page range,
/// [`StageError::Unrecoverable`] if the page count cannot be obtained or the
/// store directory cannot be created.
pub fn run_pull<F: Fetcher + ?Sized>(
    fetcher: &F,
    settings: &Settings,
    opts: &PullOptions,
) -> StageResult<PullReport> {
    let store = PageStore::new(settings.layout.raw_dir());
    Puller {
        fetcher,
        store: &store,
        base_query: &settings.base_query,
        request_interval: settings.request_interval,
    }
    .run(opts, settings.dev_mode)
}

/// Pulls pages from one fetcher into one store.
pub struct Puller<'a, F: Fetcher + ?Sized> {
    pub fetcher: &'a F,
    pub store: &'a PageStore,
    pub base_query: &'a Query,
    pub request_interval: Duration,
}

impl<F: Fetcher + ?Sized> Puller<'_, F> {
    /// Resolve the page range and pull it.
    ///
    /// # Errors
    /// See [`run_pull`].
    pub fn run(&self, opts: &PullOptions, dev_mode: bool) -> StageResult<PullReport> {
        let range = self.resolve_range(opts, dev_mode)?;
        self.store
            .ensure_dir()
            .map_err(|e| StageError::unrecoverable(Stage::Pull, e))?;

        info!(
            start = range.start,
            end = range.end,
            pages = range.len(),
            dir = %self.store.dir().display(),
            "pulling pages"
        );

        let mut report = PullReport {
            range: range.clone(),
            ..PullReport::default()
        };
        for index in range {
            if !opts.force && self.store.contains(index) {
                info!(page = index, "skipping page (use --force to overwrite)");
                report.skipped.push(index);
                continue;
            }
            match self.pull_page(index) {
                Ok(()) => report.fetched.push(index),
                Err(failure) => report.failures.push(failure),
            }
        }

        info!(
            fetched = report.fetched.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "pull finished"
        );
        Ok(report)
    }

    /// Page range `[start, end)` for this run.
    ///
    /// # Errors
    /// See [`run_pull`].
    pub fn resolve_range(&self, opts: &PullOptions, dev_mode: bool) -> StageResult<Range<u32>> {
        let start = opts.start_page;
        let end = match opts.end_page {
            Some(end) => {
                if end <= start {
                    error!(start, end, "end page must be greater than start page");
                    return Err(StageError::Config(format!(
                        "end page ({end}) must be greater than start page ({start})"
                    )));
                }
                end
            }
            None if dev_mode => start.saturating_add(1),
            None => self
                .fetcher
                .total_pages(self.base_query)
                .map_err(|e| StageError::unrecoverable(Stage::Pull, e))?,
        };
        if end <= start {
            warn!(start, total = end, "start page is past the last page");
            return Err(StageError::Config(format!(
                "start page ({start}) is not below the page count ({end})"
            )));
        }
        Ok(start..end)
    }

    fn pull_page(&self, index: u32) -> Result<(), ItemFailure> {
        let query = self.base_query.with_page(index);
        if !self.request_interval.is_zero() {
            thread::sleep(self.request_interval);
        }

        let payload = self.fetcher.fetch_page(&query).map_err(|e| {
            error!(page = index, error = %e, "failed to fetch page");
            ItemFailure::new(format!("page {index}"), e)
        })?;

        match self.store.save(index, &payload) {
            Ok(path) => {
                info!(page = index, path = %path.display(), "page saved");
                Ok(())
            }
            Err(e) => {
                let reason = format!("{e:#}");
                error!(page = index, error = %reason, "failed to save page");
                Err(ItemFailure::new(format!("page {index}"), reason))
            }
        }
    }
}
