//! # issuepipe
//!
//! A three-stage batch pipeline that mirrors a paginated issue-tracker API
//! into a queryable Parquet file.
//!
//! ## Stages
//!
//! - **pull** ([`run_pull`]) - fetch pages `[start, end)` from a [`Fetcher`]
//!   and store each raw payload as `raw/page_<n>.json`. Pages already on
//!   disk are skipped unless forced, so an interrupted pull is resumed by
//!   running it again.
//! - **merge** ([`run_merge`]) - read the stored pages in bounded batches,
//!   union the fields of all records into one column set and append the rows
//!   to `interim/merged.csv`. The header is written exactly once.
//! - **convert** ([`run_convert`]) - read the merged table in row chunks,
//!   coerce every column to text and write `processed/merged.parquet`,
//!   falling back to an uncompressed legacy encoding if the primary write
//!   fails.
//!
//! Every stage returns a report listing the items it had to skip, or a
//! [`StageError`] saying why it could not run.
//!
//! ## Quick Start
//!
//! ```no_run
//! use issuepipe::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let settings = Settings::from_env()?.with_data_dir("data");
//! let fetcher = HttpFetcher::new(&settings);
//!
//! let pulled = run_pull(&fetcher, &settings, &PullOptions::default())?;
//! let merged = run_merge(&settings, &MergeOptions::default())?;
//! let converted = run_convert(&settings, &ConvertOptions::default())?;
//! println!(
//!     "{} pages, {} rows, {}",
//!     pulled.fetched.len(),
//!     merged.rows_written,
//!     converted.output.display()
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Resources
//!
//! All stages are single-threaded and blocking. Pull holds one page in
//! memory, merge one batch of pages, and convert the whole merged table.
//! Stages share nothing but the data directory and take no locks: running
//! the same stage twice at once against the same directory is unsupported.

pub mod config;
pub mod convert;
pub mod error;
pub mod fetch;
pub mod io;
pub mod logging;
pub mod merge;
pub mod pull;
pub mod store;
pub mod table;
pub mod testing;

pub use config::{DataLayout, Settings};
pub use convert::{ConvertOptions, ConvertReport, convert_table, run_convert};
pub use error::{FetchError, ItemFailure, Stage, StageError, StageResult};
pub use fetch::{Fetcher, HttpFetcher, PagePayload, Query};
pub use io::parquet::{Codec, Encoding};
pub use merge::{MergeOptions, MergeReport, Merger, run_merge};
pub use pull::{PullOptions, PullReport, Puller, run_pull};
pub use store::{PageStore, StoredPage};
