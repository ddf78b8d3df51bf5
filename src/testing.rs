//! Test doubles and fixtures for pipeline tests.
//!
//! [`ScriptedFetcher`] stands in for the remote API; the fixture functions
//! build page documents and read Parquet output back as plain strings.

use crate::error::FetchError;
use crate::fetch::{Fetcher, PagePayload, Query};
use anyhow::{Context, Result};
use arrow::array::{Array, StringArray};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

/// In-memory [`Fetcher`] with a fixed page count.
///
/// Unscripted pages answer with [`issue_page`] holding one record whose `id`
/// is the page index. Every request is recorded.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    total: u32,
    pages: HashMap<u32, Value>,
    failing: HashSet<u32>,
    requests: RefCell<Vec<Query>>,
    total_calls: RefCell<usize>,
}

impl ScriptedFetcher {
    #[must_use]
    pub fn new(total_pages: u32) -> Self {
        Self {
            total: total_pages,
            ..Self::default()
        }
    }

    /// Answer page `index` with `payload`.
    #[must_use]
    pub fn with_page(mut self, index: u32, payload: Value) -> Self {
        self.pages.insert(index, payload);
        self
    }

    /// Fail every request for page `index`.
    #[must_use]
    pub fn failing(mut self, index: u32) -> Self {
        self.failing.insert(index);
        self
    }

    /// Page indices requested through `fetch_page`, in order.
    #[must_use]
    pub fn requested_pages(&self) -> Vec<u32> {
        self.requests.borrow().iter().filter_map(Query::page).collect()
    }

    /// Every query passed to `fetch_page`.
    #[must_use]
    pub fn requests(&self) -> Vec<Query> {
        self.requests.borrow().clone()
    }

    #[must_use]
    pub fn total_pages_calls(&self) -> usize {
        *self.total_calls.borrow()
    }
}

impl Fetcher for ScriptedFetcher {
    fn total_pages(&self, _query: &Query) -> Result<u32, FetchError> {
        *self.total_calls.borrow_mut() += 1;
        Ok(self.total)
    }

    fn fetch_page(&self, query: &Query) -> Result<PagePayload, FetchError> {
        self.requests.borrow_mut().push(query.clone());
        let index = query
            .page()
            .ok_or_else(|| FetchError::InvalidPayload("query has no page".into()))?;
        if self.failing.contains(&index) || index >= self.total {
            return Err(FetchError::Status {
                status: 503,
                url: format!("scripted://{}?page={index}", query.resource()),
            });
        }
        let payload = self
            .pages
            .get(&index)
            .cloned()
            .unwrap_or_else(|| issue_page(&[&index.to_string()]));
        Ok(PagePayload::from_value(&payload))
    }
}

/// A page document with one `{"id": ...}` record per id.
#[must_use]
pub fn issue_page(ids: &[&str]) -> Value {
    let list: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
    json!({ "list": list })
}

/// Write `payload` as page `index` under `dir`, the way the pull stage names it.
///
/// # Errors
/// Returns an error if the directory or file cannot be written.
pub fn write_page(dir: &Path, index: u32, payload: &Value) -> Result<PathBuf> {
    create_dir_all(dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
    let path = dir.join(format!("page_{index}.json"));
    std::fs::write(&path, serde_json::to_vec(payload)?)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// A Parquet file read back as column names and text rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextParquet {
    pub columns: Vec<String>,
    pub types: Vec<DataType>,
    pub rows: Vec<Vec<String>>,
}

impl TextParquet {
    /// Values of one column, top to bottom.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let i = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[i].as_str()).collect())
    }
}

/// Read a Parquet file whose columns are all `Utf8`.
///
/// # Errors
/// Returns an error if the file cannot be read or a column is not text.
pub fn read_text_parquet(path: impl AsRef<Path>) -> Result<TextParquet> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("open ParquetRecordBatchReader")?;
    let schema = builder.schema().clone();
    let reader = builder.build().context("build ParquetRecordBatchReader")?;

    let mut out = TextParquet {
        columns: schema.fields().iter().map(|f| f.name().clone()).collect(),
        types: schema.fields().iter().map(|f| f.data_type().clone()).collect(),
        rows: Vec::new(),
    };
    for batch in reader {
        let batch = batch.context("read batch")?;
        let columns: Vec<&StringArray> = batch
            .columns()
            .iter()
            .map(|c| {
                c.as_any()
                    .downcast_ref::<StringArray>()
                    .context("column is not Utf8")
            })
            .collect::<Result<_>>()?;
        for row in 0..batch.num_rows() {
            out.rows.push(
                columns
                    .iter()
                    .map(|c| {
                        if c.is_null(row) {
                            String::new()
                        } else {
                            c.value(row).to_string()
                        }
                    })
                    .collect(),
            );
        }
    }
    Ok(out)
}
