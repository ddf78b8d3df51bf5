//! Page payload parsing and JSON-to-text rendering.
//!
//! A page is expected to be a JSON object with a `list` array of record
//! objects. Anything else is reported as [`PageContent::Unexpected`] and
//! handled by the caller as a skipped file.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Name of the array field holding the records of a page.
pub const LIST_FIELD: &str = "list";

/// One record: field name to JSON value, in document order.
pub type Record = Map<String, Value>;

/// What a page file turned out to contain.
#[derive(Debug, Clone, PartialEq)]
pub enum PageContent {
    /// The `list` array. `malformed` counts elements that were not objects
    /// and were dropped.
    Records { records: Vec<Record>, malformed: usize },
    /// The document has no usable `list` array.
    Unexpected(&'static str),
}

/// Read and parse a page file.
///
/// # Errors
/// Returns an error if the file cannot be read or is not valid JSON. A valid
/// document of the wrong shape is not an error; see [`PageContent`].
pub fn read_page(path: impl AsRef<Path>) -> Result<PageContent> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("open {}", path.display()))?;
    let doc: Value =
        serde_json::from_slice(&bytes).with_context(|| format!("parse JSON {}", path.display()))?;
    Ok(page_content(doc))
}

/// Split a parsed page document into its records.
#[must_use]
pub fn page_content(doc: Value) -> PageContent {
    let Value::Object(mut doc) = doc else {
        return PageContent::Unexpected("document is not an object");
    };
    match doc.remove(LIST_FIELD) {
        None => PageContent::Unexpected("missing `list` field"),
        Some(Value::Array(items)) => {
            let total = items.len();
            let records: Vec<Record> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect();
            PageContent::Records {
                malformed: total - records.len(),
                records,
            }
        }
        Some(_) => PageContent::Unexpected("`list` is not an array"),
    }
}

/// Render a JSON value as a table cell.
///
/// Strings are taken verbatim, `null` becomes empty, scalars use their JSON
/// text and nested arrays/objects are kept as compact JSON.
#[must_use]
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
