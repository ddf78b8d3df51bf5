//! Parquet output for all-text tables.
//!
//! This module provides:
//! - [`text_record_batch`]: a [`TextTable`] as an Arrow batch of `Utf8` columns
//! - [`write_parquet`]: write one batch with a given [`Encoding`]
//! - [`write_with_fallback`]: try the primary encoding, then the legacy one
//!
//! Output is written to a temporary file next to the target and renamed into
//! place on success, so a failed attempt never leaves a partial file behind.

use crate::table::TextTable;
use anyhow::{Context, Result};
use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::{WriterProperties, WriterVersion};
use std::fmt;
use std::fs::create_dir_all;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Compression codec for the primary Parquet encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Codec {
    #[default]
    Snappy,
    Zstd,
    Gzip,
    None,
}

impl Codec {
    fn compression(self) -> Compression {
        match self {
            Codec::Snappy => Compression::SNAPPY,
            Codec::Zstd => Compression::ZSTD(ZstdLevel::default()),
            Codec::Gzip => Compression::GZIP(GzipLevel::default()),
            Codec::None => Compression::UNCOMPRESSED,
        }
    }
}

/// How a Parquet file is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Current writer version with the given codec.
    Compressed(Codec),
    /// Uncompressed, Parquet 1.0 writer version, no dictionary pages.
    Legacy,
}

impl Encoding {
    #[must_use]
    pub fn writer_properties(self) -> WriterProperties {
        match self {
            Encoding::Compressed(codec) => WriterProperties::builder()
                .set_compression(codec.compression())
                .build(),
            Encoding::Legacy => WriterProperties::builder()
                .set_compression(Compression::UNCOMPRESSED)
                .set_writer_version(WriterVersion::PARQUET_1_0)
                .set_dictionary_enabled(false)
                .build(),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Compressed(Codec::Snappy) => write!(f, "snappy"),
            Encoding::Compressed(Codec::Zstd) => write!(f, "zstd"),
            Encoding::Compressed(Codec::Gzip) => write!(f, "gzip"),
            Encoding::Compressed(Codec::None) => write!(f, "uncompressed"),
            Encoding::Legacy => write!(f, "legacy"),
        }
    }
}

/// Build an Arrow batch with one non-null `Utf8` column per table column.
///
/// # Errors
/// Returns an error if Arrow rejects the batch.
pub fn text_record_batch(table: TextTable) -> Result<RecordBatch> {
    let rows = table.num_rows();
    let (names, columns) = table.into_parts();
    let schema = Schema::new(
        names
            .iter()
            .map(|n| Field::new(n, DataType::Utf8, false))
            .collect::<Vec<_>>(),
    );
    let arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|values| Arc::new(StringArray::from(values)) as ArrayRef)
        .collect();
    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    RecordBatch::try_new_with_options(Arc::new(schema), arrays, &options)
        .context("build RecordBatch")
}

/// Write `batch` to `path` with `encoding`, replacing any existing file.
///
/// # Errors
/// Returns an error if the file cannot be created or the writer fails.
pub fn write_parquet(path: impl AsRef<Path>, batch: &RecordBatch, encoding: Encoding) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    create_dir_all(dir).with_context(|| format!("mkdir -p {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    {
        let mut writer = ArrowWriter::try_new(
            tmp.as_file_mut(),
            batch.schema(),
            Some(encoding.writer_properties()),
        )
        .context("create ArrowWriter")?;
        writer.write(batch).context("write batch to parquet")?;
        writer.close().context("close ArrowWriter")?;
    }
    tmp.persist(path)
        .with_context(|| format!("persist {}", path.display()))?;
    Ok(())
}

/// Run `write` with `primary`, and once more with [`Encoding::Legacy`] if that
/// fails.
///
/// # Returns
/// The encoding that succeeded.
///
/// # Errors
/// Returns the fallback's error when both attempts fail.
pub fn write_with_fallback<F>(primary: Encoding, mut write: F) -> Result<Encoding>
where
    F: FnMut(Encoding) -> Result<()>,
{
    match write(primary) {
        Ok(()) => {
            info!(encoding = %primary, "wrote parquet");
            Ok(primary)
        }
        Err(e) if primary != Encoding::Legacy => {
            let reason = format!("{e:#}");
            error!(encoding = %primary, error = %reason, "parquet write failed, retrying with legacy encoding");
            write(Encoding::Legacy).context("legacy parquet write")?;
            info!(encoding = %Encoding::Legacy, "wrote parquet with fallback settings");
            Ok(Encoding::Legacy)
        }
        Err(e) => Err(e),
    }
}
