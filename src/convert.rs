//! Convert stage: interim CSV table to an all-text Parquet file.
//!
//! The table is read in `chunk_size`-row chunks of raw bytes, so no value is
//! ever type-inferred, and the chunks are concatenated into a single
//! in-memory table before encoding. That whole-table buffer is the memory
//! ceiling of the pipeline: the convert stage needs roughly the size of the
//! interim table in RAM.

use crate::config::Settings;
use crate::error::{ItemFailure, Stage, StageError, StageResult};
use crate::io::csv::ChunkedTableReader;
use crate::io::parquet::{Codec, Encoding, text_record_batch, write_parquet, write_with_fallback};
use crate::merge::DEFAULT_CHUNK_SIZE;
use crate::table::{RawTable, TextTable};
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Rows per read chunk. 0 is treated as 1.
    pub chunk_size: usize,
    /// Codec for the primary encoding.
    pub compression: Codec,
    /// Output file; defaults to the layout's processed directory.
    pub output: Option<PathBuf>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression: Codec::default(),
            output: None,
        }
    }
}

/// Outcome of a convert run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertReport {
    pub rows: usize,
    pub columns: Vec<String>,
    /// CSV lines dropped for a wrong field count.
    pub skipped_lines: Vec<u64>,
    /// Columns that needed per-value conversion.
    pub failures: Vec<ItemFailure>,
    /// Encoding of the file actually written.
    pub encoding: Encoding,
    pub output: PathBuf,
}

/// Run the convert stage over the layout in `settings`.
///
/// # Errors
/// See [`convert_table`].
pub fn run_convert(settings: &Settings, opts: &ConvertOptions) -> StageResult<ConvertReport> {
    let output = opts
        .output
        .clone()
        .unwrap_or_else(|| settings.layout.columnar_output());
    convert_table(&settings.layout.interim_table(), &output, opts)
}

/// Convert the CSV at `input` into Parquet at `output`.
///
/// # Errors
/// [`StageError::NoInput`] when `input` is missing or has no header,
/// [`StageError::Unrecoverable`] when reading fails or both encodings fail.
pub fn convert_table(
    input: &Path,
    output: &Path,
    opts: &ConvertOptions,
) -> StageResult<ConvertReport> {
    if !input.is_file() {
        warn!(input = %input.display(), "no merged table to convert");
        return Err(StageError::NoInput(input.to_path_buf()));
    }
    info!(input = %input.display(), output = %output.display(), "converting dataset to parquet");

    let (raw, skipped_lines) = load_table(input, opts.chunk_size)
        .map_err(|e| StageError::unrecoverable(Stage::Convert, e))?;
    if raw.num_columns() == 0 {
        warn!(input = %input.display(), "merged table has no header");
        return Err(StageError::NoInput(input.to_path_buf()));
    }
    info!(rows = raw.num_rows(), "loaded merged table");

    debug!("converting all columns to text");
    let (table, failures): (TextTable, _) = raw.into_text();
    let rows = table.num_rows();
    let columns = table.column_names().to_vec();

    let batch =
        text_record_batch(table).map_err(|e| StageError::unrecoverable(Stage::Convert, e))?;
    let encoding = write_with_fallback(Encoding::Compressed(opts.compression), |encoding| {
        write_parquet(output, &batch, encoding)
    })
    .map_err(|e| StageError::unrecoverable(Stage::Convert, e))?;

    info!(rows, columns = columns.len(), %encoding, output = %output.display(), "dataset converted");
    Ok(ConvertReport {
        rows,
        columns,
        skipped_lines,
        failures,
        encoding,
        output: output.to_path_buf(),
    })
}

/// Read the whole table chunk by chunk.
fn load_table(input: &Path, chunk_size: usize) -> anyhow::Result<(RawTable, Vec<u64>)> {
    let mut reader = ChunkedTableReader::open(input, chunk_size)
        .with_context(|| format!("open merged table {}", input.display()))?;
    let mut table = RawTable::new(reader.header());
    let mut skipped = Vec::new();
    let mut chunks = 0usize;
    while let Some(chunk) = reader.next_chunk()? {
        chunks += 1;
        for line in &chunk.bad_lines {
            warn!(line, "skipping CSV line with wrong field count");
        }
        skipped.extend(chunk.bad_lines);
        table.extend(chunk.rows);
    }
    debug!(chunks, rows = table.num_rows(), "read merged table");
    Ok((table, skipped))
}
