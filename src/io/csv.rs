//! Interim table I/O.
//!
//! This module provides:
//! - [`TableWriter`]: an append-only CSV writer that emits the header with
//!   the first non-empty batch and only rows afterwards
//! - [`ChunkedTableReader`]: reads a headed CSV back in fixed-size row
//!   chunks as raw bytes, so no field is ever type-inferred
//!
//! # Design notes
//! - Every append reopens the file; nothing is held open between batches.
//! - Rows whose field count differs from the header are not returned by the
//!   reader. They are reported by line number in [`RawChunk::bad_lines`].

use anyhow::{Context, Result};
use csv::{ByteRecord, ReaderBuilder, WriterBuilder};
use std::fs::{File, OpenOptions, create_dir_all, remove_file};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

/// Append-only CSV writer for one merge run.
///
/// Nothing touches the disk until the first non-empty [`append`](Self::append):
/// that call truncates any previous table and writes the header.
#[derive(Debug)]
pub struct TableWriter {
    path: PathBuf,
    columns: Vec<String>,
    started: bool,
    rows_written: u64,
}

impl TableWriter {
    pub fn new(path: impl Into<PathBuf>, columns: Vec<String>) -> Self {
        Self {
            path: path.into(),
            columns,
            started: false,
            rows_written: 0,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// True once the table file exists with its header.
    #[must_use]
    pub fn started(&self) -> bool {
        self.started
    }

    #[must_use]
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Remove a table left at [`path`](Self::path) by an earlier run.
    ///
    /// Must be called before the first [`append`](Self::append); a missing
    /// file is not an error.
    ///
    /// # Errors
    /// Returns an error if an existing file cannot be removed.
    pub fn discard_existing(&self) -> Result<()> {
        anyhow::ensure!(!self.started, "table {} already started", self.path.display());
        match remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", self.path.display())),
        }
    }

    /// Write `rows`, each already projected onto [`columns`](Self::columns).
    ///
    /// Empty input is a no-op and does not create the file.
    ///
    /// # Returns
    /// The number of rows written.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or written, or if a row
    /// has the wrong number of fields.
    pub fn append(&mut self, rows: &[Vec<String>]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let file = if self.started {
            OpenOptions::new()
                .append(true)
                .open(&self.path)
                .with_context(|| format!("open {} for append", self.path.display()))?
        } else {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
            }
            File::create(&self.path).with_context(|| format!("create {}", self.path.display()))?
        };

        let mut wtr = WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        if !self.started {
            wtr.write_record(&self.columns)
                .with_context(|| format!("write header to {}", self.path.display()))?;
        }
        for (i, row) in rows.iter().enumerate() {
            anyhow::ensure!(
                row.len() == self.columns.len(),
                "row #{} has {} fields, expected {}",
                i + 1,
                row.len(),
                self.columns.len()
            );
            wtr.write_record(row)
                .with_context(|| format!("write CSV row #{}", i + 1))?;
        }
        wtr.flush()
            .with_context(|| format!("flush {}", self.path.display()))?;

        self.started = true;
        self.rows_written += rows.len() as u64;
        Ok(rows.len())
    }
}

/// One chunk of rows read by [`ChunkedTableReader`].
#[derive(Debug, Default)]
pub struct RawChunk {
    pub rows: Vec<ByteRecord>,
    /// 1-based line numbers of rows skipped for a wrong field count.
    pub bad_lines: Vec<u64>,
}

/// Reads a headed CSV in chunks of `chunk_size` well-formed rows.
pub struct ChunkedTableReader {
    reader: csv::Reader<File>,
    header: ByteRecord,
    chunk_size: usize,
    done: bool,
}

impl ChunkedTableReader {
    /// Open `path` and read its header. A `chunk_size` of 0 is treated as 1.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the header cannot be
    /// read.
    pub fn open(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(f);
        let header = reader
            .byte_headers()
            .with_context(|| format!("read header of {}", path.display()))?
            .clone();
        Ok(Self {
            reader,
            header,
            chunk_size: chunk_size.max(1),
            done: false,
        })
    }

    #[must_use]
    pub fn header(&self) -> &ByteRecord {
        &self.header
    }

    /// Read the next chunk, or `None` once the file is exhausted.
    ///
    /// # Errors
    /// Returns an error on I/O failure or malformed CSV quoting.
    pub fn next_chunk(&mut self) -> Result<Option<RawChunk>> {
        if self.done {
            return Ok(None);
        }
        let width = self.header.len();
        let mut chunk = RawChunk::default();
        let mut record = ByteRecord::new();
        while chunk.rows.len() < self.chunk_size {
            let more = self
                .reader
                .read_byte_record(&mut record)
                .context("read CSV record")?;
            if !more {
                self.done = true;
                break;
            }
            if record.len() == width {
                chunk.rows.push(record.clone());
            } else {
                let line = record.position().map_or(0, csv::Position::line);
                chunk.bad_lines.push(line);
            }
        }
        if chunk.rows.is_empty() && chunk.bad_lines.is_empty() {
            return Ok(None);
        }
        Ok(Some(chunk))
    }
}
