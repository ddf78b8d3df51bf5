//! File discovery by glob pattern.
//!
//! Results are always sorted so batch boundaries are reproducible between
//! runs over the same directory.

use anyhow::{Context, Result};
use glob::{Pattern, glob};
use std::path::{Path, PathBuf};

/// Expand `pattern` into a sorted list of matching regular files.
///
/// Directories matching the pattern are ignored. No match is not an error.
///
/// # Errors
/// Returns an error if the pattern is invalid or a matched entry cannot be
/// read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files = glob(pattern)
        .with_context(|| format!("bad glob pattern {pattern:?}"))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("read entry matching {pattern:?}"))?;
    files.retain(|p| p.is_file());
    files.sort();
    Ok(files)
}

/// Match `file_pattern` against the entries of `dir` only (no recursion).
///
/// `dir` is escaped, so directory names containing glob metacharacters are
/// matched literally.
///
/// # Errors
/// See [`expand_glob`].
pub fn files_in_dir(dir: &Path, file_pattern: &str) -> Result<Vec<PathBuf>> {
    let escaped = Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{escaped}/{file_pattern}");
    expand_glob(&pattern)
}
