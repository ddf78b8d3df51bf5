//! The Page Store: one raw JSON file per fetched page.
//!
//! Page `i` always lives at `<dir>/page_<i>.json`. Its presence is the only
//! record of progress the pull stage keeps, which is what makes a pull
//! resumable.

use crate::fetch::PagePayload;
use crate::io::glob::files_in_dir;
use anyhow::{Context, Result};
use regex::Regex;
use std::fs::create_dir_all;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static PAGE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^page_(\d+)\.json$").expect("valid page file regex"));

/// A page file found on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredPage {
    pub index: u32,
    pub path: PathBuf,
}

/// Directory of raw page payloads addressed by page index.
#[derive(Clone, Debug)]
pub struct PageStore {
    dir: PathBuf,
}

impl PageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the store directory if needed.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn ensure_dir(&self) -> Result<()> {
        create_dir_all(&self.dir).with_context(|| format!("mkdir -p {}", self.dir.display()))
    }

    #[must_use]
    pub fn page_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("page_{index}.json"))
    }

    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        self.page_path(index).is_file()
    }

    /// Persist `payload` verbatim as page `index`, replacing any previous file.
    ///
    /// The bytes go to a temporary file in the same directory first, so an
    /// interrupted write never leaves a truncated page that a later run
    /// would treat as done.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written or renamed.
    pub fn save(&self, index: u32, payload: &PagePayload) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.page_path(index);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("create temp file in {}", self.dir.display()))?;
        tmp.write_all(payload.as_bytes())
            .with_context(|| format!("write page {index}"))?;
        tmp.flush()?;
        tmp.persist(&path)
            .with_context(|| format!("persist {}", path.display()))?;
        Ok(path)
    }

    /// All page files in the store, ordered by page index.
    ///
    /// A missing directory is an empty store. Files not named
    /// `page_<n>.json` are ignored.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be listed.
    pub fn list(&self) -> Result<Vec<StoredPage>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut pages: Vec<StoredPage> = files_in_dir(&self.dir, "page_*.json")?
            .into_iter()
            .filter_map(|path| page_index(&path).map(|index| StoredPage { index, path }))
            .collect();
        pages.sort_by_key(|p| p.index);
        Ok(pages)
    }
}

/// Page index encoded in a page file name.
#[must_use]
pub fn page_index(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    PAGE_FILE.captures(name)?.get(1)?.as_str().parse().ok()
}
