//! Typed outcomes for the fetch seam and the three pipeline stages.
//!
//! Stages never panic or swallow failures. A stage returns either a report
//! (which lists per-item failures that were skipped) or a [`StageError`]
//! the caller can branch on.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for stage entry points.
pub type StageResult<T> = std::result::Result<T, StageError>;

/// The pipeline stage an error or report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pull,
    Merge,
    Convert,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Pull => write!(f, "pull"),
            Stage::Merge => write!(f, "merge"),
            Stage::Convert => write!(f, "convert"),
        }
    }
}

/// Stage-level failure.
#[derive(Error, Debug)]
pub enum StageError {
    /// Invalid options; nothing was done.
    #[error("configuration error: {0}")]
    Config(String),

    /// The stage found nothing to read at the given location.
    #[error("no input found at {}", .0.display())]
    NoInput(PathBuf),

    /// The stage started but could not finish.
    #[error("{stage} stage failed: {source:#}")]
    Unrecoverable {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}

impl StageError {
    pub fn unrecoverable(stage: Stage, source: impl Into<anyhow::Error>) -> Self {
        StageError::Unrecoverable {
            stage,
            source: source.into(),
        }
    }

    /// True when the stage performed no work because of its inputs.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, StageError::Config(_))
    }
}

/// Failure reported by a [`Fetcher`](crate::fetch::Fetcher).
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// One skipped item (page, file or column) inside an otherwise successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// What was skipped, e.g. `page 7` or a file path.
    pub item: String,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(item: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            item: item.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.item, self.reason)
    }
}
