//! Runtime settings and on-disk layout.
//!
//! Settings come from the process environment, optionally seeded from a
//! `.env` file in the working directory. Every variable has a default so a
//! bare checkout can run `issuepipe pull` against the public endpoint.
//!
//! | variable                         | default                          |
//! |----------------------------------|----------------------------------|
//! | `ISSUEPIPE_DEV_MODE`             | `true`                           |
//! | `ISSUEPIPE_DATA_DIR`             | `./data`                         |
//! | `ISSUEPIPE_BASE_URL`             | `https://www.drupal.org/api-d7`  |
//! | `ISSUEPIPE_REQUEST_INTERVAL_MS`  | `1000`                           |
//! | `ISSUEPIPE_USER_AGENT`           | `issuepipe/<version>`            |

use crate::fetch::Query;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.drupal.org/api-d7";
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// Pipeline settings shared by all stages.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Restricts a pull without an explicit end page to a single page.
    pub dev_mode: bool,
    pub base_url: String,
    pub user_agent: String,
    /// Fixed delay before every page request.
    pub request_interval: Duration,
    /// Parameters sent with every request; the page index is added per request.
    pub base_query: Query,
    pub layout: DataLayout,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dev_mode: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: default_user_agent(),
            request_interval: DEFAULT_REQUEST_INTERVAL,
            base_query: Query::issues(),
            layout: DataLayout::new("data"),
        }
    }
}

impl Settings {
    /// Load settings from `.env` (if present) and the environment.
    ///
    /// # Errors
    /// Returns an error when a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        // A missing .env file is the common case.
        let _ = dotenvy::dotenv();

        let mut settings = Settings::default();
        if let Some(v) = env_var("ISSUEPIPE_DEV_MODE") {
            settings.dev_mode =
                parse_flag(&v).with_context(|| format!("parse ISSUEPIPE_DEV_MODE={v}"))?;
        }
        if let Some(v) = env_var("ISSUEPIPE_DATA_DIR") {
            settings.layout = DataLayout::new(v);
        }
        if let Some(v) = env_var("ISSUEPIPE_BASE_URL") {
            settings.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = env_var("ISSUEPIPE_REQUEST_INTERVAL_MS") {
            let ms: u64 = v
                .parse()
                .with_context(|| format!("parse ISSUEPIPE_REQUEST_INTERVAL_MS={v}"))?;
            settings.request_interval = Duration::from_millis(ms);
        }
        if let Some(v) = env_var("ISSUEPIPE_USER_AGENT") {
            settings.user_agent = v;
        }
        Ok(settings)
    }

    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.layout = DataLayout::new(dir);
        self
    }
}

/// Directory layout under one data root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataLayout {
    pub raw_dir: PathBuf,
    pub interim_dir: PathBuf,
    pub processed_dir: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            raw_dir: root.join("raw"),
            interim_dir: root.join("interim"),
            processed_dir: root.join("processed"),
        }
    }

    /// The merged CSV produced by the merge stage.
    #[must_use]
    pub fn interim_table(&self) -> PathBuf {
        self.interim_dir.join("merged.csv")
    }

    /// Default location of the converted Parquet file.
    #[must_use]
    pub fn columnar_output(&self) -> PathBuf {
        self.processed_dir.join("merged.parquet")
    }

    #[must_use]
    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }
}

fn default_user_agent() -> String {
    format!("issuepipe/{}", env!("CARGO_PKG_VERSION"))
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_hang_off_the_root() {
        let layout = DataLayout::new("/tmp/d");
        assert_eq!(layout.raw_dir, PathBuf::from("/tmp/d/raw"));
        assert_eq!(layout.interim_table(), PathBuf::from("/tmp/d/interim/merged.csv"));
        assert_eq!(
            layout.columnar_output(),
            PathBuf::from("/tmp/d/processed/merged.parquet")
        );
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag("TRUE").unwrap());
        assert!(parse_flag("1").unwrap());
        assert!(!parse_flag("off").unwrap());
        assert!(parse_flag("maybe").is_err());
    }
}
