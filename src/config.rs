//! Configuration.
//!
//! TOML with defaults everywhere, so an empty file is a valid config. Environment
//! variables are applied on top of the file by [`Config::load`].
//!
//! # Example
//!
//! ```toml
//! pipelines = ["battles", "deaths"]
//!
//! [api]
//! endpoint = "https://stats.example.net/api/events"
//! timeout_secs = 30
//!
//! [paths]
//! raw_dir = "data/raw"
//! clean_dir = "data/clean"
//! report_path = "data/reports/ai_training_report.html"
//!
//! [encoding]
//! default_columns = ["server_id"]
//! unseen = "other"
//!
//! [encoding.vocabularies]
//! server_id = ["eu1", "us1"]
//!
//! [execution]
//! mode = "parallel"
//! threads = 4
//!
//! [log]
//! level = "info"
//! format = "console"
//! ```
//!
//! | variable         | overrides                                  |
//! |------------------|--------------------------------------------|
//! | `API_URL`        | `api.endpoint`                             |
//! | `API_KEY`        | `api.api_key`                              |
//! | `RAW_DATA_DIR`   | `paths.raw_dir`                            |
//! | `CLEAN_DATA_DIR` | `paths.clean_dir`                          |
//! | `REPORT_DIR`     | directory of `paths.report_path`           |

use crate::encode::{self, CategoricalEncoder, UnseenPolicy, Vocabulary};
use crate::error::ConfigError;
use crate::report::ChartSpec;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Report file name used when only a report directory is given.
pub const REPORT_FILE_NAME: &str = "ai_training_report.html";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enabled event types by name, in run order. All built-ins when absent.
    pub pipelines: Option<Vec<String>>,
    pub api: ApiConfig,
    pub paths: PathsConfig,
    pub encoding: EncodingConfig,
    pub execution: ExecutionConfig,
    pub log: LogConfig,
    /// Chart overrides per event type name.
    pub charts: BTreeMap<String, Vec<ChartSpec>>,
}

/// Remote event-log API.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub endpoint: String,
    pub api_key: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// First retry delay; doubles on every further attempt.
    pub backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
            max_retries: 3,
            backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub clean_dir: PathBuf,
    pub report_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            clean_dir: PathBuf::from("data/clean"),
            report_path: PathBuf::from("data/reports").join(REPORT_FILE_NAME),
        }
    }
}

impl PathsConfig {
    /// Re-root every path under `base`.
    #[must_use]
    pub fn under(base: &Path) -> Self {
        Self {
            raw_dir: base.join("raw"),
            clean_dir: base.join("clean"),
            report_path: base.join("reports").join(REPORT_FILE_NAME),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EncodingConfig {
    /// Categorical columns encoded for every event type.
    pub default_columns: Vec<String>,
    pub unseen: UnseenPolicy,
    /// Fixed category lists; columns not listed are fitted from data.
    pub vocabularies: BTreeMap<String, Vocabulary>,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            default_columns: vec!["server_id".to_string()],
            unseen: UnseenPolicy::default(),
            vocabularies: BTreeMap::new(),
        }
    }
}

impl EncodingConfig {
    #[must_use]
    pub fn encoder(&self) -> CategoricalEncoder {
        self.vocabularies
            .iter()
            .fold(CategoricalEncoder::new(self.unseen), |enc, (col, vocab)| {
                enc.with_vocabulary(col.clone(), vocab.clone())
            })
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// Worker threads for parallel mode; logical CPUs when absent.
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Console,
    Json,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `pixelbeam=debug`. `RUST_LOG` wins.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Console,
        }
    }
}

impl Config {
    /// Read `path` (or use defaults when `None`), apply environment overrides, validate.
    ///
    /// # Errors
    /// Unreadable file, invalid TOML, or a failed [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without environment overrides.
    ///
    /// # Errors
    /// Unreadable file or invalid TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("API_URL") {
            self.api.endpoint = v;
        }
        if let Some(v) = lookup("API_KEY") {
            self.api.api_key = v;
        }
        if let Some(v) = lookup("RAW_DATA_DIR") {
            self.paths.raw_dir = v.into();
        }
        if let Some(v) = lookup("CLEAN_DATA_DIR") {
            self.paths.clean_dir = v.into();
        }
        if let Some(v) = lookup("REPORT_DIR") {
            let name = self
                .paths
                .report_path
                .file_name()
                .map_or_else(|| REPORT_FILE_NAME.into(), ToOwned::to_owned);
            self.paths.report_path = PathBuf::from(v).join(name);
        }
    }

    /// # Errors
    /// [`ConfigError::Invalid`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(col) = self.encoding.default_columns.iter().find(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "encoding.default_columns contains an empty name ({col:?})"
            )));
        }
        if let Some(names) = &self.pipelines {
            let mut seen = BTreeSet::new();
            if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
                return Err(ConfigError::Invalid(format!("pipeline '{dup}' listed twice")));
            }
        }
        if self.encoding.unseen == UnseenPolicy::Other {
            for (column, vocabulary) in &self.encoding.vocabularies {
                let bucket = encode::other_column(column);
                if let Some(c) = vocabulary.categories().iter().find(|c| encode::indicator_name(column, c) == bucket) {
                    return Err(ConfigError::Invalid(format!(
                        "encoding.vocabularies.{column} uses the reserved category '{c}'"
                    )));
                }
            }
        }
        if self.execution.threads == Some(0) {
            return Err(ConfigError::Invalid("execution.threads must be at least 1".to_string()));
        }
        if self.paths.report_path.file_name().is_none() {
            return Err(ConfigError::Invalid(format!(
                "paths.report_path '{}' has no file name",
                self.paths.report_path.display()
            )));
        }
        Ok(())
    }

    /// Create the raw, clean and report directories.
    ///
    /// # Errors
    /// Returns the first directory that cannot be created.
    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        use anyhow::Context;
        let report_dir = self.paths.report_path.parent().filter(|p| !p.as_os_str().is_empty());
        for dir in [Some(self.paths.raw_dir.as_path()), Some(self.paths.clean_dir.as_path()), report_dir]
            .into_iter()
            .flatten()
        {
            std::fs::create_dir_all(dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
        }
        Ok(())
    }

    /// Where run metrics are exported: next to the report.
    #[must_use]
    pub fn metrics_path(&self) -> PathBuf {
        let mut name = self.paths.report_path.clone().into_os_string();
        name.push(".metrics.json");
        PathBuf::from(name)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}
