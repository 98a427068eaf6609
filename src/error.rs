//! Error taxonomy for the pipeline stages.
//!
//! Fatal kinds abort a single event-type run and are recorded against it. Structural
//! parse problems are *not* errors: they surface as
//! [`StructuralParseWarning`](crate::normalize::StructuralParseWarning) diagnostics and
//! report-level problems ([`ReportBuildError`]) only drop the affected chart.

use std::path::PathBuf;
use thiserror::Error;

/// Column-level failures raised by [`Table`](crate::table::Table) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("column '{0}' not found")]
    MissingColumn(String),
    #[error("column '{0}' already exists")]
    DuplicateColumn(String),
    #[error("column '{column}' has {got} values but the table has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        got: usize,
    },
}

/// Failures at the Source Client boundary.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication rejected (HTTP {status})")]
    Auth { status: u16 },
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },
    #[error("could not decode response body: {0}")]
    Decode(String),
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    #[error("source not configured: {0}")]
    NotConfigured(String),
}

/// Raw data could be obtained neither from the cache nor from the source.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cache miss for '{event_type}' and fetch failed")]
    Fetch {
        event_type: String,
        #[source]
        source: SourceError,
    },
    #[error("cached artifact {} is unreadable and re-fetch failed", path.display())]
    CacheAndFetch {
        path: PathBuf,
        #[source]
        source: SourceError,
    },
}

/// Business-rule failure inside a feature policy; fatal to that event type only.
#[derive(Debug, Error)]
pub enum FeaturePolicyError {
    #[error("{0}")]
    Rule(String),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("row count changed from {before} to {after} without a declared filter")]
    RowCountChanged { before: usize, after: usize },
    #[error("declared filter '{filter}' added rows ({before} -> {after})")]
    FilterGrewRows {
        filter: String,
        before: usize,
        after: usize,
    },
    #[error("row identity was not preserved: {0}")]
    RowIdentity(String),
    #[error("feature policy panicked: {0}")]
    Panicked(String),
}

/// Categorical encoding failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("column '{column}' holds category '{value}' outside its fixed vocabulary")]
    UnseenCategory { column: String, value: String },
    #[error("indicator column '{0}' would overwrite an existing column")]
    ColumnCollision(String),
}

/// I/O failure while writing a cleaned dataset.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("writing {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("reading metadata {}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("dataset {} has schema version {found}, expected {expected}", path.display())]
    IncompatibleSchema {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

/// Failure to build one chart; contained to that chart.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportBuildError {
    #[error("chart '{chart}': column '{column}' not found")]
    MissingColumn { chart: String, column: String },
    #[error("chart '{chart}': column '{column}' has no numeric values")]
    NotNumeric { chart: String, column: String },
    #[error("chart '{chart}': {reason}")]
    Invalid { chart: String, reason: String },
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A fatal error for one event-type run.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    FeaturePolicy(#[from] FeaturePolicyError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("run cancelled")]
    Cancelled,
}
