//! Dataset Sink: cleaned CSV plus a schema sidecar per event type.
//!
//! Layout under the clean root:
//!
//! ```text
//! dataset_<name>_clean.csv        the encoded table
//! dataset_<name>_clean.meta.json  DatasetMetadata
//! ```
//!
//! Both files are replaced atomically, data first, so a reader never observes a
//! half-written dataset. The metadata carries [`SCHEMA_VERSION`] and a fingerprint of
//! the column layout; downstream consumers call [`check_compatible`] before loading.

use crate::dataset::{EncodedDataset, EventType, PersistedDataset};
use crate::error::PersistenceError;
use crate::io::atomic::write_atomic;
use crate::io::csv::write_table_csv;
use crate::table::Table;
use crate::value::Value;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;

/// Version of the cleaned-dataset format. Bump when the file layout or the meaning of
/// existing metadata fields changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Column type inferred from the non-null cells of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// No non-null cells.
    Null,
    Bool,
    Int,
    Float,
    String,
    /// Lists, maps, or unparseable payloads; serialized as JSON text.
    Json,
    Mixed,
}

impl ColumnType {
    fn of(v: &Value) -> Option<Self> {
        match v {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Bool),
            Value::Int(_) => Some(Self::Int),
            Value::Float(_) => Some(Self::Float),
            Value::Str(_) => Some(Self::String),
            Value::List(_) | Value::Map(_) | Value::Unparseable(_) => Some(Self::Json),
        }
    }

    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Null, x) | (x, Self::Null) => x,
            (Self::Int, Self::Float) | (Self::Float, Self::Int) => Self::Float,
            _ => Self::Mixed,
        }
    }

    /// Infer the type of one column.
    #[must_use]
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        values
            .into_iter()
            .filter_map(Self::of)
            .fold(Self::Null, Self::merge)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Sidecar written next to every cleaned dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub event_type: String,
    pub action: String,
    pub row_count: usize,
    pub schema_version: u32,
    pub columns: Vec<ColumnSchema>,
    pub schema_fingerprint: String,
    /// RFC 3339 write time.
    pub written_at: String,
}

impl DatasetMetadata {
    /// Describe `table` as the cleaned dataset for `event_type`.
    #[must_use]
    pub fn describe(event_type: &EventType, table: &Table) -> Self {
        let columns: Vec<ColumnSchema> = table
            .columns()
            .iter()
            .map(|name| ColumnSchema {
                name: name.clone(),
                column_type: ColumnType::infer(table.column(name).unwrap_or_default()),
            })
            .collect();
        Self {
            event_type: event_type.name.clone(),
            action: event_type.action.clone(),
            row_count: table.row_count(),
            schema_version: SCHEMA_VERSION,
            schema_fingerprint: schema_fingerprint(&columns),
            columns,
            written_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        }
    }
}

/// SHA-256 over `name:type` lines, hex encoded. Equal layouts give equal fingerprints.
#[must_use]
pub fn schema_fingerprint(columns: &[ColumnSchema]) -> String {
    let mut hasher = Sha256::new();
    for col in columns {
        let ty = serde_json::to_value(col.column_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        hasher.update(col.name.as_bytes());
        hasher.update(b":");
        hasher.update(ty.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Clone, Debug)]
pub struct DatasetSink {
    root: PathBuf,
}

impl DatasetSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn data_path(&self, event_type: &EventType) -> PathBuf {
        self.root.join(format!("dataset_{}_clean.csv", event_type.name))
    }

    #[must_use]
    pub fn metadata_path(&self, event_type: &EventType) -> PathBuf {
        self.root.join(format!("dataset_{}_clean.meta.json", event_type.name))
    }

    /// Write the encoded dataset and its metadata.
    ///
    /// # Errors
    /// [`PersistenceError::Write`] if either file cannot be written.
    pub fn persist(&self, dataset: EncodedDataset) -> Result<PersistedDataset, PersistenceError> {
        let (event_type, table) = dataset.into_parts();
        let path = self.data_path(&event_type);
        write_table_csv(&path, &table).map_err(|source| PersistenceError::Write {
            path: path.clone(),
            source,
        })?;

        let metadata = DatasetMetadata::describe(&event_type, &table);
        let meta_path = self.metadata_path(&event_type);
        write_atomic(&meta_path, |w| {
            serde_json::to_writer_pretty(&mut *w, &metadata).context("serialize metadata")
        })
        .map_err(|source| PersistenceError::Write {
            path: meta_path.clone(),
            source,
        })?;

        info!(
            event_type = %event_type.name,
            rows = table.row_count(),
            columns = table.column_count(),
            path = %path.display(),
            "saved cleaned dataset"
        );
        Ok(PersistedDataset {
            event_type,
            table,
            metadata,
            path,
        })
    }
}

/// Load a metadata sidecar.
///
/// # Errors
/// [`PersistenceError::Metadata`] if the file is missing or not valid metadata.
pub fn read_metadata(path: impl AsRef<Path>) -> Result<DatasetMetadata, PersistenceError> {
    let path = path.as_ref();
    let load = || -> anyhow::Result<DatasetMetadata> {
        let text = std::fs::read_to_string(path).with_context(|| format!("open {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
    };
    load().map_err(|source| PersistenceError::Metadata {
        path: path.to_path_buf(),
        source,
    })
}

/// Read the sidecar at `path` and require the current [`SCHEMA_VERSION`].
///
/// # Errors
/// [`PersistenceError::IncompatibleSchema`] on a version mismatch, or a read failure.
pub fn check_compatible(path: impl AsRef<Path>) -> Result<DatasetMetadata, PersistenceError> {
    let path = path.as_ref();
    let meta = read_metadata(path)?;
    if meta.schema_version != SCHEMA_VERSION {
        return Err(PersistenceError::IncompatibleSchema {
            path: path.to_path_buf(),
            found: meta.schema_version,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(meta)
}
