//! Extraction Cache: on-disk raw datasets keyed by event type.
//!
//! One artifact per event type lives at `<root>/dataset_<ACTION>_raw.jsonl` in the
//! table JSONL form of [`crate::io::jsonl`], which round-trips nested values and the
//! unparseable marker losslessly.
//!
//! Lookup order inside [`ExtractionCache::get_or_fetch`]:
//! 1. the in-process memo (so a process fetches each event type at most once),
//! 2. the on-disk artifact,
//! 3. the fetch callback, whose non-empty result is written through.
//!
//! There is no expiry. Artifacts go away only through [`ExtractionCache::invalidate`].

use crate::dataset::{EventType, RawDataset};
use crate::error::{ExtractionError, SourceError};
use crate::io::jsonl::{read_table_jsonl, write_table_jsonl};
use crate::table::{EventRecord, Table};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Where an extracted dataset came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractOrigin {
    Memory,
    Disk,
    Network,
}

impl ExtractOrigin {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Network => "network",
        }
    }
}

#[derive(Debug)]
pub struct ExtractionCache {
    root: PathBuf,
    memo: Mutex<HashMap<String, Table>>,
}

impl ExtractionCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the artifact for `event_type`.
    #[must_use]
    pub fn artifact_path(&self, event_type: &EventType) -> PathBuf {
        self.root.join(format!("dataset_{}_raw.jsonl", event_type.action))
    }

    #[must_use]
    pub fn is_cached(&self, event_type: &EventType) -> bool {
        self.artifact_path(event_type).is_file()
    }

    /// Return the cached raw dataset for `event_type`, or call `fetch` and cache it.
    ///
    /// # Errors
    /// [`ExtractionError::Fetch`] when nothing is cached and `fetch` fails;
    /// [`ExtractionError::CacheAndFetch`] when the artifact is unreadable and the
    /// re-fetch fails too.
    pub fn get_or_fetch<F>(&self, event_type: &EventType, fetch: F) -> Result<RawDataset, ExtractionError>
    where
        F: FnOnce() -> Result<Vec<EventRecord>, SourceError>,
    {
        self.get_or_fetch_traced(event_type, fetch).map(|(ds, _)| ds)
    }

    /// [`ExtractionCache::get_or_fetch`], also reporting where the data came from.
    ///
    /// # Errors
    /// See [`ExtractionCache::get_or_fetch`].
    pub fn get_or_fetch_traced<F>(
        &self,
        event_type: &EventType,
        fetch: F,
    ) -> Result<(RawDataset, ExtractOrigin), ExtractionError>
    where
        F: FnOnce() -> Result<Vec<EventRecord>, SourceError>,
    {
        if let Some(table) = self.memo_get(event_type) {
            debug!(event_type = %event_type.name, "raw dataset served from memory");
            return Ok((RawDataset::new(event_type.clone(), table), ExtractOrigin::Memory));
        }

        let path = self.artifact_path(event_type);
        let mut corrupt = false;
        if path.is_file() {
            match read_table_jsonl(&path) {
                Ok(table) => {
                    info!(
                        event_type = %event_type.name,
                        rows = table.row_count(),
                        path = %path.display(),
                        "loaded raw dataset from cache"
                    );
                    self.memo_put(event_type, table.clone());
                    return Ok((RawDataset::new(event_type.clone(), table), ExtractOrigin::Disk));
                }
                Err(e) => {
                    warn!(
                        event_type = %event_type.name,
                        path = %path.display(),
                        error = format!("{e:#}"),
                        "cached artifact is unreadable, re-fetching"
                    );
                    corrupt = true;
                }
            }
        }

        let records = fetch().map_err(|source| {
            if corrupt {
                ExtractionError::CacheAndFetch {
                    path: path.clone(),
                    source,
                }
            } else {
                ExtractionError::Fetch {
                    event_type: event_type.name.clone(),
                    source,
                }
            }
        })?;
        let table = Table::from_records(&records);

        if table.is_empty() {
            // Nothing on disk, so the next process asks the source again.
            info!(event_type = %event_type.name, "source returned no events; not caching");
        } else if let Err(e) = write_table_jsonl(&path, &table) {
            warn!(
                event_type = %event_type.name,
                path = %path.display(),
                error = format!("{e:#}"),
                "could not write cache artifact"
            );
        } else {
            info!(
                event_type = %event_type.name,
                rows = table.row_count(),
                path = %path.display(),
                "cached raw dataset"
            );
        }
        self.memo_put(event_type, table.clone());
        Ok((RawDataset::new(event_type.clone(), table), ExtractOrigin::Network))
    }

    /// Drop the artifact and memo entry for `event_type`.
    ///
    /// # Returns
    /// `true` if an artifact was deleted.
    ///
    /// # Errors
    /// Returns an error if the artifact exists but cannot be removed.
    pub fn invalidate(&self, event_type: &EventType) -> Result<bool> {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&event_type.action);
        let path = self.artifact_path(event_type);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        info!(event_type = %event_type.name, path = %path.display(), "cache invalidated");
        Ok(true)
    }

    fn memo_get(&self, event_type: &EventType) -> Option<Table> {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event_type.action)
            .cloned()
    }

    fn memo_put(&self, event_type: &EventType, table: Table) {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event_type.action.clone(), table);
    }
}
