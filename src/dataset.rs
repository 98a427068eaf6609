//! Stage-typed datasets.
//!
//! A [`Dataset<S>`] is a [`Table`] tagged with the lifecycle stage that produced it.
//! Stages only advance through the engine, so a `Dataset<Encoded>` can only exist if the
//! normalize, feature and encode stages ran in order. Consumers can read the table
//! but cannot re-tag it.

use crate::sink::DatasetMetadata;
use crate::table::Table;
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;

/// Identifies one event-type pipeline.
///
/// `name` is the logical output name (`battles`) and keys the clean dataset;
/// `action` is the upstream event identifier (`BATTLE_END`) and keys the raw cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType {
    pub name: String,
    pub action: String,
}

impl EventType {
    pub fn new(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.action)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Marker trait for dataset lifecycle stages.
pub trait DatasetStage: sealed::Sealed {
    const NAME: &'static str;
}

macro_rules! stage_marker {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub struct $name;
        impl sealed::Sealed for $name {}
        impl DatasetStage for $name {
            const NAME: &'static str = $label;
        }
    };
}

stage_marker!(
    /// Straight from the cache or the source client.
    Raw,
    "raw"
);
stage_marker!(
    /// Nested payload columns decoded or marked unparseable.
    Normalized,
    "normalized"
);
stage_marker!(
    /// Business features applied.
    Featured,
    "featured"
);
stage_marker!(
    /// Categorical columns expanded to indicators.
    Encoded,
    "encoded"
);

#[derive(Clone, Debug, PartialEq)]
pub struct Dataset<S: DatasetStage> {
    event_type: EventType,
    table: Table,
    _stage: PhantomData<S>,
}

pub type RawDataset = Dataset<Raw>;
pub type NormalizedDataset = Dataset<Normalized>;
pub type FeatureDataset = Dataset<Featured>;
pub type EncodedDataset = Dataset<Encoded>;

impl<S: DatasetStage> Dataset<S> {
    pub(crate) const fn from_table(event_type: EventType, table: Table) -> Self {
        Self {
            event_type,
            table,
            _stage: PhantomData,
        }
    }

    #[must_use]
    pub const fn event_type(&self) -> &EventType {
        &self.event_type
    }

    #[must_use]
    pub const fn table(&self) -> &Table {
        &self.table
    }

    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.table.row_count()
    }

    #[must_use]
    pub const fn stage(&self) -> &'static str {
        S::NAME
    }

    #[must_use]
    pub fn into_parts(self) -> (EventType, Table) {
        (self.event_type, self.table)
    }
}

impl RawDataset {
    /// Wrap freshly extracted data. Raw is the only stage that can be built directly.
    #[must_use]
    pub const fn new(event_type: EventType, table: Table) -> Self {
        Self::from_table(event_type, table)
    }
}

/// An encoded dataset after it has been written by the sink.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistedDataset {
    pub event_type: EventType,
    pub table: Table,
    pub metadata: DatasetMetadata,
    pub path: PathBuf,
}

impl PersistedDataset {
    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.table.row_count()
    }
}
