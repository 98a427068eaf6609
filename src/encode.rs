//! Categorical Encoder: one-hot expansion with a deterministic layout.
//!
//! Each encoded column `c` is replaced, at its own position, by one `Int` 0/1 indicator
//! column per category, named `c_<category>` and ordered by sorted category label. The
//! layout is therefore a pure function of `(c, sorted categories)` and never of row
//! order.
//!
//! Categories come either from a fixed [`Vocabulary`] (configured per column) or are
//! fitted from the observed values. Only a fixed vocabulary can meet an unseen value,
//! and what happens then is the [`UnseenPolicy`]:
//!
//! | policy  | unseen value                                  | extra column  |
//! |---------|-----------------------------------------------|---------------|
//! | `Other` | `c__other` = 1                                | `c__other`    |
//! | `Zero`  | all indicators 0                              | none          |
//! | `Error` | [`EncodingError::UnseenCategory`]             | none          |
//!
//! Nulls are never a category: a null cell yields an all-zero indicator row. Under
//! `Other` the category `_other` is reserved in fixed vocabularies, since its
//! indicator would be named like the bucket.

use crate::error::EncodingError;
use crate::table::Table;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Suffix of the bucket column used by [`UnseenPolicy::Other`].
pub const OTHER_SUFFIX: &str = "__other";

/// Treatment of a category missing from a fixed vocabulary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnseenPolicy {
    Error,
    #[default]
    Other,
    Zero,
}

/// A fixed, sorted and de-duplicated category list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary(Vec<String>);

impl Vocabulary {
    pub fn new<S: Into<String>>(categories: impl IntoIterator<Item = S>) -> Self {
        let set: BTreeSet<String> = categories.into_iter().map(Into::into).collect();
        Self(set.into_iter().collect())
    }

    #[must_use]
    pub fn categories(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn contains(&self, category: &str) -> bool {
        self.0.binary_search_by(|c| c.as_str().cmp(category)).is_ok()
    }
}

impl From<Vec<String>> for Vocabulary {
    fn from(v: Vec<String>) -> Self {
        Self::new(v)
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(v: Vocabulary) -> Self {
        v.0
    }
}

/// Indicator column name for `category` of `column`.
#[must_use]
pub fn indicator_name(column: &str, category: &str) -> String {
    format!("{column}_{category}")
}

/// Bucket column for unseen values of `column` under [`UnseenPolicy::Other`].
#[must_use]
pub fn other_column(column: &str) -> String {
    format!("{column}{OTHER_SUFFIX}")
}

/// What happened to one encoded column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedColumn {
    pub column: String,
    pub indicators: Vec<String>,
    pub unseen_rows: usize,
}

#[derive(Clone, Debug, Default)]
pub struct CategoricalEncoder {
    unseen: UnseenPolicy,
    vocabularies: BTreeMap<String, Vocabulary>,
}

impl CategoricalEncoder {
    #[must_use]
    pub fn new(unseen: UnseenPolicy) -> Self {
        Self {
            unseen,
            vocabularies: BTreeMap::new(),
        }
    }

    /// Pin the categories of `column` instead of fitting them from data.
    #[must_use]
    pub fn with_vocabulary(mut self, column: impl Into<String>, vocabulary: Vocabulary) -> Self {
        self.vocabularies.insert(column.into(), vocabulary);
        self
    }

    #[must_use]
    pub const fn unseen_policy(&self) -> UnseenPolicy {
        self.unseen
    }

    /// Indicator layout for `column` given its categories. Pure; used by
    /// [`CategoricalEncoder::encode`] and by anyone predicting the output schema.
    #[must_use]
    pub fn layout(&self, column: &str, categories: &[String]) -> Vec<String> {
        let mut sorted: Vec<&String> = categories.iter().collect();
        sorted.sort();
        sorted.dedup();
        let mut names: Vec<String> = sorted.into_iter().map(|c| indicator_name(column, c)).collect();
        if self.vocabularies.contains_key(column) && self.unseen == UnseenPolicy::Other {
            names.push(other_column(column));
        }
        names
    }

    /// Replace each of `columns` present in `table` with its indicator columns.
    /// Absent columns and repeated names are skipped; other columns are untouched.
    ///
    /// # Errors
    /// [`EncodingError::UnseenCategory`] under [`UnseenPolicy::Error`], or
    /// [`EncodingError::ColumnCollision`] if an indicator name is already taken.
    pub fn encode(&self, mut table: Table, columns: &[String]) -> Result<(Table, Vec<EncodedColumn>), EncodingError> {
        let mut seen = BTreeSet::new();
        let mut encoded = Vec::new();
        for column in columns {
            if !seen.insert(column.as_str()) {
                continue;
            }
            if !table.has_column(column) {
                debug!(column = %column, "categorical column absent, skipping");
                continue;
            }
            encoded.push(self.encode_column(&mut table, column)?);
        }
        Ok((table, encoded))
    }

    fn encode_column(&self, table: &mut Table, column: &str) -> Result<EncodedColumn, EncodingError> {
        let labels: Vec<Option<String>> = table
            .column(column)
            .unwrap_or_default()
            .into_iter()
            .map(|v| (!v.is_null()).then(|| v.render()))
            .collect();

        let fixed = self.vocabularies.get(column);
        let categories: Vec<String> = match fixed {
            Some(vocab) => vocab.categories().to_vec(),
            None => labels
                .iter()
                .flatten()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };
        let names = self.layout(column, &categories);
        for name in &names {
            if name != column && table.has_column(name) {
                return Err(EncodingError::ColumnCollision(name.clone()));
            }
        }

        let with_other = names.len() > categories.len();
        let mut cells: Vec<Vec<Value>> = vec![Vec::with_capacity(labels.len()); names.len()];
        let mut unseen_rows = 0;
        for label in &labels {
            let hit = label
                .as_deref()
                .map(|l| categories.binary_search_by(|c| c.as_str().cmp(l)));
            let slot = match hit {
                None => None,
                Some(Ok(i)) => Some(i),
                Some(Err(_)) => {
                    unseen_rows += 1;
                    match self.unseen {
                        UnseenPolicy::Error => {
                            return Err(EncodingError::UnseenCategory {
                                column: column.to_string(),
                                value: label.clone().unwrap_or_default(),
                            });
                        }
                        UnseenPolicy::Other if with_other => Some(categories.len()),
                        UnseenPolicy::Other | UnseenPolicy::Zero => None,
                    }
                }
            };
            for (i, col) in cells.iter_mut().enumerate() {
                col.push(Value::Int(i64::from(slot == Some(i))));
            }
        }

        let Some(at) = table.column_index(column) else {
            return Err(EncodingError::ColumnCollision(column.to_string()));
        };
        table.drop_column(column);
        for (offset, (name, values)) in names.iter().zip(cells).enumerate() {
            table
                .insert_column(at + offset, name, values)
                .map_err(|_| EncodingError::ColumnCollision(name.clone()))?;
        }
        debug!(column = %column, indicators = names.len(), unseen_rows, "encoded categorical column");
        Ok(EncodedColumn {
            column: column.to_string(),
            indicators: names,
            unseen_rows,
        })
    }
}
