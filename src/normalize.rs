//! Structural normalization of serialized nested payloads.
//!
//! Upstream exporters write nested objects into string columns in more than one
//! dialect. The [`StructuralNormalizer`] decodes each targeted cell with an ordered
//! [`ParserChain`]:
//!
//! 1. [`StrictJson`]: standard JSON;
//! 2. [`LiteralDialect`]: quote-inconsistent literal syntax (see [`crate::literal`]);
//! 3. no parser succeeded: the cell becomes [`Value::Unparseable`] holding the raw text.
//!
//! Only objects and arrays count as a successful decode. Rows are never dropped and
//! decoding never fails the batch; failures are counted per column and returned as
//! [`StructuralParseWarning`]s.
//!
//! Empty strings, nulls and cells that already hold native structures (or the marker)
//! pass through untouched, which makes [`StructuralNormalizer::normalize`] idempotent.
//!
//! # Flattening
//! A column configured with [`NestedColumn::flatten`] additionally has its map keys
//! expanded into top-level columns (nested paths joined with `.`), inserted in sorted
//! key order where the source column was. Keys that would collide with an existing
//! column are skipped. The source column is dropped afterwards unless it still holds
//! unparseable markers, in which case it is kept so the failures stay visible.

use crate::literal::parse_literal;
use crate::table::Table;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Maximum number of raw samples kept per warning.
const WARNING_SAMPLES: usize = 3;
/// Raw samples are truncated to this many characters.
const SAMPLE_CHARS: usize = 80;

/// One decoding strategy in a [`ParserChain`].
pub trait NestedParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode `text`, or `None` if this dialect does not apply.
    fn parse(&self, text: &str) -> Option<Value>;
}

/// Standard JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrictJson;

impl NestedParser for StrictJson {
    fn name(&self) -> &'static str {
        "strict_json"
    }

    fn parse(&self, text: &str) -> Option<Value> {
        serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .map(Value::from_json)
    }
}

/// Single-quoted / keyword-flavoured literal syntax.
#[derive(Clone, Copy, Debug, Default)]
pub struct LiteralDialect;

impl NestedParser for LiteralDialect {
    fn name(&self) -> &'static str {
        "literal"
    }

    fn parse(&self, text: &str) -> Option<Value> {
        parse_literal(text).ok()
    }
}

/// Ordered list of parsers tried until one yields a structure.
pub struct ParserChain {
    parsers: Vec<Box<dyn NestedParser>>,
}

impl Default for ParserChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl ParserChain {
    /// Strict JSON first, then the literal dialect.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            parsers: vec![Box::new(StrictJson), Box::new(LiteralDialect)],
        }
    }

    /// Append a parser, tried after the existing ones.
    #[must_use]
    pub fn with(mut self, parser: impl NestedParser + 'static) -> Self {
        self.parsers.push(Box::new(parser));
        self
    }

    /// Decode one serialized payload, returning the structure and the parser that won.
    #[must_use]
    pub fn decode(&self, text: &str) -> Option<(Value, &'static str)> {
        self.parsers.iter().find_map(|p| {
            p.parse(text)
                .filter(Value::is_nested)
                .map(|v| (v, p.name()))
        })
    }
}

/// A column expected to hold serialized nested values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedColumn {
    pub name: String,
    #[serde(default)]
    pub flatten: bool,
}

impl NestedColumn {
    /// Decode in place, keeping the column.
    pub fn keep(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flatten: false,
        }
    }

    /// Decode and expand map keys into top-level columns.
    pub fn flatten(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flatten: true,
        }
    }
}

/// Per-column decoding statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ColumnParseStats {
    /// Cells decoded from text, keyed by the parser that succeeded.
    pub decoded: BTreeMap<String, usize>,
    /// Empty, null or already-native cells left as they were.
    pub passed_through: usize,
    /// Cells holding the unparseable marker after normalization.
    pub failed: usize,
    /// Columns produced by flattening.
    pub flattened_into: Vec<String>,
}

impl ColumnParseStats {
    #[must_use]
    pub fn decoded_total(&self) -> usize {
        self.decoded.values().sum()
    }
}

/// Warning-level diagnostic: a column had cells no parser could decode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StructuralParseWarning {
    pub column: String,
    pub failures: usize,
    /// Up to a few row indices that failed.
    pub rows: Vec<usize>,
    /// Truncated raw text of the first few failures.
    pub samples: Vec<String>,
}

/// Everything the normalizer learned about one table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationReport {
    pub columns: BTreeMap<String, ColumnParseStats>,
    pub warnings: Vec<StructuralParseWarning>,
}

impl NormalizationReport {
    #[must_use]
    pub fn total_failures(&self) -> usize {
        self.columns.values().map(|c| c.failed).sum()
    }
}

/// Decodes configured nested columns with a [`ParserChain`].
#[derive(Default)]
pub struct StructuralNormalizer {
    chain: ParserChain,
}

impl StructuralNormalizer {
    #[must_use]
    pub const fn new(chain: ParserChain) -> Self {
        Self { chain }
    }

    #[must_use]
    pub const fn chain(&self) -> &ParserChain {
        &self.chain
    }

    /// Normalize the configured columns of `table`. Unconfigured columns are untouched
    /// and configured columns that are absent are skipped.
    #[must_use]
    pub fn normalize(&self, mut table: Table, columns: &[NestedColumn]) -> (Table, NormalizationReport) {
        let mut report = NormalizationReport::default();
        for spec in columns {
            if !table.has_column(&spec.name) {
                debug!(column = %spec.name, "nested column absent, skipping");
                continue;
            }
            let mut stats = ColumnParseStats::default();
            let mut failed_rows = Vec::new();
            let mut samples = Vec::new();
            let mut row = 0usize;
            table.map_column(&spec.name, |cell| {
                let out = self.decode_cell(cell, &mut stats);
                if let Value::Unparseable(raw) = &out {
                    stats.failed += 1;
                    if failed_rows.len() < WARNING_SAMPLES {
                        failed_rows.push(row);
                        samples.push(raw.chars().take(SAMPLE_CHARS).collect());
                    }
                }
                row += 1;
                out
            });

            if spec.flatten {
                stats.flattened_into = flatten_column(&mut table, &spec.name);
                if stats.failed == 0 {
                    table.drop_column(&spec.name);
                }
            }

            if stats.failed > 0 {
                report.warnings.push(StructuralParseWarning {
                    column: spec.name.clone(),
                    failures: stats.failed,
                    rows: failed_rows,
                    samples,
                });
            }
            report.columns.insert(spec.name.clone(), stats);
        }
        (table, report)
    }

    fn decode_cell(&self, cell: &Value, stats: &mut ColumnParseStats) -> Value {
        match cell {
            Value::Str(text) if text.trim().is_empty() => {
                stats.passed_through += 1;
                cell.clone()
            }
            Value::Str(text) => match self.chain.decode(text.trim()) {
                Some((decoded, parser)) => {
                    *stats.decoded.entry(parser.to_string()).or_default() += 1;
                    decoded
                }
                None => Value::Unparseable(text.clone()),
            },
            Value::Null | Value::List(_) | Value::Map(_) | Value::Unparseable(_) => {
                stats.passed_through += 1;
                cell.clone()
            }
            // A scalar where a serialized structure was expected.
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => Value::Unparseable(cell.render()),
        }
    }
}

/// Expand map cells of `column` into new columns; returns the names added.
fn flatten_column(table: &mut Table, column: &str) -> Vec<String> {
    let Some(cells) = table.column(column) else {
        return Vec::new();
    };
    let flat_rows: Vec<BTreeMap<String, Value>> = cells
        .into_iter()
        .map(|cell| {
            let mut out = BTreeMap::new();
            if let Value::Map(m) = cell {
                flatten_into(&mut out, None, m);
            }
            out
        })
        .collect();

    let keys: BTreeSet<&String> = flat_rows.iter().flat_map(BTreeMap::keys).collect();
    let new_columns: Vec<String> = keys
        .into_iter()
        .filter(|k| !table.has_column(k))
        .cloned()
        .collect();

    let mut at = table.column_index(column).map_or(table.column_count(), |i| i + 1);
    for name in &new_columns {
        let values = flat_rows
            .iter()
            .map(|r| r.get(name).cloned().unwrap_or_default())
            .collect();
        // names were filtered for collisions and lengths match by construction
        if table.insert_column(at, name, values).is_ok() {
            at += 1;
        }
    }
    new_columns
}

fn flatten_into(out: &mut BTreeMap<String, Value>, prefix: Option<&str>, map: &BTreeMap<String, Value>) {
    for (k, v) in map {
        let key = prefix.map_or_else(|| k.clone(), |p| format!("{p}.{k}"));
        match v {
            Value::Map(inner) if !inner.is_empty() => flatten_into(out, Some(&key), inner),
            _ => {
                out.insert(key, v.clone());
            }
        }
    }
}
