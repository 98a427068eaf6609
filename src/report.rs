//! Report Data Builder.
//!
//! Reduces a persisted dataset to [`ReportFragment`]s: one per [`ChartSpec`], holding
//! only strings and `f64`s so any renderer (the bundled [`html`] one included) can
//! consume them without knowing about [`Value`](crate::value::Value) or [`Table`].
//!
//! Containment rules:
//! - an empty dataset, or a filter that leaves nothing, gives an *empty* fragment;
//! - a broken chart (missing column, nothing numeric, bad spec) gives a
//!   [`ReportBuildError`], which [`build_fragments`] turns into an empty fragment with
//!   a note so the rest of the report is unaffected.
//!
//! The builder reads the table and never mutates it.

pub mod html;

use crate::dataset::PersistedDataset;
use crate::error::ReportBuildError;
use crate::io::atomic::write_atomic;
use crate::table::Table;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    HorizontalBar,
    Histogram,
    Pie,
    Indicator,
}

/// How a chart's numbers are computed from the table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "aggregate", rename_all = "snake_case")]
pub enum Aggregation {
    /// Row count per distinct value of `column` (nulls skipped), most frequent first.
    /// `fallback` is used when `column` does not exist.
    CountBy {
        column: String,
        #[serde(default)]
        fallback: Option<String>,
        #[serde(default)]
        top: Option<usize>,
    },
    /// Mean of numeric `value` per distinct `group`.
    MeanBy {
        group: String,
        value: String,
        #[serde(default)]
        descending: bool,
    },
    /// Equal-width histogram of numeric `column`.
    Histogram {
        column: String,
        bins: usize,
        /// Keep only values strictly greater than this.
        #[serde(default)]
        above: Option<f64>,
        /// Keep only values within this inclusive range; also fixes the bin edges.
        #[serde(default)]
        range: Option<(f64, f64)>,
    },
    /// Single number: sum of numeric `column`.
    Sum { column: String },
    /// Per-category totals read back from the one-hot indicators of an encoded
    /// `column` (`<column>_<category>`), most frequent first.
    CountIndicators { column: String },
}

/// One chart of an event type's report section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub id: String,
    pub title: String,
    pub kind: ChartKind,
    #[serde(flatten)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub x_label: String,
    #[serde(default)]
    pub y_label: String,
}

impl ChartSpec {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: ChartKind, aggregation: Aggregation) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            aggregation,
            x_label: String::new(),
            y_label: String::new(),
        }
    }

    #[must_use]
    pub fn labels(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x_label = x.into();
        self.y_label = y.into();
        self
    }

    pub fn count_by(column: impl Into<String>, top: Option<usize>) -> Aggregation {
        Aggregation::CountBy {
            column: column.into(),
            fallback: None,
            top,
        }
    }

    pub fn histogram(column: impl Into<String>, bins: usize) -> Aggregation {
        Aggregation::Histogram {
            column: column.into(),
            bins,
            above: None,
            range: None,
        }
    }
}

/// Data behind one chart: parallel `labels` / `values`, nothing else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportFragment {
    pub chart_id: String,
    pub title: String,
    pub kind: ChartKind,
    pub x_label: String,
    pub y_label: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ReportFragment {
    #[must_use]
    pub fn empty(spec: &ChartSpec) -> Self {
        Self {
            chart_id: spec.id.clone(),
            title: spec.title.clone(),
            kind: spec.kind,
            x_label: spec.x_label.clone(),
            y_label: spec.y_label.clone(),
            labels: Vec::new(),
            values: Vec::new(),
            note: None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Build one fragment from `table`.
///
/// # Errors
/// [`ReportBuildError`] when the chart cannot be computed at all; an empty table is not
/// an error.
pub fn build_fragment(table: &Table, spec: &ChartSpec) -> Result<ReportFragment, ReportBuildError> {
    let mut fragment = ReportFragment::empty(spec);
    let (labels, values) = match &spec.aggregation {
        Aggregation::CountBy { column, fallback, top } => {
            let column = pick_column(table, spec, column, fallback.as_deref())?;
            count_by(table, column, *top)
        }
        Aggregation::MeanBy {
            group,
            value,
            descending,
        } => {
            require(table, spec, group)?;
            require(table, spec, value)?;
            mean_by(table, spec, group, value, *descending)?
        }
        Aggregation::Histogram {
            column,
            bins,
            above,
            range,
        } => {
            require(table, spec, column)?;
            histogram(table, spec, column, *bins, *above, *range)?
        }
        Aggregation::Sum { column } => {
            require(table, spec, column)?;
            let nums = numeric(table, spec, column)?;
            if nums.is_empty() {
                (Vec::new(), Vec::new())
            } else {
                (vec!["total".to_string()], vec![nums.iter().sum()])
            }
        }
        Aggregation::CountIndicators { column } => count_indicators(table, spec, column)?,
    };
    fragment.labels = labels;
    fragment.values = values;
    Ok(fragment)
}

/// Build every chart for a persisted dataset, containing per-chart failures.
#[must_use]
pub fn build_fragments(dataset: &PersistedDataset, specs: &[ChartSpec]) -> (Vec<ReportFragment>, Vec<ReportBuildError>) {
    let mut fragments = Vec::with_capacity(specs.len());
    let mut errors = Vec::new();
    for spec in specs {
        match build_fragment(&dataset.table, spec) {
            Ok(f) => fragments.push(f),
            Err(e) => {
                warn!(event_type = %dataset.event_type.name, chart = %spec.id, error = %e, "chart skipped");
                let mut f = ReportFragment::empty(spec);
                f.note = Some(e.to_string());
                fragments.push(f);
                errors.push(e);
            }
        }
    }
    (fragments, errors)
}

fn require(table: &Table, spec: &ChartSpec, column: &str) -> Result<(), ReportBuildError> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(ReportBuildError::MissingColumn {
            chart: spec.id.clone(),
            column: column.to_string(),
        })
    }
}

fn pick_column<'a>(
    table: &Table,
    spec: &ChartSpec,
    column: &'a str,
    fallback: Option<&'a str>,
) -> Result<&'a str, ReportBuildError> {
    match fallback {
        Some(fb) if !table.has_column(column) && table.has_column(fb) => Ok(fb),
        _ => require(table, spec, column).map(|()| column),
    }
}

/// Numeric cells of `column`. A non-empty column with no numeric cell is an error.
fn numeric(table: &Table, spec: &ChartSpec, column: &str) -> Result<Vec<f64>, ReportBuildError> {
    let cells = table.column(column).unwrap_or_default();
    let nums: Vec<f64> = cells.iter().filter_map(|v| v.coerce_f64()).collect();
    if nums.is_empty() && cells.iter().any(|v| !v.is_null()) {
        return Err(ReportBuildError::NotNumeric {
            chart: spec.id.clone(),
            column: column.to_string(),
        });
    }
    Ok(nums)
}

#[allow(clippy::cast_precision_loss)]
fn count_by(table: &Table, column: &str, top: Option<usize>) -> (Vec<String>, Vec<f64>) {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for v in table.column(column).unwrap_or_default() {
        if !v.is_null() {
            *counts.entry(v.render()).or_default() += 1;
        }
    }
    let mut pairs: Vec<(String, usize)> = counts.into_iter().collect();
    // BTreeMap order breaks ties alphabetically; the sort is stable.
    pairs.sort_by(|a, b| b.1.cmp(&a.1));
    if let Some(k) = top {
        pairs.truncate(k);
    }
    pairs.into_iter().map(|(l, c)| (l, c as f64)).unzip()
}

/// Indicator columns are found by name prefix; the bucket column of the unseen
/// policy is reported as `other`.
fn count_indicators(table: &Table, spec: &ChartSpec, column: &str) -> Result<(Vec<String>, Vec<f64>), ReportBuildError> {
    if table.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let prefix = format!("{column}_");
    let mut pairs: Vec<(String, f64)> = Vec::new();
    for name in table.columns() {
        let Some(category) = name.strip_prefix(&prefix) else {
            continue;
        };
        let category = category.strip_prefix('_').unwrap_or(category);
        let total = table
            .column(name)
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v.coerce_f64())
            .sum();
        pairs.push((category.to_string(), total));
    }
    if pairs.is_empty() {
        return Err(ReportBuildError::MissingColumn {
            chart: spec.id.clone(),
            column: format!("{prefix}*"),
        });
    }
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(pairs.into_iter().unzip())
}

#[allow(clippy::cast_precision_loss)]
fn mean_by(
    table: &Table,
    spec: &ChartSpec,
    group: &str,
    value: &str,
    descending: bool,
) -> Result<(Vec<String>, Vec<f64>), ReportBuildError> {
    let mut acc: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut any_value = false;
    for row in table.rows() {
        let v = row.get_or_null(value);
        any_value |= !v.is_null();
        let (g, Some(x)) = (row.get_or_null(group), v.coerce_f64()) else {
            continue;
        };
        if g.is_null() {
            continue;
        }
        let slot = acc.entry(g.render()).or_insert((0.0, 0));
        slot.0 += x;
        slot.1 += 1;
    }
    if acc.is_empty() && any_value {
        return Err(ReportBuildError::NotNumeric {
            chart: spec.id.clone(),
            column: value.to_string(),
        });
    }
    let mut pairs: Vec<(String, f64)> = acc
        .into_iter()
        .map(|(g, (sum, n))| (g, sum / n as f64))
        .collect();
    if descending {
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
    }
    Ok(pairs.into_iter().unzip())
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn histogram(
    table: &Table,
    spec: &ChartSpec,
    column: &str,
    bins: usize,
    above: Option<f64>,
    range: Option<(f64, f64)>,
) -> Result<(Vec<String>, Vec<f64>), ReportBuildError> {
    if bins == 0 {
        return Err(ReportBuildError::Invalid {
            chart: spec.id.clone(),
            reason: "histogram needs at least one bin".to_string(),
        });
    }
    if let Some((lo, hi)) = range
        && lo > hi
    {
        return Err(ReportBuildError::Invalid {
            chart: spec.id.clone(),
            reason: format!("empty range [{lo}, {hi}]"),
        });
    }
    let nums: Vec<f64> = numeric(table, spec, column)?
        .into_iter()
        .filter(|x| above.is_none_or(|a| *x > a))
        .filter(|x| range.is_none_or(|(lo, hi)| (lo..=hi).contains(x)))
        .collect();
    if nums.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let (lo, hi) = range.unwrap_or_else(|| {
        nums.iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(*x), hi.max(*x)))
    });
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };
    let mut counts = vec![0.0; bins];
    for x in nums {
        let idx = (((x - lo) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1.0;
    }
    let labels = (0..bins)
        .map(|i| {
            let start = lo + width * i as f64;
            format!("{}..{}", short(start), short(start + width))
        })
        .collect();
    Ok((labels, counts))
}

fn short(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e12 {
        format!("{x:.0}")
    } else {
        format!("{x:.2}")
    }
}

/// Per-event-type block of the consolidated report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub event_type: String,
    pub action: String,
    /// Final run state, e.g. `REPORTED` or `FAILED(feature_engineering)`.
    pub status: String,
    #[serde(default)]
    pub rows: Option<usize>,
    #[serde(default)]
    pub error: Option<String>,
    pub fragments: Vec<ReportFragment>,
}

/// The consolidated report: sections in configured order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub generated_at: String,
    pub sections: Vec<ReportSection>,
}

impl Report {
    #[must_use]
    pub fn new(title: impl Into<String>, sections: Vec<ReportSection>) -> Self {
        Self {
            title: title.into(),
            generated_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            sections,
        }
    }

    /// Plain JSON form, as embedded in the HTML.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Render to a self-contained HTML file, atomically.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_html(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let html = html::render(self);
        write_atomic(path, |w| {
            w.write_all(html.as_bytes())
                .with_context(|| format!("write {}", path.display()))
        })?;
        info!(path = %path.display(), sections = self.sections.len(), "report generated");
        Ok(())
    }
}
