//! The fixed event-type lifecycle.
//!
//! [`run`] drives one [`EventPipeline`] through
//! extract → normalize → feature engineering → encode → persist → report and never
//! returns an error: a fatal failure in any stage ends the run in
//! [`RunState::Failed`] and is recorded on the returned [`PipelineOutcome`], so the
//! orchestrator can carry on with the other event types.
//!
//! ```text
//! PENDING → EXTRACTED → NORMALIZED → FEATURED → ENCODED → PERSISTED → REPORTED
//!    └──────────┴───────────┴──────────┴─────────┴──────────┴──→ FAILED(stage)
//! ```

use crate::cache::ExtractOrigin;
use crate::context::RunContext;
use crate::dataset::{EncodedDataset, EventType, FeatureDataset, NormalizedDataset, PersistedDataset, RawDataset};
use crate::error::{FeaturePolicyError, StageError};
use crate::normalize::NormalizationReport;
use crate::policy::{EventPipeline, FeaturePolicy};
use crate::report::{ReportFragment, ReportSection, build_fragments};
use crate::value::Value;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// Hidden column used to check that a feature policy kept row identity.
pub const ROW_ID_COLUMN: &str = "__row_id";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Normalize,
    FeatureEngineering,
    Encode,
    Persist,
    Report,
}

impl Stage {
    pub const ALL: [Self; 6] = [
        Self::Extract,
        Self::Normalize,
        Self::FeatureEngineering,
        Self::Encode,
        Self::Persist,
        Self::Report,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Normalize => "normalize",
            Self::FeatureEngineering => "feature_engineering",
            Self::Encode => "encode",
            Self::Persist => "persist",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-event-type run state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Extracted,
    Normalized,
    Featured,
    Encoded,
    Persisted,
    Reported,
    Failed(Stage),
}

impl RunState {
    /// The stage that must run next, or `None` in a terminal state.
    #[must_use]
    pub const fn next_stage(self) -> Option<Stage> {
        match self {
            Self::Pending => Some(Stage::Extract),
            Self::Extracted => Some(Stage::Normalize),
            Self::Normalized => Some(Stage::FeatureEngineering),
            Self::Featured => Some(Stage::Encode),
            Self::Encoded => Some(Stage::Persist),
            Self::Persisted => Some(Stage::Report),
            Self::Reported | Self::Failed(_) => None,
        }
    }

    /// State reached once `stage` completes.
    #[must_use]
    pub const fn after(stage: Stage) -> Self {
        match stage {
            Stage::Extract => Self::Extracted,
            Stage::Normalize => Self::Normalized,
            Stage::FeatureEngineering => Self::Featured,
            Stage::Encode => Self::Encoded,
            Stage::Persist => Self::Persisted,
            Stage::Report => Self::Reported,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.next_stage().is_none()
    }

    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("PENDING"),
            Self::Extracted => f.write_str("EXTRACTED"),
            Self::Normalized => f.write_str("NORMALIZED"),
            Self::Featured => f.write_str("FEATURED"),
            Self::Encoded => f.write_str("ENCODED"),
            Self::Persisted => f.write_str("PERSISTED"),
            Self::Reported => f.write_str("REPORTED"),
            Self::Failed(stage) => write!(f, "FAILED({stage})"),
        }
    }
}

/// What one [`run`] produced.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub event_type: EventType,
    pub state: RunState,
    /// Set exactly when `state` is [`RunState::Failed`].
    pub error: Option<StageError>,
    pub origin: Option<ExtractOrigin>,
    pub normalization: NormalizationReport,
    pub persisted: Option<PersistedDataset>,
    pub fragments: Vec<ReportFragment>,
    /// Charts that could not be built; their fragments are empty.
    pub chart_errors: usize,
}

impl PipelineOutcome {
    fn pending(event_type: EventType) -> Self {
        Self {
            event_type,
            state: RunState::Pending,
            error: None,
            origin: None,
            normalization: NormalizationReport::default(),
            persisted: None,
            fragments: Vec::new(),
            chart_errors: 0,
        }
    }

    fn advance(&mut self, stage: Stage) {
        debug_assert_eq!(self.state.next_stage(), Some(stage), "out-of-order stage");
        let next = RunState::after(stage);
        debug!(event_type = %self.event_type.name, from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    fn fail(&mut self, stage: Stage, error: StageError) {
        debug!(event_type = %self.event_type.name, from = %self.state, to = %RunState::Failed(stage), "state transition");
        self.state = RunState::Failed(stage);
        self.error = Some(error);
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.state.is_failed()
    }

    /// Rows in the persisted dataset, if the run got that far.
    #[must_use]
    pub fn rows(&self) -> Option<usize> {
        self.persisted.as_ref().map(PersistedDataset::row_count)
    }

    /// This outcome as a block of the consolidated report.
    #[must_use]
    pub fn to_section(&self) -> ReportSection {
        ReportSection {
            event_type: self.event_type.name.clone(),
            action: self.event_type.action.clone(),
            status: self.state.to_string(),
            rows: self.rows(),
            error: self.error.as_ref().map(|e| format!("{e:#}")),
            fragments: self.fragments.clone(),
        }
    }
}

type Failure = (Stage, StageError);

/// Run `pipeline` to a terminal state.
#[must_use]
pub fn run(ctx: &RunContext, pipeline: &EventPipeline) -> PipelineOutcome {
    let span = info_span!("pipeline", event_type = %pipeline.name());
    let _enter = span.enter();

    let mut outcome = PipelineOutcome::pending(pipeline.event_type.clone());
    let started = Instant::now();
    match drive(ctx, pipeline, &mut outcome) {
        Ok(()) => {
            ctx.metrics.increment_counter("pipelines_reported", 1);
            info!(
                state = %outcome.state,
                rows = outcome.rows().unwrap_or(0),
                elapsed_ms = started.elapsed().as_millis(),
                "pipeline finished"
            );
        }
        Err((stage, err)) => {
            ctx.metrics.increment_counter("pipelines_failed", 1);
            error!(stage = %stage, error = format!("{err:#}"), "pipeline failed");
            outcome.fail(stage, err);
        }
    }
    outcome
}

fn drive(ctx: &RunContext, pipeline: &EventPipeline, outcome: &mut PipelineOutcome) -> Result<(), Failure> {
    let name = pipeline.name().to_string();

    let (raw, origin) = step(ctx, &name, Stage::Extract, || extract(ctx, pipeline))?;
    outcome.origin = Some(origin);
    outcome.advance(Stage::Extract);

    let (normalized, report) = step(ctx, &name, Stage::Normalize, || Ok(normalize(ctx, pipeline, raw)))?;
    outcome.normalization = report;
    outcome.advance(Stage::Normalize);

    let featured = step(ctx, &name, Stage::FeatureEngineering, || {
        engineer(pipeline.policy.as_ref(), normalized).map_err(StageError::from)
    })?;
    outcome.advance(Stage::FeatureEngineering);

    let encoded = step(ctx, &name, Stage::Encode, || encode(ctx, pipeline, featured))?;
    outcome.advance(Stage::Encode);

    let persisted = step(ctx, &name, Stage::Persist, || ctx.sink.persist(encoded).map_err(StageError::from))?;
    outcome.advance(Stage::Persist);

    let report = step(ctx, &name, Stage::Report, || {
        let (fragments, errors) = build_fragments(&persisted, &pipeline.charts);
        Ok((fragments, errors.len()))
    });
    // Persisted output is kept even if the run stops here.
    outcome.persisted = Some(persisted);
    let (fragments, chart_errors) = report?;
    outcome.fragments = fragments;
    outcome.chart_errors = chart_errors;
    outcome.advance(Stage::Report);
    Ok(())
}

/// Check for cancellation, run one stage and record its timing.
fn step<T>(
    ctx: &RunContext,
    event: &str,
    stage: Stage,
    f: impl FnOnce() -> Result<T, StageError>,
) -> Result<T, Failure> {
    if ctx.cancel.is_cancelled() {
        return Err((stage, StageError::Cancelled));
    }
    let started = Instant::now();
    let out = f().map_err(|e| (stage, e));
    ctx.metrics
        .record_timing(&format!("stage_ms.{event}.{stage}"), started.elapsed());
    out
}

fn extract(ctx: &RunContext, pipeline: &EventPipeline) -> Result<(RawDataset, ExtractOrigin), StageError> {
    let event_type = &pipeline.event_type;
    let (raw, origin) = ctx
        .cache
        .get_or_fetch_traced(event_type, || ctx.source.fetch(event_type, &pipeline.fetch))?;
    let name = &event_type.name;
    ctx.metrics
        .set_counter(&format!("rows_extracted.{name}"), raw.row_count() as u64);
    if origin != ExtractOrigin::Network {
        ctx.metrics.increment_counter("cache_hits", 1);
    }
    info!(rows = raw.row_count(), origin = origin.as_str(), "extracted");
    Ok((raw, origin))
}

fn normalize(ctx: &RunContext, pipeline: &EventPipeline, raw: RawDataset) -> (NormalizedDataset, NormalizationReport) {
    let (event_type, table) = raw.into_parts();
    let (table, report) = ctx.normalizer.normalize(table, &pipeline.nested_columns);
    for warning in &report.warnings {
        warn!(
            column = %warning.column,
            failures = warning.failures,
            rows = ?warning.rows,
            samples = ?warning.samples,
            "nested values could not be parsed; kept as unparseable markers"
        );
        ctx.metrics.increment_counter(
            &format!("parse_failures.{}.{}", event_type.name, warning.column),
            warning.failures as u64,
        );
    }
    (NormalizedDataset::from_table(event_type, table), report)
}

/// Apply `policy`, holding it to the row contract.
///
/// # Errors
/// The policy's own error, a panic inside it, or a broken row contract.
pub fn engineer(policy: &dyn FeaturePolicy, dataset: NormalizedDataset) -> Result<FeatureDataset, FeaturePolicyError> {
    let (event_type, mut table) = dataset.into_parts();
    let before = table.row_count();
    let ids = (0..before).map(Value::from).collect();
    table.insert_column(table.column_count(), ROW_ID_COLUMN, ids)?;

    let mut table = catch_unwind(AssertUnwindSafe(|| policy.engineer(table)))
        .map_err(|payload| FeaturePolicyError::Panicked(panic_message(payload.as_ref())))??;

    let after = table.row_count();
    match policy.declared_filter() {
        None if after != before => return Err(FeaturePolicyError::RowCountChanged { before, after }),
        Some(filter) if after > before => {
            return Err(FeaturePolicyError::FilterGrewRows {
                filter: filter.to_string(),
                before,
                after,
            });
        }
        Some(filter) if after < before => {
            info!(filter, dropped = before - after, kept = after, "declared filter removed rows");
        }
        _ => {}
    }

    let ids = table
        .drop_column(ROW_ID_COLUMN)
        .ok_or_else(|| FeaturePolicyError::RowIdentity(format!("column '{ROW_ID_COLUMN}' was removed")))?;
    check_row_ids(&ids, before)?;
    Ok(FeatureDataset::from_table(event_type, table))
}

/// Surviving row ids must be a strictly increasing subsequence of `0..before`, so rows
/// were neither reordered, duplicated nor replaced.
fn check_row_ids(ids: &[Value], before: usize) -> Result<(), FeaturePolicyError> {
    let mut last: Option<i64> = None;
    for (pos, id) in ids.iter().enumerate() {
        let Value::Int(id) = *id else {
            return Err(FeaturePolicyError::RowIdentity(format!("row {pos} lost its id")));
        };
        let in_range = usize::try_from(id).is_ok_and(|i| i < before);
        if !in_range || last.is_some_and(|l| id <= l) {
            return Err(FeaturePolicyError::RowIdentity(format!(
                "row {pos} carries id {id}; rows were reordered, duplicated or invented"
            )));
        }
        last = Some(id);
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

fn encode(ctx: &RunContext, pipeline: &EventPipeline, dataset: FeatureDataset) -> Result<EncodedDataset, StageError> {
    let mut columns = ctx.default_categoricals.clone();
    for extra in pipeline.policy.extra_categoricals() {
        if !columns.contains(&extra) {
            columns.push(extra);
        }
    }
    let (event_type, table) = dataset.into_parts();
    let (table, encoded) = ctx.encoder.encode(table, &columns)?;
    for col in &encoded {
        debug!(column = %col.column, indicators = col.indicators.len(), "encoded");
        if col.unseen_rows > 0 {
            warn!(column = %col.column, rows = col.unseen_rows, "categories outside the fixed vocabulary");
        }
    }
    Ok(EncodedDataset::from_table(event_type, table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FnPolicy;
    use crate::table::Table;

    fn normalized(rows: usize) -> NormalizedDataset {
        let mut t = Table::new(["x"]);
        for i in 0..rows {
            t.push_row(vec![Value::from(i)]);
        }
        NormalizedDataset::from_table(EventType::new("t", "T"), t)
    }

    #[test]
    fn states_advance_in_order() {
        let mut state = RunState::Pending;
        for stage in Stage::ALL {
            assert_eq!(state.next_stage(), Some(stage));
            state = RunState::after(stage);
        }
        assert_eq!(state, RunState::Reported);
        assert!(state.is_terminal());
        assert_eq!(
            RunState::Failed(Stage::FeatureEngineering).to_string(),
            "FAILED(feature_engineering)"
        );
    }

    #[test]
    fn hidden_row_id_is_removed() {
        let p = FnPolicy::new(|mut t: Table| {
            t.derive_column("y", |r| r.get_or_null("x").clone());
            Ok(t)
        });
        let out = engineer(&p, normalized(3)).unwrap();
        assert_eq!(out.table().columns(), ["x", "y"]);
        assert_eq!(out.stage(), "featured");
    }

    #[test]
    fn undeclared_filter_is_rejected() {
        let p = FnPolicy::new(|mut t: Table| {
            t.retain_rows(|r| r.get_or_null("x") != &Value::Int(0));
            Ok(t)
        });
        let err = engineer(&p, normalized(3)).unwrap_err();
        assert!(matches!(err, FeaturePolicyError::RowCountChanged { before: 3, after: 2 }));
    }

    #[test]
    fn declared_filter_may_drop_rows() {
        let p = FnPolicy::new(|mut t: Table| {
            t.retain_rows(|r| r.get_or_null("x") != &Value::Int(1));
            Ok(t)
        })
        .with_filter("drop_one");
        assert_eq!(engineer(&p, normalized(3)).unwrap().row_count(), 2);
    }

    #[test]
    fn reordering_breaks_identity() {
        let p = FnPolicy::new(|t: Table| {
            let mut rows: Vec<Vec<Value>> = t.rows().map(|r| r.values().to_vec()).collect();
            rows.reverse();
            let mut out = Table::new(t.columns().to_vec());
            for r in rows {
                out.push_row(r);
            }
            Ok(out)
        });
        let err = engineer(&p, normalized(3)).unwrap_err();
        assert!(matches!(err, FeaturePolicyError::RowIdentity(_)));
    }

    #[test]
    fn panics_are_contained() {
        let p = FnPolicy::new(|_t: Table| -> Result<Table, FeaturePolicyError> { panic!("bad row 50") });
        let err = engineer(&p, normalized(1)).unwrap_err();
        assert!(matches!(err, FeaturePolicyError::Panicked(ref m) if m.contains("bad row 50")));
    }
}
