//! Per-event-type plug points.
//!
//! An [`EventPipeline`] is a plain value describing one event type: what to fetch,
//! which columns hold nested payloads, which [`FeaturePolicy`] to run, which extra
//! columns to encode and which charts to draw. The engine runs every pipeline through
//! the same fixed lifecycle; there is no per-type subclassing.

use crate::dataset::EventType;
use crate::error::FeaturePolicyError;
use crate::normalize::NestedColumn;
use crate::report::ChartSpec;
use crate::source::FetchParams;
use crate::table::Table;
use std::fmt;
use std::sync::Arc;

/// Business transformation applied in the feature-engineering stage.
///
/// Contract enforced by the engine:
/// - without a [`declared_filter`](FeaturePolicy::declared_filter), the output has
///   exactly the input rows;
/// - with one, rows may only be removed, never added or duplicated.
///
/// Do not fill unknown values with stand-ins that change their meaning (a `0` for a
/// missing duration, say); leave them null or map them to an explicit label.
pub trait FeaturePolicy: Send + Sync {
    /// # Errors
    /// Any business-rule violation; fatal to this event type only.
    fn engineer(&self, table: Table) -> Result<Table, FeaturePolicyError>;

    /// Name of the row filter this policy applies, if any.
    fn declared_filter(&self) -> Option<&str> {
        None
    }

    /// Columns to one-hot encode in addition to the global defaults.
    fn extra_categoricals(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Leaves the table as it is.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpPolicy;

impl FeaturePolicy for NoOpPolicy {
    fn engineer(&self, table: Table) -> Result<Table, FeaturePolicyError> {
        Ok(table)
    }
}

/// A policy from a closure.
pub struct FnPolicy<F> {
    f: F,
    filter: Option<String>,
    extra: Vec<String>,
}

impl<F> FnPolicy<F>
where
    F: Fn(Table) -> Result<Table, FeaturePolicyError> + Send + Sync,
{
    pub const fn new(f: F) -> Self {
        Self {
            f,
            filter: None,
            extra: Vec::new(),
        }
    }

    /// Declare that `f` removes rows, under `name`.
    #[must_use]
    pub fn with_filter(mut self, name: impl Into<String>) -> Self {
        self.filter = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_categoricals<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.extra = columns.into_iter().map(Into::into).collect();
        self
    }
}

impl<F> FeaturePolicy for FnPolicy<F>
where
    F: Fn(Table) -> Result<Table, FeaturePolicyError> + Send + Sync,
{
    fn engineer(&self, table: Table) -> Result<Table, FeaturePolicyError> {
        (self.f)(table)
    }

    fn declared_filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    fn extra_categoricals(&self) -> Vec<String> {
        self.extra.clone()
    }
}

/// Everything the engine needs to know about one event type.
#[derive(Clone)]
pub struct EventPipeline {
    pub event_type: EventType,
    pub fetch: FetchParams,
    pub nested_columns: Vec<NestedColumn>,
    pub policy: Arc<dyn FeaturePolicy>,
    pub charts: Vec<ChartSpec>,
}

impl EventPipeline {
    /// A pipeline with no nested columns, the no-op policy and no charts.
    pub fn new(name: impl Into<String>, action: impl Into<String>) -> Self {
        let event_type = EventType::new(name, action);
        Self {
            fetch: FetchParams::for_action(event_type.action.clone()),
            event_type,
            nested_columns: Vec::new(),
            policy: Arc::new(NoOpPolicy),
            charts: Vec::new(),
        }
    }

    #[must_use]
    pub fn nested(mut self, column: NestedColumn) -> Self {
        self.nested_columns.push(column);
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: impl FeaturePolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    #[must_use]
    pub fn chart(mut self, chart: ChartSpec) -> Self {
        self.charts.push(chart);
        self
    }

    #[must_use]
    pub fn charts(mut self, charts: Vec<ChartSpec>) -> Self {
        self.charts = charts;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.event_type.name
    }
}

impl fmt::Debug for EventPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPipeline")
            .field("event_type", &self.event_type)
            .field("nested_columns", &self.nested_columns)
            .field("declared_filter", &self.policy.declared_filter())
            .field("extra_categoricals", &self.policy.extra_categoricals())
            .field("charts", &self.charts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn fn_policy_carries_declarations() {
        let p = FnPolicy::new(|mut t: Table| {
            t.retain_rows(|r| !r.get_or_null("x").is_null());
            Ok(t)
        })
        .with_filter("drop_null_x")
        .with_categoricals(["kind"]);
        assert_eq!(p.declared_filter(), Some("drop_null_x"));
        assert_eq!(p.extra_categoricals(), ["kind"]);

        let mut t = Table::new(["x"]);
        t.push_row(vec![Value::Null]);
        t.push_row(vec![Value::Int(1)]);
        assert_eq!(p.engineer(t).unwrap().row_count(), 1);
    }

    #[test]
    fn builder_defaults() {
        let p = EventPipeline::new("battles", "BATTLE_END");
        assert_eq!(p.fetch.action, "BATTLE_END");
        assert!(p.policy.declared_filter().is_none());
        assert!(p.charts.is_empty());
    }
}
