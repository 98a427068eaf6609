//! `GTS_TRANSACTION`: transaction amounts.

use super::{CONTEXT_COLUMN, numeric};
use crate::error::FeaturePolicyError;
use crate::normalize::NestedColumn;
use crate::policy::{EventPipeline, FeaturePolicy};
use crate::report::{Aggregation, ChartKind, ChartSpec};
use crate::table::Table;

pub struct EconomyPolicy;

impl FeaturePolicy for EconomyPolicy {
    /// `amount` is taken from `price` when the export has one, else from `amount`.
    fn engineer(&self, mut table: Table) -> Result<Table, FeaturePolicyError> {
        let source = ["price", "amount"].into_iter().find(|c| table.has_column(c));
        if let Some(source) = source {
            table.derive_column("amount", |r| numeric(r.get_or_null(source)));
        }
        Ok(table)
    }
}

#[must_use]
pub fn pipeline() -> EventPipeline {
    EventPipeline::new("economy", "GTS_TRANSACTION")
        .nested(NestedColumn::flatten(CONTEXT_COLUMN))
        .policy(EconomyPolicy)
        .chart(ChartSpec::new(
            "price_dist",
            "Transaction Value Distribution",
            ChartKind::Histogram,
            Aggregation::Histogram {
                column: "amount".into(),
                bins: 20,
                above: Some(0.0),
                range: None,
            },
        ))
        .chart(ChartSpec::new(
            "total_volume",
            "Total Economy Volume",
            ChartKind::Indicator,
            Aggregation::Sum {
                column: "amount".into(),
            },
        ))
}
