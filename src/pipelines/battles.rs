//! `BATTLE_END`: battle duration and a binary win target.

use super::{CONTEXT_COLUMN, label_or, numeric, scaled};
use crate::error::FeaturePolicyError;
use crate::normalize::NestedColumn;
use crate::policy::{EventPipeline, FeaturePolicy};
use crate::report::{Aggregation, ChartKind, ChartSpec};
use crate::table::Table;
use crate::value::Value;

pub struct BattlesPolicy;

impl FeaturePolicy for BattlesPolicy {
    fn engineer(&self, mut table: Table) -> Result<Table, FeaturePolicyError> {
        if table.map_column("durationMs", numeric) {
            table.derive_column("duration_sec", |r| scaled(r.get_or_null("durationMs"), 1000.0));
        }
        if table.has_column("result") {
            // 1 for a win, 0 for any other recorded outcome; no outcome stays unknown.
            table.derive_column("target", |r| {
                let result = r.get_or_null("result").render();
                if result.trim().is_empty() {
                    Value::Null
                } else {
                    Value::Int(i64::from(result.trim().eq_ignore_ascii_case("WIN")))
                }
            });
        }
        table.map_column("opponentType", |v| label_or(v, "Unknown"));
        Ok(table)
    }
}

#[must_use]
pub fn pipeline() -> EventPipeline {
    EventPipeline::new("battles", "BATTLE_END")
        .nested(NestedColumn::flatten(CONTEXT_COLUMN))
        .policy(BattlesPolicy)
        .chart(
            ChartSpec::new(
                "win_rate",
                "Win Probability by Opponent",
                ChartKind::Bar,
                Aggregation::MeanBy {
                    group: "opponentType".into(),
                    value: "target".into(),
                    descending: true,
                },
            )
            .labels("Opponent Type", "Win Rate"),
        )
        .chart(
            ChartSpec::new(
                "duration",
                "Battle Duration Distribution (Seconds)",
                ChartKind::Histogram,
                Aggregation::Histogram {
                    column: "duration_sec".into(),
                    bins: 30,
                    above: Some(0.0),
                    range: None,
                },
            )
            .labels("Seconds", "Count"),
        )
}
