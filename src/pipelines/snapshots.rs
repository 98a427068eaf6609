//! `SESSION_SNAPSHOT`: distance travelled and fly ratio.

use super::{CONTEXT_COLUMN, numeric, scaled};
use crate::error::FeaturePolicyError;
use crate::normalize::NestedColumn;
use crate::policy::{EventPipeline, FeaturePolicy};
use crate::report::{Aggregation, ChartKind, ChartSpec};
use crate::table::Table;

const CM_PER_KM: f64 = 100_000.0;

pub struct SnapshotsPolicy;

impl FeaturePolicy for SnapshotsPolicy {
    fn engineer(&self, mut table: Table) -> Result<Table, FeaturePolicyError> {
        if table.has_column("totalDistanceCm") {
            table.derive_column("totalDistance_km", |r| scaled(r.get_or_null("totalDistanceCm"), CM_PER_KM));
        } else {
            table.map_column("totalDistance_km", numeric);
        }
        table.map_column("fly_ratio", numeric);
        Ok(table)
    }
}

#[must_use]
pub fn pipeline() -> EventPipeline {
    EventPipeline::new("snapshots", "SESSION_SNAPSHOT")
        .nested(NestedColumn::flatten(CONTEXT_COLUMN))
        .policy(SnapshotsPolicy)
        .chart(
            ChartSpec::new(
                "distance_dist",
                "Player Distance Traveled Distribution (km)",
                ChartKind::Histogram,
                Aggregation::Histogram {
                    column: "totalDistance_km".into(),
                    bins: 30,
                    above: Some(0.1),
                    range: None,
                },
            )
            .labels("Kilometers", ""),
        )
        .chart(
            ChartSpec::new(
                "fly_ratio",
                "Fly Ratio Distribution (0=Walk, 1=Fly)",
                ChartKind::Histogram,
                ChartSpec::histogram("fly_ratio", 20),
            )
            .labels("Fly Ratio", "Count"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn centimetres_to_kilometres() {
        let mut t = Table::new(["totalDistanceCm", "fly_ratio"]);
        t.push_row(vec![Value::Int(250_000), "0.25".into()]);
        let t = SnapshotsPolicy.engineer(t).unwrap();
        assert_eq!(t.get(0, "totalDistance_km"), Some(&Value::Float(2.5)));
        assert_eq!(t.get(0, "fly_ratio"), Some(&Value::Float(0.25)));
    }
}
