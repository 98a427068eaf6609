//! `RAID_INTERACTION`: raid outcomes.

use super::{CONTEXT_COLUMN, label_or};
use crate::error::FeaturePolicyError;
use crate::normalize::NestedColumn;
use crate::policy::{EventPipeline, FeaturePolicy};
use crate::report::{ChartKind, ChartSpec};
use crate::table::Table;

pub struct RaidsPolicy;

impl FeaturePolicy for RaidsPolicy {
    fn engineer(&self, mut table: Table) -> Result<Table, FeaturePolicyError> {
        // The raid exporter writes the world name into `biome` and vice versa.
        if table.has_column("world") && table.has_column("biome") {
            table.swap_columns("world", "biome")?;
        }
        table.map_column("result", |v| label_or(v, "UNKNOWN"));
        Ok(table)
    }
}

#[must_use]
pub fn pipeline() -> EventPipeline {
    EventPipeline::new("raids", "RAID_INTERACTION")
        .nested(NestedColumn::flatten(CONTEXT_COLUMN))
        .policy(RaidsPolicy)
        .chart(
            ChartSpec::new(
                "raid_results",
                "Raid Outcomes (Win/Loss)",
                ChartKind::Bar,
                ChartSpec::count_by("result", None),
            )
            .labels("Result", "Count"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn swaps_world_and_biome() {
        let mut t = Table::new(["world", "biome", "result"]);
        t.push_row(vec!["desert".into(), "overworld".into(), Value::Null]);
        let t = RaidsPolicy.engineer(t).unwrap();
        assert_eq!(t.columns(), ["world", "biome", "result"]);
        assert_eq!(t.get(0, "world"), Some(&Value::from("overworld")));
        assert_eq!(t.get(0, "biome"), Some(&Value::from("desert")));
        assert_eq!(t.get(0, "result"), Some(&Value::from("UNKNOWN")));
    }
}
