//! `POKEMON_CAPTURED`: capture counts per species and per biome.

use super::{CONTEXT_COLUMN, label_or};
use crate::normalize::NestedColumn;
use crate::policy::{EventPipeline, FnPolicy};
use crate::report::{Aggregation, ChartKind, ChartSpec};
use crate::table::Table;

#[must_use]
pub fn pipeline() -> EventPipeline {
    EventPipeline::new("captures", "POKEMON_CAPTURED")
        .nested(NestedColumn::flatten(CONTEXT_COLUMN))
        .policy(FnPolicy::new(|mut table: Table| {
            table.map_column("pokemon", |v| label_or(v, "Unknown"));
            table.map_column("biome", |v| label_or(v, "Unknown"));
            Ok(table)
        }))
        .chart(
            ChartSpec::new(
                "top_captures",
                "Top 10 Captured Pokémon",
                ChartKind::Bar,
                // older exports name the column `species`
                Aggregation::CountBy {
                    column: "pokemon".into(),
                    fallback: Some("species".into()),
                    top: Some(10),
                },
            )
            .labels("Pokémon", "Count"),
        )
        .chart(
            ChartSpec::new(
                "biome_dist",
                "Top 10 Biomes for Captures",
                ChartKind::Bar,
                ChartSpec::count_by("biome", Some(10)),
            )
            .labels("Biome", "Count"),
        )
}
