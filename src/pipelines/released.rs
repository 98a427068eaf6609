//! `POKEMON_RELEASED`: released species and their quality.

use super::{CONTEXT_COLUMN, label_or, numeric};
use crate::normalize::NestedColumn;
use crate::policy::{EventPipeline, FnPolicy};
use crate::report::{ChartKind, ChartSpec};
use crate::table::Table;

#[must_use]
pub fn pipeline() -> EventPipeline {
    EventPipeline::new("released", "POKEMON_RELEASED")
        .nested(NestedColumn::flatten(CONTEXT_COLUMN))
        .policy(FnPolicy::new(|mut table: Table| {
            table.map_column("species", |v| label_or(v, "Unknown"));
            table.map_column("iv_percentage", numeric);
            table.map_column("level", numeric);
            Ok(table)
        }))
        .chart(
            ChartSpec::new(
                "top_released",
                "Top 10 Released Pokémon Species",
                ChartKind::Bar,
                ChartSpec::count_by("species", Some(10)),
            )
            .labels("Species", "Count"),
        )
        .chart(
            ChartSpec::new(
                "iv_distribution",
                "IV Percentage Distribution of Released Pokémon",
                ChartKind::Histogram,
                ChartSpec::histogram("iv_percentage", 20),
            )
            .labels("IV Percentage (0-100%)", "Count"),
        )
}
