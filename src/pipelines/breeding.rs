//! `POKEMON_BRED`: species, shininess and individual values (IVs) from the nested
//! context, which is kept as a structure rather than flattened.

use super::{CONTEXT_COLUMN, numeric};
use crate::error::FeaturePolicyError;
use crate::normalize::NestedColumn;
use crate::policy::{EventPipeline, FeaturePolicy};
use crate::report::{Aggregation, ChartKind, ChartSpec};
use crate::table::Table;
use crate::value::Value;

/// Output column and key under `context_data.ivs`, in stat order.
pub const IV_COLUMNS: [(&str, &str); 6] = [
    ("iv_hp", "PS_IV"),
    ("iv_atk", "ATTACK_IV"),
    ("iv_def", "DEFENCE_IV"),
    ("iv_spa", "SP_ATTACK_IV"),
    ("iv_spd", "SP_DEFENSE_IV"),
    ("iv_spe", "SPEED_IV"),
];

/// Six stats at 31 each.
pub const MAX_IV_TOTAL: f64 = 186.0;

pub struct BreedingPolicy;

impl FeaturePolicy for BreedingPolicy {
    fn engineer(&self, mut table: Table) -> Result<Table, FeaturePolicyError> {
        if !table.has_column(CONTEXT_COLUMN) {
            return Ok(table);
        }
        table.derive_column("species", |r| match r.get_or_null(CONTEXT_COLUMN) {
            Value::Map(m) => match m.get("species") {
                Some(v) if !v.is_null() => Value::Str(v.render()),
                _ => Value::from("unknown"),
            },
            _ => Value::Null,
        });
        table.derive_column("is_shiny", |r| match r.get_or_null(CONTEXT_COLUMN) {
            Value::Map(m) => Value::Int(i64::from(m.get("isShiny").is_some_and(truthy))),
            _ => Value::Null,
        });
        for (column, key) in IV_COLUMNS {
            table.derive_column(column, |r| {
                r.get_or_null(CONTEXT_COLUMN)
                    .get_path(&["ivs", key])
                    .map_or(Value::Null, numeric)
            });
        }
        table.derive_column("iv_total", |r| {
            IV_COLUMNS
                .iter()
                .map(|(c, _)| r.get_or_null(c).coerce_f64())
                .sum::<Option<f64>>()
                .map_or(Value::Null, Value::Float)
        });
        table.derive_column("iv_percentage", |r| {
            r.get_or_null("iv_total")
                .coerce_f64()
                .map_or(Value::Null, |t| Value::Float(t / MAX_IV_TOTAL * 100.0))
        });
        Ok(table)
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Str(s) => s.eq_ignore_ascii_case("true") || s == "1",
        _ => false,
    }
}

#[must_use]
pub fn pipeline() -> EventPipeline {
    EventPipeline::new("breeding", "POKEMON_BRED")
        .nested(NestedColumn::keep(CONTEXT_COLUMN))
        .policy(BreedingPolicy)
        .chart(
            ChartSpec::new(
                "top_bred",
                "Top 10 Bred Species",
                ChartKind::HorizontalBar,
                ChartSpec::count_by("species", Some(10)),
            )
            .labels("Count", ""),
        )
        .chart(
            ChartSpec::new(
                "iv_dist",
                "Genetic Quality Distribution (IV %)",
                ChartKind::Histogram,
                Aggregation::Histogram {
                    column: "iv_percentage".into(),
                    bins: 20,
                    above: None,
                    range: Some((0.0, 100.0)),
                },
            )
            .labels("IV Percentage (0-100%)", "Count"),
        )
}
