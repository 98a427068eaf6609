//! `PLAYER_DEATH`: cause taxonomy and a high-level flag.
//!
//! `death_category` is one-hot encoded on top of the global categoricals, so the
//! report reads the category shares back from the indicator columns.

use super::CONTEXT_COLUMN;
use crate::error::FeaturePolicyError;
use crate::normalize::NestedColumn;
use crate::policy::{EventPipeline, FeaturePolicy};
use crate::report::{Aggregation, ChartKind, ChartSpec};
use crate::table::Table;
use crate::value::Value;
use regex::RegexSet;

/// Level above which a player counts as high level.
pub const HIGH_LEVEL: f64 = 30.0;

/// Checked in order; the first match wins.
const CATEGORIES: [(&str, &str); 4] = [
    ("Gravity", r"(?i)fall|kinetic"),
    ("PvE", r"(?i)mob|arrow"),
    ("PvP", r"(?i)player"),
    ("Fire", r"(?i)lava|fire"),
];

pub struct DeathsPolicy;

impl FeaturePolicy for DeathsPolicy {
    fn engineer(&self, mut table: Table) -> Result<Table, FeaturePolicyError> {
        let set = RegexSet::new(CATEGORIES.iter().map(|(_, re)| *re))
            .map_err(|e| FeaturePolicyError::Rule(format!("death category patterns: {e}")))?;
        if table.has_column("cause") {
            table.derive_column("death_category", |r| match r.get_or_null("cause") {
                Value::Null => Value::Null,
                cause => {
                    let hit = set.matches(&cause.render()).into_iter().next();
                    Value::from(hit.map_or("Other", |i| CATEGORIES[i].0))
                }
            });
        }
        if table.has_column("level") {
            table.derive_column("is_high_level", |r| {
                r.get_or_null("level")
                    .coerce_f64()
                    .map_or(Value::Null, |l| Value::Bool(l > HIGH_LEVEL))
            });
        }
        Ok(table)
    }

    fn extra_categoricals(&self) -> Vec<String> {
        vec!["death_category".to_string()]
    }
}

#[must_use]
pub fn pipeline() -> EventPipeline {
    EventPipeline::new("deaths", "PLAYER_DEATH")
        .nested(NestedColumn::flatten(CONTEXT_COLUMN))
        .policy(DeathsPolicy)
        .chart(ChartSpec::new(
            "causes",
            "Death Causes",
            ChartKind::Pie,
            Aggregation::CountIndicators {
                column: "death_category".into(),
            },
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_in_priority_order() {
        let mut t = Table::new(["cause", "level"]);
        for (cause, level) in [
            ("FALL", Value::Int(31)),
            ("zombie mob", Value::Int(30)),
            ("Player Gary", Value::Null),
            ("lava", "45".into()),
            ("drowning", Value::Int(1)),
            ("fire from a falling player", Value::Int(1)),
        ] {
            t.push_row(vec![cause.into(), level]);
        }
        t.push_row(vec![Value::Null, Value::Null]);
        let t = DeathsPolicy.engineer(t).unwrap();
        let cats: Vec<String> = t.column("death_category").unwrap().iter().map(|v| v.render()).collect();
        assert_eq!(cats, ["Gravity", "PvE", "PvP", "Fire", "Other", "Gravity", ""]);
        let high: Vec<&Value> = t.column("is_high_level").unwrap();
        assert_eq!(high[0], &Value::Bool(true));
        assert_eq!(high[1], &Value::Bool(false));
        assert_eq!(high[2], &Value::Null);
        assert_eq!(high[3], &Value::Bool(true));
    }
}
