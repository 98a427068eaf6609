//! `SESSION_END`: session length in minutes.

use super::{CONTEXT_COLUMN, scaled};
use crate::normalize::NestedColumn;
use crate::policy::{EventPipeline, FnPolicy};
use crate::report::{Aggregation, ChartKind, ChartSpec};
use crate::table::Table;

const MS_PER_MINUTE: f64 = 60_000.0;

#[must_use]
pub fn pipeline() -> EventPipeline {
    EventPipeline::new("sessions", "SESSION_END")
        .nested(NestedColumn::flatten(CONTEXT_COLUMN))
        .policy(FnPolicy::new(|mut table: Table| {
            if table.has_column("durationMs") {
                table.derive_column("duration_min", |r| scaled(r.get_or_null("durationMs"), MS_PER_MINUTE));
            }
            Ok(table)
        }))
        .chart(
            ChartSpec::new(
                "session_duration",
                "Session Duration Distribution (Minutes)",
                ChartKind::Histogram,
                Aggregation::Histogram {
                    column: "duration_min".into(),
                    bins: 15,
                    above: Some(0.0),
                    range: None,
                },
            )
            .labels("Minutes", ""),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn minutes_from_millis() {
        let mut t = Table::new(["durationMs"]);
        t.push_row(vec![Value::Int(90_000)]);
        t.push_row(vec!["?".into()]);
        let t = pipeline().policy.engineer(t).unwrap();
        assert_eq!(t.get(0, "duration_min"), Some(&Value::Float(1.5)));
        assert_eq!(t.get(1, "duration_min"), Some(&Value::Null));
    }
}
