//! Built-in event-type pipelines.
//!
//! | name        | action             |
//! |-------------|--------------------|
//! | `battles`   | `BATTLE_END`       |
//! | `breeding`  | `POKEMON_BRED`     |
//! | `captures`  | `POKEMON_CAPTURED` |
//! | `commands`  | `COMMAND_USAGE`    |
//! | `deaths`    | `PLAYER_DEATH`     |
//! | `economy`   | `GTS_TRANSACTION`  |
//! | `raids`     | `RAID_INTERACTION` |
//! | `released`  | `POKEMON_RELEASED` |
//! | `sessions`  | `SESSION_END`      |
//! | `snapshots` | `SESSION_SNAPSHOT` |
//!
//! Every pipeline decodes `context_data`; all but `breeding` flatten it into top-level
//! columns. Helpers shared by the policies live here.

pub mod battles;
pub mod breeding;
pub mod captures;
pub mod commands;
pub mod deaths;
pub mod economy;
pub mod raids;
pub mod released;
pub mod sessions;
pub mod snapshots;

use crate::config::Config;
use crate::error::ConfigError;
use crate::policy::EventPipeline;
use crate::value::Value;

/// Column holding the serialized event context in every upstream record.
pub const CONTEXT_COLUMN: &str = "context_data";

/// All built-in pipelines, in default run order.
#[must_use]
pub fn builtin() -> Vec<EventPipeline> {
    vec![
        battles::pipeline(),
        breeding::pipeline(),
        captures::pipeline(),
        commands::pipeline(),
        deaths::pipeline(),
        economy::pipeline(),
        raids::pipeline(),
        released::pipeline(),
        sessions::pipeline(),
        snapshots::pipeline(),
    ]
}

/// Built-in pipeline by name.
#[must_use]
pub fn find(name: &str) -> Option<EventPipeline> {
    builtin().into_iter().find(|p| p.name() == name)
}

/// Pipelines enabled by `config`, in configured order, with chart overrides applied.
///
/// # Errors
/// [`ConfigError::Invalid`] for an unknown pipeline name or a chart override for a
/// pipeline that does not exist.
pub fn from_config(config: &Config) -> Result<Vec<EventPipeline>, ConfigError> {
    let mut selected = match &config.pipelines {
        None => builtin(),
        Some(names) => names
            .iter()
            .map(|n| find(n).ok_or_else(|| unknown(n)))
            .collect::<Result<Vec<_>, _>>()?,
    };
    for (name, charts) in &config.charts {
        if find(name).is_none() {
            return Err(unknown(name));
        }
        if let Some(p) = selected.iter_mut().find(|p| p.name() == name) {
            p.charts.clone_from(charts);
        }
    }
    Ok(selected)
}

fn unknown(name: &str) -> ConfigError {
    let known: Vec<String> = builtin().iter().map(|p| p.name().to_string()).collect();
    ConfigError::Invalid(format!("unknown pipeline '{name}' (known: {})", known.join(", ")))
}

/// Numeric view of a cell: ints stay ints, numeric text becomes a float, anything
/// else becomes null.
#[must_use]
pub fn numeric(v: &Value) -> Value {
    match v {
        Value::Int(_) => v.clone(),
        other => other.coerce_f64().map_or(Value::Null, Value::Float),
    }
}

/// `numeric(v) / divisor` as a float, null when `v` is not numeric.
#[must_use]
pub fn scaled(v: &Value, divisor: f64) -> Value {
    v.coerce_f64().map_or(Value::Null, |x| Value::Float(x / divisor))
}

/// Text view of a cell with an explicit label for missing values.
#[must_use]
pub fn label_or(v: &Value, missing: &str) -> Value {
    match v {
        Value::Null => Value::from(missing),
        Value::Str(s) if s.trim().is_empty() => Value::from(missing),
        Value::Str(_) => v.clone(),
        other => Value::Str(other.render()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_unique_builtins() {
        let all = builtin();
        assert_eq!(all.len(), 10);
        let mut names: Vec<&str> = all.iter().map(EventPipeline::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 10);
        assert!(all.iter().all(|p| !p.charts.is_empty()));
    }

    #[test]
    fn config_selects_and_overrides() {
        let config: Config = r#"
pipelines = ["deaths", "battles"]

[[charts.battles]]
id = "results"
title = "Results"
kind = "bar"
aggregate = "count_by"
column = "result"
"#
        .parse()
        .unwrap();
        let selected = from_config(&config).unwrap();
        assert_eq!(selected[0].name(), "deaths");
        assert_eq!(selected[1].charts.len(), 1);
        assert_eq!(selected[1].charts[0].id, "results");
    }

    #[test]
    fn unknown_names_are_rejected() {
        let config: Config = "pipelines = [\"trades\"]".parse().unwrap();
        let err = from_config(&config).unwrap_err();
        assert!(err.to_string().contains("trades"));
    }

    #[test]
    fn coercions_never_invent_values() {
        assert_eq!(numeric(&"12".into()), Value::Float(12.0));
        assert_eq!(numeric(&Value::Int(4)), Value::Int(4));
        assert_eq!(numeric(&"n/a".into()), Value::Null);
        assert_eq!(scaled(&Value::Int(1500), 1000.0), Value::Float(1.5));
        assert_eq!(scaled(&Value::Null, 1000.0), Value::Null);
        assert_eq!(label_or(&Value::Null, "Unknown"), Value::from("Unknown"));
        assert_eq!(label_or(&Value::Int(3), "Unknown"), Value::from("3"));
    }
}
