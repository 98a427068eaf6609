//! Canned event records for the built-in event types.
//!
//! Every record carries `player`, `server_id` and a serialized `context_data`, as the
//! upstream export does. Contexts alternate between strict JSON and the single-quoted
//! literal dialect so both parsers get exercised.

use super::mock_source::MockSource;
use crate::pipelines::{self, CONTEXT_COLUMN};
use crate::table::EventRecord;
use crate::value::Value;
use serde_json::{Value as Json, json};

/// Build an [`EventRecord`] from `key => value` pairs.
///
/// ```
/// use pixelbeam::record;
///
/// let r = record! { "player" => "Ash", "level" => 12 };
/// assert_eq!(r.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::table::EventRecord::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut r = $crate::table::EventRecord::new();
        $( r.insert(::std::string::String::from($key), $crate::value::Value::from($value)); )+
        r
    }};
}

const PLAYERS: [&str; 4] = ["Ash", "Misty", "Brock", "Gary"];
const SERVERS: [&str; 2] = ["eu1", "us1"];

/// A record with the common columns and `context` serialized into `context_data`.
/// Odd rows use the literal dialect.
#[must_use]
pub fn event_record(i: usize, context: &Json) -> EventRecord {
    let text = if i % 2 == 0 {
        context.to_string()
    } else {
        literal_dialect(context)
    };
    let mut r = record! {
        "player" => PLAYERS[i % PLAYERS.len()],
        "server_id" => SERVERS[i % SERVERS.len()],
        "timestamp" => format!("2025-03-{:02}T12:00:00Z", 1 + i % 28),
    };
    r.insert(CONTEXT_COLUMN.to_string(), Value::Str(text));
    r
}

/// Render a JSON value in the single-quoted literal dialect (`'k': True`).
#[must_use]
pub fn literal_dialect(v: &Json) -> String {
    match v {
        Json::Null => "None".to_string(),
        Json::Bool(true) => "True".to_string(),
        Json::Bool(false) => "False".to_string(),
        Json::Number(n) => n.to_string(),
        Json::String(s) => format!("'{}'", s.replace('\'', "\\'")),
        Json::Array(items) => format!("[{}]", items.iter().map(literal_dialect).collect::<Vec<_>>().join(", ")),
        Json::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("'{k}': {}", literal_dialect(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn records(n: usize, context: impl Fn(usize) -> Json) -> Vec<EventRecord> {
    (0..n).map(|i| event_record(i, &context(i))).collect()
}

#[must_use]
pub fn battle_records(n: usize) -> Vec<EventRecord> {
    records(n, |i| {
        json!({
            "result": (["WIN", "LOSS", "win", "DRAW"][i % 4]),
            "durationMs": 15_000 + 1_000 * i,
            "opponentType": if i % 5 == 4 { Json::Null } else { json!(["Wild", "Trainer"][i % 2]) },
        })
    })
}

#[must_use]
pub fn breeding_records(n: usize) -> Vec<EventRecord> {
    records(n, |i| {
        let iv = 31 - (i % 31);
        json!({
            "species": (["Eevee", "Ditto", "Riolu"][i % 3]),
            "isShiny": i % 7 == 0,
            "ivs": {
                "PS_IV": iv, "ATTACK_IV": iv, "DEFENCE_IV": iv,
                "SP_ATTACK_IV": iv, "SP_DEFENSE_IV": iv, "SPEED_IV": iv,
            },
        })
    })
}

#[must_use]
pub fn capture_records(n: usize) -> Vec<EventRecord> {
    records(n, |i| {
        json!({
            "pokemon": (["Pikachu", "Zubat", "Magikarp"][i % 3]),
            "biome": if i % 4 == 3 { Json::Null } else { json!(["forest", "cave"][i % 2]) },
            "level": 5 + i % 40,
        })
    })
}

#[must_use]
pub fn command_records(n: usize) -> Vec<EventRecord> {
    records(n, |i| json!({ "command": (["/home base", "/spawn", "/pokeheal", "/tpa Misty"][i % 4]) }))
}

#[must_use]
pub fn death_records(n: usize) -> Vec<EventRecord> {
    records(n, |i| {
        json!({
            "cause": (["fall", "Zombie mob", "slain by player", "lava", "drowned"][i % 5]),
            "level": if i % 6 == 5 { Json::Null } else { json!(10 + 5 * (i % 8)) },
        })
    })
}

#[must_use]
pub fn economy_records(n: usize) -> Vec<EventRecord> {
    records(n, |i| json!({ "price": 100 * (1 + i % 9), "item": (["Master Ball", "Rare Candy"][i % 2]) }))
}

#[must_use]
pub fn raid_records(n: usize) -> Vec<EventRecord> {
    records(n, |i| {
        json!({
            "world": (["plains", "desert"][i % 2]),
            "biome": "overworld",
            "result": if i % 3 == 2 { Json::Null } else { json!(["WIN", "LOSS"][i % 2]) },
        })
    })
}

#[must_use]
pub fn released_records(n: usize) -> Vec<EventRecord> {
    records(n, |i| {
        json!({
            "species": (["Rattata", "Pidgey"][i % 2]),
            "iv_percentage": format!("{:.1}", 10.0 + (i % 90) as f64),
            "level": 3 + i % 20,
        })
    })
}

#[must_use]
pub fn session_records(n: usize) -> Vec<EventRecord> {
    records(n, |i| json!({ "durationMs": 60_000 * (1 + i % 120) }))
}

#[must_use]
pub fn snapshot_records(n: usize) -> Vec<EventRecord> {
    records(n, |i| {
        json!({
            "totalDistanceCm": 50_000 * (1 + i % 30),
            "fly_ratio": format!("{:.2}", (i % 10) as f64 / 10.0),
        })
    })
}

/// Canned records for a built-in pipeline by name.
#[must_use]
pub fn sample_records(name: &str, n: usize) -> Vec<EventRecord> {
    match name {
        "battles" => battle_records(n),
        "breeding" => breeding_records(n),
        "captures" => capture_records(n),
        "commands" => command_records(n),
        "deaths" => death_records(n),
        "economy" => economy_records(n),
        "raids" => raid_records(n),
        "released" => released_records(n),
        "sessions" => session_records(n),
        "snapshots" => snapshot_records(n),
        _ => Vec::new(),
    }
}

/// A [`MockSource`] serving `n` sample records for every built-in pipeline.
#[must_use]
pub fn builtin_source(n: usize) -> MockSource {
    pipelines::builtin().iter().fold(MockSource::new(), |src, p| {
        src.with_records(&p.event_type.action, sample_records(p.name(), n))
    })
}

/// The two-row example: one literal-dialect `stats` payload and one malformed one.
#[must_use]
pub fn malformed_stats_records() -> Vec<EventRecord> {
    vec![
        record! { "player" => "Ash", "stats" => "{'iv_total': 18, 'iv_max': 31}" },
        record! { "player" => "Ash", "stats" => "{iv_total: 18,,}" },
    ]
}
