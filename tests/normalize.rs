use anyhow::Result;
use pixelbeam::normalize::{NestedColumn, StructuralNormalizer};
use pixelbeam::table::Table;
use pixelbeam::testing::*;
use pixelbeam::value::Value;
use std::collections::BTreeMap;

fn stats_map() -> Value {
    let mut m = BTreeMap::new();
    m.insert("iv_max".to_string(), Value::Int(31));
    m.insert("iv_total".to_string(), Value::Int(18));
    Value::Map(m)
}

#[test]
fn malformed_sibling_keeps_its_row() {
    let table = Table::from_records(&malformed_stats_records());
    let (out, report) = StructuralNormalizer::default().normalize(table, &[NestedColumn::keep("stats")]);

    assert_row_count(&out, 2);
    assert_column_values(&out, "player", &["Ash".into(), "Ash".into()]);
    assert_eq!(out.get(0, "stats"), Some(&stats_map()));
    assert_eq!(
        out.get(1, "stats"),
        Some(&Value::Unparseable("{iv_total: 18,,}".to_string()))
    );
    assert_eq!(report.total_failures(), 1);
    assert_eq!(report.warnings[0].column, "stats");
    assert_eq!(report.warnings[0].rows, [1]);
}

#[test]
fn normalize_is_idempotent() {
    let normalizer = StructuralNormalizer::default();
    for spec in [NestedColumn::keep("context_data"), NestedColumn::flatten("context_data")] {
        let mut records = breeding_records(6);
        records.extend(malformed_stats_records());
        let mut table = Table::from_records(&records);
        table.push_row(vec![Value::from("not { json")]);

        let (once, _) = normalizer.normalize(table, std::slice::from_ref(&spec));
        let (twice, second) = normalizer.normalize(once.clone(), std::slice::from_ref(&spec));
        assert_eq!(once, twice, "{spec:?}");
        if !spec.flatten {
            // already-decoded cells pass through; markers stay markers
            assert_eq!(second.columns["context_data"].decoded_total(), 0);
        }
    }
}

#[test]
fn garbage_never_drops_rows() {
    let cells = [
        "",
        "{",
        "[1, 2",
        "{'a': }",
        "{\"a\": 1}",
        "{'a': 'it''s'}",
        "None",
        "12",
        "\u{0}\u{1}",
        "{'nested': {'deep': [1, (2, 3)]}}",
    ];
    let mut table = Table::new(["id", "payload"]);
    for (i, c) in cells.iter().enumerate() {
        table.push_row(vec![Value::from(i), Value::from(*c)]);
    }
    let (out, report) = StructuralNormalizer::default().normalize(table, &[NestedColumn::keep("payload")]);

    assert_row_count(&out, cells.len());
    let ids: Vec<Value> = (0..cells.len()).map(Value::from).collect();
    assert_column_values(&out, "id", &ids);
    for row in out.rows() {
        let cell = row.get_or_null("payload");
        assert!(
            matches!(cell, Value::Map(_) | Value::List(_) | Value::Unparseable(_) | Value::Str(_)),
            "{cell:?}"
        );
        assert!(!cell.is_null());
    }
    assert_eq!(out.get(0, "payload"), Some(&Value::from("")));
    assert!(report.total_failures() >= 5);
}

#[test]
fn flatten_builds_top_level_columns() -> Result<()> {
    let table = Table::from_records(&battle_records(4));
    let (out, report) =
        StructuralNormalizer::default().normalize(table, &[NestedColumn::flatten("context_data")]);

    assert_eq!(report.total_failures(), 0);
    assert!(!out.has_column("context_data"));
    assert_has_columns(&out, &["durationMs", "opponentType", "result", "player", "server_id"]);
    assert_column_values(
        &out,
        "result",
        &["WIN".into(), "LOSS".into(), "win".into(), "DRAW".into()],
    );
    Ok(())
}
