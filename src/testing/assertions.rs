//! Table-level assertions with readable failure messages.

use crate::engine::{PipelineOutcome, RunState};
use crate::table::Table;
use crate::value::Value;

/// Assert that `table` has exactly `expected` rows.
///
/// # Panics
///
/// Panics if the row count differs.
pub fn assert_row_count(table: &Table, expected: usize) {
    assert_eq!(
        table.row_count(),
        expected,
        "Row count mismatch:\n  Expected: {expected}\n  Actual: {}\n  Columns: {:?}",
        table.row_count(),
        table.columns()
    );
}

/// Assert the exact column layout of `table`, in order.
///
/// # Panics
///
/// Panics if the columns differ in name or order.
///
/// # Example
///
/// ```
/// use pixelbeam::table::Table;
/// use pixelbeam::testing::assert_columns;
///
/// let t = Table::new(["player", "server_id_eu1"]);
/// assert_columns(&t, &["player", "server_id_eu1"]);
/// ```
pub fn assert_columns(table: &Table, expected: &[&str]) {
    let actual: Vec<&str> = table.columns().iter().map(String::as_str).collect();
    assert_eq!(
        actual, expected,
        "Column layout mismatch:\n  Expected: {expected:?}\n  Actual: {actual:?}"
    );
}

/// Assert that `table` has every column in `expected`, in any position.
///
/// # Panics
///
/// Panics naming the missing columns.
pub fn assert_has_columns(table: &Table, expected: &[&str]) {
    let missing: Vec<&&str> = expected.iter().filter(|c| !table.has_column(c)).collect();
    assert!(
        missing.is_empty(),
        "Missing columns: {missing:?}\n  Actual: {:?}",
        table.columns()
    );
}

/// Assert the values of one column, top to bottom.
///
/// # Panics
///
/// Panics if the column is absent or any value differs.
pub fn assert_column_values(table: &Table, column: &str, expected: &[Value]) {
    let Some(actual) = table.column(column) else {
        panic!("Column '{column}' not found\n  Columns: {:?}", table.columns());
    };
    assert_eq!(
        actual.len(),
        expected.len(),
        "Column '{column}' length mismatch:\n  Expected: {expected:?}\n  Actual: {actual:?}"
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(
            *a, e,
            "Column '{column}' mismatch at row {i}:\n  Expected: {e:?}\n  Actual: {a:?}\n  Full column: {actual:?}"
        );
    }
}

/// Assert that every one-hot group `<column>_*` has at most one `1` per row.
///
/// # Panics
///
/// Panics on a row with two or more active indicators, or on a non-0/1 indicator.
pub fn assert_one_hot(table: &Table, column: &str) {
    let prefix = format!("{column}_");
    let indicators: Vec<&String> = table.columns().iter().filter(|c| c.starts_with(&prefix)).collect();
    for (i, row) in table.rows().enumerate() {
        let mut active = 0;
        for name in &indicators {
            match row.get_or_null(name) {
                Value::Int(0) => {}
                Value::Int(1) => active += 1,
                other => panic!("Indicator '{name}' holds {other:?} at row {i}"),
            }
        }
        assert!(active <= 1, "Row {i} has {active} active '{column}' indicators");
    }
}

/// Assert the terminal state of a pipeline run.
///
/// # Panics
///
/// Panics with the recorded error if the state differs.
pub fn assert_state(outcome: &PipelineOutcome, expected: RunState) {
    assert_eq!(
        outcome.state, expected,
        "Event type '{}' ended in {} (expected {expected})\n  Error: {:?}",
        outcome.event_type.name, outcome.state, outcome.error
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded() -> Table {
        let mut t = Table::new(["player", "server_id_eu1", "server_id_us1"]);
        t.push_row(vec!["Ash".into(), Value::Int(1), Value::Int(0)]);
        t.push_row(vec!["Misty".into(), Value::Int(0), Value::Int(0)]);
        t
    }

    #[test]
    fn passing_assertions() {
        let t = encoded();
        assert_row_count(&t, 2);
        assert_columns(&t, &["player", "server_id_eu1", "server_id_us1"]);
        assert_has_columns(&t, &["player"]);
        assert_column_values(&t, "player", &["Ash".into(), "Misty".into()]);
        assert_one_hot(&t, "server_id");
    }

    #[test]
    #[should_panic(expected = "Row count mismatch")]
    fn row_count_mismatch_panics() {
        assert_row_count(&encoded(), 3);
    }

    #[test]
    #[should_panic(expected = "active 'server_id' indicators")]
    fn two_hot_rows_panic() {
        let mut t = encoded();
        t.push_row(vec!["Gary".into(), Value::Int(1), Value::Int(1)]);
        assert_one_hot(&t, "server_id");
    }
}
