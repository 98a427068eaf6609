//! A small ordered, column-named table.
//!
//! [`Table`] is the in-memory shape every dataset stage works on: an ordered list of
//! column names and a list of rows, each row holding exactly one [`Value`] per column.
//! Column order is part of the schema and is preserved by every operation unless the
//! operation is explicitly about moving columns.
//!
//! The column helpers here are what feature policies are written against; they never
//! drop rows except through [`Table::retain_rows`].

use crate::error::TableError;
use crate::value::Value;
use std::collections::BTreeMap;

/// One raw input record: field name to scalar or serialized nested value.
pub type EventRecord = BTreeMap<String, Value>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Borrowed view of one row, with by-name access.
#[derive(Clone, Copy, Debug)]
pub struct RowRef<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> RowRef<'a> {
    /// Value of `column`, or `None` if the table has no such column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    /// Like [`RowRef::get`], mapping a missing column to [`Value::Null`].
    #[must_use]
    pub fn get_or_null(&self, column: &str) -> &'a Value {
        const NULL: &Value = &Value::Null;
        self.get(column).unwrap_or(NULL)
    }

    #[must_use]
    pub const fn values(&self) -> &'a [Value] {
        self.values
    }
}

impl Table {
    /// An empty table with the given columns.
    #[must_use]
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a table from records.
    ///
    /// The column set is the union of all record keys in order of first appearance;
    /// a record missing a key gets [`Value::Null`] in that column.
    #[must_use]
    pub fn from_records(records: &[EventRecord]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for rec in records {
            for key in rec.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|rec| {
                columns
                    .iter()
                    .map(|c| rec.get(c).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    /// Convert back into records (one map per row).
    #[must_use]
    pub fn to_records(&self) -> Vec<EventRecord> {
        self.rows
            .iter()
            .map(|row| self.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }

    /// Append a row. Missing trailing values are padded with nulls, extras are dropped.
    pub fn push_row(&mut self, mut values: Vec<Value>) {
        values.resize(self.columns.len(), Value::Null);
        self.rows.push(values);
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub const fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(|values| RowRef {
            columns: &self.columns,
            values,
        })
    }

    #[must_use]
    pub fn row(&self, index: usize) -> Option<RowRef<'_>> {
        self.rows.get(index).map(|values| RowRef {
            columns: &self.columns,
            values,
        })
    }

    /// Values of one column, top to bottom.
    #[must_use]
    pub fn column(&self, column: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().filter_map(|r| r.get(idx)).collect())
    }

    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Replace the values of an existing column, or append a new column at the end.
    ///
    /// # Errors
    /// [`TableError::LengthMismatch`] if `values` does not have one entry per row.
    pub fn set_column(&mut self, column: &str, values: Vec<Value>) -> Result<(), TableError> {
        self.check_len(column, values.len())?;
        match self.column_index(column) {
            Some(idx) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[idx] = v;
                }
            }
            None => {
                self.columns.push(column.to_string());
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
        }
        Ok(())
    }

    /// Insert a new column at position `index` (clamped to the column count).
    ///
    /// # Errors
    /// [`TableError::DuplicateColumn`] if the name exists, or a length mismatch.
    pub fn insert_column(
        &mut self,
        index: usize,
        column: &str,
        values: Vec<Value>,
    ) -> Result<(), TableError> {
        if self.has_column(column) {
            return Err(TableError::DuplicateColumn(column.to_string()));
        }
        self.check_len(column, values.len())?;
        let index = index.min(self.columns.len());
        self.columns.insert(index, column.to_string());
        for (row, v) in self.rows.iter_mut().zip(values) {
            row.insert(index, v);
        }
        Ok(())
    }

    /// Remove a column and return its values.
    pub fn drop_column(&mut self, column: &str) -> Option<Vec<Value>> {
        let idx = self.column_index(column)?;
        self.columns.remove(idx);
        Some(self.rows.iter_mut().map(|row| row.remove(idx)).collect())
    }

    /// # Errors
    /// Missing source column or an already-taken target name.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), TableError> {
        if from == to {
            return Ok(());
        }
        if self.has_column(to) {
            return Err(TableError::DuplicateColumn(to.to_string()));
        }
        let idx = self
            .column_index(from)
            .ok_or_else(|| TableError::MissingColumn(from.to_string()))?;
        self.columns[idx] = to.to_string();
        Ok(())
    }

    /// Rewrite every cell of `column` in place. Returns `false` if the column is absent.
    pub fn map_column(&mut self, column: &str, mut f: impl FnMut(&Value) -> Value) -> bool {
        let Some(idx) = self.column_index(column) else {
            return false;
        };
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
        true
    }

    /// Compute a column from whole rows and set it (replacing an existing one).
    pub fn derive_column(&mut self, column: &str, mut f: impl FnMut(RowRef<'_>) -> Value) {
        let values: Vec<Value> = self.rows().map(&mut f).collect();
        // length always matches: one value per row
        let _ = self.set_column(column, values);
    }

    /// Exchange the contents of two columns, keeping their names and positions.
    ///
    /// # Errors
    /// [`TableError::MissingColumn`] if either column is absent.
    pub fn swap_columns(&mut self, a: &str, b: &str) -> Result<(), TableError> {
        let ia = self
            .column_index(a)
            .ok_or_else(|| TableError::MissingColumn(a.to_string()))?;
        let ib = self
            .column_index(b)
            .ok_or_else(|| TableError::MissingColumn(b.to_string()))?;
        for row in &mut self.rows {
            row.swap(ia, ib);
        }
        Ok(())
    }

    /// Keep only rows matching `keep`. Returns the number of rows dropped.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(RowRef<'_>) -> bool) -> usize {
        let before = self.rows.len();
        let columns = &self.columns;
        self.rows.retain(|values| keep(RowRef { columns, values }));
        before - self.rows.len()
    }

    fn check_len(&self, column: &str, got: usize) -> Result<(), TableError> {
        if got == self.rows.len() {
            Ok(())
        } else {
            Err(TableError::LengthMismatch {
                column: column.to_string(),
                expected: self.rows.len(),
                got,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, Value)]) -> EventRecord {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn from_records_unions_columns_and_pads_nulls() {
        let t = Table::from_records(&[
            rec(&[("a", Value::Int(1))]),
            rec(&[("a", Value::Int(2)), ("b", "x".into())]),
        ]);
        assert_eq!(t.columns(), ["a", "b"]);
        assert_eq!(t.get(0, "b"), Some(&Value::Null));
        assert_eq!(t.get(1, "b"), Some(&Value::from("x")));
    }

    #[test]
    fn insert_and_drop_keep_alignment() {
        let mut t = Table::new(["a", "c"]);
        t.push_row(vec![1.into(), 3.into()]);
        t.insert_column(1, "b", vec![2.into()]).unwrap();
        assert_eq!(t.columns(), ["a", "b", "c"]);
        assert_eq!(t.row(0).unwrap().values(), [Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(t.drop_column("b"), Some(vec![Value::Int(2)]));
        assert_eq!(t.columns(), ["a", "c"]);
    }

    #[test]
    fn set_column_rejects_wrong_length() {
        let mut t = Table::new(["a"]);
        t.push_row(vec![1.into()]);
        let err = t.set_column("b", vec![]).unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch { expected: 1, got: 0, .. }));
    }

    #[test]
    fn swap_and_retain() {
        let mut t = Table::new(["world", "biome"]);
        t.push_row(vec!["desert".into(), "overworld".into()]);
        t.push_row(vec!["ocean".into(), "nether".into()]);
        t.swap_columns("world", "biome").unwrap();
        assert_eq!(t.get(0, "world"), Some(&Value::from("overworld")));
        let dropped = t.retain_rows(|r| r.get("world") != Some(&Value::from("nether")));
        assert_eq!(dropped, 1);
        assert_eq!(t.row_count(), 1);
    }
}
