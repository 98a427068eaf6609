//! CSV I/O for cleaned datasets.
//!
//! Cleaned datasets are flat files meant for training code in any language, so cells
//! are written with [`Value::render`]: nulls become empty fields, nested values become
//! compact JSON and the unparseable marker becomes its reserved token. Reading back
//! yields text cells; typed consumers should use the sidecar metadata for column types.

use crate::io::atomic::write_atomic;
use crate::table::Table;
use crate::value::Value;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::File;
use std::path::Path;

/// Write `table` as CSV with a header row, atomically.
///
/// # Returns
/// The number of data rows written.
///
/// # Errors
/// Returns an error if the file/dirs cannot be created or any row fails to
/// serialize/flush.
pub fn write_table_csv(path: impl AsRef<Path>, table: &Table) -> Result<usize> {
    let path = path.as_ref();
    write_atomic(path, |w| {
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(&mut *w);
        wtr.write_record(table.columns())
            .with_context(|| format!("write CSV header to {}", path.display()))?;
        for (i, row) in table.rows().enumerate() {
            wtr.write_record(row.values().iter().map(Value::render))
                .with_context(|| format!("serialize CSV row #{}", i + 1))?;
        }
        wtr.flush()?;
        Ok(table.row_count())
    })
}

/// Read a CSV with a header row into a table of text cells (empty fields are null).
///
/// # Errors
/// Returns an error if the file cannot be opened or a record is malformed.
pub fn read_table_csv(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(f);
    let headers = rdr
        .headers()
        .with_context(|| format!("read CSV header of {}", path.display()))?
        .clone();
    let mut table = Table::new(headers.iter());
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("parse CSV record #{}", i + 1))?;
        table.push_row(
            rec.iter()
                .map(|field| {
                    if field.is_empty() {
                        Value::Null
                    } else {
                        Value::from(field)
                    }
                })
                .collect(),
        );
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_nested_and_marker_cells() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = tmp.path().join("clean.csv");
        let mut t = Table::new(["player", "stats", "score"]);
        t.push_row(vec![
            "Ash".into(),
            Value::Unparseable("{x".into()),
            Value::Float(3.0),
        ]);
        t.push_row(vec!["Misty".into(), Value::List(vec![1.into()]), Value::Null]);
        write_table_csv(&file, &t)?;

        let text = std::fs::read_to_string(&file)?;
        assert_eq!(
            text,
            "player,stats,score\nAsh,__unparseable__,3.0\nMisty,[1],\n"
        );
        let back = read_table_csv(&file)?;
        assert_eq!(back.columns(), ["player", "stats", "score"]);
        assert_eq!(back.get(1, "score"), Some(&Value::Null));
        Ok(())
    }
}
