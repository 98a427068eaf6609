//! JSON Lines (JSONL) I/O for raw-table artifacts.
//!
//! [`write_table_jsonl`] stores a [`Table`] as a header line (the ordered column
//! list) followed by one JSON array of cells per row; [`read_table_jsonl`] reads it
//! back.
//!
//! The table form keeps column order and the unparseable marker intact, which a plain
//! list of JSON objects would not. Empty/whitespace-only lines are skipped on read.

use crate::io::atomic::write_atomic;
use crate::table::Table;
use crate::value::Value;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// First line of a table artifact.
#[derive(Serialize, Deserialize)]
struct TableHeader {
    columns: Vec<String>,
}

/// Write a table artifact: header line, then one cell array per row.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_table_jsonl(path: impl AsRef<Path>, table: &Table) -> Result<usize> {
    let path = path.as_ref();
    write_atomic(path, |w| {
        let header = TableHeader {
            columns: table.columns().to_vec(),
        };
        serde_json::to_writer(&mut *w, &header).context("serialize header")?;
        w.write_all(b"\n")?;
        for (i, row) in table.rows().enumerate() {
            serde_json::to_writer(&mut *w, row.values())
                .with_context(|| format!("serialize row #{} to {}", i, path.display()))?;
            w.write_all(b"\n")?;
        }
        Ok(table.row_count())
    })
}

/// Read a table artifact written by [`write_table_jsonl`].
///
/// # Errors
/// Returns an error on I/O failure, a missing header, or a row whose width differs
/// from the header.
pub fn read_table_jsonl(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut lines = BufReader::new(f)
        .lines()
        .enumerate()
        .filter(|(_, l)| l.as_ref().map_or(true, |s| !s.trim().is_empty()));

    let Some((_, header)) = lines.next() else {
        bail!("{} is empty (missing header line)", path.display());
    };
    let header: TableHeader = serde_json::from_str(&header?)
        .with_context(|| format!("parse header of {}", path.display()))?;
    let width = header.columns.len();
    let mut table = Table::new(header.columns);

    for (i, line) in lines {
        let line = line.with_context(|| format!("read line {} in {}", i + 1, path.display()))?;
        let row: Vec<Value> = serde_json::from_str(&line)
            .with_context(|| format!("parse row on line {} in {}", i + 1, path.display()))?;
        if row.len() != width {
            bail!(
                "row on line {} in {} has {} cells, header has {}",
                i + 1,
                path.display(),
                row.len(),
                width
            );
        }
        table.push_row(row);
    }
    Ok(table)
}
