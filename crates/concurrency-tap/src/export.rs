//! Flat-file snapshot of the store.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::store::PointStore;
use crate::types::TapResult;

/// Snapshot header row.
pub const HEADER: [&str; 3] = ["timestamp", "user_count", "fetched_at"];

const SEP: char = ',';
const EOL: &str = "\r\n";

/// Every stored point as a (timestamp, value, captured_at) row, in store order.
pub fn snapshot_rows(store: &PointStore) -> TapResult<Vec<[String; 3]>> {
    Ok(store
        .list_all()?
        .into_iter()
        .map(|p| [p.timestamp, p.value.to_string(), p.captured_at])
        .collect())
}

/// Write the snapshot (header plus one row per point) and return the data row count.
pub fn export<W: Write>(store: &PointStore, mut writer: W) -> TapResult<usize> {
    let rows = snapshot_rows(store)?;
    write_row(&mut writer, &HEADER)?;
    for row in &rows {
        write_row(&mut writer, row)?;
    }
    writer.flush()?;
    Ok(rows.len())
}

/// Write the snapshot to a file, replacing any previous snapshot.
pub fn export_to_path(store: &PointStore, path: &Path) -> TapResult<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    export(store, BufWriter::new(file))
}

fn needs_quotes(field: &str) -> bool {
    field.contains(SEP) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write, S: AsRef<str>>(w: &mut W, row: &[S]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, "{SEP}")?;
        }
        let cell = cell.as_ref();
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(EOL.as_bytes())
}
