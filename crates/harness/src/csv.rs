//! Comma-separated result files under `csv/`.
//!
//! Headers are fixed strings written once, when the file is first created;
//! result rows append across runs.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Directory all result files land in.
pub const CSV_DIR: &str = "csv";

/// Ensures `csv/<name>` exists with `header` as its first line.
pub fn ensure_header(name: &str, header: &str) -> Result<()> {
    std::fs::create_dir_all(CSV_DIR)?;
    let path = Path::new(CSV_DIR).join(name);
    if path.exists() {
        return Ok(());
    }
    let mut f = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("cannot create result file {}", path.display()))?;
    writeln!(f, "{}", header)?;
    Ok(())
}

/// Appends one result row to `csv/<name>`.
pub fn append_row(name: &str, row: &str) -> Result<()> {
    let path = Path::new(CSV_DIR).join(name);
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("cannot open result file {}", path.display()))?;
    writeln!(f, "{}", row)?;
    Ok(())
}
