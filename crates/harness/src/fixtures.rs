//! Record fixtures and database initialisation.
//!
//! The record layout is fixed: keys are `"key"` plus the record index
//! zero-padded to 20 digits (so keys sort lexicographically in index
//! order), and values are `<column>_value<index>` followed by a 1000-byte
//! `'a'` filler. The filler exists solely to make SST files large enough
//! for LSM levels to matter.

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;
use store::ColumnStore;
use tracing::{debug, info};

use crate::params::experiment_store_config;

/// Filler appended to every value.
const VALUE_FILLER_LEN: usize = 1000;

/// WAL fsync cadence during bulk loads.
const SYNC_EVERY: usize = 10_000;

/// `"key" + zero-padded(index, width 20)`.
pub fn make_key(index: usize) -> Vec<u8> {
    format!("key{:020}", index).into_bytes()
}

/// `<column>_value<index>` plus the filler.
pub fn make_value(column: &str, index: usize) -> Vec<u8> {
    let mut v = format!("{}_value{}", column, index).into_bytes();
    v.resize(v.len() + VALUE_FILLER_LEN, b'a');
    v
}

/// `<column><pattern>` plus the filler — the value injected at target rows.
pub fn make_target_value(column: &str, pattern: &str) -> Vec<u8> {
    let mut v = format!("{}{}", column, pattern).into_bytes();
    v.resize(v.len() + VALUE_FILLER_LEN, b'a');
    v
}

/// Opens an experiment database with the default columns.
pub fn open_experiment_db(path: &Path) -> Result<ColumnStore> {
    ColumnStore::open(path, crate::params::DEFAULT_COLUMNS, experiment_store_config())
}

/// Bulk-inserts `num_records` records across `columns`.
///
/// Record `i` gets the same key in every CF and the per-column value of
/// [`make_value`]. The WAL is fsynced every [`SYNC_EVERY`] records rather
/// than per put.
pub fn insert_records(db: &mut ColumnStore, columns: &[&str], num_records: usize) -> Result<()> {
    info!(records = num_records, columns = columns.len(), "bulk insert started");
    for i in 1..=num_records {
        let key = make_key(i);
        for column in columns {
            db.put(column, key.clone(), make_value(column, i))?;
        }
        if i % SYNC_EVERY == 0 {
            for column in columns {
                db.sync_wal(column)?;
            }
            debug!(inserted = i, "bulk insert progress");
        }
    }
    Ok(())
}

/// Like [`insert_records`], but rows whose index is in `target_indices`
/// get `<column><pattern>` instead of the normal value in every column.
pub fn insert_records_with_targets(
    db: &mut ColumnStore,
    columns: &[&str],
    num_records: usize,
    target_indices: &HashSet<usize>,
    pattern: &str,
) -> Result<()> {
    info!(
        records = num_records,
        targets = target_indices.len(),
        "bulk insert with search targets started"
    );
    for i in 1..=num_records {
        let key = make_key(i);
        let is_target = target_indices.contains(&i);
        for column in columns {
            let value = if is_target {
                make_target_value(column, pattern)
            } else {
                make_value(column, i)
            };
            db.put(column, key.clone(), value)?;
        }
        if i % SYNC_EVERY == 0 {
            for column in columns {
                db.sync_wal(column)?;
            }
            debug!(inserted = i, "bulk insert progress");
        }
    }
    Ok(())
}

/// First-time initialisation of a shared experiment database: bulk insert,
/// flush every CF, compact every CF. Leaves the store quiescent, the state
/// the overlay builders assume.
pub fn init_shared_db(db: &mut ColumnStore, columns: &[&str], num_records: usize) -> Result<()> {
    insert_records(db, columns, num_records)?;
    db.flush_all()?;
    db.compact_all()?;
    info!("shared database initialised (flushed and compacted)");
    Ok(())
}

/// Removes leaf-filter dumps from previous runs of the build-metrics
/// experiment.
pub fn clear_bloom_files(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e == "bloom").unwrap_or(false) {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
