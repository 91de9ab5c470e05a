//! The no-overlay baseline: a full scan of the first column, point-probing
//! the rest. The harness times it against the hierarchical planners, and
//! the test suite uses it as the ground truth for answer-set equivalence.

use anyhow::Result;
use store::ColumnStore;

/// Finds every key whose value in `columns[i]` equals `values[i]` for all i,
/// the slow way: iterate the merged live view of `columns[0]` and verify the
/// other columns per key.
///
/// # Errors
///
/// Returns an error on arity mismatch, unknown column family, or read
/// failure.
pub fn scan_for_records(
    store: &ColumnStore,
    columns: &[&str],
    values: &[Vec<u8>],
) -> Result<Vec<Vec<u8>>> {
    anyhow::ensure!(
        !columns.is_empty() && columns.len() == values.len(),
        "number of columns and values must be equal and non-empty"
    );

    let candidates = store.full_scan_cf(columns[0], |_, value| value == values[0])?;

    let mut matching = Vec::new();
    for key in candidates {
        let mut all_match = true;
        for (cf, expected) in columns[1..].iter().zip(&values[1..]) {
            match store.point_get(cf, &key)? {
                Some(actual) if actual == *expected => {}
                _ => {
                    all_match = false;
                    break;
                }
            }
        }
        if all_match {
            matching.push(key);
        }
    }

    tracing::debug!(matches = matching.len(), "baseline scan finished");
    Ok(matching)
}
