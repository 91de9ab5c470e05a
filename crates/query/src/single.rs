//! The single-hierarchy fall-back planner.
//!
//! Uses only the *first* column's hierarchy: its surviving leaves are
//! scanned for candidate keys, and every candidate is then verified against
//! the remaining column families with point lookups.

use hierarchy::Hierarchy;
use rayon::prelude::*;
use store::ColumnStore;

/// Answers the same conjunction as [`crate::multi_column_query`], pruning
/// with `tree` (the hierarchy of `columns[0]`) alone.
///
/// 1. Descend the hierarchy for `values[0]` over the whole key space.
/// 2. Scan each surviving leaf's SST for keys carrying `values[0]`,
///    clipped to the leaf's range (parallel, one task per leaf).
/// 3. For each candidate key, in parallel, point-probe every other column
///    family; keep the key iff every column reports its expected value.
///
/// Inconsistent input (no columns, arity mismatch) is logged and yields no
/// matches.
pub fn single_hierarchy_query(
    store: &ColumnStore,
    tree: &Hierarchy,
    columns: &[&str],
    values: &[Vec<u8>],
) -> Vec<Vec<u8>> {
    if columns.is_empty() || columns.len() != values.len() {
        tracing::error!(
            columns = columns.len(),
            values = values.len(),
            "planner needs one value per column and at least one column"
        );
        return Vec::new();
    }

    let candidates = tree.query_nodes(&values[0], b"", b"");
    if candidates.is_empty() {
        tracing::debug!(column = columns[0], "no candidate leaves for first column");
        return Vec::new();
    }

    // Scan every candidate leaf for the first column's value.
    let all_keys: Vec<Vec<u8>> = candidates
        .par_iter()
        .flat_map_iter(|leaf| {
            metrics::record_sst_scans(1);
            let sst = leaf.sst().expect("query_nodes returns leaves");
            match store.scan_sst_for_value(sst, &values[0], &leaf.start_key, &leaf.end_key) {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::error!(file = %sst.display(), error = %e, "candidate leaf scan failed");
                    Vec::new()
                }
            }
        })
        .collect();

    // Verify each candidate key against the remaining columns.
    let matches: Vec<Vec<u8>> = all_keys
        .into_par_iter()
        .filter(|key| {
            columns[1..]
                .iter()
                .zip(&values[1..])
                .all(|(cf, expected)| match store.point_get(cf, key) {
                    Ok(Some(actual)) => actual == *expected,
                    Ok(None) => false,
                    Err(e) => {
                        tracing::warn!(cf = %cf, error = %e, "point lookup failed during verification");
                        false
                    }
                })
        })
        .collect();

    tracing::debug!(
        matches = matches.len(),
        columns = columns.len(),
        "single-hierarchy query finished"
    );
    matches
}
