//! The multi-column DFS join.
//!
//! Recursion state is a *combo*: one node per queried column plus the
//! running intersection of their key ranges. Every step checks range
//! validity, gates on all n Bloom filters, expands each column's node into
//! its admitting children, and recurses over the Cartesian product of the
//! per-column candidates. When a combo is all leaves, the n SST scans run
//! in parallel and their key sets are intersected.

use hierarchy::{Hierarchy, Node};
use rayon::prelude::*;
use std::cmp;
use std::collections::HashSet;
use store::ColumnStore;

/// One step of the lock-step descent: one node per column plus the running
/// range intersection.
struct Combo<'a> {
    nodes: Vec<&'a Node>,
    range_start: &'a [u8],
    range_end: &'a [u8],
}

/// Runs the hierarchical multi-column equality join.
///
/// `trees[i]` is the hierarchy of the column whose target is `values[i]`.
/// `global_start` / `global_end` clip the key range; empty means unbounded.
///
/// Returns matching keys in unspecified order. A key covered by several
/// overlapping leaf combos may appear more than once. Inconsistent input
/// (no columns, arity mismatch) is logged and yields no matches, as does an
/// empty hierarchy (a conjunction over a column with no data is vacuous).
pub fn multi_column_query(
    store: &ColumnStore,
    trees: &[&Hierarchy],
    values: &[Vec<u8>],
    global_start: &[u8],
    global_end: &[u8],
) -> Vec<Vec<u8>> {
    let n = trees.len();
    if n == 0 || n != values.len() {
        tracing::error!(
            trees = n,
            values = values.len(),
            "join needs one value per hierarchy and at least one column"
        );
        return Vec::new();
    }

    let roots: Option<Vec<&Node>> = trees.iter().map(|t| t.root()).collect();
    let roots = match roots {
        Some(r) => r,
        None => return Vec::new(), // some column holds no data at all
    };

    // Initial range: the intersection of every root's range, clipped by the
    // caller's bounds. Node keys are never empty, so max() absorbs an empty
    // (unbounded) global_start on its own; an empty global_end must not win
    // a min(), so it is applied conditionally.
    let mut range_start = global_start;
    let mut range_end: &[u8] = roots[0].end_key.as_slice();
    for root in &roots {
        range_start = cmp::max(range_start, root.start_key.as_slice());
        range_end = cmp::min(range_end, root.end_key.as_slice());
    }
    if !global_end.is_empty() {
        range_end = cmp::min(range_end, global_end);
    }

    let mut matches = Vec::new();
    dfs(
        store,
        values,
        Combo {
            nodes: roots,
            range_start,
            range_end,
        },
        &mut matches,
    );

    tracing::debug!(matches = matches.len(), columns = n, "multi-column join finished");
    matches
}

fn dfs<'a>(
    store: &ColumnStore,
    values: &[Vec<u8>],
    combo: Combo<'a>,
    matches: &mut Vec<Vec<u8>>,
) {
    let n = combo.nodes.len();

    // 1. Range validity: a vacuous intersection prunes before any filter is
    //    probed, same ordering as the child expansion below.
    if combo.range_start > combo.range_end {
        return;
    }

    // 2. Bloom gate: every column must admit its value here.
    for (node, value) in combo.nodes.iter().zip(values) {
        metrics::record_bloom_probe(node.is_leaf());
        if !node.bloom.contains(value) {
            return;
        }
    }

    // 3. Termination: all leaves -> scan and intersect.
    if combo.nodes.iter().all(|nd| nd.is_leaf()) {
        let keys = final_scan_and_intersect(store, &combo, values);
        matches.extend(keys);
        return;
    }

    // 4. Per-column expansion. A leaf stays as its own sole candidate (never
    //    descend past a leaf); an internal node is replaced by the children
    //    that overlap the combo range AND admit the column's value.
    let mut candidate_options: Vec<Vec<&'a Node>> = Vec::with_capacity(n);
    for (node, value) in combo.nodes.iter().zip(values) {
        let options: Vec<&'a Node> = if node.is_leaf() {
            vec![*node]
        } else {
            node.children()
                .iter()
                .filter(|child| {
                    if child.end_key.as_slice() < combo.range_start
                        || child.start_key.as_slice() > combo.range_end
                    {
                        return false;
                    }
                    metrics::record_bloom_probe(child.is_leaf());
                    child.bloom.contains(value)
                })
                .collect()
        };
        if options.is_empty() {
            return; // this column admits nothing below here
        }
        candidate_options.push(options);
    }

    // 5. Cartesian recursion over the candidate tuples, tightening the range
    //    column by column. Index-vector recursion with one on-stack buffer;
    //    no intermediate product collections.
    let mut chosen: Vec<&'a Node> = combo.nodes.clone();
    backtrack(
        store,
        values,
        &candidate_options,
        0,
        &mut chosen,
        combo.range_start,
        combo.range_end,
        matches,
    );
}

#[allow(clippy::too_many_arguments)]
fn backtrack<'a>(
    store: &ColumnStore,
    values: &[Vec<u8>],
    candidate_options: &[Vec<&'a Node>],
    idx: usize,
    chosen: &mut Vec<&'a Node>,
    cur_start: &'a [u8],
    cur_end: &'a [u8],
    matches: &mut Vec<Vec<u8>>,
) {
    if idx == candidate_options.len() {
        dfs(
            store,
            values,
            Combo {
                nodes: chosen.clone(),
                range_start: cur_start,
                range_end: cur_end,
            },
            matches,
        );
        return;
    }

    for candidate in &candidate_options[idx] {
        let next_start = cmp::max(cur_start, candidate.start_key.as_slice());
        let next_end = cmp::min(cur_end, candidate.end_key.as_slice());
        if next_start <= next_end {
            chosen[idx] = *candidate;
            backtrack(
                store,
                values,
                candidate_options,
                idx + 1,
                chosen,
                next_start,
                next_end,
                matches,
            );
        }
    }
}

/// Terminal combo: scan each leaf's SST for its column's value within the
/// combo range (clipped to the leaf), in parallel, then intersect the key
/// sets smallest-first.
fn final_scan_and_intersect(
    store: &ColumnStore,
    combo: &Combo<'_>,
    values: &[Vec<u8>],
) -> Vec<Vec<u8>> {
    let mut key_sets: Vec<HashSet<Vec<u8>>> = combo
        .nodes
        .par_iter()
        .zip(values.par_iter())
        .map(|(leaf, value)| {
            metrics::record_sst_scans(1);
            let scan_start = cmp::max(combo.range_start, leaf.start_key.as_slice());
            let scan_end = cmp::min(combo.range_end, leaf.end_key.as_slice());
            let sst = leaf.sst().expect("terminal combo nodes are leaves");
            match store.scan_sst_for_value(sst, value, scan_start, scan_end) {
                Ok(keys) => keys.into_iter().collect(),
                Err(e) => {
                    tracing::error!(file = %sst.display(), error = %e, "final scan failed");
                    HashSet::new()
                }
            }
        })
        .collect();

    // Intersect starting from the smallest set; bail as soon as it empties.
    key_sets.sort_by_key(HashSet::len);
    let mut sets = key_sets.into_iter();
    let mut result = match sets.next() {
        Some(first) => first,
        None => return Vec::new(),
    };
    for set in sets {
        result.retain(|k| set.contains(k));
        if result.is_empty() {
            return Vec::new();
        }
    }

    result.into_iter().collect()
}
