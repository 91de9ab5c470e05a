//! # Query - Join Planners Over the Bloom Overlay
//!
//! Answers equality-conjunction queries — `col1 = v1 AND col2 = v2 AND …` —
//! over a [`store::ColumnStore`], using one [`hierarchy::Hierarchy`] per
//! queried column to prune the SSTable reads.
//!
//! Three strategies, equivalent at the answer-set level:
//!
//! | Strategy | Entry point | How it prunes |
//! |----------|-------------|---------------|
//! | Multi-column DFS join | [`multi_column_query`] | Descends all hierarchies in lock-step; a branch dies as soon as any column's filter or the running range intersection rejects it. Surviving leaf combos get parallel SST scans, intersected per combo. |
//! | Single-hierarchy planner | [`single_hierarchy_query`] | Descends only the first column's hierarchy, scans its surviving leaves, then point-probes the other column families per candidate key. |
//! | Naive baseline | [`scan_for_records`] | No overlay: full scan of the first column, point-probing the rest. |
//!
//! All three bump the process-wide [`metrics`] counters so the harness can
//! compare how much work each strategy really did.
//!
//! Results are keys. The multi-column join may emit the same key more than
//! once when different leaf combos cover it (overlapping SSTs across LSM
//! levels); callers that need a set should project into one.

mod baseline;
mod join;
mod single;

pub use baseline::scan_for_records;
pub use join::multi_column_query;
pub use single::single_hierarchy_query;
