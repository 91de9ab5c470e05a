//! # Hierarchy - Value-Side Bloom Overlay
//!
//! Builds and queries the per-column Bloom hierarchy that lets the query
//! planners prune SSTable reads.
//!
//! Each column family's sorted key space is partitioned into fixed-size runs
//! of entries; every run gets a **leaf**: a Bloom filter over the run's
//! *values* plus the run's `[start_key, end_key]` range and the SST file it
//! came from. Leaves are then grouped bottom-up, `branching` at a time, into
//! internal nodes whose filter is the bitwise OR of their children's and
//! whose range is the union of their children's.
//!
//! ```text
//!                      ┌────────── root ──────────┐
//!                      │ bloom = OR of everything │
//!                      └─────┬──────────────┬─────┘
//!                   ┌────────┴───┐      ┌───┴────────┐
//!                   │ internal   │      │ internal   │
//!                   └─┬────────┬─┘      └─┬────────┬─┘
//!                 ┌───┴──┐ ┌───┴──┐   ┌───┴──┐ ┌───┴──┐
//!                 │ leaf │ │ leaf │   │ leaf │ │ leaf │   one per N-entry
//!                 └──────┘ └──────┘   └──────┘ └──────┘   run of one SST
//! ```
//!
//! A query descends from the root with two tests per node: does the node's
//! key range overlap the queried range, and does its filter admit the
//! queried value? An internal filter that rejects prunes its whole subtree
//! — filters never false-negative, so pruning never loses answers. Leaf
//! ranges of one column may overlap (different SSTs cover the same keys at
//! different LSM levels), which is why the range test alone is never enough.
//!
//! Hierarchies are built once over a quiescent store and are immutable
//! afterwards; rebuild and drop is the only update path.

mod builder;
mod node;
mod tree;

pub use builder::HierarchyBuilder;
pub use node::{Node, NodeKind};
pub use tree::Hierarchy;

/// Parameters for building one column's hierarchy.
#[derive(Debug, Clone)]
pub struct HierarchyParams {
    /// Bits per Bloom filter (m). Every filter in one hierarchy shares it.
    pub bloom_bits: u64,
    /// Hash functions per filter (k).
    pub hash_count: u32,
    /// Children per internal node (r).
    pub branching: usize,
    /// Entries summarised per leaf (N).
    pub partition_size: usize,
}

impl Default for HierarchyParams {
    fn default() -> Self {
        Self {
            bloom_bits: 1_000_000,
            hash_count: 6,
            branching: 3,
            partition_size: 100_000,
        }
    }
}

#[cfg(test)]
mod tests;
