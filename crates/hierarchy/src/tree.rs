//! Bottom-up construction and pruned descent of one column's hierarchy.

use anyhow::Result;
use bloom::BloomFilter;
use std::path::{Path, PathBuf};

use crate::{HierarchyParams, Node, NodeKind};

/// A built, immutable Bloom hierarchy for one column family.
///
/// Holds the root of an owned node tree (or nothing, for a column with no
/// data) plus the parameters it was built with. Shared read-only across
/// query tasks; lives for a query batch and is dropped on rebuild.
#[derive(Debug)]
pub struct Hierarchy {
    root: Option<Node>,
    params: HierarchyParams,
    leaf_count: usize,
}

impl Hierarchy {
    /// Builds the tree from finished leaves.
    ///
    /// Leaves are sorted by `start_key` once; grouping preserves order, so
    /// every level above inherits the sort. Each round groups `branching`
    /// consecutive nodes under a fresh parent whose filter is the OR of the
    /// group's filters and whose range is the union of the group's ranges.
    /// An empty leaf list yields a rootless hierarchy whose queries return
    /// nothing.
    pub fn build(mut leaves: Vec<Node>, params: HierarchyParams) -> Self {
        let leaf_count = leaves.len();
        if leaves.is_empty() {
            return Self {
                root: None,
                params,
                leaf_count,
            };
        }

        leaves.sort_by(|a, b| a.start_key.cmp(&b.start_key));

        let branching = params.branching.max(2);
        let mut level = leaves;
        while level.len() > 1 {
            let mut parents = Vec::with_capacity(level.len().div_ceil(branching));
            let mut drain = level.into_iter().peekable();

            while drain.peek().is_some() {
                let group: Vec<Node> = drain.by_ref().take(branching).collect();

                let mut bloom = BloomFilter::new(params.bloom_bits, params.hash_count);
                // Level order gives the min start for free; ranges may
                // overlap, so the max end must be computed.
                let start_key = group[0].start_key.clone();
                let mut end_key = group[0].end_key.clone();
                for child in &group {
                    bloom.merge(&child.bloom);
                    if child.end_key > end_key {
                        end_key = child.end_key.clone();
                    }
                }

                parents.push(Node {
                    bloom,
                    start_key,
                    end_key,
                    kind: NodeKind::Internal { children: group },
                });
            }

            level = parents;
        }

        Self {
            root: level.pop(),
            params,
            leaf_count,
        }
    }

    /// Root node, if the hierarchy is non-empty.
    #[must_use]
    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    /// Parameters the hierarchy was built with.
    #[must_use]
    pub fn params(&self) -> &HierarchyParams {
        &self.params
    }

    /// Number of leaves below the root.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// SST files of all leaves whose range overlaps `[qstart, qend]` and
    /// whose filter admits `value`. Empty bounds are unbounded.
    ///
    /// Every node visit that passes the range test costs one Bloom probe,
    /// recorded in the process-wide counters (leaf probes tagged
    /// separately). The whole surviving frontier is returned; there is no
    /// early stop.
    pub fn query(&self, value: &[u8], qstart: &[u8], qend: &[u8]) -> Vec<PathBuf> {
        self.query_nodes(value, qstart, qend)
            .into_iter()
            .filter_map(|leaf| leaf.sst().map(Path::to_path_buf))
            .collect()
    }

    /// Like [`query`](Self::query), but returns the surviving leaf nodes
    /// themselves (the planners need their key ranges too).
    pub fn query_nodes(&self, value: &[u8], qstart: &[u8], qend: &[u8]) -> Vec<&Node> {
        let mut results = Vec::new();
        if let Some(root) = &self.root {
            Self::search(root, value, qstart, qend, &mut results);
        }
        results
    }

    fn search<'a>(
        node: &'a Node,
        value: &[u8],
        qstart: &[u8],
        qend: &[u8],
        results: &mut Vec<&'a Node>,
    ) {
        if !node.overlaps(qstart, qend) {
            return;
        }

        metrics::record_bloom_probe(node.is_leaf());
        if !node.bloom.contains(value) {
            return;
        }

        match &node.kind {
            NodeKind::Leaf { .. } => results.push(node),
            NodeKind::Internal { children } => {
                for child in children {
                    Self::search(child, value, qstart, qend, results);
                }
            }
        }
    }

    /// All leaves in `start_key` order.
    pub fn leaves(&self) -> Vec<&Node> {
        let mut out = Vec::with_capacity(self.leaf_count);
        if let Some(root) = &self.root {
            Self::collect_leaves(root, &mut out);
        }
        out
    }

    fn collect_leaves<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
        match &node.kind {
            NodeKind::Leaf { .. } => out.push(node),
            NodeKind::Internal { children } => {
                for child in children {
                    Self::collect_leaves(child, out);
                }
            }
        }
    }

    /// Summed serialized size of all leaf filters in bytes — the disk
    /// footprint a persisted overlay would occupy.
    #[must_use]
    pub fn filter_bytes(&self) -> u64 {
        self.leaves()
            .iter()
            .map(|l| l.bloom.serialized_size() as u64)
            .sum()
    }

    /// In-memory footprint of every filter in the tree (internals included).
    #[must_use]
    pub fn memory_bytes(&self) -> u64 {
        let mut total = 0u64;
        if let Some(root) = &self.root {
            Self::sum_memory(root, &mut total);
        }
        total
    }

    fn sum_memory(node: &Node, total: &mut u64) {
        *total += node.bloom.memory_size() as u64;
        for child in node.children() {
            Self::sum_memory(child, total);
        }
    }

    /// Dumps every leaf filter into `dir` (one `.bloom` file per leaf, in
    /// leaf order), returning the bytes written. Only the disk-footprint
    /// experiment reads these files; no query path does.
    pub fn dump_leaf_filters(&self, dir: &Path) -> Result<u64> {
        std::fs::create_dir_all(dir)?;
        let mut written = 0u64;
        for (i, leaf) in self.leaves().iter().enumerate() {
            let path = dir.join(format!("leaf-{:06}.bloom", i));
            let mut f = std::io::BufWriter::new(std::fs::File::create(&path)?);
            leaf.bloom.write_to(&mut f)?;
            written += leaf.bloom.serialized_size() as u64;
        }
        Ok(written)
    }
}
