use bloom::BloomFilter;
use std::path::{Path, PathBuf};

/// What a node summarises: one SST run (leaf) or a group of children.
#[derive(Debug)]
pub enum NodeKind {
    /// Summarises one contiguous run of entries from one SST file.
    Leaf {
        /// The SST file the run came from.
        sst: PathBuf,
    },
    /// Summarises up to `branching` children, ordered by `start_key`.
    Internal { children: Vec<Node> },
}

/// One node of a Bloom hierarchy.
///
/// A node owns its entire subtree; dropping the root frees the hierarchy.
/// No parent back-pointers — nothing here needs them.
#[derive(Debug)]
pub struct Node {
    /// Value filter: for a leaf, the values of its run; for an internal
    /// node, the OR of its children's filters.
    pub bloom: BloomFilter,
    /// Smallest key covered by this subtree.
    pub start_key: Vec<u8>,
    /// Largest key covered by this subtree.
    pub end_key: Vec<u8>,
    pub kind: NodeKind,
}

impl Node {
    /// Creates a leaf over one SST run.
    pub fn leaf(bloom: BloomFilter, sst: PathBuf, start_key: Vec<u8>, end_key: Vec<u8>) -> Self {
        Self {
            bloom,
            start_key,
            end_key,
            kind: NodeKind::Leaf { sst },
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// The SST file of a leaf; `None` for internal nodes.
    #[must_use]
    pub fn sst(&self) -> Option<&Path> {
        match &self.kind {
            NodeKind::Leaf { sst } => Some(sst),
            NodeKind::Internal { .. } => None,
        }
    }

    /// Children of an internal node; empty slice for a leaf.
    #[must_use]
    pub fn children(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Leaf { .. } => &[],
            NodeKind::Internal { children } => children,
        }
    }

    /// `true` iff this node's range intersects `[qstart, qend]`, where an
    /// empty bound is unbounded on that side.
    #[must_use]
    pub fn overlaps(&self, qstart: &[u8], qend: &[u8]) -> bool {
        (qend.is_empty() || self.start_key.as_slice() <= qend)
            && (qstart.is_empty() || self.end_key.as_slice() >= qstart)
    }
}
