use super::*;
use anyhow::Result;
use bloom::BloomFilter;
use store::{ColumnStore, StoreConfig};
use tempfile::tempdir;

fn small_params() -> HierarchyParams {
    HierarchyParams {
        bloom_bits: 64,
        hash_count: 2,
        branching: 2,
        partition_size: 1,
    }
}

fn leaf(value: &[u8], sst: &str, start: &[u8], end: &[u8], params: &HierarchyParams) -> Node {
    let mut bloom = BloomFilter::new(params.bloom_bits, params.hash_count);
    bloom.insert(value);
    Node::leaf(bloom, sst.into(), start.to_vec(), end.to_vec())
}

/// Verifies the structural invariants of every internal node: range equals
/// the union of child ranges, filter admits whatever any child admits,
/// children sorted by start_key.
fn check_invariants(node: &Node, probes: &[&[u8]]) {
    let children = node.children();
    if children.is_empty() {
        return;
    }

    let min_start = children.iter().map(|c| &c.start_key).min().unwrap();
    let max_end = children.iter().map(|c| &c.end_key).max().unwrap();
    assert_eq!(&node.start_key, min_start, "parent start != min child start");
    assert_eq!(&node.end_key, max_end, "parent end != max child end");

    for w in children.windows(2) {
        assert!(w[0].start_key <= w[1].start_key, "children out of order");
    }

    for probe in probes {
        let any_child = children.iter().any(|c| c.bloom.contains(probe));
        if any_child {
            assert!(
                node.bloom.contains(probe),
                "parent filter dropped a child's value"
            );
        }
    }

    for child in children {
        check_invariants(child, probes);
    }
}

// -------------------- Tree build --------------------

#[test]
fn empty_build_yields_empty_queries() {
    // Building from 0 leaves must not error, and queries return nothing.
    let tree = Hierarchy::build(Vec::new(), small_params());
    assert!(tree.root().is_none());
    assert_eq!(tree.leaf_count(), 0);
    assert!(tree.query(b"anything", b"", b"").is_empty());
    assert!(tree.query_nodes(b"anything", b"", b"").is_empty());
    assert_eq!(tree.filter_bytes(), 0);
    assert_eq!(tree.memory_bytes(), 0);
}

#[test]
fn single_leaf_becomes_root() {
    let params = small_params();
    let tree = Hierarchy::build(vec![leaf(b"v", "a.sst", b"k1", b"k5", &params)], params);

    let root = tree.root().expect("root");
    assert!(root.is_leaf());
    assert_eq!(tree.leaf_count(), 1);
    assert_eq!(tree.query(b"v", b"", b""), vec![std::path::PathBuf::from("a.sst")]);
}

#[test]
fn build_invariants_hold() {
    let params = HierarchyParams {
        bloom_bits: 256,
        hash_count: 3,
        branching: 3,
        partition_size: 1,
    };

    // 10 leaves with overlapping ranges, deliberately unsorted
    let values: Vec<Vec<u8>> = (0..10u8).map(|i| vec![b'v', i]).collect();
    let mut leaves = Vec::new();
    for (i, v) in values.iter().enumerate().rev() {
        let start = format!("key{:02}", i * 2);
        let end = format!("key{:02}", i * 2 + 3); // overlaps the next leaf
        leaves.push(leaf(v, &format!("{}.sst", i), start.as_bytes(), end.as_bytes(), &params));
    }

    let tree = Hierarchy::build(leaves, params);
    assert_eq!(tree.leaf_count(), 10);

    let probes: Vec<&[u8]> = values.iter().map(|v| v.as_slice()).collect();
    check_invariants(tree.root().unwrap(), &probes);

    // Leaves come back in start_key order
    let got = tree.leaves();
    assert_eq!(got.len(), 10);
    for w in got.windows(2) {
        assert!(w[0].start_key <= w[1].start_key);
    }
}

#[test]
fn root_admits_every_leaf_value() {
    let params = small_params();
    let leaves: Vec<Node> = (0..7u8)
        .map(|i| {
            let key = format!("key{:02}", i);
            leaf(&[b'x', i], &format!("{}.sst", i), key.as_bytes(), key.as_bytes(), &params)
        })
        .collect();
    let tree = Hierarchy::build(leaves, params);

    let root = tree.root().unwrap();
    for i in 0..7u8 {
        assert!(root.bloom.contains(&[b'x', i]));
    }
}

// -------------------- Queries --------------------

#[test]
fn query_finds_matching_leaves() {
    // Three records, one per SST: (key01,"a"), (key02,"b"), (key03,"a").
    let params = small_params();
    let leaves = vec![
        leaf(b"a", "rec1.sst", b"key01", b"key01", &params),
        leaf(b"b", "rec2.sst", b"key02", b"key02", &params),
        leaf(b"a", "rec3.sst", b"key03", b"key03", &params),
    ];
    let tree = Hierarchy::build(leaves, params);

    let mut hits = tree.query(b"a", b"", b"");
    hits.sort();
    assert_eq!(
        hits,
        vec![
            std::path::PathBuf::from("rec1.sst"),
            std::path::PathBuf::from("rec3.sst")
        ]
    );
}

#[test]
fn query_range_prunes_leaves() {
    let params = small_params();
    let leaves = vec![
        leaf(b"a", "rec1.sst", b"key01", b"key01", &params),
        leaf(b"b", "rec2.sst", b"key02", b"key02", &params),
        leaf(b"a", "rec3.sst", b"key03", b"key03", &params),
    ];
    let tree = Hierarchy::build(leaves, params);

    // Range [key02, key03] excludes the first record's leaf
    let hits = tree.query(b"a", b"key02", b"key03");
    assert_eq!(hits, vec![std::path::PathBuf::from("rec3.sst")]);

    // Open start bound
    let mut hits = tree.query(b"a", b"", b"key02");
    hits.sort();
    assert_eq!(hits, vec![std::path::PathBuf::from("rec1.sst")]);
}

#[test]
fn query_returns_whole_surviving_frontier() {
    // The same value in every leaf: nothing may be dropped.
    let params = HierarchyParams {
        bloom_bits: 128,
        hash_count: 2,
        branching: 2,
        partition_size: 1,
    };
    let leaves: Vec<Node> = (0..9usize)
        .map(|i| {
            let key = format!("key{:02}", i);
            leaf(b"same", &format!("{}.sst", i), key.as_bytes(), key.as_bytes(), &params)
        })
        .collect();
    let tree = Hierarchy::build(leaves, params);

    assert_eq!(tree.query(b"same", b"", b"").len(), 9);
}

#[test]
fn query_completeness_matches_leaf_scan() {
    // Whatever a brute-force pass over the leaves would accept, the pruned
    // descent must return too.
    let params = HierarchyParams {
        bloom_bits: 64,
        hash_count: 2,
        branching: 3,
        partition_size: 1,
    };
    let leaves: Vec<Node> = (0..20usize)
        .map(|i| {
            let v = [b'v', (i % 4) as u8];
            let start = format!("key{:02}", i);
            let end = format!("key{:02}", i + 2);
            leaf(&v, &format!("{}.sst", i), start.as_bytes(), end.as_bytes(), &params)
        })
        .collect();
    let tree = Hierarchy::build(leaves, params);

    for probe in [&[b'v', 0u8][..], &[b'v', 3u8][..], &b"absent"[..]] {
        for (qstart, qend) in [
            (&b""[..], &b""[..]),
            (&b"key05"[..], &b"key12"[..]),
            (&b"key19"[..], &b""[..]),
        ] {
            let expected: Vec<_> = tree
                .leaves()
                .into_iter()
                .filter(|l| l.overlaps(qstart, qend) && l.bloom.contains(probe))
                .map(|l| l.sst().unwrap().to_path_buf())
                .collect();
            let mut got = tree.query(probe, qstart, qend);
            let mut expected = expected;
            got.sort();
            expected.sort();
            assert_eq!(got, expected, "probe {:?} range {:?}..{:?}", probe, qstart, qend);
        }
    }
}

#[test]
fn query_counts_bloom_probes() {
    let params = small_params();
    let leaves = vec![
        leaf(b"a", "rec1.sst", b"key01", b"key01", &params),
        leaf(b"b", "rec2.sst", b"key02", b"key02", &params),
    ];
    let tree = Hierarchy::build(leaves, params);

    let before = metrics::snapshot();
    tree.query(b"a", b"", b"");
    let delta = metrics::snapshot() - before;

    // Root probe + at least one leaf probe
    assert!(delta.bloom_probes >= 2);
    assert!(delta.leaf_bloom_probes >= 1);
}

// -------------------- Builder over a real store --------------------

fn seeded_store(dir: &std::path::Path) -> Result<ColumnStore> {
    let mut store = ColumnStore::open(
        dir,
        &["phone"],
        StoreConfig {
            flush_threshold: 1024 * 1024,
            wal_sync: false,
            l0_compaction_trigger: 0,
        },
    )?;
    // Three records, one SST each
    for (i, v) in [(1, "a"), (2, "b"), (3, "a")] {
        store.put(
            "phone",
            format!("key{:02}", i).into_bytes(),
            v.as_bytes().to_vec(),
        )?;
        store.flush("phone")?;
    }
    Ok(store)
}

#[test]
fn builder_emits_one_leaf_per_record_at_partition_one() -> Result<()> {
    let dir = tempdir()?;
    let store = seeded_store(dir.path())?;

    let tree = HierarchyBuilder::build_for_column(&store, "phone", &small_params())?;
    assert_eq!(tree.leaf_count(), 3);

    // Value "a" lives in the SSTs of records 1 and 3
    let hits = tree.query(b"a", b"", b"");
    assert_eq!(hits.len(), 2);
    let ssts = store.enumerate_ssts("phone")?;
    assert!(hits.iter().all(|h| ssts.contains(h)));
    Ok(())
}

#[test]
fn builder_range_query_scenario() -> Result<()> {
    let dir = tempdir()?;
    let store = seeded_store(dir.path())?;
    let tree = HierarchyBuilder::build_for_column(&store, "phone", &small_params())?;

    // Range [key02, key03] prunes record 1; only record 3 carries "a"
    let hits = tree.query(b"a", b"key02", b"key03");
    assert_eq!(hits.len(), 1);

    let rec3 = tree
        .query_nodes(b"a", b"key02", b"key03")
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(rec3.start_key, b"key03".to_vec());
    Ok(())
}

#[test]
fn builder_partitions_runs_with_trailing_leaf() -> Result<()> {
    let dir = tempdir()?;
    let mut store = ColumnStore::open(dir.path(), &["phone"], StoreConfig::default())?;
    for i in 0..10u32 {
        store.put(
            "phone",
            format!("key{:02}", i).into_bytes(),
            format!("value{}", i).into_bytes(),
        )?;
    }
    store.flush("phone")?; // single SST with 10 entries

    let params = HierarchyParams {
        bloom_bits: 256,
        hash_count: 2,
        branching: 3,
        partition_size: 4,
    };
    let tree = HierarchyBuilder::build_for_column(&store, "phone", &params)?;

    // 10 entries at N=4: runs of 4, 4, and a trailing 2
    assert_eq!(tree.leaf_count(), 3);
    let leaves = tree.leaves();
    assert_eq!(leaves[0].start_key, b"key00".to_vec());
    assert_eq!(leaves[0].end_key, b"key03".to_vec());
    assert_eq!(leaves[1].start_key, b"key04".to_vec());
    assert_eq!(leaves[1].end_key, b"key07".to_vec());
    assert_eq!(leaves[2].start_key, b"key08".to_vec());
    assert_eq!(leaves[2].end_key, b"key09".to_vec());

    // Each value is admitted by exactly its own run's leaf range
    let hits = tree.query(b"value5", b"", b"");
    assert!(!hits.is_empty());
    Ok(())
}

#[test]
fn builder_skips_tombstones() -> Result<()> {
    let dir = tempdir()?;
    let mut store = ColumnStore::open(dir.path(), &["phone"], StoreConfig::default())?;
    store.put("phone", b"key01".to_vec(), b"live".to_vec())?;
    store.delete("phone", b"key02".to_vec())?;
    store.put("phone", b"key03".to_vec(), b"live".to_vec())?;
    store.flush("phone")?;

    let params = HierarchyParams {
        bloom_bits: 128,
        hash_count: 2,
        branching: 2,
        partition_size: 2,
    };
    let tree = HierarchyBuilder::build_for_column(&store, "phone", &params)?;

    // Two live entries -> one full run; the tombstone contributes nothing
    assert_eq!(tree.leaf_count(), 1);
    let leaves = tree.leaves();
    assert_eq!(leaves[0].start_key, b"key01".to_vec());
    assert_eq!(leaves[0].end_key, b"key03".to_vec());
    Ok(())
}

#[test]
fn builder_on_empty_column_yields_empty_hierarchy() -> Result<()> {
    let dir = tempdir()?;
    let store = ColumnStore::open(dir.path(), &["phone"], StoreConfig::default())?;

    let tree = HierarchyBuilder::build_for_column(&store, "phone", &small_params())?;
    assert!(tree.root().is_none());
    assert!(tree.query(b"v", b"", b"").is_empty());
    Ok(())
}

#[test]
fn builder_unknown_cf_errors() {
    let dir = tempdir().unwrap();
    let store = ColumnStore::open(dir.path(), &["phone"], StoreConfig::default()).unwrap();
    assert!(HierarchyBuilder::build_for_column(&store, "bogus", &small_params()).is_err());
}

// -------------------- Size accounting --------------------

#[test]
fn size_accounting_and_filter_dump() -> Result<()> {
    let dir = tempdir()?;
    let store = seeded_store(dir.path())?;
    let tree = HierarchyBuilder::build_for_column(&store, "phone", &small_params())?;

    // 3 leaves * (12 header bytes + 8 bytes of a 64-bit array)
    assert_eq!(tree.filter_bytes(), 3 * 20);
    assert!(tree.memory_bytes() >= tree.leaf_count() as u64 * 8);

    let dump_dir = dir.path().join("filters");
    let written = tree.dump_leaf_filters(&dump_dir)?;
    assert_eq!(written, tree.filter_bytes());
    assert_eq!(std::fs::read_dir(&dump_dir)?.count(), 3);
    Ok(())
}
