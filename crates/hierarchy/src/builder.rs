//! Parallel construction of one column's hierarchy from its SST files.

use anyhow::Result;
use bloom::BloomFilter;
use rayon::prelude::*;
use sstable::TableReader;
use std::path::Path;
use store::ColumnStore;

use crate::{Hierarchy, HierarchyParams, Node};

/// Walks a column family's SST files and emits one leaf per `partition_size`
/// run of live entries.
///
/// One rayon task per SST file; tasks share nothing but their input path and
/// produce independent leaf lists that are concatenated after the join (the
/// tree build sorts by `start_key`, so concatenation order is irrelevant).
pub struct HierarchyBuilder;

impl HierarchyBuilder {
    /// Builds the hierarchy for one column family of a quiescent store.
    ///
    /// An SST file that fails to open or read is logged and skipped; the
    /// rest of the column still builds.
    ///
    /// # Errors
    ///
    /// Returns an error only if the CF itself is unknown.
    pub fn build_for_column(
        store: &ColumnStore,
        cf: &str,
        params: &HierarchyParams,
    ) -> Result<Hierarchy> {
        let ssts = store.enumerate_ssts(cf)?;

        let leaves: Vec<Node> = ssts
            .par_iter()
            .map(|sst| Self::leaves_for_sst(sst, params))
            .reduce(Vec::new, |mut acc, mut part| {
                acc.append(&mut part);
                acc
            });

        tracing::info!(
            cf,
            sst_files = ssts.len(),
            leaves = leaves.len(),
            "hierarchy leaves built"
        );

        Ok(Hierarchy::build(leaves, params.clone()))
    }

    /// Partitions one SST file into leaves.
    ///
    /// Walks entries in key order; every live value goes into the current
    /// run's filter. When the run reaches `partition_size` entries it is
    /// sealed as a leaf `[first_key, last_key]` and a fresh run starts. A
    /// non-empty trailing run becomes a final leaf.
    fn leaves_for_sst(sst: &Path, params: &HierarchyParams) -> Vec<Node> {
        let reader = match TableReader::open(sst) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(file = %sst.display(), error = %e, "cannot open SST file, skipping");
                return Vec::new();
            }
        };

        let mut leaves = Vec::new();
        let mut run_bloom = BloomFilter::new(params.bloom_bits, params.hash_count);
        let mut run_first: Option<Vec<u8>> = None;
        let mut run_last: Vec<u8> = Vec::new();
        let mut run_count = 0usize;
        let partition_size = params.partition_size.max(1);

        let walk = reader.scan(b"", b"", |key, entry| {
            // Tombstones carry no value; they neither feed the filter nor
            // open a run.
            let value = match &entry.value {
                Some(v) => v,
                None => return true,
            };

            if run_first.is_none() {
                run_first = Some(key.to_vec());
            }
            run_bloom.insert(value);
            run_last.clear();
            run_last.extend_from_slice(key);
            run_count += 1;

            if run_count >= partition_size {
                let first = run_first.take().expect("non-empty run has a first key");
                leaves.push(Node::leaf(
                    std::mem::replace(
                        &mut run_bloom,
                        BloomFilter::new(params.bloom_bits, params.hash_count),
                    ),
                    sst.to_path_buf(),
                    first,
                    run_last.clone(),
                ));
                run_count = 0;
            }
            true
        });

        if let Err(e) = walk {
            tracing::error!(file = %sst.display(), error = %e, "SST read failed, file contributes no leaves");
            return Vec::new();
        }

        // Trailing partial run
        if run_count > 0 {
            if let Some(first) = run_first {
                leaves.push(Node::leaf(run_bloom, sst.to_path_buf(), first, run_last));
            }
        }

        leaves
    }
}
