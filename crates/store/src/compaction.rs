//! Compaction: merges all of a CF's L0 + L1 SSTables into a single L1 table.
//!
//! Uses [`MergeIterator`] for sorted, deduplicated streaming from multiple
//! tables. Because this is a *full* compaction there are no older tables
//! left to shadow, so every tombstone is garbage-collected. The result is
//! written atomically, old files are deleted, and the manifest is updated.

use anyhow::Result;
use sstable::{MergeIterator, TableReader, TableWriter};
use std::cell::Cell;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cf::ColumnFamily;

impl ColumnFamily {
    /// Compacts all SSTables of this CF into one merged L1 SSTable.
    ///
    /// Streams [`MergeIterator`] output straight into [`TableWriter`]
    /// without materializing the dataset; memory use is bounded by the new
    /// table's bloom filter and index, not the data volume. Duplicates are
    /// resolved by highest sequence number; tombstones are dropped.
    ///
    /// If every surviving entry was a tombstone, the CF ends up with no
    /// SSTables at all (and an empty manifest).
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure during merge, write, or cleanup.
    pub(crate) fn compact(&mut self) -> Result<()> {
        let total = self.l0.len() + self.l1.len();
        if total == 0 {
            return Ok(());
        }
        if self.l0.is_empty() && self.l1.len() == 1 {
            return Ok(()); // already fully compacted
        }

        // Paths of the input files, for deletion afterwards.
        let old_paths: Vec<PathBuf> = self
            .l0
            .iter()
            .chain(self.l1.iter())
            .map(|r| r.path().to_path_buf())
            .collect();

        // Move L0 + L1 into a contiguous vec for MergeIterator.
        let mut inputs: Vec<TableReader> = Vec::with_capacity(total);
        inputs.append(&mut self.l0);
        inputs.append(&mut self.l1);

        // Estimate entry count for the new table's key bloom.
        let estimated_count: usize = inputs.iter().map(|r| r.len()).sum();

        let ts = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
        let sst_name = format!("sst-{:020}-{}.sst", self.seq, ts);
        let sst_path = self.dir.join(&sst_name);

        let mut merge = MergeIterator::new(&inputs);
        let mut merge_error: Option<anyhow::Error> = None;
        let emitted = Cell::new(0usize);

        let streaming = std::iter::from_fn(|| loop {
            match merge.next_entry() {
                // Full compaction: a tombstone has nothing older to shadow.
                Ok(Some((_, entry))) if entry.value.is_none() => continue,
                Ok(Some(pair)) => {
                    emitted.set(emitted.get() + 1);
                    return Some(pair);
                }
                Ok(None) => return None,
                Err(e) => {
                    merge_error = Some(e);
                    return None;
                }
            }
        });

        let write_result = TableWriter::write_from_iter(&sst_path, estimated_count, streaming);

        if let Some(e) = merge_error {
            let _ = std::fs::remove_file(sst_path.with_extension("sst.tmp"));
            return Err(e);
        }

        if emitted.get() == 0 {
            // Everything was deleted; the writer refused to produce an empty
            // table. Drop the inputs and leave the CF with no SSTables.
            drop(inputs);
            for p in &old_paths {
                let _ = std::fs::remove_file(p);
            }
            self.manifest.clear();
            self.manifest.save()?;
            tracing::debug!(cf = %self.name, "compaction eliminated all entries");
            return Ok(());
        }
        write_result?;

        self.manifest.replace_all_with_l1(sst_name);
        self.manifest.save()?;

        // Drop old readers (releases file handles) before deleting files.
        drop(inputs);
        for p in old_paths.iter().filter(|p| **p != sst_path) {
            let _ = std::fs::remove_file(p);
        }

        let reader = TableReader::open(&sst_path)?;
        tracing::debug!(
            cf = %self.name,
            inputs = total,
            entries = reader.len(),
            "compaction finished"
        );
        self.l1 = vec![reader];

        Ok(())
    }
}
