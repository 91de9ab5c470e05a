//! Read path: point lookups, merged live scans, SST enumeration, and the
//! per-SST value-equality scan the query planners delegate to.
//!
//! Point lookups check the memtable first (freshest data), then L0 tables
//! (newest-first, may overlap), then L1. The first match wins; tombstones
//! shadow older values.
//!
//! Merged scans combine the memtable and every table, deduplicate by
//! highest sequence number, and drop tombstones before returning.

use anyhow::Result;
use memtable::Entry;
use sstable::TableReader;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::ColumnStore;

impl ColumnStore {
    /// Looks up the live value of `key` in one column family.
    ///
    /// Returns `Ok(None)` when the key is absent or deleted.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown CF or on any SSTable read failure.
    pub fn point_get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_ref(cf)?;

        // 1. Memtable first (and respect tombstones).
        if let Some(entry) = cf.mem.get_entry(key) {
            return Ok(entry.value.clone());
        }

        // 2. L0 tables, newest -> oldest (may overlap).
        for sst in &cf.l0 {
            if let Some(entry) = sst.get(key)? {
                return Ok(entry.value); // tombstone hides older values
            }
        }

        // 3. L1 tables (non-overlapping).
        for sst in &cf.l1 {
            if let Some(entry) = sst.get(key)? {
                return Ok(entry.value);
            }
        }

        Ok(None)
    }

    /// Ordered SST file paths for one CF: L0 newest-first, then L1.
    ///
    /// This is the file set the hierarchy builder summarises. The store is
    /// expected to be quiescent (flushed, compacted) when this is consumed.
    pub fn enumerate_ssts(&self, cf: &str) -> Result<Vec<PathBuf>> {
        let cf = self.cf_ref(cf)?;
        Ok(cf
            .l0
            .iter()
            .chain(cf.l1.iter())
            .map(|r| r.path().to_path_buf())
            .collect())
    }

    /// Scans a single SST file for **live** keys in `[start, end]` whose
    /// value equals `target` (empty bounds = open).
    ///
    /// The file handle is scoped to this call. A file that cannot be opened
    /// is logged and contributes no keys; the query as a whole proceeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the file opens but a record fails its CRC or the
    /// read itself fails.
    pub fn scan_sst_for_value(
        &self,
        sst: &Path,
        target: &[u8],
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<Vec<u8>>> {
        let reader = match TableReader::open(sst) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(file = %sst.display(), error = %e, "failed to open SSTable for value scan");
                return Ok(Vec::new());
            }
        };
        reader.keys_with_value(target, start, end)
    }

    /// Scans the merged live view of one CF, returning the keys whose
    /// `(key, value)` satisfy `pred`.
    ///
    /// Used by the no-overlay baseline and anywhere an exhaustive
    /// column-wide check is wanted.
    pub fn full_scan_cf<F>(&self, cf: &str, mut pred: F) -> Result<Vec<Vec<u8>>>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let merged = self.merged_range(cf, b"", b"")?;
        Ok(merged
            .into_iter()
            .filter_map(|(key, entry)| entry.value.map(|v| (key, v)))
            .filter(|(key, value)| pred(key, value))
            .map(|(key, _)| key)
            .collect())
    }

    /// Live `(key, value)` pairs of one CF within `[start, end]`, ascending.
    pub fn scan_cf(&self, cf: &str, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let merged = self.merged_range(cf, start, end)?;
        Ok(merged
            .into_iter()
            .filter_map(|(key, entry)| entry.value.map(|v| (key, v)))
            .collect())
    }

    /// Collects the best (highest-seq) entry per key across the memtable and
    /// every SSTable of a CF. Tombstones are retained so callers can tell
    /// deleted from absent.
    fn merged_range(&self, cf: &str, start: &[u8], end: &[u8]) -> Result<BTreeMap<Vec<u8>, Entry>> {
        let cf = self.cf_ref(cf)?;
        let mut merged: BTreeMap<Vec<u8>, Entry> = BTreeMap::new();

        let mut merge_entry = |key: Vec<u8>, entry: Entry| match merged.get(&key) {
            Some(existing) if existing.seq >= entry.seq => {}
            _ => {
                merged.insert(key, entry);
            }
        };

        for (key, entry) in cf.mem.range(start, end) {
            merge_entry(key.clone(), entry.clone());
        }

        for sst in cf.l0.iter().chain(cf.l1.iter()) {
            sst.scan(start, end, |key, entry| {
                merge_entry(key.to_vec(), entry.clone());
                true
            })?;
        }

        Ok(merged)
    }
}
