//! # Store - SieveKV Column-Family Store
//!
//! The LSM substrate the Bloom overlay is built on: one column family (CF)
//! per logical column, each CF an independent little LSM tree made of the
//! [`memtable`], [`wal`], and [`sstable`] crates.
//!
//! ## Architecture
//!
//! ```text
//! ColumnStore (root directory)
//!   ├── phone/    ┐
//!   ├── mail/     │ one ColumnFamily per logical column
//!   ├── address/  │ (+ the "default" sentinel CF)
//!   └── default/  ┘
//!
//! Each CF directory:
//!   wal.log       write-ahead log, truncated after flush
//!   MANIFEST      level assignment of the .sst files
//!   *.sst         immutable sorted tables (L0 from flushes, L1 from compaction)
//! ```
//!
//! Every record uses the *same* key across every CF, so a key is the natural
//! join column for the query planners.
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | [`lib.rs`]     | `ColumnStore` + `StoreConfig`, CF resolution         |
//! | [`cf`]         | Per-CF write path: put/delete, WAL-first, auto-flush |
//! | [`read`]       | point_get, merged live scans, per-SST value scans    |
//! | [`compaction`] | Full CF compaction (L0 + L1 -> single L1)            |
//! | [`manifest`]   | Persistent level tracking (atomic file ops)          |
//!
//! ## Quiescence contract
//!
//! The overlay layers assume the store is **quiescent** — flushed and
//! compacted — while hierarchies are built and queried. The store itself
//! does not enforce this; the experiment harness drives `flush_all` /
//! `compact_all` before handing the store to the builder.

mod cf;
mod compaction;
mod manifest;
mod read;

use anyhow::{bail, Result};
use cf::ColumnFamily;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the sentinel column family that every store carries.
pub const DEFAULT_CF: &str = "default";

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// Tuning knobs shared by every column family of a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Memtable byte-size threshold that triggers an automatic flush.
    pub flush_threshold: usize,
    /// If `true`, every WAL append is followed by `fsync`.
    pub wal_sync: bool,
    /// Number of L0 SSTables that triggers automatic compaction after a
    /// flush. `0` disables auto-compaction (the harness compacts manually).
    pub l0_compaction_trigger: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 4 * 1024 * 1024,
            wal_sync: false,
            l0_compaction_trigger: 0,
        }
    }
}

/// A column-family keyed LSM store.
///
/// CFs are fixed at open time; writes go through [`put`](ColumnStore::put) /
/// [`delete`](ColumnStore::delete), reads through the methods in [`read`].
/// All read methods take `&self` and are safe to call from parallel query
/// tasks.
pub struct ColumnStore {
    root: PathBuf,
    cfs: BTreeMap<String, ColumnFamily>,
    config: StoreConfig,
}

impl ColumnStore {
    /// Opens (or creates) a store at `root` with the given column families.
    ///
    /// The `default` sentinel CF is always added. Each CF recovers
    /// independently: WAL replay into a fresh memtable, SSTables reloaded
    /// from the manifest, leftover temp files removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a CF directory cannot be created or its WAL or
    /// manifest is unreadable.
    pub fn open<P: AsRef<Path>>(
        root: P,
        cf_names: &[&str],
        config: StoreConfig,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let mut names: Vec<String> = cf_names.iter().map(|s| s.to_string()).collect();
        if !names.iter().any(|n| n == DEFAULT_CF) {
            names.push(DEFAULT_CF.to_string());
        }

        let mut cfs = BTreeMap::new();
        for name in names {
            let cf = ColumnFamily::open(root.join(&name), name.clone(), &config)?;
            cfs.insert(name, cf);
        }

        tracing::info!(root = %root.display(), cf_count = cfs.len(), "column store opened");

        Ok(Self { root, cfs, config })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all column families, `default` included, sorted.
    pub fn cf_names(&self) -> impl Iterator<Item = &str> {
        self.cfs.keys().map(|s| s.as_str())
    }

    /// Returns `true` if the store has a CF with this name.
    #[must_use]
    pub fn has_cf(&self, cf: &str) -> bool {
        self.cfs.contains_key(cf)
    }

    /// Inserts a key-value pair into one column family.
    ///
    /// WAL-first: the record is appended to the CF's log, then applied to
    /// its memtable. Crossing the flush threshold flushes automatically.
    pub fn put(&mut self, cf: &str, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.cf_mut(cf)?.put(key, value)
    }

    /// Deletes a key from one column family (writes a tombstone).
    pub fn delete(&mut self, cf: &str, key: Vec<u8>) -> Result<()> {
        self.cf_mut(cf)?.delete(key)
    }

    /// Flushes one CF's memtable to a new L0 SSTable (no-op when empty).
    pub fn flush(&mut self, cf: &str) -> Result<()> {
        self.cf_mut(cf)?.force_flush()
    }

    /// Flushes every column family.
    pub fn flush_all(&mut self) -> Result<()> {
        for cf in self.cfs.values_mut() {
            cf.force_flush()?;
        }
        Ok(())
    }

    /// Compacts one CF: all L0 + L1 SSTables into a single L1 SSTable.
    pub fn compact(&mut self, cf: &str) -> Result<()> {
        self.cf_mut(cf)?.compact()
    }

    /// Fsyncs one CF's WAL. Bulk loads run with `wal_sync = false` and call
    /// this once per batch instead of once per record.
    pub fn sync_wal(&mut self, cf: &str) -> Result<()> {
        self.cf_mut(cf)?.sync_wal()
    }

    /// Compacts every column family.
    pub fn compact_all(&mut self) -> Result<()> {
        for cf in self.cfs.values_mut() {
            cf.compact()?;
        }
        Ok(())
    }

    /// Total number of SSTables across the given CF's levels.
    pub fn sstable_count(&self, cf: &str) -> Result<usize> {
        let cf = self.cf_ref(cf)?;
        Ok(cf.l0.len() + cf.l1.len())
    }

    pub(crate) fn cf_ref(&self, name: &str) -> Result<&ColumnFamily> {
        match self.cfs.get(name) {
            Some(cf) => Ok(cf),
            None => bail!("unknown column family: {}", name),
        }
    }

    fn cf_mut(&mut self, name: &str) -> Result<&mut ColumnFamily> {
        match self.cfs.get_mut(name) {
            Some(cf) => Ok(cf),
            None => bail!("unknown column family: {}", name),
        }
    }
}

impl std::fmt::Debug for ColumnStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnStore")
            .field("root", &self.root)
            .field("cfs", &self.cfs.keys().collect::<Vec<_>>())
            .field("flush_threshold", &self.config.flush_threshold)
            .finish()
    }
}
