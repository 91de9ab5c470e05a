//! Per-column-family write path and recovery.
//!
//! Each CF is an independent LSM tree: WAL-first writes into a sorted
//! memtable, flushed to L0 SSTables, compacted into L1. Sequence numbers
//! are per-CF monotonic.

use anyhow::Result;
use memtable::Memtable;
use sstable::{TableReader, TableWriter};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use wal::{LogReader, LogRecord, LogWriter};

use crate::manifest::Manifest;
use crate::{StoreConfig, MAX_KEY_SIZE, MAX_VALUE_SIZE};

/// Filename of the per-CF write-ahead log.
const WAL_FILENAME: &str = "wal.log";

pub(crate) struct ColumnFamily {
    pub(crate) name: String,
    pub(crate) dir: PathBuf,
    pub(crate) mem: Memtable,
    /// Level 0: SSTables from memtable flushes (may overlap). Newest first.
    pub(crate) l0: Vec<TableReader>,
    /// Level 1: SSTables from compaction (non-overlapping). Newest first.
    pub(crate) l1: Vec<TableReader>,
    pub(crate) manifest: Manifest,
    wal: LogWriter,
    wal_path: PathBuf,
    /// Current per-CF monotonic sequence number.
    pub(crate) seq: u64,
    flush_threshold: usize,
    l0_compaction_trigger: usize,
    wal_sync: bool,
}

impl ColumnFamily {
    /// Opens (or creates) one column family at `dir`, performing full
    /// recovery: temp-file cleanup, WAL replay, SSTable reload from the
    /// manifest (with a directory-scan fallback for manifest-less dirs).
    pub(crate) fn open(dir: PathBuf, name: String, config: &StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        cleanup_tmp_files(&dir);

        let wal_path = dir.join(WAL_FILENAME);

        // Replay the WAL into a fresh memtable BEFORE opening the writer.
        let mut mem = Memtable::new();
        let wal_seq = replay_wal(&wal_path, &mut mem)?;

        let wal = LogWriter::create(&wal_path, config.wal_sync)?;
        let mut manifest = Manifest::load_or_create(&dir)?;

        let mut l0 = Vec::new();
        let mut l1 = Vec::new();
        let mut max_sst_seq = 0u64;

        if !manifest.entries.is_empty() {
            for filename in manifest.l0_filenames() {
                let path = dir.join(filename);
                if path.exists() {
                    let reader = TableReader::open(&path)?;
                    max_sst_seq = max_sst_seq.max(reader.max_seq());
                    l0.push(reader);
                } else {
                    tracing::warn!(cf = %name, file = filename, "manifest entry missing on disk");
                }
            }
            for filename in manifest.l1_filenames() {
                let path = dir.join(filename);
                if path.exists() {
                    let reader = TableReader::open(&path)?;
                    max_sst_seq = max_sst_seq.max(reader.max_seq());
                    l1.push(reader);
                } else {
                    tracing::warn!(cf = %name, file = filename, "manifest entry missing on disk");
                }
            }
        } else {
            // No manifest (fresh CF, or dropped manifest). Scan the directory
            // and load everything into L0; compaction will sort it out.
            let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map(|e| e == "sst").unwrap_or(false))
                .collect();

            // newest first (filenames embed seq + timestamp)
            paths.sort();
            paths.reverse();

            for path in &paths {
                let reader = TableReader::open(path)?;
                max_sst_seq = max_sst_seq.max(reader.max_seq());
                l0.push(reader);
            }

            if !paths.is_empty() {
                for path in &paths {
                    if let Some(n) = path.file_name().and_then(|n| n.to_str()) {
                        manifest.add(n.to_string(), 0);
                    }
                }
                manifest.save()?;
            }
        }

        Ok(Self {
            name,
            dir,
            mem,
            l0,
            l1,
            manifest,
            wal,
            wal_path,
            seq: wal_seq.max(max_sst_seq),
            flush_threshold: config.flush_threshold,
            l0_compaction_trigger: config.l0_compaction_trigger,
            wal_sync: config.wal_sync,
        })
    }

    /// Inserts a key-value pair: WAL append, memtable apply, maybe flush.
    pub(crate) fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        anyhow::ensure!(!key.is_empty(), "key must not be empty");
        anyhow::ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        );
        anyhow::ensure!(
            value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        );

        let seq = self.next_seq()?;
        self.wal.append(&LogRecord::Put {
            seq,
            key: key.clone(),
            value: value.clone(),
        })?;
        self.mem.put(key, value, seq);

        if self.mem.approx_size() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Deletes a key by writing a tombstone.
    pub(crate) fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        anyhow::ensure!(!key.is_empty(), "key must not be empty");

        let seq = self.next_seq()?;
        self.wal.append(&LogRecord::Del {
            seq,
            key: key.clone(),
        })?;
        self.mem.delete(key, seq);

        if self.mem.approx_size() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush unless the memtable is empty.
    pub(crate) fn force_flush(&mut self) -> Result<()> {
        if self.mem.is_empty() {
            return Ok(());
        }
        self.flush()
    }

    /// Flushes the memtable to a new L0 SSTable.
    ///
    /// # Steps
    ///
    /// 1. Write `sst-{seq}-{timestamp_ms}.sst` (atomic temp + rename).
    /// 2. Record it in the manifest and persist the manifest atomically.
    /// 3. Truncate the WAL and open a fresh writer.
    /// 4. Reset the memtable and register the new reader at L0 front.
    /// 5. Trigger auto-compaction if the L0 count reaches the threshold.
    fn flush(&mut self) -> Result<()> {
        let ts = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
        let sst_name = format!("sst-{:020}-{}.sst", self.seq, ts);
        let sst_path = self.dir.join(&sst_name);

        TableWriter::write_from_memtable(&sst_path, &self.mem)?;

        self.manifest.add(sst_name, 0);
        self.manifest.save()?;

        // SSTable and manifest are durable; now the WAL can go.
        let _f = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.wal_path)?;
        self.wal = LogWriter::create(&self.wal_path, self.wal_sync)?;

        self.mem.clear();

        let reader = TableReader::open(&sst_path)?;
        self.l0.insert(0, reader);

        tracing::debug!(cf = %self.name, l0 = self.l0.len(), "memtable flushed");

        if self.l0_compaction_trigger > 0 && self.l0.len() >= self.l0_compaction_trigger {
            self.compact()?;
        }

        Ok(())
    }

    /// Syncs the WAL to disk; used by bulk loads running with `wal_sync = false`.
    pub(crate) fn sync_wal(&mut self) -> Result<()> {
        self.wal.sync_to_disk()?;
        Ok(())
    }

    fn next_seq(&mut self) -> Result<u64> {
        self.seq = self
            .seq
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("sequence number overflow (u64::MAX reached)"))?;
        Ok(self.seq)
    }
}

/// Replays a WAL file into the given memtable, returning the highest
/// sequence number encountered. A missing file is a fresh start.
fn replay_wal(path: &PathBuf, mem: &mut Memtable) -> Result<u64> {
    match LogReader::open(path) {
        Ok(mut reader) => {
            let mut max_seq = 0u64;
            reader.replay(|r| match r {
                LogRecord::Put { seq, key, value } => {
                    mem.put(key, value, seq);
                    max_seq = max_seq.max(seq);
                }
                LogRecord::Del { seq, key } => {
                    mem.delete(key, seq);
                    max_seq = max_seq.max(seq);
                }
            })?;
            Ok(max_seq)
        }
        Err(wal::WalError::Io(ref io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
            Ok(0)
        }
        Err(e) => Err(anyhow::anyhow!(e).context("failed to open WAL for replay")),
    }
}

/// Removes leftover `.sst.tmp` files from interrupted flushes.
fn cleanup_tmp_files(dir: &PathBuf) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let p = entry.path();
            if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                if name.ends_with(".sst.tmp") {
                    let _ = std::fs::remove_file(&p);
                }
            }
        }
    }
}
