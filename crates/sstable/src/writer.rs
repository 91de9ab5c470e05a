use anyhow::{bail, Result};
use bloom::BloomFilter;
use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use memtable::{Entry, Memtable};
use std::fs::{rename, OpenOptions};
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use crate::format::{write_footer, Footer};

/// Target false-positive rate for the embedded key bloom filter.
const KEY_BLOOM_FPR: f64 = 0.01;

/// Writes SSTable files. See the crate docs for the file layout.
///
/// Implementation notes:
/// - Writes to a temp file in the same directory, fsyncs, then atomically
///   renames into place, so readers never observe a partial table.
/// - The index is kept in memory while writing (vector of (key, offset)).
pub struct TableWriter {}

impl TableWriter {
    /// Writes an SSTable at `path` from the given memtable.
    ///
    /// Entries (tombstones included) are written in the memtable's sorted
    /// key order. The embedded key bloom is sized for the entry count.
    ///
    /// # Errors
    ///
    /// Returns an error if the memtable is empty or on any I/O failure.
    pub fn write_from_memtable(path: &Path, mem: &Memtable) -> Result<()> {
        Self::write_from_iter(path, mem.len(), mem.iter().map(|(k, e)| (k.clone(), e.clone())))
    }

    /// Writes an SSTable at `path` from an ordered `(key, entry)` stream.
    ///
    /// The stream must yield keys in strictly ascending order; this is the
    /// compaction path, fed by [`crate::MergeIterator`].
    ///
    /// # Errors
    ///
    /// Returns an error if the stream yields no entries or on I/O failure.
    pub fn write_from_iter<I>(path: &Path, estimated_count: usize, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (Vec<u8>, Entry)>,
    {
        // Create temporary file next to target for atomic rename later
        let tmp_path = path.with_extension("sst.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut w = BufWriter::new(file);

        // In-memory index: (key, offset); key bloom built alongside.
        let mut index: Vec<(Vec<u8>, u64)> = Vec::new();
        let mut key_bloom = BloomFilter::with_capacity(estimated_count.max(1), KEY_BLOOM_FPR);
        let mut max_seq = 0u64;

        // Reusable record body buffer; the CRC is computed over it.
        let mut body = Vec::with_capacity(256);

        for (key, entry) in entries {
            let offset = w.stream_position()?;

            body.clear();
            body.write_u32::<LittleEndian>(key.len() as u32)?;
            body.extend_from_slice(&key);
            body.write_u64::<LittleEndian>(entry.seq)?;
            match &entry.value {
                Some(v) => {
                    body.write_u8(1)?;
                    body.write_u32::<LittleEndian>(v.len() as u32)?;
                    body.extend_from_slice(v);
                }
                None => {
                    body.write_u8(0)?;
                }
            }

            let mut hasher = Crc32::new();
            hasher.update(&body);
            w.write_u32::<LittleEndian>(hasher.finalize())?;
            w.write_all(&body)?;

            key_bloom.insert(&key);
            max_seq = max_seq.max(entry.seq);
            index.push((key, offset));
        }

        if index.is_empty() {
            // Drop the handle before unlinking the temp file.
            drop(w);
            let _ = std::fs::remove_file(&tmp_path);
            bail!("refusing to write empty sstable at {}", path.display());
        }

        // Bloom section
        let bloom_offset = w.stream_position()?;
        key_bloom.write_to(&mut w)?;

        // Index section
        let index_offset = w.stream_position()?;
        for (key, data_offset) in &index {
            w.write_u32::<LittleEndian>(key.len() as u32)?;
            w.write_all(key)?;
            w.write_u64::<LittleEndian>(*data_offset)?;
        }

        write_footer(
            &mut w,
            &Footer {
                max_seq,
                bloom_offset,
                index_offset,
            },
        )?;

        // Flush, sync, and atomically move into place
        w.flush()?;
        let file = w
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush sstable buffer: {}", e))?;
        file.sync_all()?;
        drop(file);
        rename(tmp_path, path)?;

        Ok(())
    }
}
