use anyhow::{bail, Result};
use bloom::BloomFilter;
use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use memtable::Entry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::format::{read_footer, Footer, FOOTER_BYTES, TABLE_MAGIC};

/// Maximum key size we'll allocate during reads (64 KiB). Prevents OOM on corrupt files.
const MAX_KEY_BYTES: usize = 64 * 1024;
/// Maximum value size we'll allocate during reads (10 MiB). Prevents OOM on corrupt files.
const MAX_VALUE_BYTES: usize = 10 * 1024 * 1024;

/// Reads an SSTable file for point lookups and ordered scans.
///
/// On [`open`](TableReader::open) the entire **index** is loaded into memory
/// as a `BTreeMap<Vec<u8>, u64>` (key → data-section byte offset) together
/// with the embedded key bloom filter.
///
/// A persistent file handle is kept open for the lifetime of the reader,
/// wrapped in a `Mutex` so that `get` and `scan` can be called through a
/// shared `&self` reference (the query layer scans tables from rayon tasks).
pub struct TableReader {
    /// Path to the `.sst` file on disk.
    path: PathBuf,
    /// In-memory index mapping each key to its byte offset in the data section.
    index: BTreeMap<Vec<u8>, u64>,
    /// Embedded key bloom for negative point-lookup short-circuit.
    key_bloom: BloomFilter,
    /// Persistent file handle, wrapped in Mutex for interior mutability.
    file: Mutex<BufReader<File>>,
    footer: Footer,
}

impl TableReader {
    /// Opens an SSTable file and loads its index and key bloom into memory.
    ///
    /// # Validation
    ///
    /// - The file must be at least as large as the footer.
    /// - The footer magic must be `VSST`.
    /// - The bloom and index offsets must point inside the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is too small, the magic is wrong, or any
    /// I/O operation fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let mut f = File::open(&path_buf)?;
        let filesize = f.metadata()?.len();

        if filesize < FOOTER_BYTES {
            bail!("sstable file too small: {}", path_buf.display());
        }

        let (footer, magic) = read_footer(&mut f)?;
        if magic != TABLE_MAGIC {
            bail!(
                "bad sstable magic {:#010x} in {}",
                magic,
                path_buf.display()
            );
        }
        if footer.bloom_offset >= filesize
            || footer.index_offset >= filesize
            || footer.bloom_offset > footer.index_offset
        {
            bail!("invalid section offsets in {}", path_buf.display());
        }

        f.seek(SeekFrom::Start(footer.bloom_offset))?;
        let key_bloom = BloomFilter::read_from(&mut f)?;

        // Read index entries from index_offset up to the footer
        f.seek(SeekFrom::Start(footer.index_offset))?;
        let mut index = BTreeMap::new();
        let index_end = filesize - FOOTER_BYTES;

        while f.stream_position()? < index_end {
            let key_len = f.read_u32::<LittleEndian>()? as usize;
            if key_len > MAX_KEY_BYTES {
                bail!(
                    "corrupt index: key_len {} exceeds maximum {}",
                    key_len,
                    MAX_KEY_BYTES
                );
            }
            let mut key = vec![0u8; key_len];
            f.read_exact(&mut key)?;
            let data_offset = f.read_u64::<LittleEndian>()?;
            index.insert(key, data_offset);
        }

        f.seek(SeekFrom::Start(0))?;

        Ok(Self {
            path: path_buf,
            index,
            key_bloom,
            file: Mutex::new(BufReader::new(f)),
            footer,
        })
    }

    /// Point lookup for a single key.
    ///
    /// The embedded key bloom is checked first. A negative result means the
    /// key is **definitely not** in this table, avoiding an index lookup and
    /// disk I/O entirely.
    ///
    /// Returns `Ok(Some(entry))` if the key exists in this table (the entry
    /// may be a tombstone with `value: None`). Returns `Ok(None)` if the key
    /// is not present.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, CRC mismatch, or if the on-disk key
    /// does not match the requested key (index corruption).
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        // Fast path: bloom says "definitely not here"
        if !self.key_bloom.contains(key) {
            return Ok(None);
        }

        let offset = match self.index.get(key) {
            Some(&o) => o,
            None => return Ok(None),
        };

        let mut f = self
            .file
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
        f.seek(SeekFrom::Start(offset))?;

        let (stored_key, entry) = read_record(&mut *f)?;
        if stored_key != key {
            bail!(
                "index pointed to mismatching key at offset {} in {}",
                offset,
                self.path.display()
            );
        }
        Ok(Some(entry))
    }

    /// Ordered scan of the data section clipped to `[start, end]`.
    ///
    /// Empty bounds mean unbounded on that side. The callback receives every
    /// record in key order, tombstones included; it may return `false` to
    /// stop the scan early.
    ///
    /// The scan seeks once to the first in-range record and then reads
    /// sequentially, so it costs one seek plus a linear pass over the
    /// clipped range.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or CRC mismatch.
    pub fn scan<F>(&self, start: &[u8], end: &[u8], mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &Entry) -> bool,
    {
        // Find the offset of the first key >= start via the in-memory index.
        let lo = if start.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(start.to_vec())
        };
        let first_offset = match self.index.range((lo, Bound::<Vec<u8>>::Unbounded)).next() {
            Some((_, &off)) => off,
            None => return Ok(()), // nothing at or after start
        };

        let mut f = self
            .file
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
        f.seek(SeekFrom::Start(first_offset))?;

        let data_end = self.footer.bloom_offset;
        while f.stream_position()? < data_end {
            let (key, entry) = read_record(&mut *f)?;
            if !end.is_empty() && key.as_slice() > end {
                break;
            }
            if !visit(&key, &entry) {
                break;
            }
        }
        Ok(())
    }

    /// Returns the keys of all **live** records in `[start, end]` whose value
    /// equals `target`.
    ///
    /// This is the workhorse of the value-side overlay: the hierarchy prunes
    /// down to a few tables and key ranges, and this performs the exact
    /// equality check within them. Tombstones never match.
    pub fn keys_with_value(&self, target: &[u8], start: &[u8], end: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        self.scan(start, end, |key, entry| {
            if let Some(ref v) = entry.value {
                if v.as_slice() == target {
                    keys.push(key.to_vec());
                }
            }
            true
        })?;
        Ok(keys)
    }

    /// Returns the number of entries in the in-memory index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if the table contains zero entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the max sequence number stored in the footer.
    #[must_use]
    pub fn max_seq(&self) -> u64 {
        self.footer.max_seq
    }

    /// Path of the underlying `.sst` file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Smallest key in the table.
    #[must_use]
    pub fn first_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    /// Largest key in the table.
    #[must_use]
    pub fn last_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Iterator over all keys in ascending order (from the in-memory index).
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.index.keys().map(|k| k.as_slice())
    }
}

impl std::fmt::Debug for TableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReader")
            .field("path", &self.path)
            .field("entries", &self.index.len())
            .field("max_seq", &self.footer.max_seq)
            .finish()
    }
}

/// Reads and CRC-verifies one record at the reader's current position.
///
/// Record layout: `[crc32: u32][key_len: u32][key][seq: u64][present: u8][val_len: u32][val]`.
fn read_record<R: Read>(f: &mut R) -> Result<(Vec<u8>, Entry)> {
    let stored_crc = f.read_u32::<LittleEndian>()?;

    let key_len = f.read_u32::<LittleEndian>()? as usize;
    if key_len > MAX_KEY_BYTES {
        bail!(
            "corrupt data: key_len {} exceeds maximum {}",
            key_len,
            MAX_KEY_BYTES
        );
    }
    let mut key = vec![0u8; key_len];
    f.read_exact(&mut key)?;

    let seq = f.read_u64::<LittleEndian>()?;
    let present = f.read_u8()?;
    let value = if present == 1 {
        let val_len = f.read_u32::<LittleEndian>()? as usize;
        if val_len > MAX_VALUE_BYTES {
            bail!(
                "corrupt data: val_len {} exceeds maximum {}",
                val_len,
                MAX_VALUE_BYTES
            );
        }
        let mut val = vec![0u8; val_len];
        f.read_exact(&mut val)?;
        Some(val)
    } else {
        None
    };

    // Reconstruct the checksummed body: key_len + key + seq + present + [val_len + val]
    let mut hasher = Crc32::new();
    hasher.update(&(key_len as u32).to_le_bytes());
    hasher.update(&key);
    hasher.update(&seq.to_le_bytes());
    hasher.update(&[present]);
    if let Some(ref v) = value {
        hasher.update(&(v.len() as u32).to_le_bytes());
        hasher.update(v);
    }
    let actual_crc = hasher.finalize();
    if actual_crc != stored_crc {
        bail!(
            "CRC32 mismatch: expected {:#010x}, got {:#010x} (data corruption)",
            stored_crc,
            actual_crc
        );
    }

    Ok((key, Entry { seq, value }))
}
