//! Merge iterator over multiple [`TableReader`]s.
//!
//! Produces `(key, Entry)` pairs in ascending key order. When the same key
//! appears in multiple tables, only the entry with the **highest sequence
//! number** is emitted (newest wins).
//!
//! This is the core primitive for compaction: walk N input tables in sorted
//! order, deduplicate by seq, and stream the result into a new table.

use anyhow::Result;
use memtable::Entry;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::TableReader;

/// A pending key from one table source, used for heap-based merge ordering.
///
/// Only the `key` and `source` are stored — the actual [`Entry`] is read
/// lazily from disk when the key reaches the top of the heap. This keeps
/// heap entries lightweight.
struct HeapEntry {
    key: Vec<u8>,
    /// Index into the `readers` / `key_iters` arrays.
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the *smallest* key first, so
        // reverse the key comparison. On tie, prefer the source with the
        // lower index (arbitrary but deterministic).
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges multiple tables into a single sorted stream of `(key, Entry)`.
///
/// Duplicate keys are resolved by keeping only the entry with the highest
/// sequence number. The iterator is lazy — it reads one record at a time
/// from each source table.
pub struct MergeIterator<'a> {
    readers: &'a [TableReader],
    /// Per-reader: sorted keys remaining to be yielded.
    key_iters: Vec<std::vec::IntoIter<Vec<u8>>>,
    heap: BinaryHeap<HeapEntry>,
}

impl<'a> MergeIterator<'a> {
    /// Creates a new merge iterator over the given table readers.
    ///
    /// Each reader's keys come from its in-memory index; the first key from
    /// each reader is pushed onto a min-heap.
    pub fn new(readers: &'a [TableReader]) -> Self {
        let mut key_iters: Vec<std::vec::IntoIter<Vec<u8>>> = Vec::with_capacity(readers.len());
        let mut heap = BinaryHeap::new();

        for (i, reader) in readers.iter().enumerate() {
            let keys: Vec<Vec<u8>> = reader.keys().map(|k| k.to_vec()).collect();
            let mut iter = keys.into_iter();
            if let Some(first_key) = iter.next() {
                heap.push(HeapEntry {
                    key: first_key,
                    source: i,
                });
            }
            key_iters.push(iter);
        }

        Self {
            readers,
            key_iters,
            heap,
        }
    }

    /// Returns the next `(key, Entry)` in sorted order, or `None` when all
    /// sources are exhausted.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Entry)>> {
        let top = match self.heap.pop() {
            Some(e) => e,
            None => return Ok(None),
        };

        let entry = self.readers[top.source].get(&top.key)?;
        self.advance(top.source);

        let mut best_entry = match entry {
            Some(e) => e,
            None => anyhow::bail!("merge source lost key mid-iteration"),
        };
        let best_key = top.key;

        // Drain all heap entries with the same key, keeping the highest seq.
        while let Some(peek) = self.heap.peek() {
            if peek.key != best_key {
                break;
            }
            let dup = self.heap.pop().expect("peeked entry must pop");
            if let Some(dup_entry) = self.readers[dup.source].get(&dup.key)? {
                if dup_entry.seq > best_entry.seq {
                    best_entry = dup_entry;
                }
            }
            self.advance(dup.source);
        }

        Ok(Some((best_key, best_entry)))
    }

    /// Pushes the next key from `source` onto the heap, if any.
    fn advance(&mut self, source: usize) {
        if let Some(next_key) = self.key_iters[source].next() {
            self.heap.push(HeapEntry {
                key: next_key,
                source,
            });
        }
    }

    /// Collects all remaining entries into a `Vec`. Used by tests.
    pub fn collect_all(&mut self) -> Result<Vec<(Vec<u8>, Entry)>> {
        let mut result = Vec::new();
        while let Some(pair) = self.next_entry()? {
            result.push(pair);
        }
        Ok(result)
    }
}
