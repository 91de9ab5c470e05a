//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk storage files for the SieveKV column store.
//!
//! When a column family's in-memory [`memtable::Memtable`] exceeds its size
//! threshold it is flushed to disk as an SSTable. SSTables are *write-once,
//! read-many* — once created they are never modified (only replaced during
//! compaction).
//!
//! Besides point lookups, readers support ordered range scans over the data
//! section. The scan path is what the value-side Bloom overlay is built on:
//! the hierarchy builder walks each table's entries in key order, and query
//! planners scan a table for keys carrying one exact value.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION (sorted key/value records)                       │
//! │                                                               │
//! │ crc32 (u32) | key_len (u32) | key | seq (u64)                 │
//! │ present (u8) | [val_len (u32) | val]                          │
//! │                                                               │
//! │ ... repeated for each entry ...                               │
//! │                                                               │
//! │ The CRC32 covers everything after itself in the record        │
//! │ (key_len through end of value). This detects silent disk      │
//! │ corruption on reads.                                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ BLOOM SECTION (serialized key BloomFilter)                    │
//! │                                                               │
//! │ num_bits (u64) | num_hashes (u32) | bits (bytes)              │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX SECTION (key -> data_offset mapping)                    │
//! │                                                               │
//! │ key_len (u32) | key | data_offset (u64)                       │
//! │                                                               │
//! │ ... repeated for each entry ...                               │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 28 bytes)                                 │
//! │                                                               │
//! │ max_seq (u64 LE) | bloom_offset (u64 LE)                      │
//! │ index_offset (u64 LE) | magic (u32 LE) "VSST"                 │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The magic value `0x5653_5354` ("VSST")
//! identifies the format. The embedded bloom filter summarises *keys* and
//! short-circuits negative point lookups; it is unrelated to the value-side
//! filters the hierarchy layer builds over runs of entries.

mod format;
mod merge;
mod reader;
mod writer;

pub use format::{Footer, FOOTER_BYTES, TABLE_MAGIC};
pub use merge::MergeIterator;
pub use reader::TableReader;
pub use writer::TableWriter;

#[cfg(test)]
mod tests;
