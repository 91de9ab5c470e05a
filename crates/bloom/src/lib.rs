///! # Bloom Filter
///!
///! A space-efficient probabilistic data structure for set membership testing.
///!
///! A bloom filter can tell you with certainty that an item is **not** in the
///! set (no false negatives), but may occasionally report that an item **is**
///! in the set when it isn't (false positives). The false positive rate
///! depends on the number of bits and hash functions used.
///!
///! ## Usage in SieveKV
///!
///! The same filter type serves two roles:
///!
///! - Every SSTable embeds a filter built from its *keys*, sized
///!   automatically via [`BloomFilter::with_capacity`]. Point lookups check
///!   it first and skip the table on a negative answer.
///! - The hierarchy layer builds filters over the *values* of fixed-size SST
///!   runs with explicit parameters via [`BloomFilter::new`], and OR-merges
///!   them bottom-up into internal tree nodes. Merging requires bit-exact
///!   hash agreement between filters, which is why hashing here is fully
///!   deterministic and derived from the item bytes alone.
///!
///! ## Example
///!
///! ```rust,no_run
///! use bloom::BloomFilter;
///!
///! let mut bf = BloomFilter::new(1024, 4);
///! bf.insert(b"hello");
///! assert!(bf.contains(b"hello"));
///! ```
use std::io::{self, Read, Write};

/// A bloom filter backed by a bit vector with `k` hash functions.
///
/// The i-th probe position is derived from a single FNV-1a base hash of the
/// item, mixed with the probe index through splitmix64. Two filters with the
/// same `(m, k)` therefore always probe the same positions for the same
/// item, which makes [`merge`](BloomFilter::merge) meaningful.
#[derive(Clone)]
pub struct BloomFilter {
    /// The bit vector storing the filter state.
    bits: Vec<u8>,
    /// Number of bits in the filter (m).
    num_bits: u64,
    /// Number of hash functions (k).
    num_hashes: u32,
}

impl BloomFilter {
    /// Creates a filter with exactly `num_bits` bits and `num_hashes` hash
    /// functions. No automatic sizing: the caller owns the parameters.
    ///
    /// # Panics
    ///
    /// Panics if `num_bits` or `num_hashes` is 0.
    pub fn new(num_bits: u64, num_hashes: u32) -> Self {
        assert!(num_bits > 0, "num_bits must be > 0");
        assert!(num_hashes > 0, "num_hashes must be > 0");

        let byte_len = ((num_bits + 7) / 8) as usize;
        Self {
            bits: vec![0u8; byte_len],
            num_bits,
            num_hashes,
        }
    }

    /// Creates a filter sized for `expected_items` with the given target
    /// `false_positive_rate`, using the standard optimal-parameter formulas.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in `(0, 1)`.
    pub fn with_capacity(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // Optimal number of bits: m = -n * ln(p) / (ln(2)^2)
        let n = expected_items as f64;
        let m = (-n * false_positive_rate.ln() / (std::f64::consts::LN_2.powi(2))).ceil() as u64;
        let m = m.max(8);

        // Optimal number of hashes: k = (m/n) * ln(2)
        let k = ((m as f64 / n) * std::f64::consts::LN_2).ceil() as u32;
        let k = k.max(1);

        Self::new(m, k)
    }

    /// Creates a bloom filter from raw parts (used during deserialization).
    fn from_raw(bits: Vec<u8>, num_bits: u64, num_hashes: u32) -> Self {
        Self {
            bits,
            num_bits,
            num_hashes,
        }
    }

    /// Inserts an item into the bloom filter.
    pub fn insert(&mut self, item: &[u8]) {
        let base = fnv1a_64(item);
        for i in 0..self.num_hashes {
            let bit_idx = self.bit_index(base, i);
            self.set_bit(bit_idx);
        }
    }

    /// Returns `true` if the item **might** be in the set, `false` if it is
    /// **definitely not** in the set.
    #[must_use]
    pub fn contains(&self, item: &[u8]) -> bool {
        let base = fnv1a_64(item);
        for i in 0..self.num_hashes {
            let bit_idx = self.bit_index(base, i);
            if !self.get_bit(bit_idx) {
                return false;
            }
        }
        true
    }

    /// OR-merges `other` into `self`.
    ///
    /// After the merge, `self.contains(x)` holds for every `x` inserted into
    /// either filter.
    ///
    /// # Panics
    ///
    /// Panics if the two filters disagree on `num_bits` or `num_hashes`;
    /// merging filters with different parameters is a programmer error.
    pub fn merge(&mut self, other: &BloomFilter) {
        assert_eq!(
            self.num_bits, other.num_bits,
            "bloom merge: num_bits mismatch ({} vs {})",
            self.num_bits, other.num_bits
        );
        assert_eq!(
            self.num_hashes, other.num_hashes,
            "bloom merge: num_hashes mismatch ({} vs {})",
            self.num_hashes, other.num_hashes
        );
        for (dst, src) in self.bits.iter_mut().zip(other.bits.iter()) {
            *dst |= src;
        }
    }

    /// Returns the number of bits in the filter.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Returns the number of hash functions.
    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Returns the size of the serialized filter in bytes.
    ///
    /// Layout: `num_bits(u64) + num_hashes(u32) + packed bits`.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        8 + 4 + self.bits.len()
    }

    /// In-memory footprint of the bit array in bytes.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        self.bits.len()
    }

    /// Serializes the filter to a writer.
    ///
    /// Wire format (all little-endian):
    /// ```text
    /// [num_bits: u64][num_hashes: u32][bits: ceil(num_bits/8) bytes]
    /// ```
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.num_bits.to_le_bytes())?;
        w.write_all(&self.num_hashes.to_le_bytes())?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Deserializes a filter from a reader.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];
        let mut buf4 = [0u8; 4];

        r.read_exact(&mut buf8)?;
        let num_bits = u64::from_le_bytes(buf8);

        r.read_exact(&mut buf4)?;
        let num_hashes = u32::from_le_bytes(buf4);

        // Safety cap: a single filter should not exceed 128 MiB
        const MAX_BLOOM_BITS: u64 = 8 * 128 * 1024 * 1024;
        if num_bits == 0 || num_bits > MAX_BLOOM_BITS || num_hashes == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid bloom parameters: m={}, k={}", num_bits, num_hashes),
            ));
        }

        let byte_len = ((num_bits + 7) / 8) as usize;
        let mut bits = vec![0u8; byte_len];
        r.read_exact(&mut bits)?;

        Ok(Self::from_raw(bits, num_bits, num_hashes))
    }

    // ---- Internal helpers ----

    /// Probe position i: splitmix64 of the base hash combined with the
    /// probe index, reduced mod num_bits.
    fn bit_index(&self, base: u64, i: u32) -> u64 {
        const SEED_STRIDE: u64 = 0x9e37_79b9_7f4a_7c15;
        splitmix64(base ^ (i as u64).wrapping_mul(SEED_STRIDE)) % self.num_bits
    }

    fn set_bit(&mut self, idx: u64) {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        self.bits[byte_idx] |= 1 << bit_offset;
    }

    fn get_bit(&self, idx: u64) -> bool {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        (self.bits[byte_idx] >> bit_offset) & 1 == 1
    }
}

impl PartialEq for BloomFilter {
    fn eq(&self, other: &Self) -> bool {
        self.num_bits == other.num_bits
            && self.num_hashes == other.num_hashes
            && self.bits == other.bits
    }
}

impl Eq for BloomFilter {}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

/// FNV-1a 64-bit hash.
fn fnv1a_64(data: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001b3;
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// splitmix64 finalizer; full-avalanche mixing of a 64-bit state.
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
