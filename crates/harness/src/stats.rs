//! Aggregation of per-run measurements.

/// Min/max/median/average over one measurement series.
#[derive(Debug, Clone, Copy, Default)]
pub struct Summary {
    pub min: u64,
    pub max: u64,
    pub median: f64,
    pub average: f64,
}

/// Summarises a series. An empty series yields zeros.
pub fn summarize(values: &[u64]) -> Summary {
    if values.is_empty() {
        tracing::warn!("summarize called with empty series");
        return Summary::default();
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let n = sorted.len();
    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0
    } else {
        sorted[n / 2] as f64
    };
    let sum: u128 = sorted.iter().map(|&v| v as u128).sum();

    Summary {
        min: sorted[0],
        max: sorted[n - 1],
        median,
        average: sum as f64 / n as f64,
    }
}

/// Analytic false-positive probability of a Bloom filter with `bloom_bits`
/// bits and `hash_count` hashes after `items` insertions:
/// `(1 - e^(-k*n/m))^k`.
pub fn false_positive_probability(bloom_bits: u64, hash_count: u32, items: usize) -> f64 {
    if bloom_bits == 0 {
        return 1.0;
    }
    let exponent = -(hash_count as f64) * (items as f64) / (bloom_bits as f64);
    (1.0 - exponent.exp()).powi(hash_count as i32)
}
