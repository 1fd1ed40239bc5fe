//! Adaptive Bloom filter for seen-packet suppression
//!
//! Sizing from expected insertions `n` and target false-positive rate `p`:
//!   m = ceil(-n * ln p / (ln 2)^2) bits
//!   k = round((m / n) * ln 2) hash functions, at least 1
//!
//! Positions use double hashing over a single blake3 digest:
//! index_i = (h1 + i * h2) mod m, with h2 forced odd.
//!
//! Inserted keys are retained. Once the insert count passes the planned
//! capacity the filter doubles that capacity, resizes, and re-inserts every
//! retained key, so there are never false negatives between resets.

use super::FilterError;
use std::collections::HashSet;
use std::f64::consts::LN_2;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    size: usize,
    hash_count: usize,
    capacity: usize,
    false_positive_rate: f64,
    keys: HashSet<Vec<u8>>,
}

impl BloomFilter {
    /// Create a filter planned for `expected_insertions` keys at the target
    /// false-positive rate (strictly between 0 and 1)
    pub fn new(expected_insertions: usize, false_positive_rate: f64) -> Result<Self, FilterError> {
        if expected_insertions == 0 {
            return Err(FilterError::InvalidCapacity(expected_insertions));
        }
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(FilterError::InvalidFalsePositiveRate(false_positive_rate));
        }

        let (size, hash_count) = optimal_parameters(expected_insertions, false_positive_rate);
        Ok(Self {
            bits: vec![0u64; words_for(size)],
            size,
            hash_count,
            capacity: expected_insertions,
            false_positive_rate,
            keys: HashSet::new(),
        })
    }

    /// Add a key, growing the filter if it is now over capacity
    pub fn insert(&mut self, key: impl AsRef<[u8]>) {
        let key = key.as_ref();
        if !self.keys.insert(key.to_vec()) {
            return;
        }

        if self.keys.len() > self.capacity {
            self.grow();
        } else {
            self.set_bits(key);
        }
    }

    /// True if the key may have been inserted; false means definitely not
    pub fn might_contain(&self, key: impl AsRef<[u8]>) -> bool {
        self.hashes(key)
            .into_iter()
            .all(|index| self.bits[index / 64] & (1u64 << (index % 64)) != 0)
    }

    /// Clear every bit and forget all retained keys. Sizing is kept.
    pub fn reset(&mut self) {
        self.bits.iter_mut().for_each(|word| *word = 0);
        self.keys.clear();
    }

    /// The `k` bit indices for a key, each in `0..size()`
    pub fn hashes(&self, key: impl AsRef<[u8]>) -> Vec<usize> {
        let digest = blake3::hash(key.as_ref());
        let bytes = digest.as_bytes();
        let h1 = u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]);
        let h2 = u64::from_le_bytes([
            bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
        ]) | 1;

        let m = self.size as u64;
        (0..self.hash_count as u64)
            .map(|i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
            .collect()
    }

    /// Number of bits (`m`)
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of hash functions (`k`)
    pub fn hash_count(&self) -> usize {
        self.hash_count
    }

    /// Insertions currently planned for
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn false_positive_rate(&self) -> f64 {
        self.false_positive_rate
    }

    /// Distinct keys inserted since the last reset
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn set_bits(&mut self, key: &[u8]) {
        for index in self.hashes(key) {
            self.bits[index / 64] |= 1u64 << (index % 64);
        }
    }

    fn grow(&mut self) {
        let previous = self.size;
        self.capacity = self.capacity.saturating_mul(2);
        let (size, hash_count) = optimal_parameters(self.capacity, self.false_positive_rate);
        self.size = size;
        self.hash_count = hash_count;
        self.bits = vec![0u64; words_for(size)];

        let keys: Vec<Vec<u8>> = self.keys.iter().cloned().collect();
        for key in &keys {
            self.set_bits(key);
        }

        debug!(
            "Bloom filter grown to capacity {} ({} -> {} bits, k = {}), rehashed {} keys",
            self.capacity,
            previous,
            size,
            hash_count,
            keys.len()
        );
    }
}

fn optimal_parameters(n: usize, p: f64) -> (usize, usize) {
    let n = n as f64;
    let m = (-n * p.ln() / (LN_2 * LN_2)).ceil().max(1.0);
    let k = ((m / n) * LN_2).round().max(1.0);
    (m as usize, k as usize)
}

fn words_for(bits: usize) -> usize {
    bits.div_ceil(64)
}
