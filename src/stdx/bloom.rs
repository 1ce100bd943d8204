//! Fixed-size Bloom filter.
//!
//! # Invariants
//! - `contains` never returns false for an inserted key (no false negatives).
//! - The bit array never grows; sizing happens once from (capacity, fpr).
//!
//! # Design Notes
//! - Double hashing: two 64-bit hashes h1/h2 derive all k probe positions as
//!   `h1 + i*h2`, which is indistinguishable from k independent hashes for
//!   Bloom filter purposes.
//! - The second hash is forced odd so probe strides cycle the full table.

use std::hash::{BuildHasher, Hash, Hasher};

use ahash::RandomState;

/// Bloom filter over hashable keys, sized for a target false-positive rate.
pub struct BloomFilter {
    bits: Vec<u64>,
    mask_bits: u64,
    k: u32,
    state1: RandomState,
    state2: RandomState,
}

impl BloomFilter {
    /// Creates a filter sized for `capacity` insertions at roughly `fpr`.
    ///
    /// Standard sizing: m = -n*ln(p)/ln(2)^2 bits, k = m/n*ln(2).
    pub fn optimal(capacity: usize, fpr: f64) -> Self {
        let n = capacity.max(1) as f64;
        let p = fpr.clamp(1e-12, 0.5);
        let m = (-n * p.ln() / (core::f64::consts::LN_2 * core::f64::consts::LN_2)).ceil();
        let bits = (m as u64).next_power_of_two().max(64);
        let k = ((m / n) * core::f64::consts::LN_2).round().max(1.0) as u32;
        Self {
            bits: vec![0u64; (bits / 64) as usize],
            mask_bits: bits - 1,
            k,
            state1: RandomState::with_seeds(0x243f_6a88, 0x85a3_08d3, 0x1319_8a2e, 0x0370_7344),
            state2: RandomState::with_seeds(0xa409_3822, 0x299f_31d0, 0x082e_fa98, 0xec4e_6c89),
        }
    }

    fn probes<K: Hash>(&self, key: &K) -> (u64, u64) {
        let mut h1 = self.state1.build_hasher();
        key.hash(&mut h1);
        let mut h2 = self.state2.build_hasher();
        key.hash(&mut h2);
        (h1.finish(), h2.finish() | 1)
    }

    pub fn insert<K: Hash>(&mut self, key: &K) {
        let (h1, h2) = self.probes(key);
        for i in 0..self.k {
            let bit = h1.wrapping_add(u64::from(i).wrapping_mul(h2)) & self.mask_bits;
            self.bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    pub fn contains<K: Hash>(&self, key: &K) -> bool {
        let (h1, h2) = self.probes(key);
        for i in 0..self.k {
            let bit = h1.wrapping_add(u64::from(i).wrapping_mul(h2)) & self.mask_bits;
            if self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) == 0 {
                return false;
            }
        }
        true
    }
}
