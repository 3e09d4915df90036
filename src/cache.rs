//! Exact-match result cache.
//!
//! Maps a 64-bit content hash of a query vector to a previously resolved
//! item id. Hash collisions are not disambiguated against the original
//! vector: two distinct queries that hash identically share an answer.
//! That is a deliberate latency/accuracy trade-off, not a defect.
//!
//! The map is internally sharded, so probes take no explicit lock and
//! concurrent inserts from many search threads are safe.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Memoization of `hash(query) -> item id`.
pub struct ResultCache {
    map: DashMap<u64, i64>,
    seed: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    /// Create an empty cache whose hash function uses `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            map: DashMap::new(),
            seed,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Content hash of a query vector's raw bytes.
    #[inline]
    pub fn hash(&self, query: &[f32]) -> u64 {
        // f32 has no padding, so its raw bytes are a stable hash input.
        let bytes = unsafe {
            std::slice::from_raw_parts(query.as_ptr() as *const u8, std::mem::size_of_val(query))
        };
        xxh3_64_with_seed(bytes, self.seed)
    }

    /// Look up a previously resolved answer.
    pub fn probe(&self, hash: u64) -> Option<i64> {
        match self.map.get(&hash) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(*entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Record an answer. First writer wins; a later insert for the same
    /// hash is dropped.
    pub fn record(&self, hash: u64, item: i64) {
        self.map.entry(hash).or_insert(item);
    }

    /// Number of cached answers.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache holds no answers.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// `(hits, misses)` counters since creation.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
