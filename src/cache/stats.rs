//! Cache Statistics Module
//!
//! Tracks cache activity: get-or-set hits and misses, writes, deletes,
//! timer expirations and race retries.

use serde::Serialize;

// == Cache Stats ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// get-or-set calls answered from the cache
    pub hits: u64,
    /// get-or-set calls that invoked their producer
    pub misses: u64,
    /// Value-changing writes
    pub writes: u64,
    /// Explicit deletes of present keys
    pub deletes: u64,
    /// Keys removed by their eviction timer
    pub expirations: u64,
    /// get-or-set attempts repeated because the entry vanished
    pub race_retries: u64,
    /// Keys currently holding a value
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the get-or-set hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    pub fn record_delete(&mut self) {
        self.deletes += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    pub fn record_race_retry(&mut self) {
        self.race_retries += 1;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
