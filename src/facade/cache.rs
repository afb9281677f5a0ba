//! TTL Cache (C3).
//!
//! Keyed byte cache with per-(venue, dataType) TTLs and hit/miss
//! accounting. Grounded on `scrapers/polymarket_book_store.rs`'s staleness
//! model (`default_max_stale_ms`/`hard_stale_ms`), generalized from
//! order-book-only staleness to a venue-agnostic fetch cache.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Trades,
    Klines,
    L1,
    L2,
    Funding,
    OpenInterest,
}

impl DataType {
    pub fn default_ttl(&self) -> Duration {
        match self {
            DataType::Trades => Duration::from_secs(30),
            DataType::Klines => Duration::from_secs(60),
            DataType::L1 => Duration::from_secs(5),
            DataType::L2 => Duration::from_secs(10),
            DataType::Funding => Duration::from_secs(300),
            DataType::OpenInterest => Duration::from_secs(60),
        }
    }
}

pub type CacheKey = String;

/// Stable hash over (venue, endpoint, params) — spec.md §4.3.
pub fn cache_key(venue: &str, endpoint: &str, params: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(venue.as_bytes());
    hasher.update([0u8]);
    hasher.update(endpoint.as_bytes());
    hasher.update([0u8]);
    hasher.update(params.as_bytes());
    hex::encode(hasher.finalize())
}

struct Entry {
    bytes: Vec<u8>,
    fetched_at: Instant,
    ttl: Duration,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct TtlCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    hits: Mutex<u64>,
    misses: Mutex<u64>,
    /// Per-venue doubling flag, set while that venue's breaker is Open
    /// (spec.md §4.2, §4.3).
    doubled_venues: Mutex<HashMap<String, bool>>,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: Mutex::new(0),
            misses: Mutex::new(0),
            doubled_venues: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_doubled(&self, venue: &str, doubled: bool) {
        self.doubled_venues.lock().insert(venue.to_string(), doubled);
    }

    fn effective_ttl(&self, venue: &str, base_ttl: Duration) -> Duration {
        if self.doubled_venues.lock().get(venue).copied().unwrap_or(false) {
            base_ttl * 2
        } else {
            base_ttl
        }
    }

    pub fn get(&self, venue: &str, key: &CacheKey) -> Option<Vec<u8>> {
        let entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            if entry.fetched_at.elapsed() < self.effective_ttl(venue, entry.ttl) {
                *self.hits.lock() += 1;
                return Some(entry.bytes.clone());
            }
        }
        *self.misses.lock() += 1;
        None
    }

    pub fn put(&self, key: CacheKey, bytes: Vec<u8>, ttl: Duration) {
        self.entries.lock().insert(key, Entry { bytes, fetched_at: Instant::now(), ttl });
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: *self.hits.lock(),
            misses: *self.misses.lock(),
            size: self.entries.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl_miss_after() {
        let cache = TtlCache::new();
        let key = cache_key("binance", "klines", "BTCUSD:1h");
        cache.put(key.clone(), vec![1, 2, 3], Duration::from_millis(20));
        assert_eq!(cache.get("binance", &key), Some(vec![1, 2, 3]));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("binance", &key), None);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn breaker_open_doubles_ttl() {
        let cache = TtlCache::new();
        let key = cache_key("binance", "klines", "BTCUSD:1h");
        cache.put(key.clone(), vec![1], Duration::from_millis(20));
        cache.set_doubled("binance", true);
        std::thread::sleep(Duration::from_millis(30));
        // would have expired under the base TTL, but doubling keeps it alive
        assert_eq!(cache.get("binance", &key), Some(vec![1]));
    }

    #[test]
    fn default_ttls_match_spec_examples() {
        assert_eq!(DataType::Trades.default_ttl(), Duration::from_secs(30));
        assert_eq!(DataType::Klines.default_ttl(), Duration::from_secs(60));
        assert_eq!(DataType::L1.default_ttl(), Duration::from_secs(5));
        assert_eq!(DataType::L2.default_ttl(), Duration::from_secs(10));
        assert_eq!(DataType::Funding.default_ttl(), Duration::from_secs(300));
        assert_eq!(DataType::OpenInterest.default_ttl(), Duration::from_secs(60));
    }
}
