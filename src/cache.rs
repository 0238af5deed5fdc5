//! Response cache with LRU eviction and TTL expiry.
//!
//! Entries expire a fixed time after they were written, whether or not they have been read
//! since.  When the cache is full, the least recently used entry is evicted.  The cache is
//! internally synchronized and is meant to be shared behind an `Arc`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::observability::{CACHE_HITS, CACHE_MISSES};
use crate::types::Response;

/// Default maximum number of entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Default time-to-live.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct CacheEntry {
    response: Response,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Least recently used first.
    access_order: VecDeque<String>,
}

impl CacheState {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            if let Some(k) = self.access_order.remove(pos) {
                self.access_order.push_back(k);
            }
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.access_order.retain(|k| k != key);
        self.entries.remove(key)
    }
}

/// Cache from request fingerprints to completed responses.
#[derive(Debug)]
pub struct ResponseCache {
    state: Mutex<CacheState>,
    capacity: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Creates a cache holding at most `capacity` entries for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::validation(
                "cache capacity must be at least 1",
                Some("capacity".to_string()),
            ));
        }
        if ttl.is_zero() {
            return Err(Error::validation(
                "cache TTL must be positive",
                Some("ttl".to_string()),
            ));
        }
        Ok(Self {
            state: Mutex::new(CacheState::default()),
            capacity,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Time-to-live of each entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Looks up a live entry.  Expired entries are dropped and reported as absent.
    pub fn get(&self, key: &str) -> Option<Response> {
        let mut state = self.lock();
        let live = match state.entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => Some(entry.response.clone()),
            Some(_) => {
                state.remove(key);
                None
            }
            None => None,
        };
        match live {
            Some(response) => {
                state.touch(key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                CACHE_HITS.click();
                Some(response)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                CACHE_MISSES.click();
                None
            }
        }
    }

    /// Inserts or replaces an entry, evicting the least recently used entry if full.
    pub fn put(&self, key: impl Into<String>, response: Response) {
        let key = key.into();
        let mut state = self.lock();
        state.remove(&key);
        while state.entries.len() >= self.capacity {
            let Some(oldest) = state.access_order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            tracing::debug!(key = %oldest, "evicted cached response");
        }
        state.access_order.push_back(key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                response,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drops one entry.
    pub fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Drops every entry.
    pub fn invalidate_all(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.access_order.clear();
    }

    /// Physically removes expired entries.
    pub fn evict_expired(&self) {
        let mut state = self.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.ttl))
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            state.remove(&key);
        }
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit and miss counts.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            entries: self.len(),
            hits,
            misses,
            hit_rate: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            capacity: DEFAULT_CACHE_CAPACITY,
            ttl: DEFAULT_CACHE_TTL,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Stored entries.
    pub entries: usize,
    /// Lookups that found a live entry.
    pub hits: u64,
    /// Lookups that did not.
    pub misses: u64,
    /// `hits / (hits + misses)`, or zero before any lookup.
    pub hit_rate: f64,
}
