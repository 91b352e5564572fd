//! Bounded TTL cache for fetched bar series.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use super::ohlcv::Bar;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub source: String,
}

#[derive(Debug, Clone)]
struct Entry {
    inserted: Instant,
    provider: String,
    bars: Vec<Bar>,
}

/// Owned by one data source manager. Entries expire after `ttl`; inserting
/// beyond `max_entries` evicts the oldest entry.
#[derive(Debug)]
pub struct BarCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl BarCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        BarCache {
            ttl,
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        BarCache::new(Duration::ZERO, 0)
    }

    /// Cached bars and the provider that served them, if still fresh.
    pub fn get(&self, key: &CacheKey) -> Option<(String, Vec<Bar>)> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&self, key: CacheKey, provider: &str, bars: Vec<Bar>) {
        self.insert_at(key, provider, bars, Instant::now());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn get_at(&self, key: &CacheKey, now: Instant) -> Option<(String, Vec<Bar>)> {
        let mut entries = self.lock();
        let fresh = match entries.get(key) {
            Some(entry) => now.saturating_duration_since(entry.inserted) < self.ttl,
            None => return None,
        };
        if !fresh {
            entries.remove(key);
            return None;
        }
        entries
            .get(key)
            .map(|entry| (entry.provider.clone(), entry.bars.clone()))
    }

    fn insert_at(&self, key: CacheKey, provider: &str, bars: Vec<Bar>, now: Instant) {
        if self.max_entries == 0 || self.ttl.is_zero() {
            return;
        }
        let mut entries = self.lock();
        let ttl = self.ttl;
        entries.retain(|_, e| now.saturating_duration_since(e.inserted) < ttl);

        while entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }

        entries.insert(
            key,
            Entry {
                inserted: now,
                provider: provider.to_string(),
                bars,
            },
        );
    }

    // A poisoned lock only means another run panicked mid-insert; the map
    // itself is still usable.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
