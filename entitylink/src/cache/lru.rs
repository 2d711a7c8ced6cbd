//! Fixed-capacity LRU cache of fetched records, keyed by `(collection, id)`.

use crate::cache::stats::RecordCacheStats;
use crate::record::Record;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type CacheKey = (String, String);

struct Entry {
    record: Arc<Record>,
    last_accessed: AtomicU64,
}

/// `max_entries` bounds entry count rather than byte size: record sizes
/// vary too much per source to make a byte budget predictable, while an
/// entry-count cap matches the scorer's batch-sized access pattern
/// directly (§4C batch contract, default batch size 5000).
pub struct RecordCache {
    entries: RwLock<HashMap<CacheKey, Arc<Entry>>>,
    max_entries: usize,
    access_counter: AtomicU64,
    stats: Arc<RecordCacheStats>,
}

impl RecordCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            access_counter: AtomicU64::new(0),
            stats: Arc::new(RecordCacheStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<RecordCacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Arc<Record>> {
        let key = (collection.to_string(), id.to_string());
        let entries = self.entries.read();
        if let Some(entry) = entries.get(&key) {
            self.stats.hit();
            let access = self.access_counter.fetch_add(1, Ordering::Relaxed);
            entry.last_accessed.store(access, Ordering::Relaxed);
            Some(Arc::clone(&entry.record))
        } else {
            self.stats.miss();
            None
        }
    }

    pub fn put(&self, collection: &str, record: Record) -> Arc<Record> {
        let key = (collection.to_string(), record.id.clone());
        let record = Arc::new(record);
        let mut entries = self.entries.write();

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            self.evict_one(&mut entries);
        }

        let access = self.access_counter.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            key,
            Arc::new(Entry {
                record: Arc::clone(&record),
                last_accessed: AtomicU64::new(access),
            }),
        );
        record
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_one(&self, entries: &mut HashMap<CacheKey, Arc<Entry>>) {
        let lru_key = entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed.load(Ordering::Relaxed))
            .map(|(k, _)| k.clone());
        if let Some(key) = lru_key {
            entries.remove(&key);
            self.stats.evict();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str) -> Record {
        Record::new(id, "people")
    }

    #[test]
    fn miss_then_hit() {
        let cache = RecordCache::new(10);
        assert!(cache.get("people", "1").is_none());
        cache.put("people", rec("1"));
        assert!(cache.get("people", "1").is_some());
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = RecordCache::new(2);
        cache.put("people", rec("1"));
        cache.put("people", rec("2"));
        cache.get("people", "1");
        cache.put("people", rec("3"));
        assert!(cache.get("people", "2").is_none());
        assert!(cache.get("people", "1").is_some());
        assert!(cache.get("people", "3").is_some());
    }

    #[test]
    fn distinguishes_collections() {
        let cache = RecordCache::new(10);
        cache.put("people", rec("1"));
        assert!(cache.get("companies", "1").is_none());
    }
}
