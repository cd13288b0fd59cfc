// ResultCache: bounded, durable history of classification decisions
//
// Newest-first. Every insertion is written through to the key/value store
// before `record` returns; insertion order is the only ordering.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::detection::ClassificationDecision;
use crate::error::{log_storage_error, StorageError};
use crate::storage::{keys, load_json_list_lenient, save_json, KeyValueStore};

/// Maximum number of decisions retained
pub const RESULT_CACHE_CAPACITY: usize = 100;

/// Rolling history of recent decisions
///
/// # Example
/// ```ignore
/// let cache = ResultCache::new(store);
/// cache.load_persisted()?;
/// cache.record(decision)?;
/// let newest = cache.latest();
/// ```
pub struct ResultCache {
    entries: Mutex<VecDeque<ClassificationDecision>>,
    capacity: usize,
    store: Arc<dyn KeyValueStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_capacity(store, RESULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            store,
        }
    }

    fn lock_entries(&self) -> Result<MutexGuard<'_, VecDeque<ClassificationDecision>>, StorageError> {
        self.entries.lock().map_err(|_| StorageError::LockPoisoned {
            component: "result_cache".to_string(),
        })
    }

    /// Insert a decision at the front and persist the whole list
    ///
    /// # Returns
    /// * `Ok(())` - Decision stored in memory and durably
    /// * `Err(StorageError)` - Decision stored in memory only; the durable
    ///   write failed
    pub fn record(&self, decision: ClassificationDecision) -> Result<(), StorageError> {
        let mut entries = self.lock_entries()?;
        entries.push_front(decision);
        while entries.len() > self.capacity {
            entries.pop_back();
        }
        // Written while holding the lock so concurrent records persist in order
        save_json(self.store.as_ref(), keys::RECENT_DECISIONS, &*entries)
    }

    /// Replace in-memory state with the persisted list
    ///
    /// Malformed entries are skipped. A list longer than the capacity is
    /// truncated to its newest entries.
    ///
    /// # Returns
    /// Number of entries loaded
    pub fn load_persisted(&self) -> Result<usize, StorageError> {
        let (mut loaded, skipped) = load_json_list_lenient::<ClassificationDecision>(
            self.store.as_ref(),
            keys::RECENT_DECISIONS,
        )?;
        if skipped > 0 {
            log::warn!("[ResultCache] Skipped {} malformed persisted decisions", skipped);
        }
        loaded.truncate(self.capacity);

        let count = loaded.len();
        *self.lock_entries()? = loaded.into();
        log::info!("[ResultCache] Loaded {} persisted decisions", count);
        Ok(count)
    }

    /// Newest-first copy of every entry.
    pub fn entries(&self) -> Vec<ClassificationDecision> {
        match self.lock_entries() {
            Ok(entries) => entries.iter().cloned().collect(),
            Err(err) => {
                log_storage_error(&err, "result_cache_entries");
                Vec::new()
            }
        }
    }

    pub fn latest(&self) -> Option<ClassificationDecision> {
        self.lock_entries()
            .ok()
            .and_then(|entries| entries.front().cloned())
    }

    /// Most recent decision for `recording_id`.
    pub fn find(&self, recording_id: &str) -> Option<ClassificationDecision> {
        self.lock_entries().ok().and_then(|entries| {
            entries
                .iter()
                .find(|decision| decision.recording_id() == recording_id)
                .cloned()
        })
    }

    pub fn len(&self) -> usize {
        self.lock_entries().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn decision(id: usize) -> ClassificationDecision {
        ClassificationDecision::new(
            format!("label{}", id % 3),
            None,
            0.5,
            None,
            format!("rec{}", id),
        )
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable {
                reason: "offline".to_string(),
            })
        }
        fn put(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable {
                reason: "offline".to_string(),
            })
        }
        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn test_newest_first() {
        let cache = ResultCache::new(Arc::new(MemoryStore::new()));
        cache.record(decision(1)).unwrap();
        cache.record(decision(2)).unwrap();
        let ids: Vec<_> = cache
            .entries()
            .iter()
            .map(|d| d.recording_id().to_string())
            .collect();
        assert_eq!(ids, vec!["rec2", "rec1"]);
        assert_eq!(cache.latest().unwrap().recording_id(), "rec2");
    }

    #[test]
    fn test_never_exceeds_capacity_and_evicts_oldest() {
        let cache = ResultCache::new(Arc::new(MemoryStore::new()));
        for id in 0..150 {
            cache.record(decision(id)).unwrap();
            assert!(cache.len() <= RESULT_CACHE_CAPACITY);
        }
        let entries = cache.entries();
        assert_eq!(entries.len(), 100);
        assert_eq!(entries[0].recording_id(), "rec149");
        assert_eq!(entries[99].recording_id(), "rec50");
        assert!(cache.find("rec49").is_none());
    }

    #[test]
    fn test_reload_preserves_order() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(store.clone());
        for id in 0..42 {
            cache.record(decision(id)).unwrap();
        }

        let reloaded = ResultCache::new(store);
        assert_eq!(reloaded.load_persisted().unwrap(), 42);
        assert_eq!(reloaded.entries(), cache.entries());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let good = serde_json::to_value(decision(7)).unwrap();
        let raw = serde_json::json!([good, {"label": 5}, "garbage"]);
        store
            .put(keys::RECENT_DECISIONS, &raw.to_string())
            .unwrap();

        let cache = ResultCache::new(store);
        assert_eq!(cache.load_persisted().unwrap(), 1);
        assert_eq!(cache.latest().unwrap().recording_id(), "rec7");
    }

    #[test]
    fn test_failed_write_keeps_memory_state() {
        let cache = ResultCache::new(Arc::new(FailingStore));
        assert!(cache.record(decision(1)).is_err());
        assert_eq!(cache.len(), 1);
        assert!(cache.load_persisted().is_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_find_by_recording_id() {
        let cache = ResultCache::new(Arc::new(MemoryStore::new()));
        cache.record(decision(1)).unwrap();
        cache.record(decision(2)).unwrap();
        assert_eq!(cache.find("rec1").unwrap().recording_id(), "rec1");
        assert!(cache.find("missing").is_none());
    }
}
