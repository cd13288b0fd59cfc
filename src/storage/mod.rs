//! Durable key/value persistence.
//!
//! Every persisted value is a string stored under a logical key. Lists
//! (recent decisions, reference classes) are JSON arrays; settings are
//! primitive values rendered with `to_string()`.

mod file_store;
mod memory_store;

pub use file_store::FileStore;
pub use memory_store::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

/// Logical storage keys.
pub mod keys {
    pub const RECENT_DECISIONS: &str = "recent_decisions";
    pub const REFERENCE_CLASSES: &str = "reference_classes";
    pub const DEVICE_ID: &str = "device_id";
    pub const DETECTION_THRESHOLD: &str = "detection_threshold";
    pub const MICROPHONE_THRESHOLD: &str = "microphone_threshold";
    pub const FILTER_LOW_CONFIDENCE: &str = "filter_low_confidence";
    pub const SHOW_ALL_PREDICTIONS: &str = "show_all_predictions";
    pub const RECORDING_DURATION_SECONDS: &str = "recording_duration_seconds";
}

/// Durable storage seam shared by the caches, the device identifier and the
/// persisted settings.
///
/// Reads and writes are synchronous and assumed fast.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Serialize `value` as JSON and store it under `key`.
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let encoded = serde_json::to_string(value)?;
    store.put(key, &encoded)
}

/// Load a JSON value stored under `key`; `Ok(None)` when the key is absent.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Load a JSON array element by element, skipping entries that fail to decode.
///
/// Returns the decoded entries and the number of skipped ones. A value that
/// is not an array at all is a serialization error.
pub fn load_json_list_lenient<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<(Vec<T>, usize), StorageError> {
    let Some(raw) = store.get(key)? else {
        return Ok((Vec::new(), 0));
    };

    let values: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
    let mut decoded = Vec::with_capacity(values.len());
    let mut skipped = 0;
    for value in values {
        match serde_json::from_value::<T>(value) {
            Ok(entry) => decoded.push(entry),
            Err(err) => {
                skipped += 1;
                log::warn!("[Storage] Skipping malformed entry under {}: {}", key, err);
            }
        }
    }
    Ok((decoded, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Entry {
        name: String,
        score: f32,
    }

    #[test]
    fn test_json_helpers_roundtrip() {
        let store = MemoryStore::new();
        let entries = vec![
            Entry {
                name: "a".to_string(),
                score: 0.5,
            },
            Entry {
                name: "b".to_string(),
                score: 0.25,
            },
        ];
        save_json(&store, "entries", &entries).unwrap();

        let loaded: Vec<Entry> = load_json(&store, "entries").unwrap().unwrap();
        assert_eq!(loaded, entries);
    }

    #[test]
    fn test_load_json_missing_key() {
        let store = MemoryStore::new();
        let loaded: Option<Vec<Entry>> = load_json(&store, "missing").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_lenient_list_skips_malformed_entries() {
        let store = MemoryStore::new();
        store
            .put(
                "entries",
                r#"[{"name":"a","score":0.5},{"name":7},{"name":"c","score":1.0}]"#,
            )
            .unwrap();

        let (entries, skipped) = load_json_list_lenient::<Entry>(&store, "entries").unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a");
        assert_eq!(entries[1].name, "c");
    }

    #[test]
    fn test_lenient_list_rejects_non_array() {
        let store = MemoryStore::new();
        store.put("entries", r#"{"name":"a"}"#).unwrap();
        let result = load_json_list_lenient::<Entry>(&store, "entries");
        assert!(matches!(result, Err(StorageError::Serialization { .. })));
    }
}
