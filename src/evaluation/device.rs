// DeviceIdentifier - stable random id attached to every evaluation

use std::sync::{Arc, Mutex};

use crate::error::log_storage_error;
use crate::storage::{keys, KeyValueStore};

/// Process-wide device id, generated lazily and persisted on first use.
///
/// When the store cannot be read or written the id is generated anyway and
/// kept in memory for the rest of the process, but never persisted.
pub struct DeviceIdentifier {
    store: Arc<dyn KeyValueStore>,
    cached: Mutex<Option<String>>,
}

impl DeviceIdentifier {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    pub fn get_or_create(&self) -> String {
        let mut cached = self
            .cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        let id = match self.store.get(keys::DEVICE_ID) {
            Ok(Some(stored)) if !stored.trim().is_empty() => stored.trim().to_string(),
            Ok(_) => {
                let fresh = uuid::Uuid::new_v4().to_string();
                match self.store.put(keys::DEVICE_ID, &fresh) {
                    Ok(()) => log::info!("[Evaluation] Generated device id {}", fresh),
                    Err(err) => {
                        log_storage_error(&err, "persist_device_id");
                        log::warn!("[Evaluation] Using ephemeral device id {}", fresh);
                    }
                }
                fresh
            }
            Err(err) => {
                log_storage_error(&err, "load_device_id");
                let fresh = uuid::Uuid::new_v4().to_string();
                log::warn!("[Evaluation] Using ephemeral device id {}", fresh);
                fresh
            }
        };

        *cached = Some(id.clone());
        id
    }
}
