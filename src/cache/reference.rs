// ReferenceDataCache: mirror of the server's reference classes
//
// The snapshot is replaced wholesale on every successful fetch and persisted
// as the fallback for the next failed one.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::detection::ClassificationDecision;
use crate::error::{log_remote_error, log_storage_error, RemoteError};
use crate::remote::ReferenceApi;
use crate::storage::{keys, load_json_list_lenient, save_json, KeyValueStore};
use crate::telemetry::{PipelineEvent, TelemetryCollector};

/// Server-defined sound category (alert class)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceClass {
    pub id: i64,
    #[serde(rename = "class_name")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub min_confidence: f32,
    pub is_active: bool,
    pub created_at: String,
}

struct RefreshWorker {
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

/// Periodically refreshed, durably cached reference classes
///
/// # Example
/// ```ignore
/// let cache = Arc::new(ReferenceDataCache::new(api, store, classes_tx, telemetry, timeout));
/// cache.start_periodic_refresh(Duration::from_secs(900));
/// let classes = cache.get(false).await;
/// cache.stop_periodic_refresh();
/// ```
pub struct ReferenceDataCache {
    api: Arc<dyn ReferenceApi>,
    store: Arc<dyn KeyValueStore>,
    snapshot: RwLock<BTreeMap<i64, ReferenceClass>>,
    classes_tx: broadcast::Sender<Vec<ReferenceClass>>,
    telemetry: Arc<TelemetryCollector>,
    fetch_timeout: Duration,
    refresher: Mutex<Option<RefreshWorker>>,
}

impl ReferenceDataCache {
    pub fn new(
        api: Arc<dyn ReferenceApi>,
        store: Arc<dyn KeyValueStore>,
        classes_tx: broadcast::Sender<Vec<ReferenceClass>>,
        telemetry: Arc<TelemetryCollector>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            api,
            store,
            snapshot: RwLock::new(BTreeMap::new()),
            classes_tx,
            telemetry,
            fetch_timeout,
            refresher: Mutex::new(None),
        }
    }

    /// Current snapshot ordered by id.
    pub fn snapshot(&self) -> Vec<ReferenceClass> {
        self.snapshot
            .read()
            .map(|snapshot| snapshot.values().cloned().collect())
            .unwrap_or_default()
    }

    fn is_empty(&self) -> bool {
        self.snapshot
            .read()
            .map(|snapshot| snapshot.is_empty())
            .unwrap_or(true)
    }

    fn replace(&self, classes: Vec<ReferenceClass>) {
        let replacement: BTreeMap<i64, ReferenceClass> =
            classes.into_iter().map(|class| (class.id, class)).collect();
        match self.snapshot.write() {
            Ok(mut snapshot) => *snapshot = replacement,
            Err(poisoned) => *poisoned.into_inner() = replacement,
        }
    }

    /// Return the snapshot, fetching first when empty or when forced
    ///
    /// # Arguments
    /// * `force_refresh` - Fetch even if a snapshot is already held
    ///
    /// # Returns
    /// The snapshot after the attempt. On fetch failure with an empty
    /// in-memory snapshot, the persisted snapshot is loaded and returned;
    /// otherwise the held snapshot is returned unchanged.
    pub async fn get(&self, force_refresh: bool) -> Vec<ReferenceClass> {
        if !force_refresh && !self.is_empty() {
            return self.snapshot();
        }

        match self.fetch().await {
            Ok(classes) => {
                if let Err(err) = save_json(self.store.as_ref(), keys::REFERENCE_CLASSES, &classes)
                {
                    log_storage_error(&err, "persist_reference_classes");
                }
                self.replace(classes);
                let snapshot = self.snapshot();
                log::info!("[ReferenceCache] Refreshed {} classes", snapshot.len());
                self.telemetry.publish(PipelineEvent::ReferenceRefreshed {
                    class_count: snapshot.len(),
                });
                let _ = self.classes_tx.send(snapshot.clone());
                snapshot
            }
            Err(err) => {
                log_remote_error(&err, "refresh_reference_classes");
                self.telemetry.record_refresh_failure(&err);
                if self.is_empty() {
                    self.load_persisted();
                }
                self.snapshot()
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<ReferenceClass>, RemoteError> {
        tokio::time::timeout(self.fetch_timeout, self.api.fetch_classes())
            .await
            .map_err(|_| RemoteError::timeout("fetch_reference_classes", self.fetch_timeout))?
    }

    fn load_persisted(&self) {
        match load_json_list_lenient::<ReferenceClass>(self.store.as_ref(), keys::REFERENCE_CLASSES)
        {
            Ok((classes, _)) if !classes.is_empty() => {
                log::warn!(
                    "[ReferenceCache] Using {} persisted classes after failed refresh",
                    classes.len()
                );
                self.replace(classes);
            }
            Ok(_) => {}
            Err(err) => log_storage_error(&err, "load_reference_classes"),
        }
    }

    /// Refresh immediately, then on every tick of `interval`
    ///
    /// Replaces any refresh loop already running. The task holds only a weak
    /// reference, so dropping the last `Arc` also ends it.
    pub fn start_periodic_refresh(self: &Arc<Self>, interval: Duration) {
        self.stop_periodic_refresh();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                // Not raced against cancellation: an in-flight fetch completes
                cache.get(true).await;
            }
            log::debug!("[ReferenceCache] Periodic refresh ended");
        });

        log::info!(
            "[ReferenceCache] Periodic refresh every {}s",
            interval.as_secs()
        );
        if let Ok(mut refresher) = self.refresher.lock() {
            *refresher = Some(RefreshWorker {
                cancel,
                _handle: handle,
            });
        }
    }

    /// Cancel the refresh timer. Idempotent.
    pub fn stop_periodic_refresh(&self) {
        let worker = match self.refresher.lock() {
            Ok(mut refresher) => refresher.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            worker.cancel.cancel();
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<ReferenceClass> {
        self.snapshot
            .read()
            .ok()
            .and_then(|snapshot| snapshot.values().find(|class| class.name == name).cloned())
    }

    /// Active class matching the decision's label whose minimum confidence
    /// the decision meets. Failed decisions never match.
    pub fn alert_class_for(&self, decision: &ClassificationDecision) -> Option<ReferenceClass> {
        if decision.is_error() {
            return None;
        }
        self.snapshot.read().ok().and_then(|snapshot| {
            snapshot
                .values()
                .find(|class| {
                    class.is_active
                        && class.name == decision.label()
                        && class.min_confidence <= decision.confidence()
                })
                .cloned()
        })
    }
}

impl Drop for ReferenceDataCache {
    fn drop(&mut self) {
        self.stop_periodic_refresh();
    }
}
