use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::{LocationStore, LocationWrite, RawDocument, StoreError, StoreEvent, Subscription};

/// In-process store with the same observable contract as the Firestore
/// backend: merge upserts, initial snapshot on subscribe, one push per
/// change. Backs offline mode and the test suite; the failure knobs let
/// tests drive the error paths the real backend produces.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    docs: Mutex<HashMap<String, RawDocument>>,
    notify: broadcast::Sender<String>,
    deny_reads: AtomicBool,
    fail_writes: Mutex<Option<String>>,
    live_subscriptions: AtomicUsize,
    write_log: Mutex<Vec<(String, LocationWrite)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                docs: Mutex::new(HashMap::new()),
                notify,
                deny_reads: AtomicBool::new(false),
                fail_writes: Mutex::new(None),
                live_subscriptions: AtomicUsize::new(0),
                write_log: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Make every subscription fail with a permission error, the way a rules
    /// mismatch does on the real backend.
    pub fn deny_reads(&self, deny: bool) {
        self.inner.deny_reads.store(deny, Ordering::SeqCst);
    }

    /// Make every write fail with the given message until cleared.
    pub fn fail_writes(&self, message: Option<&str>) {
        *self.inner.fail_writes.lock().unwrap() = message.map(str::to_string);
    }

    pub fn live_subscription_count(&self) -> usize {
        self.inner.live_subscriptions.load(Ordering::SeqCst)
    }

    /// Ordered log of every accepted write, for assertions on regime
    /// exclusivity and payload shape.
    pub fn write_log(&self) -> Vec<(String, LocationWrite)> {
        self.inner.write_log.lock().unwrap().clone()
    }

    pub fn get(&self, bag_id: &str) -> Option<RawDocument> {
        self.inner.docs.lock().unwrap().get(bag_id).cloned()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationStore for InMemoryStore {
    async fn upsert_merge(&self, bag_id: &str, write: &LocationWrite) -> Result<(), StoreError> {
        if let Some(message) = self.inner.fail_writes.lock().unwrap().clone() {
            return Err(StoreError::Other(message));
        }

        {
            let mut docs = self.inner.docs.lock().unwrap();
            let doc = docs.entry(bag_id.to_string()).or_insert_with(|| RawDocument {
                fields: serde_json::Map::new(),
                update_time: Utc::now(),
            });
            for (key, value) in write.to_fields() {
                doc.fields.insert(key, value);
            }
            // Server-assigned write timestamp, mirrored from the transform
            // the Firestore backend applies.
            doc.update_time = Utc::now();
            doc.fields.insert(
                "lastUpdated".into(),
                serde_json::Value::from(doc.update_time.to_rfc3339()),
            );
        }

        self.inner
            .write_log
            .lock()
            .unwrap()
            .push((bag_id.to_string(), write.clone()));

        // No receivers is fine; nobody is watching this bag yet.
        let _ = self.inner.notify.send(bag_id.to_string());
        Ok(())
    }

    fn subscribe(&self, bag_id: &str, events: mpsc::Sender<StoreEvent>) -> Subscription {
        let inner = self.inner.clone();
        let bag_id = bag_id.to_string();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        inner.live_subscriptions.fetch_add(1, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let _guard = SubscriptionGuard(&inner.live_subscriptions);
            let mut changes = inner.notify.subscribe();

            if inner.deny_reads.load(Ordering::SeqCst) {
                let _ = events
                    .send(StoreEvent::Failed(StoreError::PermissionDenied(
                        "Missing or insufficient permissions.".into(),
                    )))
                    .await;
                return;
            }

            let snapshot = inner.docs.lock().unwrap().get(&bag_id).cloned();
            if events.send(StoreEvent::Snapshot(snapshot)).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    changed = changes.recv() => match changed {
                        Ok(id) if id == bag_id => {
                            let snapshot = inner.docs.lock().unwrap().get(&bag_id).cloned();
                            if events.send(StoreEvent::Snapshot(snapshot)).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
        });

        Subscription::new(cancel, task)
    }
}

struct SubscriptionGuard<'a>(&'a AtomicUsize);

impl Drop for SubscriptionGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
