mod firestore;
mod memory;
mod record;

use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use firestore::FirestoreStore;
pub use memory::InMemoryStore;
pub use record::{
    decode_record, round_coordinate, LocationRecord, LocationWrite, RawDocument,
};

/// Store failures the clients classify. Permission problems get their own
/// variant because the viewer maps them to a dedicated message; everything
/// else is surfaced verbatim.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Other(String),
}

/// One push from a live subscription. A missing document is a snapshot, not
/// an error; `Failed` is fatal to the subscription that produced it.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Snapshot(Option<RawDocument>),
    Failed(StoreError),
}

/// Handle over a live subscription task. Dropping it without `shutdown` leaks
/// the task until its next wakeup; callers tear down on every exit path.
pub struct Subscription {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { cancel, task }
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Document store collaborator seam. Keys are bag identifiers; the backend
/// owns the full path composition.
pub trait LocationStore: Clone + Send + Sync + 'static {
    /// Single-document merge upsert: fields absent from the write stay
    /// untouched in the stored record. Independently atomic; last write wins.
    fn upsert_merge(
        &self,
        bag_id: &str,
        write: &LocationWrite,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Open a realtime subscription on the record for `bag_id`. The first
    /// event is always a snapshot of the then-current state (present or
    /// missing); later events arrive once per observed change. No history is
    /// replayed.
    fn subscribe(&self, bag_id: &str, events: mpsc::Sender<StoreEvent>) -> Subscription;
}

/// Runtime-selected backend. The app talks Firestore; offline mode and the
/// test suite run against the in-memory store.
#[derive(Clone)]
pub enum Store {
    Firestore(FirestoreStore),
    Memory(InMemoryStore),
}

impl LocationStore for Store {
    async fn upsert_merge(&self, bag_id: &str, write: &LocationWrite) -> Result<(), StoreError> {
        match self {
            Store::Firestore(store) => store.upsert_merge(bag_id, write).await,
            Store::Memory(store) => store.upsert_merge(bag_id, write).await,
        }
    }

    fn subscribe(&self, bag_id: &str, events: mpsc::Sender<StoreEvent>) -> Subscription {
        match self {
            Store::Firestore(store) => store.subscribe(bag_id, events),
            Store::Memory(store) => store.subscribe(bag_id, events),
        }
    }
}
