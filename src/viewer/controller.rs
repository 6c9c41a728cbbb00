use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::store::{decode_record, LocationRecord, LocationStore, StoreError, StoreEvent, Subscription};

/// What the viewer screen renders. `Waiting` means the record does not exist
/// yet, which is an empty state rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerPhase {
    Connecting,
    Waiting,
    Live(LocationRecord),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    pub phase: ViewerPhase,
    pub auto_refresh: bool,
}

struct Pump {
    subscription: Subscription,
    task: JoinHandle<()>,
}

struct Inner<S> {
    bag_id: String,
    store: S,
    state: watch::Sender<ViewerState>,
    pump: Mutex<Option<Pump>>,
}

/// Owns the viewer side of a session: at most one live subscription at a
/// time, toggled by auto-refresh. `shutdown` must run on every exit path.
#[derive(Clone)]
pub struct ViewerController<S> {
    inner: Arc<Inner<S>>,
}

impl<S: LocationStore> ViewerController<S> {
    /// Opens the initial subscription immediately; auto-refresh starts on.
    pub fn new(handle: &tokio::runtime::Handle, bag_id: String, store: S) -> Self {
        let state = watch::channel(ViewerState {
            phase: ViewerPhase::Connecting,
            auto_refresh: true,
        })
        .0;

        let _guard = handle.enter();
        let pump = open_pump(&store, &bag_id, &state);

        Self {
            inner: Arc::new(Inner {
                bag_id,
                store,
                state,
                pump: Mutex::new(Some(pump)),
            }),
        }
    }

    pub fn state(&self) -> watch::Receiver<ViewerState> {
        self.inner.state.subscribe()
    }

    /// Toggle the live subscription. Turning it off tears the subscription
    /// down; turning it back on opens a fresh one that yields only the
    /// then-current record, never history.
    pub async fn set_auto_refresh(&self, enabled: bool) {
        let mut slot = self.inner.pump.lock().await;
        if enabled == slot.is_some() {
            self.inner.state.send_modify(|s| s.auto_refresh = enabled);
            return;
        }

        if let Some(pump) = slot.take() {
            pump.subscription.shutdown().await;
            let _ = pump.task.await;
        }

        if enabled {
            self.inner
                .state
                .send_modify(|s| s.phase = ViewerPhase::Connecting);
            *slot = Some(open_pump(&self.inner.store, &self.inner.bag_id, &self.inner.state));
            info!("viewer {} resubscribed", self.inner.bag_id);
        }
        self.inner.state.send_modify(|s| s.auto_refresh = enabled);
    }

    pub async fn shutdown(&self) {
        let mut slot = self.inner.pump.lock().await;
        if let Some(pump) = slot.take() {
            pump.subscription.shutdown().await;
            let _ = pump.task.await;
        }
    }

}

fn open_pump<S: LocationStore>(
    store: &S,
    bag_id: &str,
    state: &watch::Sender<ViewerState>,
) -> Pump {
    let (tx, mut rx) = mpsc::channel(16);
    let subscription = store.subscribe(bag_id, tx);
    let state = state.clone();
    let bag_id = bag_id.to_string();
    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                StoreEvent::Snapshot(None) => {
                    state.send_modify(|s| s.phase = ViewerPhase::Waiting);
                }
                StoreEvent::Snapshot(Some(doc)) => {
                    let record = decode_record(&doc);
                    state.send_modify(|s| s.phase = ViewerPhase::Live(record));
                }
                StoreEvent::Failed(err) => {
                    warn!("subscription for bag {bag_id} failed: {err}");
                    let message = classify(&err);
                    state.send_modify(|s| s.phase = ViewerPhase::Failed(message));
                }
            }
        }
    });
    Pump { subscription, task }
}

fn classify(err: &StoreError) -> String {
    match err {
        StoreError::PermissionDenied(_) => {
            "Permission denied. Bag ID may be incorrect.".to_string()
        }
        StoreError::Other(msg) => format!("Error: {msg}"),
    }
}

/// Wall-clock age bucketed to the coarsest unit that fits.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds().max(0);
    if seconds < 60 {
        format!("{seconds}s ago")
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h ago", seconds / 3600)
    } else {
        format!("{}d ago", seconds / 86_400)
    }
}

/// Hand the coordinates to the platform's full map application.
pub fn open_in_external_maps(lat: f64, lng: f64) {
    let url = format!("https://www.google.com/maps?q={lat},{lng}");
    if let Err(err) = open::that(&url) {
        warn!("failed to open external map: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    use crate::store::{InMemoryStore, LocationWrite};

    fn write(lat: f64, lng: f64) -> LocationWrite {
        LocationWrite::new(
            lat,
            lng,
            false,
            crate::device::BatteryLevel::Percent(80),
            "agent".into(),
            1,
            Utc::now(),
        )
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<ViewerState>, pred: F) -> ViewerState
    where
        F: Fn(&ViewerState) -> bool,
    {
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            loop {
                if pred(&rx.borrow()) {
                    return rx.borrow().clone();
                }
                rx.changed().await.expect("state channel closed");
            }
        })
        .await
        .expect("condition not reached")
    }

    #[tokio::test]
    async fn missing_record_is_waiting_not_error() {
        let store = InMemoryStore::new();
        let viewer = ViewerController::new(
            &tokio::runtime::Handle::current(),
            "ZZZZZZ".into(),
            store,
        );
        let mut rx = viewer.state();
        let state = wait_for(&mut rx, |s| s.phase != ViewerPhase::Connecting).await;
        assert_eq!(state.phase, ViewerPhase::Waiting);
        viewer.shutdown().await;
    }

    #[tokio::test]
    async fn live_record_follows_writes() {
        let store = InMemoryStore::new();
        store
            .upsert_merge("X7K9P2", &write(40.785091, -73.968285))
            .await
            .unwrap();
        let viewer = ViewerController::new(
            &tokio::runtime::Handle::current(),
            "X7K9P2".into(),
            store.clone(),
        );
        let mut rx = viewer.state();

        let state = wait_for(&mut rx, |s| matches!(s.phase, ViewerPhase::Live(_))).await;
        let ViewerPhase::Live(record) = state.phase else {
            unreachable!()
        };
        assert_eq!(record.lat, 40.785091);
        assert_eq!(record.lng, -73.968285);

        store
            .upsert_merge("X7K9P2", &write(40.79, -73.97))
            .await
            .unwrap();
        let state = wait_for(&mut rx, |s| {
            matches!(&s.phase, ViewerPhase::Live(r) if r.lat == 40.79)
        })
        .await;
        assert!(matches!(state.phase, ViewerPhase::Live(_)));
        viewer.shutdown().await;
    }

    #[tokio::test]
    async fn permission_denied_maps_to_bag_id_hint() {
        let store = InMemoryStore::new();
        store.deny_reads(true);
        let viewer = ViewerController::new(
            &tokio::runtime::Handle::current(),
            "X7K9P2".into(),
            store,
        );
        let mut rx = viewer.state();
        let state = wait_for(&mut rx, |s| matches!(s.phase, ViewerPhase::Failed(_))).await;
        assert_eq!(
            state.phase,
            ViewerPhase::Failed("Permission denied. Bag ID may be incorrect.".to_string())
        );
        viewer.shutdown().await;
    }

    #[tokio::test]
    async fn toggling_auto_refresh_keeps_one_subscription() {
        let store = InMemoryStore::new();
        let viewer = ViewerController::new(
            &tokio::runtime::Handle::current(),
            "X7K9P2".into(),
            store.clone(),
        );
        assert_eq!(store.live_subscription_count(), 1);

        viewer.set_auto_refresh(false).await;
        assert_eq!(store.live_subscription_count(), 0);

        viewer.set_auto_refresh(true).await;
        assert_eq!(store.live_subscription_count(), 1);
        // Redundant enable must not stack a second subscription.
        viewer.set_auto_refresh(true).await;
        assert_eq!(store.live_subscription_count(), 1);

        viewer.shutdown().await;
        assert_eq!(store.live_subscription_count(), 0);
    }

    #[tokio::test]
    async fn reenabling_yields_current_record_not_history() {
        let store = InMemoryStore::new();
        let viewer = ViewerController::new(
            &tokio::runtime::Handle::current(),
            "X7K9P2".into(),
            store.clone(),
        );
        viewer.set_auto_refresh(false).await;

        store.upsert_merge("X7K9P2", &write(10.0, 20.0)).await.unwrap();
        store.upsert_merge("X7K9P2", &write(30.0, 40.0)).await.unwrap();

        viewer.set_auto_refresh(true).await;
        let mut rx = viewer.state();
        let state = wait_for(&mut rx, |s| matches!(s.phase, ViewerPhase::Live(_))).await;
        let ViewerPhase::Live(record) = state.phase else {
            unreachable!()
        };
        assert_eq!(record.lat, 30.0);
        viewer.shutdown().await;
    }

    #[test]
    fn time_ago_buckets() {
        let now = Utc::now();
        assert_eq!(time_ago(now, now), "0s ago");
        assert_eq!(time_ago(now - TimeDelta::seconds(45), now), "45s ago");
        assert_eq!(time_ago(now - TimeDelta::seconds(90), now), "1m ago");
        assert_eq!(time_ago(now - TimeDelta::seconds(3 * 3600 + 20), now), "3h ago");
        assert_eq!(time_ago(now - TimeDelta::days(2), now), "2d ago");
        // Clock skew never yields a negative age.
        assert_eq!(time_ago(now + TimeDelta::seconds(5), now), "0s ago");
    }

    #[test]
    fn classify_messages() {
        assert_eq!(
            classify(&StoreError::PermissionDenied("nope".into())),
            "Permission denied. Bag ID may be incorrect."
        );
        assert_eq!(classify(&StoreError::Other("boom".into())), "Error: boom");
    }
}
