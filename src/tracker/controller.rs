use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::device::{BatteryLevel, BatteryMonitor};
use crate::position::{FixOptions, PositionError, Positioner};
use crate::store::{LocationStore, LocationWrite};
use crate::wake_lock::WakeLock;

use super::simulate::RandomWalk;
use super::state::{TrackerRegime, TrackerState, TrackerStatus};

/// Fixed-interval periods of the two regimes. Tests shrink these; the
/// defaults are the product values.
#[derive(Debug, Clone, Copy)]
pub struct RegimePeriods {
    pub real_gps: Duration,
    pub simulated: Duration,
}

impl Default for RegimePeriods {
    fn default() -> Self {
        Self {
            real_gps: Duration::from_secs(60),
            simulated: Duration::from_secs(5),
        }
    }
}

struct RegimeTask {
    regime: TrackerRegime,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Everything a regime loop needs to fetch-and-write one tick.
#[derive(Clone)]
struct SendCtx<S> {
    bag_id: String,
    store: S,
    agent: String,
    state: watch::Sender<TrackerState>,
    battery: watch::Receiver<BatteryLevel>,
}

struct Inner<S, P> {
    positioner: P,
    periods: RegimePeriods,
    ctx: SendCtx<S>,
    regime_task: Mutex<Option<RegimeTask>>,
    wake_lock: std::sync::Mutex<Option<WakeLock>>,
    battery: std::sync::Mutex<Option<BatteryMonitor>>,
    battery_forward: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

/// Owns the tracker side of a session: the live regime task, the battery
/// monitor, and the wake lock. Cloneable handle; `shutdown` releases every
/// held resource and must run on every exit path.
#[derive(Clone)]
pub struct TrackerController<S, P> {
    inner: Arc<Inner<S, P>>,
}

impl<S: LocationStore, P: Positioner> TrackerController<S, P> {
    pub fn new(
        handle: &tokio::runtime::Handle,
        bag_id: String,
        store: S,
        positioner: P,
        agent: String,
    ) -> Self {
        Self::with_periods(handle, bag_id, store, positioner, agent, RegimePeriods::default())
    }

    pub fn with_periods(
        handle: &tokio::runtime::Handle,
        bag_id: String,
        store: S,
        positioner: P,
        agent: String,
        periods: RegimePeriods,
    ) -> Self {
        let battery = BatteryMonitor::spawn(handle);
        let state = watch::channel(TrackerState::new(battery.level())).0;

        // Mirror battery level changes into the published state.
        let forward_token = CancellationToken::new();
        let forward = handle.spawn({
            let mut rx = battery.subscribe();
            let state = state.clone();
            let token = forward_token.clone();
            async move {
                loop {
                    tokio::select! {
                        changed = rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let level = *rx.borrow();
                            state.send_modify(|s| s.battery = level);
                        }
                        _ = token.cancelled() => break,
                    }
                }
            }
        });

        let ctx = SendCtx {
            bag_id,
            store,
            agent,
            state,
            battery: battery.subscribe(),
        };

        Self {
            inner: Arc::new(Inner {
                positioner,
                periods,
                ctx,
                regime_task: Mutex::new(None),
                wake_lock: std::sync::Mutex::new(None),
                battery: std::sync::Mutex::new(Some(battery)),
                battery_forward: Mutex::new(Some((forward_token, forward))),
            }),
        }
    }

    pub fn state(&self) -> watch::Receiver<TrackerState> {
        self.inner.ctx.state.subscribe()
    }

    /// Switch regimes. The previous regime's task is cancelled and joined
    /// before the new one spawns, so the two never write concurrently.
    pub async fn set_regime(&self, regime: TrackerRegime) {
        let mut slot = self.inner.regime_task.lock().await;
        if slot.as_ref().map(|task| task.regime) == Some(regime) {
            return;
        }

        if let Some(task) = slot.take() {
            task.cancel.cancel();
            let _ = task.handle.await;
        }

        self.inner.ctx.state.send_modify(|s| {
            s.regime = regime;
            s.status = TrackerStatus::Initializing;
            s.error = None;
        });

        if regime == TrackerRegime::Idle {
            info!("tracker {} idle", self.inner.ctx.bag_id);
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let ctx = self.inner.ctx.clone();
        let handle = match regime {
            TrackerRegime::RealGps => {
                let positioner = self.inner.positioner.clone();
                let period = self.inner.periods.real_gps;
                tokio::spawn(run_real_gps(ctx, positioner, period, token))
            }
            TrackerRegime::Simulated => {
                let period = self.inner.periods.simulated;
                tokio::spawn(run_simulated(ctx, period, token))
            }
            TrackerRegime::Idle => unreachable!(),
        };

        *slot = Some(RegimeTask {
            regime,
            cancel,
            handle,
        });
    }

    /// Best-effort wake lock; acquisition failure is logged, never surfaced.
    pub fn set_keep_awake(&self, enabled: bool) {
        {
            let mut lock = self.inner.wake_lock.lock().unwrap();
            if enabled && lock.is_none() {
                match WakeLock::acquire() {
                    Ok(acquired) => *lock = Some(acquired),
                    Err(err) => warn!("wake lock unavailable: {err:#}"),
                }
            } else if !enabled {
                lock.take();
            }
        }
        self.inner.ctx.state.send_modify(|s| s.keep_awake = enabled);
    }

    /// Release everything: regime task, battery monitor, wake lock. Safe to
    /// call more than once.
    pub async fn shutdown(&self) {
        {
            let mut slot = self.inner.regime_task.lock().await;
            if let Some(task) = slot.take() {
                task.cancel.cancel();
                let _ = task.handle.await;
            }
        }

        if let Some((token, handle)) = self.inner.battery_forward.lock().await.take() {
            token.cancel();
            let _ = handle.await;
        }

        let monitor = self.inner.battery.lock().unwrap().take();
        if let Some(monitor) = monitor {
            monitor.shutdown().await;
        }

        self.inner.wake_lock.lock().unwrap().take();
    }
}

async fn run_real_gps<S: LocationStore, P: Positioner>(
    ctx: SendCtx<S>,
    positioner: P,
    period: Duration,
    cancel: CancellationToken,
) {
    if !positioner.is_available() {
        ctx.state.send_modify(|s| {
            s.status = TrackerStatus::GpsUnavailable;
            s.error = Some("Geolocation not supported on this device".into());
        });
        return;
    }

    let options = FixOptions::default();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Cancellation must not wait on an in-flight fetch or write.
                tokio::select! {
                    _ = real_gps_tick(&ctx, &positioner, &options) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

async fn real_gps_tick<S: LocationStore, P: Positioner>(
    ctx: &SendCtx<S>,
    positioner: &P,
    options: &FixOptions,
) {
    let fix = tokio::time::timeout(options.timeout, positioner.current_position(options))
        .await
        .unwrap_or(Err(PositionError::Timeout));
    match fix {
        Ok(fix) => send_location(ctx, fix.lat, fix.lng, false).await,
        Err(err) => {
            ctx.state.send_modify(|s| {
                s.status = TrackerStatus::SignalLost;
                s.error = Some(err.to_string());
            });
        }
    }
}

async fn run_simulated<S: LocationStore>(
    ctx: SendCtx<S>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut walk = RandomWalk::new();
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let fix = walk.step(&mut rng);
                tokio::select! {
                    _ = send_location(&ctx, fix.lat, fix.lng, true) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

/// One fetch produced one write. Failures surface the store's message
/// verbatim and do not stop the timer; the next tick tries again.
async fn send_location<S: LocationStore>(ctx: &SendCtx<S>, lat: f64, lng: f64, simulated: bool) {
    ctx.state.send_modify(|s| s.status = TrackerStatus::Sending);

    let send_count = ctx.state.borrow().send_count + 1;
    let write = LocationWrite::new(
        lat,
        lng,
        simulated,
        *ctx.battery.borrow(),
        ctx.agent.clone(),
        send_count,
        Utc::now(),
    );

    match ctx.store.upsert_merge(&ctx.bag_id, &write).await {
        Ok(()) => {
            ctx.state.send_modify(|s| {
                s.last_sent = Some(Utc::now());
                s.send_count = send_count;
                s.status = TrackerStatus::Active;
                s.error = None;
            });
        }
        Err(err) => {
            warn!("send failed for bag {}: {err}", ctx.bag_id);
            ctx.state.send_modify(|s| {
                s.status = TrackerStatus::SendError;
                s.error = Some(err.to_string());
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{PositionFix, StubPositioner};
    use crate::store::{InMemoryStore, StoreError, StoreEvent, Subscription};
    use tokio::sync::mpsc;

    fn fast_periods() -> RegimePeriods {
        RegimePeriods {
            real_gps: Duration::from_millis(10),
            simulated: Duration::from_millis(10),
        }
    }

    fn controller(
        store: InMemoryStore,
        positioner: StubPositioner,
    ) -> TrackerController<InMemoryStore, StubPositioner> {
        TrackerController::with_periods(
            &tokio::runtime::Handle::current(),
            "X7K9P2".into(),
            store,
            positioner,
            "test-agent".into(),
            fast_periods(),
        )
    }

    #[tokio::test]
    async fn real_regime_writes_rounded_fixes() {
        let store = InMemoryStore::new();
        let positioner = StubPositioner::fix(PositionFix {
            lat: 40.7850912345,
            lng: -73.9682853333,
        });
        let tracker = controller(store.clone(), positioner);

        tracker.set_regime(TrackerRegime::RealGps).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        tracker.shutdown().await;

        let log = store.write_log();
        assert!(!log.is_empty());
        let (bag, write) = &log[0];
        assert_eq!(bag, "X7K9P2");
        assert_eq!(write.lat, 40.785091);
        assert_eq!(write.lng, -73.968285);
        assert!(!write.is_simulated);
        assert_eq!(write.send_count, 1);
    }

    #[tokio::test]
    async fn send_count_increments_per_successful_write() {
        let store = InMemoryStore::new();
        let tracker = controller(
            store.clone(),
            StubPositioner::fix(PositionFix { lat: 1.0, lng: 2.0 }),
        );

        tracker.set_regime(TrackerRegime::RealGps).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        tracker.shutdown().await;

        let log = store.write_log();
        assert!(log.len() >= 2);
        for (i, (_, write)) in log.iter().enumerate() {
            assert_eq!(write.send_count, i as u64 + 1);
        }
    }

    #[tokio::test]
    async fn regimes_never_overlap_across_a_switch() {
        let store = InMemoryStore::new();
        let tracker = controller(
            store.clone(),
            StubPositioner::fix(PositionFix { lat: 1.0, lng: 2.0 }),
        );

        tracker.set_regime(TrackerRegime::RealGps).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        // set_regime only returns once the old task is joined, so after the
        // first simulated write no real-GPS write can appear.
        tracker.set_regime(TrackerRegime::Simulated).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        tracker.shutdown().await;

        let log = store.write_log();
        let first_sim = log
            .iter()
            .position(|(_, write)| write.is_simulated)
            .expect("simulation never wrote");
        assert!(first_sim > 0, "real-GPS regime never wrote");
        assert!(
            log[first_sim..].iter().all(|(_, write)| write.is_simulated),
            "real-GPS write interleaved after the switch to simulation"
        );
    }

    #[tokio::test]
    async fn absent_positioner_is_terminal_gps_unavailable() {
        let store = InMemoryStore::new();
        let tracker = controller(store.clone(), StubPositioner::absent());
        let mut state = tracker.state();

        tracker.set_regime(TrackerRegime::RealGps).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(state.borrow_and_update().status, TrackerStatus::GpsUnavailable);
        assert!(store.write_log().is_empty());
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn fix_failure_maps_to_signal_lost_with_fixed_message() {
        let store = InMemoryStore::new();
        let tracker = controller(
            store.clone(),
            StubPositioner::failing(PositionError::PermissionDenied),
        );
        let mut state = tracker.state();

        tracker.set_regime(TrackerRegime::RealGps).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        tracker.shutdown().await;

        let snapshot = state.borrow_and_update().clone();
        assert_eq!(snapshot.status, TrackerStatus::SignalLost);
        assert_eq!(snapshot.error.as_deref(), Some("Location permission denied"));
        assert!(store.write_log().is_empty());
    }

    #[tokio::test]
    async fn write_failure_surfaces_verbatim_and_keeps_ticking() {
        let store = InMemoryStore::new();
        store.fail_writes(Some("quota exceeded"));
        let tracker = controller(
            store.clone(),
            StubPositioner::fix(PositionFix { lat: 1.0, lng: 2.0 }),
        );
        let mut state = tracker.state();

        tracker.set_regime(TrackerRegime::RealGps).await;
        wait_for_status(&mut state, TrackerStatus::SendError).await;
        assert_eq!(state.borrow().error.as_deref(), Some("quota exceeded"));

        // Clearing the fault lets the next tick recover without restarting.
        store.fail_writes(None);
        wait_for_status(&mut state, TrackerStatus::Active).await;
        tracker.shutdown().await;
    }

    /// Store whose writes never complete, standing in for a stalled
    /// connection with no request timeout.
    #[derive(Clone)]
    struct StallingStore;

    impl LocationStore for StallingStore {
        async fn upsert_merge(
            &self,
            _bag_id: &str,
            _write: &LocationWrite,
        ) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        fn subscribe(&self, _bag_id: &str, _events: mpsc::Sender<StoreEvent>) -> Subscription {
            let cancel = CancellationToken::new();
            let token = cancel.clone();
            let task = tokio::spawn(async move { token.cancelled().await });
            Subscription::new(cancel, task)
        }
    }

    #[tokio::test]
    async fn teardown_never_waits_on_an_in_flight_write() {
        let tracker = TrackerController::with_periods(
            &tokio::runtime::Handle::current(),
            "X7K9P2".into(),
            StallingStore,
            StubPositioner::fix(PositionFix { lat: 1.0, lng: 2.0 }),
            "test-agent".into(),
            fast_periods(),
        );

        tracker.set_regime(TrackerRegime::RealGps).await;
        // Let the first tick park inside the write.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(
            tracker.state().borrow().status,
            TrackerStatus::Sending,
            "first write should be in flight"
        );

        tokio::time::timeout(Duration::from_secs(2), tracker.shutdown())
            .await
            .expect("teardown blocked behind a stalled write");
    }

    #[tokio::test]
    async fn regime_switch_never_waits_on_an_in_flight_write() {
        let tracker = TrackerController::with_periods(
            &tokio::runtime::Handle::current(),
            "X7K9P2".into(),
            StallingStore,
            StubPositioner::fix(PositionFix { lat: 1.0, lng: 2.0 }),
            "test-agent".into(),
            fast_periods(),
        );

        tracker.set_regime(TrackerRegime::RealGps).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        tokio::time::timeout(Duration::from_secs(2), tracker.set_regime(TrackerRegime::Idle))
            .await
            .expect("regime switch blocked behind a stalled write");
        tracker.shutdown().await;
    }

    async fn wait_for_status(
        state: &mut watch::Receiver<TrackerState>,
        expected: TrackerStatus,
    ) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if state.borrow().status == expected {
                    return;
                }
                state.changed().await.expect("state channel closed");
            }
        })
        .await
        .unwrap_or_else(|_| panic!("tracker never reached {expected:?}"));
    }
}
