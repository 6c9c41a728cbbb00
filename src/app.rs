use std::time::Duration;

use eframe::egui;
use log::info;
use tokio::sync::watch;

use crate::config::AppConfig;
use crate::device::agent_string;
use crate::identity::AuthSession;
use crate::position::SystemPositioner;
use crate::session::{generate_bag_id, Mode, SessionShell, COMPACT_WIDTH};
use crate::store::{FirestoreStore, InMemoryStore, Store};
use crate::tracker::{TrackerController, TrackerRegime, TrackerState};
use crate::ui::{
    selection_screen, tracker_screen, viewer_screen, MapPanel, SelectionAction, TrackerAction,
    ViewerAction,
};
use crate::viewer::{ViewerController, ViewerState};

/// Repaint cadence while a live screen is up; controller state arrives on
/// watch channels, not through egui events.
const LIVE_REPAINT: Duration = Duration::from_millis(250);

pub struct BagTrackApp {
    runtime: tokio::runtime::Runtime,
    config: AppConfig,
    identity_rx: watch::Receiver<Option<AuthSession>>,
    store: Option<Store>,
    shell: SessionShell,
    tracker: Option<(
        TrackerController<Store, SystemPositioner>,
        watch::Receiver<TrackerState>,
    )>,
    viewer: Option<(ViewerController<Store>, watch::Receiver<ViewerState>)>,
    map: MapPanel,
}

impl BagTrackApp {
    pub fn new(
        runtime: tokio::runtime::Runtime,
        config: AppConfig,
        identity_rx: watch::Receiver<Option<AuthSession>>,
    ) -> Self {
        Self {
            runtime,
            config,
            identity_rx,
            store: None,
            shell: SessionShell::new(),
            tracker: None,
            viewer: None,
            map: MapPanel::new(),
        }
    }

    /// The store exists only once identity has resolved; until then every
    /// frame shows the connecting screen.
    fn ensure_store(&mut self) -> bool {
        if self.store.is_some() {
            return true;
        }
        let session = self.identity_rx.borrow().clone();
        if let Some(session) = session {
            let store = if self.config.offline {
                Store::Memory(InMemoryStore::new())
            } else {
                Store::Firestore(FirestoreStore::new(&self.config, session.id_token.clone()))
            };
            self.store = Some(store);
            true
        } else {
            false
        }
    }

    fn start_tracker(&mut self) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let bag_id = generate_bag_id();
        info!("starting tracker for bag {bag_id}");
        let controller = TrackerController::new(
            self.runtime.handle(),
            bag_id.clone(),
            store,
            SystemPositioner::from_env(),
            agent_string(),
        );
        let state = controller.state();
        let c = controller.clone();
        self.runtime.spawn(async move {
            c.set_regime(TrackerRegime::RealGps).await;
        });
        self.tracker = Some((controller, state));
        self.shell.bag_id = bag_id;
        self.shell.mode = Mode::Tracker;
    }

    fn start_viewer(&mut self, bag_id: String) {
        let Some(store) = self.store.clone() else {
            return;
        };
        info!("starting viewer for bag {bag_id}");
        let controller = ViewerController::new(self.runtime.handle(), bag_id.clone(), store);
        let state = controller.state();
        self.viewer = Some((controller, state));
        self.shell.bag_id = bag_id;
        self.shell.mode = Mode::Viewer;
    }

    /// Tear down whichever controller is live, then fall back to selection.
    fn go_home(&mut self) {
        if let Some((controller, _)) = self.tracker.take() {
            self.runtime.spawn(async move {
                controller.shutdown().await;
            });
        }
        if let Some((controller, _)) = self.viewer.take() {
            self.runtime.spawn(async move {
                controller.shutdown().await;
            });
        }
        self.shell.reset_to_selection();
    }

    fn apply_tracker_action(&mut self, action: TrackerAction) {
        let Some((controller, _)) = &self.tracker else {
            return;
        };
        match action {
            TrackerAction::SetSimulated(enabled) => {
                let regime = if enabled {
                    TrackerRegime::Simulated
                } else {
                    TrackerRegime::RealGps
                };
                let c = controller.clone();
                self.runtime.spawn(async move {
                    c.set_regime(regime).await;
                });
            }
            TrackerAction::SetKeepAwake(enabled) => controller.set_keep_awake(enabled),
        }
    }

    fn apply_viewer_action(&mut self, action: ViewerAction) {
        let Some((controller, _)) = &self.viewer else {
            return;
        };
        match action {
            ViewerAction::SetAutoRefresh(enabled) => {
                let c = controller.clone();
                self.runtime.spawn(async move {
                    c.set_auto_refresh(enabled).await;
                });
            }
        }
    }
}

impl eframe::App for BagTrackApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.shell.compact = ctx.screen_rect().width() < COMPACT_WIDTH;

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new("BagTrack Live").strong().size(16.0));
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if self.shell.mode != Mode::Selection && ui.button("Home").clicked() {
                        self.go_home();
                    }
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if !self.ensure_store() {
                ui.vertical_centered(|ui| {
                    ui.add_space(ui.available_height() * 0.4);
                    ui.spinner();
                    ui.label("Connecting...");
                });
                ctx.request_repaint_after(Duration::from_millis(100));
                return;
            }

            match self.shell.mode {
                Mode::Selection => {
                    match selection_screen(ui, &mut self.shell) {
                        Some(SelectionAction::StartTracker) => self.start_tracker(),
                        Some(SelectionAction::StartViewer(id)) => self.start_viewer(id),
                        None => {}
                    }
                }
                Mode::Tracker => {
                    let state = self
                        .tracker
                        .as_ref()
                        .map(|(_, rx)| rx.borrow().clone());
                    if let Some(state) = state {
                        if let Some(action) = tracker_screen(ui, &mut self.shell, &state) {
                            self.apply_tracker_action(action);
                        }
                    }
                    ctx.request_repaint_after(LIVE_REPAINT);
                }
                Mode::Viewer => {
                    let state = self
                        .viewer
                        .as_ref()
                        .map(|(_, rx)| rx.borrow().clone());
                    if let Some(state) = state {
                        let action = viewer_screen(ui, &self.shell, &state, &mut self.map);
                        if let Some(action) = action {
                            self.apply_viewer_action(action);
                        }
                    }
                    ctx.request_repaint_after(LIVE_REPAINT);
                }
            }
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if let Some((controller, _)) = self.tracker.take() {
            self.runtime.block_on(controller.shutdown());
        }
        if let Some((controller, _)) = self.viewer.take() {
            self.runtime.block_on(controller.shutdown());
        }
    }
}
