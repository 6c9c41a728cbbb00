use chrono::Local;
use eframe::egui;

use crate::clipboard;
use crate::session::SessionShell;
use crate::tracker::{TrackerRegime, TrackerState, TrackerStatus};

pub enum TrackerAction {
    SetSimulated(bool),
    SetKeepAwake(bool),
}

pub fn tracker_screen(
    ui: &mut egui::Ui,
    shell: &mut SessionShell,
    state: &TrackerState,
) -> Option<TrackerAction> {
    let mut action = None;
    let panel_width = if shell.compact { ui.available_width() } else { 380.0 };

    ui.vertical_centered(|ui| {
        ui.add_space(if shell.compact { 12.0 } else { 32.0 });
        ui.label(egui::RichText::new("Tracker Mode").size(20.0).strong());
        ui.add_space(8.0);

        ui.horizontal(|ui| {
            ui.add_space((ui.available_width() - panel_width).max(0.0) / 2.0);
            ui.label(
                egui::RichText::new(&shell.bag_id)
                    .monospace()
                    .size(26.0)
                    .strong(),
            );
            let copy_label = if shell.copy_flash_active() {
                "Copied!"
            } else {
                "Copy ID"
            };
            if ui.button(copy_label).clicked() {
                clipboard::copy_text(ui.ctx(), &shell.bag_id);
                shell.mark_copied();
            }
        });
        ui.add_space(12.0);

        ui.allocate_ui(egui::vec2(panel_width, 0.0), |ui| {
            ui.group(|ui| {
                ui.set_width(panel_width);
                status_row(ui, "Status", status_text(state));
                status_row(
                    ui,
                    "Update Rate",
                    egui::RichText::new(state.regime.rate_label()),
                );
                let last = state
                    .last_sent
                    .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "--:--:--".to_string());
                status_row(ui, "Last Update", egui::RichText::new(last).monospace());
                status_row(
                    ui,
                    "Sends",
                    egui::RichText::new(state.send_count.to_string()),
                );
                status_row(ui, "Battery", egui::RichText::new(state.battery.label()));
            });

            if let Some(ref error) = state.error {
                ui.add_space(8.0);
                ui.group(|ui| {
                    ui.set_width(panel_width);
                    ui.label(
                        egui::RichText::new("Location Error")
                            .small()
                            .strong()
                            .color(egui::Color32::from_rgb(220, 60, 60)),
                    );
                    ui.label(
                        egui::RichText::new(error)
                            .small()
                            .color(egui::Color32::from_rgb(220, 60, 60)),
                    );
                });
            }

            ui.add_space(8.0);
            ui.group(|ui| {
                ui.set_width(panel_width);
                ui.label(
                    egui::RichText::new(
                        "Keep your device screen ON for continuous tracking. Enable airplane \
                         mode if needed but keep WiFi/GPS active.",
                    )
                    .small(),
                );
            });

            ui.add_space(8.0);
            let mut keep_awake = state.keep_awake;
            if ui
                .checkbox(&mut keep_awake, "Keep Screen Awake")
                .changed()
            {
                action = Some(TrackerAction::SetKeepAwake(keep_awake));
            }
            let mut simulating = state.regime == TrackerRegime::Simulated;
            if ui.checkbox(&mut simulating, "Simulation Mode").changed() {
                action = Some(TrackerAction::SetSimulated(simulating));
            }
        });
    });

    action
}

fn status_text(state: &TrackerState) -> egui::RichText {
    let color = if state.status.is_error() {
        egui::Color32::from_rgb(220, 60, 60)
    } else if state.status == TrackerStatus::Active {
        egui::Color32::from_rgb(16, 160, 90)
    } else {
        egui::Color32::from_rgb(200, 150, 0)
    };
    egui::RichText::new(state.status.label()).color(color)
}

fn status_row(ui: &mut egui::Ui, label: &str, value: egui::RichText) {
    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(label).weak());
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.label(value);
        });
    });
}
