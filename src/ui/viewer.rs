use chrono::Utc;
use eframe::egui;

use crate::device::BatteryLevel;
use crate::session::SessionShell;
use crate::store::LocationRecord;
use crate::viewer::{open_in_external_maps, time_ago, ViewerPhase, ViewerState};

use super::map::MapPanel;

pub enum ViewerAction {
    SetAutoRefresh(bool),
}

pub fn viewer_screen(
    ui: &mut egui::Ui,
    shell: &SessionShell,
    state: &ViewerState,
    map: &mut MapPanel,
) -> Option<ViewerAction> {
    match &state.phase {
        ViewerPhase::Connecting => {
            centered_notice(ui, |ui| {
                ui.spinner();
                ui.label("Connecting...");
            });
            None
        }
        ViewerPhase::Failed(message) => {
            let mut action = None;
            centered_notice(ui, |ui| {
                ui.label(
                    egui::RichText::new("Unable to Track")
                        .strong()
                        .size(18.0)
                        .color(egui::Color32::from_rgb(220, 60, 60)),
                );
                ui.label(message);
                ui.add_space(8.0);
                action = auto_refresh_toggle(ui, state);
            });
            action
        }
        ViewerPhase::Waiting => {
            let mut action = None;
            centered_notice(ui, |ui| {
                ui.label(egui::RichText::new("Waiting for Signal").strong().size(18.0));
                ui.label(format!(
                    "Bag {} hasn't reported a location yet.",
                    shell.bag_id
                ));
                ui.add_space(8.0);
                action = auto_refresh_toggle(ui, state);
            });
            action
        }
        ViewerPhase::Live(record) => live_view(ui, shell, state, record, map),
    }
}

fn live_view(
    ui: &mut egui::Ui,
    shell: &SessionShell,
    state: &ViewerState,
    record: &LocationRecord,
    map: &mut MapPanel,
) -> Option<ViewerAction> {
    let mut action = None;

    ui.horizontal(|ui| {
        ui.label(
            egui::RichText::new(&shell.bag_id)
                .monospace()
                .strong()
                .size(18.0),
        );
        if record.is_simulated {
            ui.label(
                egui::RichText::new("SIMULATION")
                    .small()
                    .strong()
                    .color(egui::Color32::from_rgb(168, 85, 247)),
            );
        }
        ui.label(
            egui::RichText::new(format!(
                "Updated {}",
                time_ago(record.last_updated, Utc::now())
            ))
            .small()
            .weak(),
        );
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            action = auto_refresh_toggle(ui, state);
            if ui.button("Open in Google Maps").clicked() {
                open_in_external_maps(record.lat, record.lng);
            }
        });
    });

    ui.horizontal(|ui| {
        ui.label(
            egui::RichText::new(format!("{:.6}, {:.6}", record.lat, record.lng)).monospace(),
        );
        if let BatteryLevel::Percent(level) = record.battery_level {
            ui.label(egui::RichText::new(format!("🔋 {level}%")).small());
        }
        ui.label(
            egui::RichText::new(format!("Sends: {}", record.send_count))
                .small()
                .strong(),
        );
        ui.label(egui::RichText::new(short_agent(&record.device_agent)).small().weak());
    });

    ui.separator();
    map.show(ui, &shell.bag_id, record);
    action
}

fn auto_refresh_toggle(ui: &mut egui::Ui, state: &ViewerState) -> Option<ViewerAction> {
    let mut enabled = state.auto_refresh;
    if ui.checkbox(&mut enabled, "Auto-refresh").changed() {
        Some(ViewerAction::SetAutoRefresh(enabled))
    } else {
        None
    }
}

fn centered_notice(ui: &mut egui::Ui, add_contents: impl FnOnce(&mut egui::Ui)) {
    ui.vertical_centered(|ui| {
        ui.add_space(ui.available_height() * 0.3);
        add_contents(ui);
    });
}

/// The overlay shows only the leading product token of the agent string,
/// truncated the way phones truncate it.
fn short_agent(agent: &str) -> String {
    agent.split('/').next().unwrap_or("").chars().take(15).collect()
}

#[cfg(test)]
mod tests {
    use super::short_agent;

    #[test]
    fn agent_is_truncated_to_leading_token() {
        assert_eq!(short_agent("Ubuntu/24.04 (host)"), "Ubuntu");
        assert_eq!(short_agent(""), "");
        assert_eq!(
            short_agent("AVeryLongOperatingSystemName/1.0"),
            "AVeryLongOperat"
        );
    }
}
