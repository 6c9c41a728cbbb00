use eframe::egui;

use crate::session::{SessionShell, BAG_ID_LEN};

/// Minimum typed length before the Track button unlocks. Shorter prefixes are
/// almost certainly typos.
const MIN_VIEWER_INPUT: usize = 3;

pub enum SelectionAction {
    StartTracker,
    StartViewer(String),
}

pub fn selection_screen(ui: &mut egui::Ui, shell: &mut SessionShell) -> Option<SelectionAction> {
    let mut action = None;
    let panel_width = if shell.compact { ui.available_width() } else { 420.0 };

    ui.vertical_centered(|ui| {
        ui.add_space(if shell.compact { 16.0 } else { 48.0 });
        ui.heading(egui::RichText::new("Locate Your Stuff").size(28.0).strong());
        ui.label("Real-time location tracking for bags, luggage, and valuables");
        ui.add_space(24.0);

        ui.allocate_ui(egui::vec2(panel_width, 0.0), |ui| {
            ui.group(|ui| {
                ui.set_width(panel_width);
                ui.label(egui::RichText::new("I am the Tracker").strong().size(16.0));
                ui.label(
                    egui::RichText::new("Put this device in the bag to track it")
                        .small()
                        .weak(),
                );
                ui.add_space(6.0);
                if ui
                    .add_sized(
                        [panel_width - 16.0, 36.0],
                        egui::Button::new("Start Tracking"),
                    )
                    .clicked()
                {
                    action = Some(SelectionAction::StartTracker);
                }
                ui.label(egui::RichText::new("Sends your location every 60 seconds").small());
            });

            ui.add_space(12.0);

            ui.group(|ui| {
                ui.set_width(panel_width);
                ui.label(egui::RichText::new("I am the Viewer").strong().size(16.0));
                ui.label(
                    egui::RichText::new("Track a bag from another device")
                        .small()
                        .weak(),
                );
                ui.add_space(6.0);
                ui.horizontal(|ui| {
                    let edit = egui::TextEdit::singleline(&mut shell.viewer_input)
                        .hint_text("Enter Bag ID (e.g., X7K9P)")
                        .char_limit(BAG_ID_LEN)
                        .font(egui::TextStyle::Monospace);
                    if ui.add(edit).changed() {
                        shell.viewer_input = shell.viewer_input.to_uppercase();
                    }
                    let ready = shell.viewer_input.len() >= MIN_VIEWER_INPUT;
                    if ui
                        .add_enabled(ready, egui::Button::new("Track"))
                        .clicked()
                    {
                        action = Some(SelectionAction::StartViewer(shell.viewer_input.clone()));
                    }
                });
                ui.label(
                    egui::RichText::new("Get the tracking ID from the device in the bag")
                        .small()
                        .weak(),
                );
            });

            ui.add_space(16.0);

            ui.group(|ui| {
                ui.set_width(panel_width);
                ui.label(
                    egui::RichText::new("Screen Needs to Stay On")
                        .small()
                        .strong()
                        .color(egui::Color32::from_rgb(180, 120, 0)),
                );
                ui.label(
                    egui::RichText::new(
                        "The device in the bag should keep its screen awake or plugged in. \
                         A screen lock option is available in tracker mode.",
                    )
                    .small(),
                );
            });
            ui.add_space(6.0);
            ui.group(|ui| {
                ui.set_width(panel_width);
                ui.label(
                    egui::RichText::new("Uses GPS and WiFi")
                        .small()
                        .strong()
                        .color(egui::Color32::from_rgb(37, 99, 235)),
                );
                ui.label(
                    egui::RichText::new(
                        "Location accuracy depends on available GPS signal. \
                         WiFi can help indoors. Real-time updates every minute.",
                    )
                    .small(),
                );
            });
        });
    });

    action
}
