use chrono::{DateTime, Utc};
use eframe::egui;
use walkers::sources::OpenStreetMap;
use walkers::{HttpTiles, Map, MapMemory, Plugin, Position, Projector};

use crate::store::LocationRecord;
use crate::viewer::time_ago;

/// Slippy map showing the bag's latest position. Tiles are created once on
/// first show; pan and zoom live in `MapMemory` and survive repaints, so a
/// fresh record only recenters when the coordinates actually moved.
pub struct MapPanel {
    tiles: Option<HttpTiles>,
    memory: MapMemory,
    last_center: Option<(f64, f64)>,
}

impl MapPanel {
    pub fn new() -> Self {
        Self {
            tiles: None,
            memory: MapMemory::default(),
            last_center: None,
        }
    }

    fn ensure_tiles(&mut self, ctx: &egui::Context) {
        if self.tiles.is_none() {
            self.tiles = Some(HttpTiles::new(OpenStreetMap, ctx.clone()));
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, bag_id: &str, record: &LocationRecord) {
        self.ensure_tiles(ui.ctx());

        let position = walkers::lat_lon(record.lat, record.lng);
        if self.last_center != Some((record.lat, record.lng)) {
            self.memory.center_at(position);
            self.last_center = Some((record.lat, record.lng));
        }

        let map_rect = ui.available_rect_before_wrap();
        if let Some(ref mut tiles) = self.tiles {
            let marker = BagMarkerPlugin {
                position,
                simulated: record.is_simulated,
                label: marker_label(bag_id, record.last_updated, Utc::now()),
            };
            let map = Map::new(Some(tiles), &mut self.memory, position).with_plugin(marker);
            ui.add(map);

            ui.painter().text(
                map_rect.max - egui::vec2(5.0, 5.0),
                egui::Align2::RIGHT_BOTTOM,
                "© OpenStreetMap contributors",
                egui::FontId::proportional(10.0),
                egui::Color32::from_black_alpha(150),
            );
        }
    }
}

impl Default for MapPanel {
    fn default() -> Self {
        Self::new()
    }
}

/// Popup-style text pinned to the marker: identifier plus how long ago the
/// record was written.
fn marker_label(bag_id: &str, last_updated: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format!("Bag {bag_id}\nUpdated {}", time_ago(last_updated, now))
}

/// Draws the single bag marker: a soft halo around a filled dot, purple for
/// simulated positions and blue for real fixes, with the label floated above.
struct BagMarkerPlugin {
    position: Position,
    simulated: bool,
    label: String,
}

impl Plugin for BagMarkerPlugin {
    fn run(
        self: Box<Self>,
        ui: &mut egui::Ui,
        _response: &egui::Response,
        projector: &Projector,
        _memory: &MapMemory,
    ) {
        let screen = projector.project(self.position);
        let center = egui::pos2(screen.x, screen.y);
        let fill = if self.simulated {
            egui::Color32::from_rgb(168, 85, 247)
        } else {
            egui::Color32::from_rgb(37, 99, 235)
        };

        let painter = ui.painter();
        painter.circle_filled(center, 14.0, fill.gamma_multiply(0.25));
        painter.circle_filled(center, 7.0, fill);
        painter.circle_stroke(center, 7.0, egui::Stroke::new(2.0, egui::Color32::WHITE));

        let galley = painter.layout_no_wrap(
            self.label,
            egui::FontId::proportional(12.0),
            egui::Color32::WHITE,
        );
        let rect = egui::Align2::CENTER_BOTTOM
            .anchor_size(center - egui::vec2(0.0, 16.0), galley.size());
        painter.rect_filled(
            rect.expand(5.0),
            egui::CornerRadius::same(5),
            egui::Color32::from_black_alpha(170),
        );
        painter.galley(rect.min, galley, egui::Color32::WHITE);
    }
}
