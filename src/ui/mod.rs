mod map;
mod selection;
mod tracker;
mod viewer;

pub use map::MapPanel;
pub use selection::{selection_screen, SelectionAction};
pub use tracker::{tracker_screen, TrackerAction};
pub use viewer::{viewer_screen, ViewerAction};
