mod controller;

pub use controller::{open_in_external_maps, time_ago, ViewerController, ViewerPhase, ViewerState};
