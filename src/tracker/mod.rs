mod controller;
mod simulate;
mod state;

pub use controller::{RegimePeriods, TrackerController};
pub use state::{TrackerRegime, TrackerState, TrackerStatus};
