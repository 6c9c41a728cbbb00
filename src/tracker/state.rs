use chrono::{DateTime, Utc};

use crate::device::BatteryLevel;

/// Which periodic task, if any, is feeding the store. Exactly one regime is
/// live at a time; transitions cancel the old task before starting the new
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerRegime {
    Idle,
    RealGps,
    Simulated,
}

impl TrackerRegime {
    /// The "Update Rate" line in the status panel.
    pub fn rate_label(&self) -> &'static str {
        match self {
            TrackerRegime::Idle => "--",
            TrackerRegime::RealGps => "1 min (GPS)",
            TrackerRegime::Simulated => "5 sec (Sim)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStatus {
    Initializing,
    Sending,
    Active,
    SendError,
    /// Terminal: no positioning collaborator exists.
    GpsUnavailable,
    /// A fix failed; the next scheduled tick is the only retry.
    SignalLost,
}

impl TrackerStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TrackerStatus::Initializing => "Initializing...",
            TrackerStatus::Sending => "Sending update...",
            TrackerStatus::Active => "Active & Transmitting",
            TrackerStatus::SendError => "Error sending data",
            TrackerStatus::GpsUnavailable => "GPS Not Available",
            TrackerStatus::SignalLost => "GPS Signal Lost",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            TrackerStatus::SendError | TrackerStatus::GpsUnavailable | TrackerStatus::SignalLost
        )
    }
}

/// Snapshot published to the UI after every state-affecting event.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerState {
    pub regime: TrackerRegime,
    pub status: TrackerStatus,
    pub error: Option<String>,
    pub last_sent: Option<DateTime<Utc>>,
    /// Per-session advisory counter; resets with the tracker process.
    pub send_count: u64,
    pub battery: BatteryLevel,
    pub keep_awake: bool,
}

impl TrackerState {
    pub fn new(battery: BatteryLevel) -> Self {
        Self {
            regime: TrackerRegime::Idle,
            status: TrackerStatus::Initializing,
            error: None,
            last_sent: None,
            send_count: 0,
            battery,
            keep_awake: false,
        }
    }
}
