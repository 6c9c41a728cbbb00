use std::time::Duration;

use log::{debug, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Battery state as written into the location record: a percent when the
/// platform reports one, otherwise the `"Unknown"` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryLevel {
    Percent(u8),
    Unknown,
}

impl BatteryLevel {
    pub fn label(&self) -> String {
        match self {
            BatteryLevel::Percent(level) => format!("{level}%"),
            BatteryLevel::Unknown => "Unknown".to_string(),
        }
    }
}

/// Device identification string carried in the record, informational only.
pub fn agent_string() -> String {
    let os = sysinfo::System::name().unwrap_or_else(|| "Unknown OS".to_string());
    let version = sysinfo::System::os_version().unwrap_or_else(|| "?".to_string());
    let host = sysinfo::System::host_name().unwrap_or_else(|| "unknown-host".to_string());
    format!("{os}/{version} ({host})")
}

const BATTERY_POLL: Duration = Duration::from_secs(30);

/// Watches the platform battery, pushing a new level only when it changes.
/// If the platform exposes no battery the level stays `Unknown` for the
/// lifetime of the monitor; that is not an error.
pub struct BatteryMonitor {
    rx: watch::Receiver<BatteryLevel>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BatteryMonitor {
    pub fn spawn(handle: &tokio::runtime::Handle) -> Self {
        let initial = read_battery_percent()
            .map(BatteryLevel::Percent)
            .unwrap_or(BatteryLevel::Unknown);
        let (tx, rx) = watch::channel(initial);

        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = handle.spawn(async move {
            if matches!(*tx.borrow(), BatteryLevel::Unknown) {
                // No battery to watch; level stays Unknown.
                debug!("battery status unavailable on this platform");
                return;
            }

            let mut ticker = tokio::time::interval(BATTERY_POLL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let level = read_battery_percent()
                            .map(BatteryLevel::Percent)
                            .unwrap_or(BatteryLevel::Unknown);
                        tx.send_if_modified(|current| {
                            if *current != level {
                                info!("battery level changed: {}", level.label());
                                *current = level;
                                true
                            } else {
                                false
                            }
                        });
                    }
                    _ = token.cancelled() => break,
                }
            }
        });

        Self {
            rx,
            cancel,
            task: Some(task),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<BatteryLevel> {
        self.rx.clone()
    }

    pub fn level(&self) -> BatteryLevel {
        *self.rx.borrow()
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for BatteryMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(target_os = "linux")]
fn read_battery_percent() -> Option<u8> {
    let entries = std::fs::read_dir("/sys/class/power_supply").ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        let kind = std::fs::read_to_string(path.join("type")).unwrap_or_default();
        if kind.trim() != "Battery" {
            continue;
        }
        if let Ok(raw) = std::fs::read_to_string(path.join("capacity")) {
            if let Ok(percent) = raw.trim().parse::<u8>() {
                return Some(percent.min(100));
            }
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn read_battery_percent() -> Option<u8> {
    None
}
