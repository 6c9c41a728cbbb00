use anyhow::{Context, Result};
use log::{info, warn};

/// Best-effort inhibitor that keeps the machine from idling to sleep while
/// tracking. Held as a value; releasing is dropping.
#[derive(Debug)]
pub struct WakeLock {
    #[cfg(target_os = "linux")]
    child: std::process::Child,
}

impl WakeLock {
    /// Failure here is non-fatal by contract: callers log it and move on.
    #[cfg(target_os = "linux")]
    pub fn acquire() -> Result<Self> {
        let child = std::process::Command::new("systemd-inhibit")
            .args([
                "--what=idle:sleep",
                "--who=bagtrack",
                "--why=Live location tracking",
                "sleep",
                "infinity",
            ])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .context("failed to spawn systemd-inhibit")?;
        info!("wake lock acquired");
        Ok(Self { child })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn acquire() -> Result<Self> {
        anyhow::bail!("wake lock not supported on this platform")
    }
}

impl Drop for WakeLock {
    fn drop(&mut self) {
        #[cfg(target_os = "linux")]
        {
            if let Err(err) = self.child.kill() {
                warn!("failed to release wake lock: {err}");
            } else {
                let _ = self.child.wait();
                info!("wake lock released");
            }
        }
    }
}
