use std::future::Future;
use std::time::Duration;

use log::warn;
use thiserror::Error;

/// A single position fix from the positioning collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub lat: f64,
    pub lng: f64,
}

/// The three failure classes the tracker surfaces. The display strings are
/// the exact user-facing messages; nothing else ever reaches the status
/// panel for positioning failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Unable to retrieve your location")]
    Unavailable,
    #[error("Location request timeout")]
    Timeout,
}

/// Options passed with every fix request. The defaults match the product:
/// high accuracy, no cached fixes, 10 second timeout.
#[derive(Debug, Clone, Copy)]
pub struct FixOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub no_cache: bool,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            no_cache: true,
        }
    }
}

/// Positioning collaborator seam. The tracker only ever asks for one fix at
/// a time; the timeout in [`FixOptions`] is enforced by the caller.
pub trait Positioner: Clone + Send + Sync + 'static {
    /// Whether a positioning source exists at all. `false` puts the tracker
    /// into its terminal "GPS Not Available" state.
    fn is_available(&self) -> bool;

    fn current_position(
        &self,
        options: &FixOptions,
    ) -> impl Future<Output = Result<PositionFix, PositionError>> + Send;
}

/// Host positioning source. Desktop machines rarely carry a GPS receiver, so
/// this reads a pinned fix from `BAGTRACK_FIXED_POSITION` ("lat,lng") when
/// one is configured and otherwise reports the collaborator as absent, which
/// is exactly what a browser without geolocation support does.
#[derive(Clone)]
pub struct SystemPositioner {
    fix: Option<PositionFix>,
}

impl SystemPositioner {
    pub fn from_env() -> Self {
        let fix = std::env::var("BAGTRACK_FIXED_POSITION")
            .ok()
            .and_then(|raw| parse_fix(&raw));
        if fix.is_none() {
            warn!("no positioning source configured; real GPS mode will report unavailable");
        }
        Self { fix }
    }
}

impl Positioner for SystemPositioner {
    fn is_available(&self) -> bool {
        self.fix.is_some()
    }

    async fn current_position(
        &self,
        _options: &FixOptions,
    ) -> Result<PositionFix, PositionError> {
        self.fix.ok_or(PositionError::Unavailable)
    }
}

/// Scripted positioning source: always yields the same outcome. Drives the
/// failure paths in the test suite and stands in where no real receiver
/// exists.
#[derive(Clone)]
pub struct StubPositioner {
    available: bool,
    outcome: Result<PositionFix, PositionError>,
}

impl StubPositioner {
    pub fn fix(fix: PositionFix) -> Self {
        Self {
            available: true,
            outcome: Ok(fix),
        }
    }

    pub fn failing(error: PositionError) -> Self {
        Self {
            available: true,
            outcome: Err(error),
        }
    }

    pub fn absent() -> Self {
        Self {
            available: false,
            outcome: Err(PositionError::Unavailable),
        }
    }
}

impl Positioner for StubPositioner {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn current_position(
        &self,
        _options: &FixOptions,
    ) -> Result<PositionFix, PositionError> {
        self.outcome
    }
}

fn parse_fix(raw: &str) -> Option<PositionFix> {
    let (lat, lng) = raw.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().parse().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return None;
    }
    Some(PositionFix { lat, lng })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_position() {
        let fix = parse_fix("40.785091, -73.968285").unwrap();
        assert_eq!(fix.lat, 40.785091);
        assert_eq!(fix.lng, -73.968285);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(parse_fix("91.0,0.0").is_none());
        assert!(parse_fix("0.0,181.0").is_none());
        assert!(parse_fix("garbage").is_none());
    }

    #[test]
    fn error_messages_are_the_fixed_user_strings() {
        assert_eq!(
            PositionError::PermissionDenied.to_string(),
            "Location permission denied"
        );
        assert_eq!(
            PositionError::Unavailable.to_string(),
            "Unable to retrieve your location"
        );
        assert_eq!(
            PositionError::Timeout.to_string(),
            "Location request timeout"
        );
    }
}
