use rand::Rng;

use crate::position::PositionFix;

/// Walk start point (Central Park, NY) and the box the walk is clamped to.
pub const WALK_START: PositionFix = PositionFix {
    lat: 40.785091,
    lng: -73.968285,
};
pub const LAT_BOUNDS: (f64, f64) = (40.75, 40.82);
pub const LNG_BOUNDS: (f64, f64) = (-73.99, -73.93);

/// Per-tick perturbation is uniform in ±STEP_RANGE/2 on each axis.
pub const STEP_RANGE: f64 = 0.0015;

/// Random walk standing in for a moving device. Restarting the simulation
/// constructs a fresh walk; no state survives a toggle.
#[derive(Debug)]
pub struct RandomWalk {
    position: PositionFix,
}

impl RandomWalk {
    pub fn new() -> Self {
        Self {
            position: WALK_START,
        }
    }

    pub fn step<R: Rng>(&mut self, rng: &mut R) -> PositionFix {
        let lat = self.position.lat + (rng.gen::<f64>() - 0.5) * STEP_RANGE;
        let lng = self.position.lng + (rng.gen::<f64>() - 0.5) * STEP_RANGE;
        self.position = PositionFix {
            lat: lat.clamp(LAT_BOUNDS.0, LAT_BOUNDS.1),
            lng: lng.clamp(LNG_BOUNDS.0, LNG_BOUNDS.1),
        };
        self.position
    }
}

impl Default for RandomWalk {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn walk_starts_at_the_fixed_point() {
        assert_eq!(RandomWalk::new().position, WALK_START);
    }

    #[test]
    fn steps_are_bounded_and_stay_in_the_box() {
        let mut rng = StdRng::seed_from_u64(123);
        let mut walk = RandomWalk::new();
        let mut previous = WALK_START;
        let max_delta = STEP_RANGE / 2.0 + 1e-12;

        for _ in 0..5000 {
            let next = walk.step(&mut rng);
            // Per-tick delta never exceeds half the step range per axis
            // (clamping can only shrink a step, never grow it).
            assert!((next.lat - previous.lat).abs() <= max_delta);
            assert!((next.lng - previous.lng).abs() <= max_delta);
            assert!((LAT_BOUNDS.0..=LAT_BOUNDS.1).contains(&next.lat));
            assert!((LNG_BOUNDS.0..=LNG_BOUNDS.1).contains(&next.lng));
            previous = next;
        }
    }

    #[test]
    fn restart_resets_to_the_start_point() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut walk = RandomWalk::new();
        for _ in 0..10 {
            walk.step(&mut rng);
        }
        assert_eq!(RandomWalk::new().position, WALK_START);
    }
}
