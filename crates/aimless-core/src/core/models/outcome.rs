use super::configuration::Configuration;

/// Identifier of a stable basin, as numbered by the committor definition.
pub type Basin = i32;

/// The result of one trajectory launched from a shooting point.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryOutcome {
    /// The basin the trajectory committed to, or `None` if it did not commit
    /// within its step budget.
    pub basin: Option<Basin>,
    /// The frames captured at Δt and 2Δt after the shooting point, in that order.
    pub frames: [Configuration; 2],
}

impl TrajectoryOutcome {
    pub fn new(basin: Option<Basin>, frames: [Configuration; 2]) -> Self {
        Self { basin, frames }
    }
}

/// The paired outcome of one shooting attempt.
///
/// A branch is `None` when the engine failed to launch that trajectory; such a
/// branch counts as not committed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShootingResult {
    /// Trajectory launched with the sampled velocities.
    pub fwd: Option<TrajectoryOutcome>,
    /// Trajectory launched with the negated velocities.
    pub rev: Option<TrajectoryOutcome>,
}

impl ShootingResult {
    pub fn basin_fwd(&self) -> Option<Basin> {
        self.fwd.as_ref().and_then(|o| o.basin)
    }

    pub fn basin_rev(&self) -> Option<Basin> {
        self.rev.as_ref().and_then(|o| o.basin)
    }

    /// Returns both outcomes if both trajectories launched successfully.
    pub fn both(&self) -> Option<(&TrajectoryOutcome, &TrajectoryOutcome)> {
        match (&self.fwd, &self.rev) {
            (Some(fwd), Some(rev)) => Some((fwd, rev)),
            _ => None,
        }
    }
}
