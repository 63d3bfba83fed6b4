//! The capability an external molecular dynamics engine must provide.
//!
//! The shooting engine never inspects which backend it is driving. A backend
//! implements [`EngineLauncher`], which hands out one fresh [`SimulationEngine`]
//! handle per trajectory; handles are never shared between the forward and reverse
//! branch of an attempt, between attempts, or between workers.

use crate::core::models::configuration::{Configuration, ModelError};
use crate::core::models::outcome::TrajectoryOutcome;
use crate::core::models::velocity::Velocities;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to prepare trajectory {id}: {source}")]
    Prepare {
        id: TrajectoryId,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start engine process for {id}: {source}")]
    Spawn {
        id: TrajectoryId,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine process for {id} failed ({status}) without committing: {stderr}")]
    Process {
        id: TrajectoryId,
        status: String,
        stderr: String,
    },

    #[error("Engine output for {id} could not be read from {path:?}: {message}")]
    Output {
        id: TrajectoryId,
        path: PathBuf,
        message: String,
    },

    #[error("Invalid engine input: {0}")]
    Input(#[from] ModelError),

    #[error("Engine handle used before {0} was set")]
    NotReady(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "fwd",
            Direction::Reverse => "rev",
        }
    }
}

/// Names one trajectory uniquely within a campaign.
///
/// `attempt` is the index the attempt will receive in its worker's log, so the
/// identifier is stable across a resumed run as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrajectoryId {
    pub worker: usize,
    pub attempt: usize,
    pub direction: Direction,
}

impl fmt::Display for TrajectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "w{}_a{}_{}",
            self.worker,
            self.attempt,
            self.direction.as_str()
        )
    }
}

/// A single-use handle that runs one trajectory.
pub trait SimulationEngine: Send {
    /// Sets the starting coordinates of the trajectory.
    fn set_positions(&mut self, configuration: &Configuration) -> Result<(), LaunchError>;

    /// Sets the starting velocities of the trajectory.
    fn set_velocities(&mut self, velocities: &Velocities) -> Result<(), LaunchError>;

    /// Runs the trajectory to completion.
    ///
    /// Implementations own the lifecycle of any external process and must yield to
    /// the runtime while it runs. A trajectory that exhausts its step budget without
    /// committing resolves to an outcome whose basin is `None`; it is not an error.
    fn run(self) -> impl Future<Output = Result<TrajectoryOutcome, LaunchError>> + Send;
}

/// Produces independent [`SimulationEngine`] handles.
pub trait EngineLauncher: Send + Sync + 'static {
    type Engine: SimulationEngine;

    /// Creates a handle configured for the system described by `seed`.
    fn configure(&self, seed: &Configuration, id: TrajectoryId) -> Result<Self::Engine, LaunchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trajectory_id_display_is_filesystem_friendly() {
        let id = TrajectoryId {
            worker: 2,
            attempt: 17,
            direction: Direction::Reverse,
        };
        assert_eq!(id.to_string(), "w2_a17_rev");
    }
}
