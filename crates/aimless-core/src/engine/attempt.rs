use super::simulator::{Direction, EngineLauncher, LaunchError, SimulationEngine, TrajectoryId};
use crate::core::models::configuration::Configuration;
use crate::core::models::outcome::{ShootingResult, TrajectoryOutcome};
use crate::core::models::velocity::Velocities;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Runs the forward and reverse trajectories of one shooting point concurrently.
///
/// Each branch gets its own engine handle. A branch whose launch fails comes
/// back as `None`, which every acceptor treats as not committed, so a failed
/// launch is recorded as an ordinary rejection.
pub async fn run_shooting_point<L: EngineLauncher>(
    launcher: &L,
    limiter: Option<&Semaphore>,
    worker: usize,
    attempt: usize,
    base: &Configuration,
    velocities: &Velocities,
) -> ShootingResult {
    let fwd_id = TrajectoryId {
        worker,
        attempt,
        direction: Direction::Forward,
    };
    let rev_id = TrajectoryId {
        direction: Direction::Reverse,
        ..fwd_id
    };
    let reversed = velocities.reversed();

    let (fwd, rev) = tokio::join!(
        run_branch(launcher, limiter, fwd_id, base, velocities),
        run_branch(launcher, limiter, rev_id, base, &reversed),
    );
    ShootingResult { fwd, rev }
}

async fn run_branch<L: EngineLauncher>(
    launcher: &L,
    limiter: Option<&Semaphore>,
    id: TrajectoryId,
    base: &Configuration,
    velocities: &Velocities,
) -> Option<TrajectoryOutcome> {
    let _permit = match limiter {
        Some(semaphore) => match semaphore.acquire().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!(trajectory = %id, "Process limiter closed; branch not launched");
                return None;
            }
        },
        None => None,
    };

    match launch(launcher, id, base, velocities).await {
        Ok(outcome) => {
            debug!(trajectory = %id, basin = ?outcome.basin, "Trajectory finished");
            Some(outcome)
        }
        Err(e) => {
            warn!(trajectory = %id, error = %e, "Trajectory launch failed; branch counts as not committed");
            None
        }
    }
}

async fn launch<L: EngineLauncher>(
    launcher: &L,
    id: TrajectoryId,
    base: &Configuration,
    velocities: &Velocities,
) -> Result<TrajectoryOutcome, LaunchError> {
    velocities.check_len(base.len())?;
    let mut engine = launcher.configure(base, id)?;
    engine.set_positions(base)?;
    engine.set_velocities(velocities)?;
    let outcome = engine.run().await?;
    for frame in &outcome.frames {
        base.check_same_atoms(frame)?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{ScriptedLauncher, argon_pair, zero_velocities};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn reverse_branch_receives_negated_velocities() {
        let launcher = ScriptedLauncher::new(|id| match id.direction {
            Direction::Forward => Ok(Some(1)),
            Direction::Reverse => Ok(Some(2)),
        });
        let base = argon_pair(0.0);
        let velocities = Velocities::new(vec![
            nalgebra::Vector3::new(1.0, 0.0, 0.0),
            nalgebra::Vector3::new(0.0, -2.0, 0.0),
        ]);

        let result = run_shooting_point(&launcher, None, 0, 0, &base, &velocities).await;
        assert_eq!(result.basin_fwd(), Some(1));
        assert_eq!(result.basin_rev(), Some(2));

        let seen = launcher.launched();
        assert_eq!(seen.len(), 2);
        let rev = seen
            .iter()
            .find(|(id, _)| id.direction == Direction::Reverse)
            .unwrap();
        assert_eq!(rev.1, velocities.reversed());
    }

    #[tokio::test]
    async fn failed_launch_becomes_uncommitted_branch() {
        let launcher = ScriptedLauncher::new(|id| match id.direction {
            Direction::Forward => Err(LaunchError::NotReady("positions")),
            Direction::Reverse => Ok(Some(2)),
        });
        let base = argon_pair(0.0);
        let result =
            run_shooting_point(&launcher, None, 1, 4, &base, &zero_velocities(2)).await;
        assert!(result.fwd.is_none());
        assert_eq!(result.basin_rev(), Some(2));
    }

    #[tokio::test]
    async fn mismatched_velocities_are_not_launched() {
        let launcher = ScriptedLauncher::new(|_| Ok(Some(1)));
        let base = argon_pair(0.0);
        let result =
            run_shooting_point(&launcher, None, 0, 0, &base, &zero_velocities(3)).await;
        assert!(result.fwd.is_none() && result.rev.is_none());
        assert!(launcher.launched().is_empty());
    }

    #[tokio::test]
    async fn limiter_permits_are_released_after_each_branch() {
        let launcher = ScriptedLauncher::new(|_| Ok(Some(1)));
        let limiter = Arc::new(Semaphore::new(1));
        let base = argon_pair(0.0);
        let result = run_shooting_point(
            &launcher,
            Some(&limiter),
            0,
            0,
            &base,
            &zero_velocities(2),
        )
        .await;
        assert!(result.both().is_some());
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test]
    async fn both_branches_run_at_the_same_time_without_a_limiter() {
        let launcher =
            ScriptedLauncher::new(|_| Ok(Some(1))).holding(Duration::from_millis(20));
        let base = argon_pair(0.0);
        let result =
            run_shooting_point(&launcher, None, 0, 0, &base, &zero_velocities(2)).await;
        assert!(result.both().is_some());
        assert_eq!(launcher.peak_running(), 2);
    }

    #[tokio::test]
    async fn single_permit_serializes_the_branches() {
        let launcher =
            ScriptedLauncher::new(|_| Ok(Some(1))).holding(Duration::from_millis(20));
        let limiter = Semaphore::new(1);
        let base = argon_pair(0.0);
        let result = run_shooting_point(
            &launcher,
            Some(&limiter),
            0,
            0,
            &base,
            &zero_velocities(2),
        )
        .await;
        assert!(result.both().is_some());
        assert_eq!(launcher.peak_running(), 1);
    }
}
