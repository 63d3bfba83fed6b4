//! Deterministic in-process engine used by the orchestration tests.

use super::simulator::{Direction, EngineLauncher, LaunchError, SimulationEngine, TrajectoryId};
use crate::core::models::configuration::Configuration;
use crate::core::models::outcome::{Basin, TrajectoryOutcome};
use crate::core::models::velocity::Velocities;
use nalgebra::{Point3, Vector3};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Script = dyn Fn(&TrajectoryId) -> Result<Option<Basin>, LaunchError> + Send + Sync;
type LaunchLog = Arc<Mutex<Vec<(TrajectoryId, Velocities)>>>;

/// Answers every trajectory with the basin its script returns for that id.
///
/// The Δt frames it reports are the starting positions shifted by 0.1 Å per
/// step along x, forward for the forward branch and backward for the reverse one.
#[derive(Clone)]
pub struct ScriptedLauncher {
    script: Arc<Script>,
    launched: LaunchLog,
    hold: Duration,
    occupancy: Arc<Occupancy>,
}

/// Trajectories running right now and the most that ever ran at once.
#[derive(Debug, Default)]
struct Occupancy {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedLauncher {
    pub fn new(
        script: impl Fn(&TrajectoryId) -> Result<Option<Basin>, LaunchError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Arc::new(script),
            launched: Arc::default(),
            hold: Duration::ZERO,
            occupancy: Arc::default(),
        }
    }

    /// Keeps every trajectory running for `hold` before it reports its basin.
    pub fn holding(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    /// Largest number of trajectories that were running at the same time.
    pub fn peak_running(&self) -> usize {
        self.occupancy.peak.load(Ordering::SeqCst)
    }

    /// Every trajectory that reached `run`, with the velocities it was given.
    pub fn launched(&self) -> Vec<(TrajectoryId, Velocities)> {
        self.launched.lock().unwrap().clone()
    }
}

impl EngineLauncher for ScriptedLauncher {
    type Engine = ScriptedEngine;

    fn configure(&self, _seed: &Configuration, id: TrajectoryId) -> Result<ScriptedEngine, LaunchError> {
        Ok(ScriptedEngine {
            id,
            script: Arc::clone(&self.script),
            launched: Arc::clone(&self.launched),
            hold: self.hold,
            occupancy: Arc::clone(&self.occupancy),
            positions: None,
            velocities: None,
        })
    }
}

pub struct ScriptedEngine {
    id: TrajectoryId,
    script: Arc<Script>,
    launched: LaunchLog,
    hold: Duration,
    occupancy: Arc<Occupancy>,
    positions: Option<Configuration>,
    velocities: Option<Velocities>,
}

impl SimulationEngine for ScriptedEngine {
    fn set_positions(&mut self, configuration: &Configuration) -> Result<(), LaunchError> {
        self.positions = Some(configuration.clone());
        Ok(())
    }

    fn set_velocities(&mut self, velocities: &Velocities) -> Result<(), LaunchError> {
        self.velocities = Some(velocities.clone());
        Ok(())
    }

    fn run(self) -> impl Future<Output = Result<TrajectoryOutcome, LaunchError>> + Send {
        async move {
            let base = self.positions.ok_or(LaunchError::NotReady("positions"))?;
            let velocities = self.velocities.ok_or(LaunchError::NotReady("velocities"))?;
            self.launched.lock().unwrap().push((self.id, velocities));
            self.occupancy.enter();
            if self.hold.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.hold).await;
            }
            self.occupancy.leave();

            let basin = (self.script)(&self.id)?;
            let sign = match self.id.direction {
                Direction::Forward => 1.0,
                Direction::Reverse => -1.0,
            };
            let shifted = |steps: f64| {
                let positions = base
                    .positions()
                    .iter()
                    .map(|p| p + Vector3::new(sign * steps * 0.1, 0.0, 0.0))
                    .collect();
                base.with_positions(positions)
            };
            Ok(TrajectoryOutcome::new(basin, [shifted(1.0)?, shifted(2.0)?]))
        }
    }
}

/// Two argon atoms 3 Å apart, the first at `x`, in a 20 Å box.
pub fn argon_pair(x: f64) -> Configuration {
    Configuration::new(
        vec!["Ar".to_string(), "Ar".to_string()].into(),
        vec![Point3::new(x, 0.0, 0.0), Point3::new(x + 3.0, 0.0, 0.0)],
        Vector3::new(20.0, 20.0, 20.0),
    )
    .unwrap()
}

pub fn zero_velocities(n: usize) -> Velocities {
    Velocities::new(vec![Vector3::zeros(); n])
}
