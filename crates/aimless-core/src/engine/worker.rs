use super::acceptor::Acceptor;
use super::attempt::run_shooting_point;
use super::config::ProcessLimit;
use super::error::EngineError;
use super::logger::{LogContents, ResultsLogger};
use super::pool::{AcceptedPool, AcceptedState};
use super::progress::{Progress, ProgressReporter};
use super::sampling::VelocitySampler;
use super::simulator::EngineLauncher;
use super::state::{FailureReason, RetryPolicy, ShootingState, StateMachine};
use crate::core::models::configuration::Configuration;
use crate::core::models::velocity::Velocities;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, trace, warn};

/// Read-only inputs every worker of a run shares.
pub struct WorkerContext<L: EngineLauncher> {
    pub launcher: Arc<L>,
    pub acceptor: Arc<dyn Acceptor>,
    pub sampler: VelocitySampler,
    pub seeds: Arc<[Configuration]>,
    pub policy: RetryPolicy,
    pub process_limit: ProcessLimit,
    /// Shared semaphore when the process cap is global.
    pub global_limiter: Option<Arc<Semaphore>>,
    pub reporter: Arc<ProgressReporter>,
}

impl<L: EngineLauncher> WorkerContext<L> {
    fn limiter_for_worker(&self) -> Option<Arc<Semaphore>> {
        match self.process_limit {
            ProcessLimit::Unbounded => None,
            ProcessLimit::Global(_) => self.global_limiter.clone(),
            ProcessLimit::PerWorker(n) => Some(Arc::new(Semaphore::new(n))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker: usize,
    /// Accepted entries in the worker's log, including ones from a resumed log.
    pub accepted: usize,
    /// Attempts made during this run.
    pub attempts: usize,
    /// Entries in the worker's log.
    pub records: usize,
    pub pool_size: usize,
}

/// A worker that stopped before reaching its target, with what it had done by then.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct WorkerFailure {
    pub summary: WorkerSummary,
    #[source]
    pub error: EngineError,
}

/// One independent aimless-shooting chain.
///
/// A worker exclusively owns its accepted-state pool, its log pair and its
/// random source; nothing in it is shared with sibling workers.
pub struct Worker<L: EngineLauncher> {
    id: usize,
    launcher: Arc<L>,
    acceptor: Arc<dyn Acceptor>,
    sampler: VelocitySampler,
    kickstart: Vec<Configuration>,
    pool: AcceptedPool,
    logger: ResultsLogger,
    limiter: Option<Arc<Semaphore>>,
    reporter: Arc<ProgressReporter>,
    rng: StdRng,
    machine: StateMachine,
    target: usize,
    state_tries: usize,
    attempts: usize,
}

impl<L: EngineLauncher> Worker<L> {
    /// Builds a worker around an opened log pair.
    ///
    /// Kickstart bases are the accepted frames of a resumed log, in log order,
    /// followed by the seed configurations in a shuffled order.
    pub fn new(
        id: usize,
        ctx: &WorkerContext<L>,
        logger: ResultsLogger,
        existing: LogContents,
        mut rng: StdRng,
    ) -> Result<Self, EngineError> {
        let reference = ctx.seeds.first().ok_or(EngineError::NoSeeds)?;

        let mut kickstart = Vec::with_capacity(ctx.seeds.len());
        for frame in existing.accepted_frames() {
            let config = frame.to_configuration_like(reference).map_err(|e| {
                EngineError::Internal(format!("accepted frame of resumed log is unusable: {e}"))
            })?;
            kickstart.push(config);
        }
        let resumed = kickstart.len();
        let mut seeds = ctx.seeds.to_vec();
        seeds.shuffle(&mut rng);
        kickstart.extend(seeds);

        let machine = StateMachine::new(ctx.policy, kickstart.len(), existing.accepted_count());
        debug!(
            worker = id,
            resumed_seeds = resumed,
            kickstart_bases = kickstart.len(),
            "Worker prepared"
        );

        Ok(Self {
            id,
            launcher: Arc::clone(&ctx.launcher),
            acceptor: Arc::clone(&ctx.acceptor),
            sampler: ctx.sampler.clone(),
            kickstart,
            pool: AcceptedPool::new(),
            limiter: ctx.limiter_for_worker(),
            reporter: Arc::clone(&ctx.reporter),
            logger,
            rng,
            machine,
            target: ctx.policy.n_points,
            state_tries: ctx.policy.n_state_tries,
            attempts: 0,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Drives the state machine until the accepted target is met or the worker fails.
    #[instrument(skip_all, fields(worker = self.id))]
    pub async fn run(mut self) -> Result<WorkerSummary, WorkerFailure> {
        self.reporter.report(Progress::WorkerStarted {
            worker: self.id,
            target: self.target,
            already_accepted: self.machine.accepted(),
        });
        info!(already_accepted = self.machine.accepted(), "Worker started");

        let outcome = self.drive().await;
        let summary = self.summary();
        match outcome {
            Ok(()) => {
                info!(
                    accepted = summary.accepted,
                    attempts = summary.attempts,
                    "Worker reached its target"
                );
                self.reporter.report(Progress::WorkerFinished {
                    worker: self.id,
                    accepted: summary.accepted,
                });
                Ok(summary)
            }
            Err(error) => {
                warn!(attempts = summary.attempts, %error, "Worker failed");
                self.reporter.report(Progress::WorkerFailed {
                    worker: self.id,
                    reason: error.to_string(),
                });
                Err(WorkerFailure { summary, error })
            }
        }
    }

    async fn drive(&mut self) -> Result<(), EngineError> {
        let mut base: Option<Configuration> = None;
        let mut velocities: Option<Velocities> = None;

        loop {
            match self.machine.state() {
                ShootingState::SelectBase => {
                    base = Some(self.select_base()?);
                    self.machine.advance();
                }
                ShootingState::GenerateVelocity => {
                    velocities = Some(self.sampler.sample(&mut self.rng));
                    self.machine.advance();
                }
                ShootingState::RunAttempt => {
                    let (Some(b), Some(v)) = (base.as_ref(), velocities.as_ref()) else {
                        return Err(EngineError::Internal(
                            "attempt reached without a base and velocities".to_string(),
                        ));
                    };
                    let accepted = self.attempt(b, v).await?;
                    self.machine.record_attempt(accepted);
                }
                ShootingState::Accepted
                | ShootingState::RetryVelocity
                | ShootingState::ReselectState => {
                    self.machine.advance();
                }
                ShootingState::Done => return Ok(()),
                ShootingState::Failed(FailureReason::RetriesExhausted) => {
                    return Err(EngineError::RetriesExhausted {
                        worker: self.id,
                        state_tries: self.state_tries,
                    });
                }
                ShootingState::Failed(FailureReason::NoInitialAcceptance) => {
                    return Err(EngineError::SeedsExhausted {
                        worker: self.id,
                        seeds: self.kickstart.len(),
                    });
                }
            }
        }
    }

    fn select_base(&mut self) -> Result<Configuration, EngineError> {
        if let Some(cursor) = self.machine.seed_cursor() {
            trace!(seed = cursor, "Kickstarting from seed");
            return self.kickstart.get(cursor).cloned().ok_or_else(|| {
                EngineError::Internal(format!("seed cursor {cursor} out of range"))
            });
        }
        let (config, offset) = self.pool.perturb(&mut self.rng).ok_or_else(|| {
            EngineError::Internal("accepted pool is empty after an acceptance".to_string())
        })?;
        trace!(offset = offset.steps(), pool = self.pool.len(), "Reselected base");
        Ok(config)
    }

    async fn attempt(
        &mut self,
        base: &Configuration,
        velocities: &Velocities,
    ) -> Result<bool, EngineError> {
        let index = self.logger.next_index();
        let result = run_shooting_point(
            self.launcher.as_ref(),
            self.limiter.as_deref(),
            self.id,
            index,
            base,
            velocities,
        )
        .await;

        let accepted = match result.both() {
            Some((fwd, rev)) if self.acceptor.is_accepted(fwd.basin, rev.basin) => {
                self.pool.push(AcceptedState::new(
                    base.clone(),
                    velocities.clone(),
                    fwd,
                    rev,
                ));
                true
            }
            _ => false,
        };

        let logger = &mut self.logger;
        let record =
            tokio::task::block_in_place(|| logger.log_attempt(base, &result, accepted))?;
        self.attempts += 1;
        debug!(
            index = record.index,
            basin_fwd = ?record.basin_fwd,
            basin_rev = ?record.basin_rev,
            accepted,
            "Attempt logged"
        );
        self.reporter.report(Progress::AttemptLogged {
            worker: self.id,
            index: record.index,
            accepted,
        });
        Ok(accepted)
    }

    fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            worker: self.id,
            accepted: self.machine.accepted(),
            attempts: self.attempts,
            records: self.logger.next_index(),
            pool_size: self.pool.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::records::read_records;
    use crate::core::io::xyz::read_frames;
    use crate::core::models::outcome::Basin;
    use crate::engine::acceptor::DefaultAcceptor;
    use crate::engine::simulator::{Direction, LaunchError, TrajectoryId};
    use crate::engine::testing::{ScriptedLauncher, argon_pair};
    use rand::SeedableRng;
    use std::fs::File;
    use std::path::Path;
    use tempfile::tempdir;

    fn policy(n_points: usize, n_vel_tries: usize, n_state_tries: usize) -> RetryPolicy {
        RetryPolicy {
            n_points,
            n_vel_tries,
            n_state_tries,
        }
    }

    fn context(
        launcher: &ScriptedLauncher,
        seeds: Vec<Configuration>,
        policy: RetryPolicy,
    ) -> WorkerContext<ScriptedLauncher> {
        WorkerContext {
            launcher: Arc::new(launcher.clone()),
            acceptor: Arc::new(DefaultAcceptor),
            sampler: VelocitySampler::new(seeds[0].atoms(), 300.0).unwrap(),
            seeds: seeds.into(),
            policy,
            process_limit: ProcessLimit::Unbounded,
            global_limiter: None,
            reporter: ProgressReporter::new().shared(),
        }
    }

    /// Commits to different basins on the listed attempts and to the same basin otherwise.
    fn accept_on(attempts: &'static [usize]) -> ScriptedLauncher {
        ScriptedLauncher::new(move |id: &TrajectoryId| -> Result<Option<Basin>, LaunchError> {
            Ok(match id.direction {
                Direction::Forward => Some(1),
                Direction::Reverse if attempts.contains(&id.attempt) => Some(2),
                Direction::Reverse => Some(1),
            })
        })
    }

    fn worker(
        ctx: &WorkerContext<ScriptedLauncher>,
        prefix: &Path,
    ) -> Worker<ScriptedLauncher> {
        let (logger, existing) = ResultsLogger::open(prefix).unwrap();
        Worker::new(0, ctx, logger, existing, StdRng::seed_from_u64(5)).unwrap()
    }

    fn logged(prefix: &Path) -> (Vec<bool>, Vec<f64>) {
        let csv = File::open(prefix.with_extension("csv")).unwrap();
        let records = read_records(csv).unwrap();
        let mut xyz = File::open(prefix.with_extension("xyz")).unwrap();
        let frames = read_frames(&mut xyz).unwrap();
        assert_eq!(records.len(), frames.len());
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.index, i);
        }
        (
            records.iter().map(|r| r.accepted).collect(),
            frames.iter().map(|f| f.positions[0].x).collect(),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn third_draw_accepted_after_two_rejections_logs_three_records() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("w0");
        let launcher = accept_on(&[2]);
        let ctx = context(&launcher, vec![argon_pair(0.0), argon_pair(10.0)], policy(1, 2, 3));

        let summary = worker(&ctx, &prefix).run().await.unwrap();
        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.pool_size, 1);

        let (accepted, xs) = logged(&prefix);
        assert_eq!(accepted, vec![false, false, true]);
        assert_eq!(xs[0], xs[1]);
        assert_ne!(xs[1], xs[2]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exhausted_state_retries_stop_the_worker() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("w0");
        let launcher = accept_on(&[0]);
        let ctx = context(&launcher, vec![argon_pair(0.0)], policy(5, 2, 2));

        let failure = worker(&ctx, &prefix).run().await.unwrap_err();
        assert!(matches!(
            failure.error,
            EngineError::RetriesExhausted {
                worker: 0,
                state_tries: 2
            }
        ));
        assert_eq!(failure.summary.accepted, 1);
        assert_eq!(failure.summary.attempts, 5);

        let (accepted, _) = logged(&prefix);
        assert_eq!(accepted, vec![true, false, false, false, false]);
        assert_eq!(launcher.launched().len(), 10);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reselected_bases_come_from_accepted_trajectories() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("w0");
        let launcher = accept_on(&[0, 1, 2, 3]);
        let ctx = context(&launcher, vec![argon_pair(0.0)], policy(4, 1, 1));

        worker(&ctx, &prefix).run().await.unwrap();
        let (accepted, xs) = logged(&prefix);
        assert_eq!(accepted, vec![true; 4]);
        // The scripted engine moves 0.1 per step, so every base lies on that grid.
        for x in xs {
            let steps = x / 0.1;
            assert!((steps - steps.round()).abs() < 1e-9, "x = {x}");
            assert!(x.abs() <= 0.8 + 1e-9);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn persistent_launch_failures_exhaust_retries() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("w0");
        let launcher = ScriptedLauncher::new(|id: &TrajectoryId| match (id.attempt, id.direction) {
            (0, Direction::Forward) => Ok(Some(1)),
            (0, Direction::Reverse) => Ok(Some(2)),
            _ => Err(LaunchError::NotReady("positions")),
        });
        let ctx = context(&launcher, vec![argon_pair(0.0)], policy(3, 1, 2));

        let failure = worker(&ctx, &prefix).run().await.unwrap_err();
        assert!(matches!(failure.error, EngineError::RetriesExhausted { .. }));
        let (accepted, _) = logged(&prefix);
        assert_eq!(accepted, vec![true, false, false]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn kickstart_gives_up_after_every_seed() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("w0");
        let launcher = accept_on(&[]);
        let ctx = context(
            &launcher,
            vec![argon_pair(0.0), argon_pair(4.0), argon_pair(8.0)],
            policy(1, 2, 10),
        );

        let failure = worker(&ctx, &prefix).run().await.unwrap_err();
        assert!(matches!(failure.error, EngineError::SeedsExhausted { worker: 0, seeds: 3 }));
        assert_eq!(failure.summary.pool_size, 0);
        let (accepted, xs) = logged(&prefix);
        assert_eq!(accepted.len(), 6);
        let mut starts: Vec<f64> = xs.iter().step_by(2).copied().collect();
        starts.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(starts, vec![0.0, 4.0, 8.0]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resumed_worker_continues_from_its_log() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("w0");
        {
            let launcher = accept_on(&[0, 1]);
            let ctx = context(&launcher, vec![argon_pair(5.0)], policy(2, 1, 1));
            worker(&ctx, &prefix).run().await.unwrap();
        }

        let launcher = accept_on(&[2]);
        let ctx = context(&launcher, vec![argon_pair(0.0)], policy(3, 1, 1));
        let summary = worker(&ctx, &prefix).run().await.unwrap();
        assert_eq!(summary.accepted, 3);
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.records, 3);

        let launched = launcher.launched();
        assert!(launched.iter().all(|(id, _)| id.attempt == 2));
        let (accepted, xs) = logged(&prefix);
        assert_eq!(accepted, vec![true, true, true]);
        assert_eq!(xs[2], xs[0]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resumed_frames_keep_their_logged_box() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("w0");
        {
            let wide = argon_pair(5.0);
            let wide = Configuration::new(
                wide.shared_atoms(),
                wide.positions().to_vec(),
                nalgebra::Vector3::new(30.0, 30.0, 30.0),
            )
            .unwrap();
            let launcher = accept_on(&[0]);
            let ctx = context(&launcher, vec![wide], policy(1, 1, 1));
            worker(&ctx, &prefix).run().await.unwrap();
        }

        let launcher = accept_on(&[1]);
        let ctx = context(&launcher, vec![argon_pair(0.0)], policy(2, 1, 1));
        let summary = worker(&ctx, &prefix).run().await.unwrap();
        assert_eq!(summary.accepted, 2);

        let records = read_records(File::open(prefix.with_extension("csv")).unwrap()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].box_x, 30.0);
        assert_eq!(records[1].box_dims(), records[0].box_dims());
        let (_, xs) = logged(&prefix);
        assert_eq!(xs[1], xs[0]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn finished_log_runs_no_attempts() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("w0");
        let launcher = accept_on(&[0]);
        let ctx = context(&launcher, vec![argon_pair(0.0)], policy(1, 1, 1));
        worker(&ctx, &prefix).run().await.unwrap();

        let summary = worker(&ctx, &prefix).run().await.unwrap();
        assert_eq!(summary.attempts, 0);
        assert_eq!(launcher.launched().len(), 2);
    }
}
