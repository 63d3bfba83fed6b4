use crate::core::models::configuration::Configuration;
use crate::engine::acceptor::AcceptorSpec;
use crate::engine::aggregate::{Aggregator, LogTail};
use crate::engine::config::{ProcessLimit, ShootingConfig};
use crate::engine::error::EngineError;
use crate::engine::logger::{LogError, LogPaths, ResultsLogger};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::sampling::VelocitySampler;
use crate::engine::simulator::EngineLauncher;
use crate::engine::state::RetryPolicy;
use crate::engine::worker::{Worker, WorkerContext, WorkerSummary};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};
use tracing::{error, info, instrument, warn};

#[derive(Debug)]
pub struct WorkerReport {
    pub worker: usize,
    pub prefix: PathBuf,
    /// `None` only if the worker task itself was lost.
    pub summary: Option<WorkerSummary>,
    pub error: Option<EngineError>,
}

impl WorkerReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn accepted(&self) -> usize {
        self.summary.as_ref().map_or(0, |s| s.accepted)
    }
}

#[derive(Debug)]
pub struct ShootingReport {
    pub workers: Vec<WorkerReport>,
    /// Accepted entries across every worker log.
    pub total_accepted: usize,
    /// Entries in the master log after the final aggregation.
    pub master_records: usize,
}

impl ShootingReport {
    pub fn failed_workers(&self) -> impl Iterator<Item = &WorkerReport> {
        self.workers.iter().filter(|w| !w.succeeded())
    }
}

/// Runs a parallel aimless-shooting campaign.
///
/// Everything that can be checked without launching a simulation is checked
/// first: the acceptor, the seed set, the element masses and every log file.
/// Workers then run concurrently and independently; a worker that fails does
/// not stop the others. Their entries are copied into the master log while
/// they run, starting from each worker's aggregation cursor, so entries a
/// previous run logged but never copied are picked up as well. A new master
/// log receives every worker entry.
///
/// # Errors
///
/// Returns an error for any configuration problem found before the workers
/// start, or if the master log cannot be written.
///
/// [`EngineError::NoInitialAcceptance`] is not raised early: it is returned
/// only after every worker has run and exhausted all of its kickstart bases
/// without an acceptance. A worker stopping that way does not cut its
/// siblings short, and their entries are aggregated before the error is
/// returned.
#[instrument(skip_all, name = "shooting_workflow", fields(n_parallel = config.n_parallel))]
pub async fn run<L: EngineLauncher>(
    launcher: Arc<L>,
    seeds: Vec<Configuration>,
    acceptor: &AcceptorSpec,
    config: &ShootingConfig,
    reporter: Arc<ProgressReporter>,
) -> Result<ShootingReport, EngineError> {
    // === Phase 0: Preflight ===
    let acceptor = acceptor.build()?;
    let reference = seeds.first().ok_or(EngineError::NoSeeds)?;
    for (index, seed) in seeds.iter().enumerate().skip(1) {
        reference
            .check_same_atoms(seed)
            .map_err(|source| EngineError::InconsistentSeed { index, source })?;
    }
    let sampler = VelocitySampler::new(reference.atoms(), config.temperature)?;
    info!(
        seeds = seeds.len(),
        atoms = reference.len(),
        temperature = config.temperature,
        "Preflight checks passed"
    );

    let mut master_rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let global_limiter = match config.process_limit {
        ProcessLimit::Global(n) => Some(Arc::new(Semaphore::new(n))),
        ProcessLimit::Unbounded | ProcessLimit::PerWorker(_) => None,
    };
    let ctx = WorkerContext {
        launcher,
        acceptor,
        sampler,
        seeds: seeds.into(),
        policy: RetryPolicy {
            n_points: config.n_points,
            n_vel_tries: config.n_vel_tries,
            n_state_tries: config.n_state_tries,
        },
        process_limit: config.process_limit,
        global_limiter,
        reporter: Arc::clone(&reporter),
    };

    // === Phase 1: Open every log and build the workers ===
    let (master, _) = ResultsLogger::open(&config.output_prefix)?;
    let fresh_master = master.next_index() == 0;
    let mut workers = Vec::with_capacity(config.n_parallel);
    let mut tails = Vec::with_capacity(config.n_parallel);
    for id in 0..config.n_parallel {
        let prefix = config.worker_prefix(id);
        let (logger, existing) = ResultsLogger::open(&prefix)?;
        let copied = if fresh_master {
            0
        } else {
            LogTail::read_cursor(logger.paths())?
        };
        let tail = LogTail::tracked(logger.paths().clone(), copied)?;
        if tail.rows() < existing.records.len() {
            info!(
                worker = id,
                pending = existing.records.len() - tail.rows(),
                "Worker log has entries not yet in the master log"
            );
        }
        tails.push(tail);
        let rng = StdRng::seed_from_u64(master_rng.next_u64());
        workers.push((prefix, Worker::new(id, &ctx, logger, existing, rng)?));
    }

    // === Phase 2: Run workers alongside the aggregator ===
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let aggregator = Aggregator::new(
        tails,
        master,
        config.aggregate_poll_interval,
        Arc::clone(&reporter),
    );
    let master_records_before = aggregator.master_len();
    let aggregation = tokio::spawn(aggregator.run(shutdown_rx));

    let handles: Vec<_> = workers
        .into_iter()
        .map(|(prefix, worker)| (worker.id(), prefix, tokio::spawn(worker.run())))
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for (id, prefix, handle) in handles {
        let report = match handle.await {
            Ok(Ok(summary)) => WorkerReport {
                worker: id,
                prefix,
                summary: Some(summary),
                error: None,
            },
            Ok(Err(failure)) => WorkerReport {
                worker: id,
                prefix,
                summary: Some(failure.summary),
                error: Some(failure.error),
            },
            Err(join_error) => {
                error!(worker = id, error = %join_error, "Worker task did not complete");
                WorkerReport {
                    worker: id,
                    prefix,
                    summary: None,
                    error: Some(EngineError::WorkerAborted {
                        worker: id,
                        reason: join_error.to_string(),
                    }),
                }
            }
        };
        reports.push(report);
    }

    // === Phase 3: Final aggregation and report ===
    let _ = shutdown_tx.send(true);
    let merged = aggregation
        .await
        .map_err(|e| EngineError::Internal(format!("aggregator task did not complete: {e}")))??;

    if reports
        .iter()
        .all(|r| matches!(r.error, Some(EngineError::SeedsExhausted { .. })))
    {
        error!("No worker got a seed configuration accepted");
        return Err(EngineError::NoInitialAcceptance {
            workers: reports.len(),
        });
    }

    let report = ShootingReport {
        total_accepted: reports.iter().map(WorkerReport::accepted).sum(),
        master_records: master_records_before + merged,
        workers: reports,
    };
    let failed = report.failed_workers().count();
    if failed > 0 {
        warn!(failed, "Some workers stopped before reaching their target");
    }
    info!(
        total_accepted = report.total_accepted,
        master_records = report.master_records,
        "Shooting workflow complete"
    );
    Ok(report)
}

/// Rebuilds a master log from completed worker logs.
///
/// Any existing master pair is replaced. Worker logs are copied whole, in the
/// order given, and their entries renumbered from zero. Returns the number of
/// entries written.
#[instrument(skip_all, name = "merge_workflow", fields(workers = worker_prefixes.len()))]
pub fn merge(
    worker_prefixes: &[PathBuf],
    master_prefix: &Path,
    reporter: &ProgressReporter,
) -> Result<usize, LogError> {
    let mut master = ResultsLogger::create(master_prefix)?;
    for prefix in worker_prefixes {
        let mut tail = LogTail::from_start(LogPaths::for_prefix(prefix));
        let entries = tail.poll()?;
        for (frame, record) in &entries {
            master.append(frame, record.clone())?;
        }
        info!(worker = %prefix.display(), entries = entries.len(), "Merged worker log");
    }
    let total = master.next_index();
    reporter.report(Progress::RecordsMerged { total });
    Ok(total)
}
