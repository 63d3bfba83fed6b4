use crate::cli::RunArgs;
use crate::config::{AppConfig, build_config};
use crate::error::{CliError, Result};
use crate::ui::UiEvent;
use crate::utils::progress::CliProgressHandler;
use aimless::core::io::xyz::read_first_frame;
use aimless::core::models::configuration::Configuration;
use aimless::engine::command::CommandLauncher;
use aimless::engine::progress::ProgressReporter;
use aimless::workflows::shoot::{self, ShootingReport};
use nalgebra::Vector3;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(args: RunArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app = build_config(&args)?;

    let reporter = CliProgressHandler::new(ui_sender).reporter();

    println!(
        "Starting aimless shooting with {} worker(s), {} point(s) each...",
        app.core_config.n_parallel, app.core_config.n_points
    );
    let report = execute(app, reporter).await?;

    print_report(&report);
    Ok(())
}

/// Loads the seeds and drives the shooting workflow with the external-command engine.
pub async fn execute(app: AppConfig, reporter: Arc<ProgressReporter>) -> Result<ShootingReport> {
    info!("Loading seed configurations from {:?}", &app.starts_dir);
    let seeds = load_seeds(&app.starts_dir, app.default_box)?;
    info!("Loaded {} seed configuration(s).", seeds.len());

    let launcher = Arc::new(CommandLauncher::new(app.command));
    let report = shoot::run(launcher, seeds, &app.acceptor, &app.core_config, reporter).await?;

    info!(
        "Workflow finished: {} accepted, {} master entries.",
        report.total_accepted, report.master_records
    );
    Ok(report)
}

/// Reads the first frame of every `.xyz` file in `dir`, in file name order.
pub fn load_seeds(dir: &Path, default_box: Option<Vector3<f64>>) -> Result<Vec<Configuration>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "xyz"))
        .collect();
    paths.sort();

    let mut seeds = Vec::with_capacity(paths.len());
    for path in paths {
        let parse_error = |e: aimless::core::io::xyz::XyzError| CliError::FileParsing {
            path: path.clone(),
            source: e.into(),
        };
        let mut file = File::open(&path)?;
        let Some(frame) = read_first_frame(&mut file).map_err(parse_error)? else {
            warn!("Seed file {:?} holds no frames; skipping it.", path);
            continue;
        };
        seeds.push(frame.into_configuration(default_box).map_err(parse_error)?);
    }
    Ok(seeds)
}

fn print_report(report: &ShootingReport) {
    for worker in &report.workers {
        match &worker.error {
            None => println!(
                "  ✓ worker {} ({}): {} accepted",
                worker.worker,
                worker.prefix.display(),
                worker.accepted()
            ),
            Some(e) => {
                warn!("Worker {} stopped early: {}", worker.worker, e);
                println!(
                    "  ✗ worker {} ({}): {} accepted, stopped: {}",
                    worker.worker,
                    worker.prefix.display(),
                    worker.accepted(),
                    e
                );
            }
        }
    }
    println!(
        "Total accepted: {} ({} entries in the master log)",
        report.total_accepted, report.master_records
    );
}
