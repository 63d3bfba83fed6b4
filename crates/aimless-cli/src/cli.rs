use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Aimless CLI - Runs parallel aimless-shooting campaigns through an external molecular dynamics engine.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run (or resume) an aimless-shooting campaign.
    Run(RunArgs),
    /// Rebuild a master log from finished worker logs.
    Merge(MergeArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Path to the run configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    // --- Shooting Overrides ---
    /// Override the number of independent workers.
    #[arg(short = 'n', long = "parallel", value_name = "INT")]
    pub n_parallel: Option<usize>,

    /// Override the number of accepted points each worker must collect.
    #[arg(long = "points", value_name = "INT")]
    pub n_points: Option<usize>,

    /// Override the number of base reselections allowed after a rejection.
    #[arg(long = "state-tries", value_name = "INT")]
    pub n_state_tries: Option<usize>,

    /// Override the number of velocity draws allowed per base.
    #[arg(long = "vel-tries", value_name = "INT")]
    pub n_vel_tries: Option<usize>,

    /// Override the temperature (Kelvin) used to draw velocities.
    #[arg(short, long, value_name = "FLOAT")]
    pub temperature: Option<f64>,

    /// Seed the random source for a reproducible run.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Override the output prefix of the master log.
    #[arg(short, long = "output", value_name = "PREFIX")]
    pub output_prefix: Option<PathBuf>,

    /// Override the directory of seed configurations.
    #[arg(long = "starts", value_name = "DIR")]
    pub starts_dir: Option<PathBuf>,

    /// Keep every trajectory working directory after it finishes.
    #[arg(long)]
    pub keep_files: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S shooting.n-points=50
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `merge` subcommand.
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Prefix of the master log pair to (re)create.
    #[arg(short, long = "output", required = true, value_name = "PREFIX")]
    pub output_prefix: PathBuf,

    /// Prefixes of the worker log pairs, merged in the order given.
    #[arg(required = true, value_name = "WORKER_PREFIX")]
    pub workers: Vec<PathBuf>,
}
