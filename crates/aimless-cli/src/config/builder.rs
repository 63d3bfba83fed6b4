use super::defaults::DefaultsConfig;
use super::file::{
    FileConfig, FileEngineConfig, FileProcessScope, FileResourcesConfig, FileShootingConfig,
};
use super::models::AppConfig;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use aimless::engine::acceptor::AcceptorSpec;
use aimless::engine::command::CommandSpec;
use aimless::engine::config::{ProcessLimit, ShootingConfigBuilder};
use nalgebra::Vector3;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Layers CLI flags over `-S` overrides over the config file over built-in defaults.
pub fn build_config(args: &RunArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();
    let file_config = FileConfig::from_file(&args.config)?;
    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let shooting = file_config.shooting.take().unwrap_or_default();
    let engine = file_config.engine.take().unwrap_or_default();
    let resources = file_config.resources.take().unwrap_or_default();

    let starts_dir = args
        .starts_dir
        .clone()
        .or_else(|| shooting.starts_dir.clone())
        .unwrap_or_else(|| PathBuf::from(defaults.starts_dir));
    if !starts_dir.is_dir() {
        return Err(CliError::Config(format!(
            "Seed directory does not exist: {}",
            starts_dir.display()
        )));
    }

    let default_box = shooting.default_box.map(Vector3::from);
    let acceptor = file_config
        .acceptor
        .map(AcceptorSpec::from)
        .unwrap_or_default();
    let command = merge_engine(engine, args.keep_files, &defaults)?;
    let core_config = merge_shooting(args, &shooting, &resources, &defaults)?;

    Ok(AppConfig {
        starts_dir,
        default_box,
        acceptor,
        command,
        core_config,
    })
}

fn merge_shooting(
    args: &RunArgs,
    file: &FileShootingConfig,
    resources: &FileResourcesConfig,
    defaults: &DefaultsConfig,
) -> Result<aimless::engine::config::ShootingConfig> {
    let n_parallel = args
        .n_parallel
        .or(file.n_parallel)
        .unwrap_or(defaults.n_parallel);

    let mut builder = ShootingConfigBuilder::new()
        .temperature(
            args.temperature
                .or(file.temperature)
                .unwrap_or(defaults.temperature),
        )
        .n_parallel(n_parallel)
        .n_points(args.n_points.or(file.n_points).unwrap_or(defaults.n_points))
        .n_state_tries(
            args.n_state_tries
                .or(file.n_state_tries)
                .unwrap_or(defaults.n_state_tries),
        )
        .n_vel_tries(
            args.n_vel_tries
                .or(file.n_vel_tries)
                .unwrap_or(defaults.n_vel_tries),
        )
        .output_prefix(
            args.output_prefix
                .clone()
                .or_else(|| file.output_prefix.clone())
                .unwrap_or_else(|| PathBuf::from(defaults.output_prefix)),
        )
        .aggregate_poll_interval(Duration::from_millis(
            file.aggregate_poll_ms.unwrap_or(defaults.aggregate_poll_ms),
        ));

    if let Some(seed) = args.seed.or(file.seed) {
        builder = builder.seed(seed);
    }
    if let Some(limit) = merge_process_limit(resources, defaults)? {
        builder = builder.process_limit(limit);
    }

    builder.build().map_err(|e| CliError::Config(e.to_string()))
}

/// `None` leaves the library default (a global cap of two processes per worker).
fn merge_process_limit(
    resources: &FileResourcesConfig,
    defaults: &DefaultsConfig,
) -> Result<Option<ProcessLimit>> {
    let limit = match (resources.scope, resources.max_processes) {
        (Some(FileProcessScope::Unbounded), Some(_)) => {
            return Err(CliError::Config(
                "`resources.max-processes` cannot be combined with the unbounded scope".to_string(),
            ));
        }
        (Some(FileProcessScope::Unbounded), None) => Some(ProcessLimit::Unbounded),
        (Some(FileProcessScope::PerWorker), max) => Some(ProcessLimit::PerWorker(
            max.unwrap_or(defaults.per_worker_processes),
        )),
        (Some(FileProcessScope::Global) | None, Some(max)) => Some(ProcessLimit::Global(max)),
        (Some(FileProcessScope::Global) | None, None) => None,
    };
    Ok(limit)
}

fn merge_engine(
    file: FileEngineConfig,
    cli_keep_files: bool,
    defaults: &DefaultsConfig,
) -> Result<CommandSpec> {
    let program = file.program.ok_or_else(|| {
        CliError::Config("`engine.program` is required to launch trajectories.".to_string())
    })?;
    let poll_interval_ms = file.poll_interval_ms.unwrap_or(defaults.poll_interval_ms);
    if poll_interval_ms == 0 {
        return Err(CliError::Config(
            "`engine.poll-interval-ms` must be positive".to_string(),
        ));
    }
    if file.timeout_secs == Some(0) {
        return Err(CliError::Config(
            "`engine.timeout-secs` must be positive".to_string(),
        ));
    }

    Ok(CommandSpec {
        program,
        args: file.args.unwrap_or_default(),
        work_root: file
            .work_dir
            .unwrap_or_else(|| PathBuf::from(defaults.work_dir)),
        poll_interval: Duration::from_millis(poll_interval_ms),
        timeout: file.timeout_secs.map(Duration::from_secs),
        keep_files: cli_keep_files || file.keep_files.unwrap_or(defaults.keep_files),
    })
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value)))
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };

        match key {
            "shooting.temperature" => {
                config.shooting.get_or_insert_with(Default::default).temperature =
                    Some(parse_value(key, value_str, "float")?);
            }
            "shooting.n-parallel" => {
                config.shooting.get_or_insert_with(Default::default).n_parallel =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "shooting.n-points" => {
                config.shooting.get_or_insert_with(Default::default).n_points =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "shooting.n-state-tries" => {
                config.shooting.get_or_insert_with(Default::default).n_state_tries =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "shooting.n-vel-tries" => {
                config.shooting.get_or_insert_with(Default::default).n_vel_tries =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "shooting.seed" => {
                config.shooting.get_or_insert_with(Default::default).seed =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "shooting.output-prefix" => {
                config.shooting.get_or_insert_with(Default::default).output_prefix =
                    Some(PathBuf::from(value_str));
            }
            "shooting.starts-dir" => {
                config.shooting.get_or_insert_with(Default::default).starts_dir =
                    Some(PathBuf::from(value_str));
            }
            "engine.program" => {
                config.engine.get_or_insert_with(Default::default).program =
                    Some(PathBuf::from(value_str));
            }
            "engine.work-dir" => {
                config.engine.get_or_insert_with(Default::default).work_dir =
                    Some(PathBuf::from(value_str));
            }
            "engine.poll-interval-ms" => {
                config
                    .engine
                    .get_or_insert_with(Default::default)
                    .poll_interval_ms = Some(parse_value(key, value_str, "integer")?);
            }
            "engine.timeout-secs" => {
                config.engine.get_or_insert_with(Default::default).timeout_secs =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "engine.keep-files" => {
                config.engine.get_or_insert_with(Default::default).keep_files =
                    Some(parse_value(key, value_str, "boolean")?);
            }
            "resources.max-processes" => {
                config
                    .resources
                    .get_or_insert_with(Default::default)
                    .max_processes = Some(parse_value(key, value_str, "integer")?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}
