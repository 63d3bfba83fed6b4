use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Bound on the number of external simulation processes alive at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessLimit {
    Unbounded,
    /// At most `n` processes across every worker.
    Global(usize),
    /// At most `n` processes per worker.
    PerWorker(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShootingConfig {
    pub temperature: f64,
    pub n_parallel: usize,
    pub n_points: usize,
    pub n_state_tries: usize,
    pub n_vel_tries: usize,
    pub output_prefix: PathBuf,
    pub process_limit: ProcessLimit,
    pub seed: Option<u64>,
    pub aggregate_poll_interval: Duration,
}

impl ShootingConfig {
    /// Log prefix of worker `i`: the output prefix with the worker ordinal appended.
    pub fn worker_prefix(&self, worker: usize) -> PathBuf {
        let mut name = self.output_prefix.clone().into_os_string();
        name.push(worker.to_string());
        PathBuf::from(name)
    }
}

pub const DEFAULT_AGGREGATE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
pub struct ShootingConfigBuilder {
    temperature: Option<f64>,
    n_parallel: Option<usize>,
    n_points: Option<usize>,
    n_state_tries: Option<usize>,
    n_vel_tries: Option<usize>,
    output_prefix: Option<PathBuf>,
    process_limit: Option<ProcessLimit>,
    seed: Option<u64>,
    aggregate_poll_interval: Option<Duration>,
}

impl ShootingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn n_parallel(mut self, n: usize) -> Self {
        self.n_parallel = Some(n);
        self
    }
    pub fn n_points(mut self, n: usize) -> Self {
        self.n_points = Some(n);
        self
    }
    pub fn n_state_tries(mut self, n: usize) -> Self {
        self.n_state_tries = Some(n);
        self
    }
    pub fn n_vel_tries(mut self, n: usize) -> Self {
        self.n_vel_tries = Some(n);
        self
    }
    pub fn output_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.output_prefix = Some(prefix.into());
        self
    }
    pub fn process_limit(mut self, limit: ProcessLimit) -> Self {
        self.process_limit = Some(limit);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn aggregate_poll_interval(mut self, interval: Duration) -> Self {
        self.aggregate_poll_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<ShootingConfig, ConfigError> {
        let temperature = self
            .temperature
            .ok_or(ConfigError::MissingParameter("temperature"))?;
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "temperature",
                reason: format!("{temperature} K is not a positive temperature"),
            });
        }

        let n_parallel = positive("n_parallel", self.n_parallel)?;
        let n_points = positive("n_points", self.n_points)?;
        let n_state_tries = positive("n_state_tries", self.n_state_tries)?;
        let n_vel_tries = positive("n_vel_tries", self.n_vel_tries)?;

        let output_prefix = self
            .output_prefix
            .ok_or(ConfigError::MissingParameter("output_prefix"))?;
        if output_prefix.as_os_str().is_empty() {
            return Err(ConfigError::InvalidParameter {
                name: "output_prefix",
                reason: "must not be empty".to_string(),
            });
        }

        let process_limit = self
            .process_limit
            .unwrap_or(ProcessLimit::Global(n_parallel * 2));
        if matches!(
            process_limit,
            ProcessLimit::Global(0) | ProcessLimit::PerWorker(0)
        ) {
            return Err(ConfigError::InvalidParameter {
                name: "process_limit",
                reason: "a process cap must allow at least one process".to_string(),
            });
        }

        let aggregate_poll_interval = self
            .aggregate_poll_interval
            .unwrap_or(DEFAULT_AGGREGATE_POLL_INTERVAL);
        if aggregate_poll_interval.is_zero() {
            return Err(ConfigError::InvalidParameter {
                name: "aggregate_poll_interval",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(ShootingConfig {
            temperature,
            n_parallel,
            n_points,
            n_state_tries,
            n_vel_tries,
            output_prefix,
            process_limit,
            seed: self.seed,
            aggregate_poll_interval,
        })
    }
}

fn positive(name: &'static str, value: Option<usize>) -> Result<usize, ConfigError> {
    match value {
        None => Err(ConfigError::MissingParameter(name)),
        Some(0) => Err(ConfigError::InvalidParameter {
            name,
            reason: "must be at least 1".to_string(),
        }),
        Some(n) => Ok(n),
    }
}
