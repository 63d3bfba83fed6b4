use crate::error::{CliError, Result};
use aimless::core::models::outcome::Basin;
use aimless::engine::acceptor::AcceptorSpec;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub shooting: Option<FileShootingConfig>,
    pub acceptor: Option<FileAcceptorConfig>,
    pub engine: Option<FileEngineConfig>,
    pub resources: Option<FileResourcesConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileShootingConfig {
    pub temperature: Option<f64>,
    pub n_parallel: Option<usize>,
    pub n_points: Option<usize>,
    pub n_state_tries: Option<usize>,
    pub n_vel_tries: Option<usize>,
    pub output_prefix: Option<PathBuf>,
    pub starts_dir: Option<PathBuf>,
    /// Box lengths for seed frames whose comment line carries none.
    pub default_box: Option<[f64; 3]>,
    pub seed: Option<u64>,
    pub aggregate_poll_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum FileAcceptorConfig {
    Default,
    MultiBasin {
        reactants: Vec<Basin>,
        products: Vec<Basin>,
    },
}

impl From<FileAcceptorConfig> for AcceptorSpec {
    fn from(f: FileAcceptorConfig) -> Self {
        match f {
            FileAcceptorConfig::Default => AcceptorSpec::Default,
            FileAcceptorConfig::MultiBasin {
                reactants,
                products,
            } => AcceptorSpec::MultiBasin {
                reactants,
                products,
            },
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileEngineConfig {
    pub program: Option<PathBuf>,
    pub args: Option<Vec<String>>,
    pub work_dir: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub keep_files: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileProcessScope {
    Unbounded,
    Global,
    PerWorker,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileResourcesConfig {
    pub scope: Option<FileProcessScope>,
    pub max_processes: Option<usize>,
}
