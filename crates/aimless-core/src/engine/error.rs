use thiserror::Error;

use super::acceptor::AcceptorError;
use super::config::ConfigError;
use super::logger::LogError;
use super::sampling::SamplingError;
use crate::core::models::configuration::ModelError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid acceptor: {0}")]
    Acceptor(#[from] AcceptorError),

    #[error("Velocity sampling cannot be set up: {0}")]
    Sampling(#[from] SamplingError),

    #[error("Results log error: {0}")]
    Log(#[from] LogError),

    #[error("Invalid configuration data: {0}")]
    Model(#[from] ModelError),

    #[error("No seed configurations were provided")]
    NoSeeds,

    #[error("Seed configuration {index} does not match the first seed: {source}")]
    InconsistentSeed {
        index: usize,
        #[source]
        source: ModelError,
    },

    #[error("Worker {worker} exhausted its {state_tries} state retries without an acceptance")]
    RetriesExhausted { worker: usize, state_tries: usize },

    #[error("Worker {worker} tried all {seeds} seed configuration(s) without an acceptance")]
    SeedsExhausted { worker: usize, seeds: usize },

    #[error("No seed configuration was accepted by any of the {workers} worker(s)")]
    NoInitialAcceptance { workers: usize },

    #[error("Worker task {worker} did not complete: {reason}")]
    WorkerAborted { worker: usize, reason: String },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
