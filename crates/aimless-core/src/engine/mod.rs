//! # Engine Module
//!
//! The stateful layer of the library: everything that decides which shooting
//! point to try next, runs it through an external simulation engine and records
//! the result.
//!
//! ## Architecture
//!
//! - **Acceptance** ([`acceptor`]) - Policies judging a forward/reverse basin pair
//! - **Simulation Capability** ([`simulator`]) - The contract an external engine fulfils,
//!   with a generic external-program adapter in [`command`]
//! - **Sampling** ([`sampling`]) - Maxwell–Boltzmann velocities and perturbation offsets
//! - **Shooting** ([`attempt`], [`pool`]) - One forward/reverse pair, and the accepted states
//!   that later bases are drawn from
//! - **Retry Policy** ([`state`]) - The per-worker state machine and its counters
//! - **Workers** ([`worker`]) - One independent chain owning its pool, log and random source
//! - **Persistence** ([`logger`], [`aggregate`]) - Aligned per-worker logs and the master log
//! - **Configuration** ([`config`]), **Progress** ([`progress`]) and **Errors** ([`error`])
//!
//! ## Concurrency
//!
//! Workers share nothing mutable. Each one is an async task whose only suspension
//! point is waiting for both trajectories of an attempt; an optional semaphore
//! bounds how many external processes are alive at once.

pub mod acceptor;
pub mod aggregate;
pub mod attempt;
pub mod command;
pub mod config;
pub mod error;
pub mod logger;
pub mod pool;
pub mod progress;
pub mod sampling;
pub mod simulator;
pub mod state;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
