//! # Aimless Core Library
//!
//! An orchestration engine for aimless shooting: the iterative generation of
//! configurations near the dividing surface between two stable basins, driven by
//! pairs of short forward/reverse trajectories launched through an external
//! molecular dynamics engine.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture so that the retry logic,
//! the file formats and the concurrency model can each be tested in isolation.
//!
//! - **[`core`]: The Foundation.** Immutable value types (`Configuration`, `Velocities`,
//!   `ShootingResult`), the element mass table, and the coordinate archive and
//!   metadata table formats.
//!
//! - **[`engine`]: The Logic Core.** The stateful layer. It contains the acceptors, the
//!   simulation engine capability, velocity sampling, the accepted-state pool, the
//!   retry state machine that drives a worker, the durable results logger and the
//!   aggregator that merges worker logs into one master log.
//!
//! - **[`workflows`]: The Public API.** Ties the `engine` and `core` together to run a
//!   complete parallel aimless-shooting campaign, or to merge the logs of a finished one.

pub mod core;
pub mod engine;
pub mod workflows;
