//! # Workflows Module
//!
//! High-level entry points that run a complete aimless-shooting campaign.
//!
//! ## Overview
//!
//! A workflow takes validated inputs (seed configurations, an acceptor choice, a
//! [`crate::engine::config::ShootingConfig`] and an engine launcher), checks
//! everything that can fail before a simulation is launched, and then drives the
//! engine layer to completion while reporting progress.
//!
//! ## Architecture
//!
//! - **Shooting Workflow** ([`shoot::run`]) - Runs `n_parallel` independent workers
//!   concurrently and aggregates their logs into one master log as they progress.
//! - **Merge Workflow** ([`shoot::merge`]) - Rebuilds a master log from the logs of
//!   finished workers.

pub mod shoot;
