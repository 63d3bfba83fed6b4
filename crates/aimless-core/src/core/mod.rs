//! # Core Module
//!
//! The stateless foundation of the library: the values that flow between the
//! orchestration engine and an external simulation engine, plus the file formats
//! used to persist them.
//!
//! ## Architecture
//!
//! - **Value Types** ([`models`]) - Configurations, velocities and trajectory outcomes
//! - **Element Data** ([`elements`]) - Atomic masses used for Maxwell–Boltzmann sampling
//! - **File I/O** ([`io`]) - The XYZ coordinate archive and the CSV metadata table
//!
//! ## Invariants
//!
//! - A [`models::configuration::Configuration`] never changes after construction; derived
//!   frames are new values sharing the same atom symbol list.
//! - A [`models::velocity::Velocities`] always has one vector per atom of the
//!   configuration it was generated for.

pub mod elements;
pub mod io;
pub mod models;
