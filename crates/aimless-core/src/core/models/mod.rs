//! # Core Models Module
//!
//! Immutable value types exchanged between the shooting engine and the external
//! simulation engine.
//!
//! ## Key Components
//!
//! - [`configuration`] - Atom symbols, positions (Å) and box dimensions (Å)
//! - [`velocity`] - Per-atom velocity vectors (m/s)
//! - [`outcome`] - Committed basins and the Δt/2Δt frames of a trajectory, and the
//!   paired forward/reverse result of one shooting attempt
//!
//! ## Usage
//!
//! ```ignore
//! use aimless::core::models::configuration::Configuration;
//! use nalgebra::{Point3, Vector3};
//!
//! let config = Configuration::new(
//!     vec!["Na".into(), "Cl".into()].into(),
//!     vec![Point3::new(0.0, 0.0, 0.0), Point3::new(2.8, 0.0, 0.0)],
//!     Vector3::new(10.0, 10.0, 10.0),
//! )?;
//! let shifted = config.with_positions(vec![Point3::origin(), Point3::new(2.9, 0.0, 0.0)])?;
//! ```

pub mod configuration;
pub mod outcome;
pub mod velocity;
