use nalgebra::{Point3, Vector3};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when a configuration or velocity set has an inconsistent shape.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// A configuration must contain at least one atom.
    #[error("Configuration contains no atoms")]
    Empty,
    /// The number of per-atom entries does not match the atom symbol list.
    #[error("Expected {expected} per-atom entries, found {found}")]
    AtomCountMismatch { expected: usize, found: usize },
    /// Two configurations used in the same run disagree on their atom symbols.
    #[error("Atom symbols differ from the reference configuration at atom {index}: expected '{expected}', found '{found}'")]
    SymbolMismatch {
        index: usize,
        expected: String,
        found: String,
    },
    /// Box dimensions must be finite and non-negative.
    #[error("Invalid box dimensions: {0:?}")]
    InvalidBox([f64; 3]),
}

/// An immutable snapshot of atomic positions inside a periodic box.
///
/// The atom symbol list is reference-counted: every frame derived from a
/// configuration (the Δt and 2Δt frames of a trajectory, perturbed shooting points)
/// shares the same list, which keeps the symbols identical across a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    /// Ordered atom symbols in periodic table format (e.g. "Ar", "Cl").
    atoms: Arc<[String]>,
    /// Cartesian positions in Angstroms, one per atom.
    positions: Vec<Point3<f64>>,
    /// Orthorhombic box lengths in Angstroms.
    box_dims: Vector3<f64>,
}

impl Configuration {
    /// Creates a new configuration, validating its shape.
    ///
    /// # Arguments
    ///
    /// * `atoms` - The ordered atom symbols.
    /// * `positions` - One position per atom, in Angstroms.
    /// * `box_dims` - The box lengths along x, y and z, in Angstroms.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if there are no atoms, if the position count differs
    /// from the atom count, or if the box is not finite and non-negative.
    pub fn new(
        atoms: Arc<[String]>,
        positions: Vec<Point3<f64>>,
        box_dims: Vector3<f64>,
    ) -> Result<Self, ModelError> {
        if atoms.is_empty() {
            return Err(ModelError::Empty);
        }
        if positions.len() != atoms.len() {
            return Err(ModelError::AtomCountMismatch {
                expected: atoms.len(),
                found: positions.len(),
            });
        }
        if box_dims.iter().any(|d| !d.is_finite() || *d < 0.0) {
            return Err(ModelError::InvalidBox([box_dims.x, box_dims.y, box_dims.z]));
        }
        Ok(Self {
            atoms,
            positions,
            box_dims,
        })
    }

    /// Creates a configuration with the same atoms and box but new positions.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::AtomCountMismatch`] if `positions` has the wrong length.
    pub fn with_positions(&self, positions: Vec<Point3<f64>>) -> Result<Self, ModelError> {
        if positions.len() != self.atoms.len() {
            return Err(ModelError::AtomCountMismatch {
                expected: self.atoms.len(),
                found: positions.len(),
            });
        }
        Ok(Self {
            atoms: Arc::clone(&self.atoms),
            positions,
            box_dims: self.box_dims,
        })
    }

    pub fn atoms(&self) -> &[String] {
        &self.atoms
    }

    pub fn shared_atoms(&self) -> Arc<[String]> {
        Arc::clone(&self.atoms)
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn box_dims(&self) -> Vector3<f64> {
        self.box_dims
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Checks that `other` uses exactly the same ordered atom symbols.
    ///
    /// # Errors
    ///
    /// Returns the first count or symbol mismatch found.
    pub fn check_same_atoms(&self, other: &Configuration) -> Result<(), ModelError> {
        if Arc::ptr_eq(&self.atoms, &other.atoms) {
            return Ok(());
        }
        if self.atoms.len() != other.atoms.len() {
            return Err(ModelError::AtomCountMismatch {
                expected: self.atoms.len(),
                found: other.atoms.len(),
            });
        }
        match self
            .atoms
            .iter()
            .zip(other.atoms.iter())
            .position(|(a, b)| a != b)
        {
            Some(index) => Err(ModelError::SymbolMismatch {
                index,
                expected: self.atoms[index].clone(),
                found: other.atoms[index].clone(),
            }),
            None => Ok(()),
        }
    }
}
