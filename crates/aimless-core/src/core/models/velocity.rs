use super::configuration::ModelError;
use nalgebra::Vector3;

/// Per-atom velocities in meters per second.
///
/// Velocities are ordered exactly like the atoms of the configuration they were
/// drawn for. They are either sampled from a Maxwell–Boltzmann distribution or
/// obtained by reversing an existing set.
#[derive(Debug, Clone, PartialEq)]
pub struct Velocities {
    vectors: Vec<Vector3<f64>>,
}

impl Velocities {
    pub fn new(vectors: Vec<Vector3<f64>>) -> Self {
        Self { vectors }
    }

    /// Returns the velocity set with every component negated.
    ///
    /// This is the launch velocity of the reverse trajectory of a shooting point.
    pub fn reversed(&self) -> Self {
        Self {
            vectors: self.vectors.iter().map(|v| -v).collect(),
        }
    }

    pub fn vectors(&self) -> &[Vector3<f64>] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Checks that there is exactly one vector per atom.
    pub fn check_len(&self, n_atoms: usize) -> Result<(), ModelError> {
        if self.vectors.len() != n_atoms {
            return Err(ModelError::AtomCountMismatch {
                expected: n_atoms,
                found: self.vectors.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversed_negates_every_component() {
        let v = Velocities::new(vec![Vector3::new(1.0, -2.0, 3.0), Vector3::new(0.0, 4.5, -6.0)]);
        let r = v.reversed();
        assert_eq!(r.vectors()[0], Vector3::new(-1.0, 2.0, -3.0));
        assert_eq!(r.vectors()[1], Vector3::new(0.0, -4.5, 6.0));
        assert_eq!(r.reversed(), v);
    }

    #[test]
    fn check_len_detects_wrong_atom_count() {
        let v = Velocities::new(vec![Vector3::zeros(); 3]);
        assert!(v.check_len(3).is_ok());
        assert_eq!(
            v.check_len(2),
            Err(ModelError::AtomCountMismatch {
                expected: 2,
                found: 3
            })
        );
    }
}
