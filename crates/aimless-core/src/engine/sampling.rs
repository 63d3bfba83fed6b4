use crate::core::elements::{AMU_TO_KG, atomic_mass};
use crate::core::models::velocity::Velocities;
use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use thiserror::Error;
use tracing::instrument;

/// Boltzmann constant in J/K.
pub const BOLTZMANN_J_PER_K: f64 = 1.380_649e-23;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SamplingError {
    #[error("No atomic mass is known for element '{0}'")]
    UnknownElement(String),
    #[error("Invalid temperature: {0} K. Temperature must be positive and finite")]
    InvalidTemperature(f64),
}

/// Draws Maxwell–Boltzmann velocities for a fixed list of atoms at a fixed temperature.
///
/// The per-atom standard deviation `sqrt(k_B T / m)` is computed once at
/// construction, so an unknown element is reported before any simulation runs.
#[derive(Debug, Clone)]
pub struct VelocitySampler {
    temperature: f64,
    sigmas: Vec<f64>,
}

impl VelocitySampler {
    pub fn new(atoms: &[String], temperature: f64) -> Result<Self, SamplingError> {
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(SamplingError::InvalidTemperature(temperature));
        }
        let sigmas = atoms
            .iter()
            .map(|symbol| {
                let mass_kg = atomic_mass(symbol)
                    .ok_or_else(|| SamplingError::UnknownElement(symbol.clone()))?
                    * AMU_TO_KG;
                Ok((BOLTZMANN_J_PER_K * temperature / mass_kg).sqrt())
            })
            .collect::<Result<_, SamplingError>>()?;
        Ok(Self {
            temperature,
            sigmas,
        })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn n_atoms(&self) -> usize {
        self.sigmas.len()
    }

    /// Samples one velocity set, in m/s.
    #[instrument(level = "trace", skip_all, fields(n_atoms = self.sigmas.len()))]
    pub fn sample(&self, rng: &mut impl Rng) -> Velocities {
        let mut vectors = Vec::with_capacity(self.sigmas.len());
        for &sigma in &self.sigmas {
            let x: f64 = StandardNormal.sample(rng);
            let y: f64 = StandardNormal.sample(rng);
            let z: f64 = StandardNormal.sample(rng);
            vectors.push(Vector3::new(x, y, z) * sigma);
        }
        Velocities::new(vectors)
    }
}

/// Offset of a perturbed shooting point along an accepted attempt's trajectories.
///
/// Negative offsets walk back along the reverse trajectory, positive offsets
/// forward along the forward trajectory. `Zero` is the accepted point itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameOffset {
    MinusTwo,
    MinusOne,
    Zero,
    PlusOne,
    PlusTwo,
}

impl FrameOffset {
    pub const ALL: [FrameOffset; 5] = [
        FrameOffset::MinusTwo,
        FrameOffset::MinusOne,
        FrameOffset::Zero,
        FrameOffset::PlusOne,
        FrameOffset::PlusTwo,
    ];

    /// Picks one of the five offsets uniformly.
    pub fn choose(rng: &mut impl Rng) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// The offset in multiples of Δt.
    pub fn steps(&self) -> i8 {
        match self {
            FrameOffset::MinusTwo => -2,
            FrameOffset::MinusOne => -1,
            FrameOffset::Zero => 0,
            FrameOffset::PlusOne => 1,
            FrameOffset::PlusTwo => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn argon(n: usize) -> Vec<String> {
        vec!["Ar".to_string(); n]
    }

    fn mean_square_component(v: &Velocities) -> f64 {
        v.vectors().iter().map(|v| v.norm_squared()).sum::<f64>() / (3.0 * v.len() as f64)
    }

    #[test]
    fn sampled_variance_matches_equipartition() {
        let sampler = VelocitySampler::new(&argon(4000), 300.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let v = sampler.sample(&mut rng);
        assert_eq!(v.len(), 4000);

        let expected = BOLTZMANN_J_PER_K * 300.0 / (39.948 * AMU_TO_KG);
        let measured = mean_square_component(&v);
        assert!((measured / expected - 1.0).abs() < 0.05, "ratio {}", measured / expected);
    }

    #[test]
    fn hotter_systems_sample_faster_velocities() {
        let mut rng = StdRng::seed_from_u64(1);
        let cold = VelocitySampler::new(&argon(2000), 300.0).unwrap().sample(&mut rng);
        let hot = VelocitySampler::new(&argon(2000), 1000.0).unwrap().sample(&mut rng);
        assert!(mean_square_component(&hot) > mean_square_component(&cold));
    }

    #[test]
    fn same_seed_reproduces_same_velocities() {
        let sampler = VelocitySampler::new(&["Na".to_string(), "Cl".to_string()], 300.0).unwrap();
        let a = sampler.sample(&mut StdRng::seed_from_u64(42));
        let b = sampler.sample(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn construction_rejects_unknown_elements_and_bad_temperatures() {
        assert_eq!(
            VelocitySampler::new(&["Qq".to_string()], 300.0).unwrap_err(),
            SamplingError::UnknownElement("Qq".into())
        );
        assert_eq!(
            VelocitySampler::new(&argon(1), 0.0).unwrap_err(),
            SamplingError::InvalidTemperature(0.0)
        );
        assert!(VelocitySampler::new(&argon(1), f64::NAN).is_err());
    }

    #[test]
    fn offsets_are_all_reachable() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(FrameOffset::choose(&mut rng));
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(
            FrameOffset::ALL.map(|o| o.steps()),
            [-2, -1, 0, 1, 2]
        );
    }
}
