use crate::constants;
use crate::errors::TshError;
use ndarray::prelude::*;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Struct that holds a Boltzmann distribution
pub struct BoltzmannMomenta {
    dist: Normal<f64>,
}

impl BoltzmannMomenta {
    /// Initialize the distribution from a given temperature
    pub fn new(temperature: f64) -> Result<BoltzmannMomenta, TshError> {
        let dist = Normal::new(0.0, f64::sqrt(constants::K_BOLTZMANN * temperature)).map_err(
            |_| {
                TshError::InvalidConfiguration(format!(
                    "no Boltzmann distribution for a temperature of {} K",
                    temperature
                ))
            },
        )?;
        Ok(BoltzmannMomenta { dist })
    }

    /// Sample the momenta (ndof x ntraj). DOFs with a vanishing inverse mass stay at rest.
    pub fn sample<R: Rng>(&self, inv_mass: ArrayView1<f64>, ntraj: usize, rng: &mut R) -> Array2<f64> {
        let mut momenta: Array2<f64> = Array2::zeros((inv_mass.len(), ntraj));
        for traj in 0..ntraj {
            for (dof, inv_m) in inv_mass.iter().enumerate() {
                if *inv_m > 0.0 {
                    momenta[[dof, traj]] = self.dist.sample(rng) / inv_m.sqrt();
                }
            }
        }
        momenta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn equipartition() {
        let temperature: f64 = 300.0;
        let mut rng = StdRng::seed_from_u64(3);
        let boltzmann = BoltzmannMomenta::new(temperature).unwrap();
        let inv_mass: Array1<f64> = array![1.0 / 2000.0, 0.0];
        let p: Array2<f64> = boltzmann.sample(inv_mass.view(), 20000, &mut rng);
        let ekin: f64 = p.row(0).mapv(|val| 0.5 * val * val * inv_mass[0]).mean().unwrap();
        assert_relative_eq!(
            ekin,
            0.5 * constants::K_BOLTZMANN * temperature,
            max_relative = 0.05
        );
        assert!(p.row(1).iter().all(|val| *val == 0.0));
        assert!(BoltzmannMomenta::new(-1.0).is_err());
    }
}
