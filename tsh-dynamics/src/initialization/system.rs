use crate::c64;
use crate::errors::TshError;
use crate::initialization::velocities::BoltzmannMomenta;
use ndarray::prelude::*;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::Rng;

/// Initial conditions of the ensemble: nuclear coordinates and momenta (ndof x ntraj),
/// inverse masses (ndof), adiabatic amplitudes (nstates x ntraj) and the
/// initially occupied states
#[derive(Clone, Debug)]
pub struct SystemData {
    pub q: Array2<f64>,
    pub p: Array2<f64>,
    pub inv_mass: Array1<f64>,
    pub amplitudes: Array2<c64>,
    pub act_states: Vec<usize>,
}

impl SystemData {
    /// Every trajectory starts with all of its population in `initial_state`
    pub fn new(
        q: Array2<f64>,
        p: Array2<f64>,
        inv_mass: Array1<f64>,
        nstates: usize,
        initial_state: usize,
    ) -> Result<Self, TshError> {
        let ntraj: usize = q.ncols();
        if initial_state >= nstates {
            return Err(TshError::InvalidConfiguration(format!(
                "initial state {} does not exist, there are {} states",
                initial_state, nstates
            )));
        }
        let mut amplitudes: Array2<c64> = Array2::zeros((nstates, ntraj));
        amplitudes
            .row_mut(initial_state)
            .fill(c64::new(1.0, 0.0));
        let system = SystemData {
            q,
            p,
            inv_mass,
            amplitudes,
            act_states: vec![initial_state; ntraj],
        };
        system.check()?;
        Ok(system)
    }

    /// Sample coordinates and momenta of `ntraj` trajectories from independent
    /// Gaussians with the given means and widths per DOF
    pub fn sample_gaussian<R: Rng>(
        q_mean: ArrayView1<f64>,
        q_width: ArrayView1<f64>,
        p_mean: ArrayView1<f64>,
        p_width: ArrayView1<f64>,
        inv_mass: Array1<f64>,
        ntraj: usize,
        nstates: usize,
        initial_state: usize,
        rng: &mut R,
    ) -> Result<Self, TshError> {
        let ndof: usize = inv_mass.len();
        for (what, found) in [
            ("q_mean", q_mean.len()),
            ("q_width", q_width.len()),
            ("p_mean", p_mean.len()),
            ("p_width", p_width.len()),
        ] {
            if found != ndof {
                return Err(TshError::DimensionMismatch {
                    what,
                    expected: ndof,
                    found,
                });
            }
        }
        let xi_q: Array2<f64> = Array2::random_using((ndof, ntraj), StandardNormal, rng);
        let xi_p: Array2<f64> = Array2::random_using((ndof, ntraj), StandardNormal, rng);
        let q: Array2<f64> = &xi_q * &q_width.insert_axis(Axis(1)) + &q_mean.insert_axis(Axis(1));
        let p: Array2<f64> = &xi_p * &p_width.insert_axis(Axis(1)) + &p_mean.insert_axis(Axis(1));
        Self::new(q, p, inv_mass, nstates, initial_state)
    }

    /// Replace the momenta by a sample of the Maxwell-Boltzmann distribution
    pub fn with_boltzmann_momenta<R: Rng>(
        mut self,
        temperature: f64,
        rng: &mut R,
    ) -> Result<Self, TshError> {
        let boltzmann: BoltzmannMomenta = BoltzmannMomenta::new(temperature)?;
        self.p = boltzmann.sample(self.inv_mass.view(), self.q.ncols(), rng);
        Ok(self)
    }

    pub fn ndof(&self) -> usize {
        self.inv_mass.len()
    }

    pub fn ntraj(&self) -> usize {
        self.q.ncols()
    }

    pub fn nstates(&self) -> usize {
        self.amplitudes.nrows()
    }

    fn check(&self) -> Result<(), TshError> {
        let ndof: usize = self.ndof();
        let ntraj: usize = self.ntraj();
        if self.q.nrows() != ndof || self.p.nrows() != ndof {
            return Err(TshError::DimensionMismatch {
                what: "DOFs of the coordinates or momenta",
                expected: ndof,
                found: if self.q.nrows() != ndof {
                    self.q.nrows()
                } else {
                    self.p.nrows()
                },
            });
        }
        if self.p.ncols() != ntraj || self.amplitudes.ncols() != ntraj {
            return Err(TshError::DimensionMismatch {
                what: "number of trajectories",
                expected: ntraj,
                found: if self.p.ncols() != ntraj {
                    self.p.ncols()
                } else {
                    self.amplitudes.ncols()
                },
            });
        }
        if ntraj == 0 {
            return Err(TshError::InvalidConfiguration(String::from(
                "the ensemble needs at least one trajectory",
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn explicit_initial_conditions() {
        let system = SystemData::new(
            Array2::zeros((2, 3)),
            Array2::zeros((2, 3)),
            array![1.0, 0.5],
            2,
            1,
        )
        .unwrap();
        assert_eq!(system.act_states, vec![1, 1, 1]);
        assert_eq!(system.amplitudes[[1, 2]], c64::new(1.0, 0.0));
        assert_eq!(system.amplitudes[[0, 2]], c64::new(0.0, 0.0));
        assert!(SystemData::new(
            Array2::zeros((2, 3)),
            Array2::zeros((1, 3)),
            array![1.0, 0.5],
            2,
            0
        )
        .is_err());
        assert!(SystemData::new(Array2::zeros((1, 1)), Array2::zeros((1, 1)), array![1.0], 2, 2).is_err());
    }

    #[test]
    fn gaussian_sampling_statistics() {
        let mut rng = StdRng::seed_from_u64(7);
        let ntraj: usize = 4000;
        let system = SystemData::sample_gaussian(
            array![-4.0].view(),
            array![0.5].view(),
            array![10.0].view(),
            array![1.0].view(),
            array![0.01],
            ntraj,
            2,
            0,
            &mut rng,
        )
        .unwrap();
        assert_eq!(system.q.dim(), (1, ntraj));
        let q_mean: f64 = system.q.mean().unwrap();
        let p_mean: f64 = system.p.mean().unwrap();
        let p_var: f64 = system.p.mapv(|val| (val - p_mean).powi(2)).mean().unwrap();
        assert_abs_diff_eq!(q_mean, -4.0, epsilon = 0.05);
        assert_abs_diff_eq!(p_mean, 10.0, epsilon = 0.1);
        assert_abs_diff_eq!(p_var, 1.0, epsilon = 0.1);
    }

    #[test]
    fn gaussian_sampling_checks_dimensions() {
        let mut rng = StdRng::seed_from_u64(3);
        let q_mean: Array1<f64> = array![0.0, 1.0];
        let widths: Array1<f64> = array![0.5, 0.5];
        let result = {
            // views of arrays with different lifetimes
            let p_mean: Array1<f64> = array![10.0];
            SystemData::sample_gaussian(
                q_mean.view(),
                widths.view(),
                p_mean.view(),
                widths.view(),
                array![0.01, 0.01],
                5,
                2,
                0,
                &mut rng,
            )
        };
        assert!(matches!(
            result,
            Err(TshError::DimensionMismatch {
                what: "p_mean",
                expected: 2,
                found: 1
            })
        ));
    }
}
