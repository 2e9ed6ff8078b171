use crate::c64;
use crate::errors::TshError;
use crate::initialization::methods::Representation;
use crate::initialization::{DynamicConfiguration, Ensemble};
use crate::interface::HamiltonianProvider;
use crate::utils::*;
use ndarray::prelude::*;
use rayon::prelude::*;

/// Vibronic Hamiltonian H - i sum_dof d[dof] p_dof invM_dof of one child in the
/// representation `rep`. Without diabatic derivative couplings the diabatic
/// vibronic Hamiltonian is the diabatic Hamiltonian itself.
pub fn vibronic_hamiltonian(
    rep: Representation,
    ham: &dyn HamiltonianProvider,
    child: usize,
    p: ArrayView1<f64>,
    inv_mass: ArrayView1<f64>,
) -> Array2<c64> {
    let ndof: usize = inv_mass.len();
    let mut hvib: Array2<c64> = match rep {
        Representation::Adiabatic => ham.ham_adi(child).to_owned(),
        Representation::Diabatic => ham.ham_dia(child).to_owned(),
    };
    let minus_i: c64 = c64::new(0.0, -1.0);
    for dof in 0..ndof {
        let velocity: f64 = p[dof] * inv_mass[dof];
        if velocity == 0.0 {
            continue;
        }
        let coupling: Option<ArrayView2<c64>> = match rep {
            Representation::Adiabatic => Some(ham.dc1_adi(child, dof)),
            Representation::Diabatic => ham.dc1_dia(child, dof),
        };
        if let Some(coupling) = coupling {
            hvib.scaled_add(minus_i * velocity, &coupling);
        }
    }
    hvib
}

impl Ensemble {
    /// Vibronic Hamiltonians of all children. Each child sees the momenta of the
    /// trajectory with the same index, i.e. of the reference trajectory under the NBRA.
    pub fn vibronic_hamiltonians(
        &self,
        config: &DynamicConfiguration,
        rep: Representation,
        ham: &dyn HamiltonianProvider,
    ) -> Vec<Array2<c64>> {
        let p: &Array2<f64> = &self.p;
        let inv_mass: ArrayView1<f64> = self.inv_mass.view();
        (0..config.n_children(self.ntraj))
            .into_par_iter()
            .map(|child| vibronic_hamiltonian(rep, ham, child, p.column(child), inv_mass))
            .collect()
    }

    /// Propagate the amplitudes of the active representation over half of the
    /// nuclear time step: `num_electronic_substeps` applications of exp(-i Hvib dt_el / 2)
    pub fn propagate_electronic(
        &mut self,
        config: &DynamicConfiguration,
        ham: &dyn HamiltonianProvider,
    ) -> Result<(), TshError> {
        let rep: Representation = config.rep_tdse;
        let tau: f64 = 0.5 * config.dt_el();
        let propagators: Vec<Array2<c64>> = self
            .vibronic_hamiltonians(config, rep, ham)
            .par_iter()
            .map(|hvib| unitary_propagator(hvib.view(), tau))
            .collect();
        let num_el: usize = config.num_electronic_substeps;

        self.amplitudes_mut(rep)
            .axis_iter_mut(Axis(1))
            .into_par_iter()
            .enumerate()
            .for_each(|(traj, mut c)| {
                let propagator: &Array2<c64> = &propagators[config.child(traj)];
                for _ in 0..num_el {
                    let c_new: Array1<c64> = propagator.dot(&c);
                    c.assign(&c_new);
                }
            });
        self.check_amplitudes_finite("electronic propagation")?;
        self.update_amplitudes(rep, config, ham);
        Ok(())
    }

    /// Make the diabatic amplitudes follow the adiabatic ones after a correction
    /// that acted on the adiabatic amplitudes
    pub fn sync_from_adiabatic(&mut self, config: &DynamicConfiguration, ham: &dyn HamiltonianProvider) {
        self.update_amplitudes(Representation::Adiabatic, config, ham);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initialization::SystemData;
    use crate::models::{ConstantCoupling, CrossingParabolas, ModelHamiltonian};
    use approx::assert_abs_diff_eq;

    #[test]
    fn adiabatic_vibronic_hamiltonian_is_hermitian() {
        let mut ham = ModelHamiltonian::new(CrossingParabolas::default(), 1);
        ham.compute(0, array![0.4].view()).unwrap();
        let hvib: Array2<c64> = vibronic_hamiltonian(
            Representation::Adiabatic,
            &ham,
            0,
            array![5.0].view(),
            array![0.01].view(),
        );
        assert_abs_diff_eq!((hvib[[0, 1]] - hvib[[1, 0]].conj()).norm(), 0.0, epsilon = 1e-14);
        assert!(hvib[[0, 1]].norm() > 0.0);
        assert_abs_diff_eq!(hvib[[0, 0]].im, 0.0, epsilon = 1e-14);
    }

    #[test]
    fn rabi_oscillation_in_diabatic_representation() {
        // degenerate diabatic states coupled by V: |c_1|^2 = sin^2(V t)
        let coupling: f64 = 0.01;
        let model = ConstantCoupling {
            energies: vec![0.0, 0.0],
            coupling,
            ndof: 1,
        };
        let mut config = DynamicConfiguration::default();
        config.rep_tdse = Representation::Diabatic;
        config.num_electronic_substeps = 3;
        let mut ham = ModelHamiltonian::new(model, 1);
        let system = SystemData::new(array![[0.0]], array![[0.0]], array![1.0], 2, 0).unwrap();
        let mut ensemble = Ensemble::new(system, &config, &mut ham).unwrap();
        ensemble.ampl_dia = array![[c64::new(1.0, 0.0)], [c64::new(0.0, 0.0)]];
        ensemble.update_amplitudes(Representation::Diabatic, &config, &ham);
        for _ in 0..10 {
            ensemble.propagate_electronic(&config, &ham).unwrap();
        }
        let time: f64 = 10.0 * 0.5 * config.dt;
        assert_abs_diff_eq!(
            ensemble.ampl_dia[[1, 0]].norm_sqr(),
            (coupling * time).sin().powi(2),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(ensemble.norms(Representation::Adiabatic)[0], 1.0, epsilon = 1e-12);
    }
}
