use crate::c64;
use crate::initialization::methods::{CollapseOption, Representation};
use crate::initialization::{DynamicConfiguration, Ensemble};
use crate::interface::{HamiltonianProvider, UniformSource};
use crate::dynamics::decoherence::collapse;
use crate::dynamics::schroedinger_integration::vibronic_hamiltonian;
use crate::utils::*;
use log::trace;
use ndarray::prelude::*;

/// Reset and collapse probabilities of the augmented surface hopping scheme
#[derive(Debug, Clone)]
pub struct AfsshProbabilities {
    /// probability to reset the moments of a state (nadi)
    pub reset: Array1<f64>,
    /// probability to collapse onto the active state (nadi)
    pub collapse: Array1<f64>,
}

/// Adiabatic forces -Re dH_ii/dq_dof of all states
fn state_forces(ham: &dyn HamiltonianProvider, child: usize, dof: usize) -> Array1<f64> {
    ham.d1ham_adi(child, dof).diag().mapv(|val| -val.re)
}

impl Ensemble {
    /// Zero the moments of one trajectory
    pub fn reset_afssh_moments(&mut self, traj: usize) {
        for dof in 0..self.ndof {
            let idx: usize = self.moment_index(traj, dof);
            if idx < self.afssh_dr.len() {
                self.afssh_dr[idx].fill(c64::new(0.0, 0.0));
                self.afssh_dp[idx].fill(c64::new(0.0, 0.0));
            }
        }
    }

    /// Integrate the position and momentum moments over one nuclear step:
    ///   dR <- U dR U^H + dt_el invM dP
    ///   dP <- U dP U^H + dt_el (dF sigma + sigma dF) / 2
    /// with U = exp(-i Hvib dt_el), dF = diag(F_i - F_a) and the adiabatic density matrix sigma
    pub fn propagate_afssh_moments(&mut self, config: &DynamicConfiguration, ham: &dyn HamiltonianProvider) {
        self.allocate_afssh();
        let dt_el: f64 = config.dt_el();
        for traj in 0..self.ntraj {
            let child: usize = config.child(traj);
            let active: usize = self.act_states[traj];
            let hvib: Array2<c64> = vibronic_hamiltonian(
                Representation::Adiabatic,
                ham,
                child,
                self.p.column(child),
                self.inv_mass.view(),
            );
            let propagator: Array2<c64> = unitary_propagator(hvib.view(), dt_el);
            let propagator_h: Array2<c64> = adjoint(propagator.view());
            let sigma: Array2<c64> = self.density_matrix(traj, Representation::Adiabatic);

            for dof in 0..self.ndof {
                let idx: usize = self.moment_index(traj, dof);
                let forces: Array1<f64> = state_forces(ham, child, dof);
                let force_difference: Array1<c64> =
                    forces.mapv(|force| c64::new(force - forces[active], 0.0));
                let d_f: Array2<c64> = Array2::from_diag(&force_difference);
                let source: Array2<c64> = (d_f.dot(&sigma) + sigma.dot(&d_f)) * c64::new(0.5, 0.0);
                let inv_mass: f64 = self.inv_mass[dof];

                for _ in 0..config.num_electronic_substeps {
                    let dr: Array2<c64> = propagator.dot(&self.afssh_dr[idx]).dot(&propagator_h)
                        + &self.afssh_dp[idx] * c64::new(dt_el * inv_mass, 0.0);
                    let dp: Array2<c64> = propagator.dot(&self.afssh_dp[idx]).dot(&propagator_h)
                        + &source * c64::new(dt_el, 0.0);
                    self.afssh_dr[idx] = dr;
                    self.afssh_dp[idx] = dp;
                }
            }
        }
    }

    /// Reset and collapse probabilities of one trajectory
    pub fn afssh_probabilities(
        &self,
        traj: usize,
        config: &DynamicConfiguration,
        ham: &dyn HamiltonianProvider,
    ) -> AfsshProbabilities {
        let child: usize = config.child(traj);
        let active: usize = self.act_states[traj];
        let mut gamma_reset: Array1<f64> = Array1::zeros(self.nadi);
        let mut coupling_term: Array1<f64> = Array1::zeros(self.nadi);
        for dof in 0..self.ndof {
            let idx: usize = self.moment_index(traj, dof);
            let dr: &Array2<c64> = &self.afssh_dr[idx];
            let d1ham: ArrayView2<c64> = ham.d1ham_adi(child, dof);
            let forces: Array1<f64> = state_forces(ham, child, dof);
            for state in 0..self.nadi {
                let displacement: f64 = dr[[state, state]].re - dr[[active, active]].re;
                gamma_reset[state] -= 0.5 * (forces[state] - forces[active]) * displacement;
                coupling_term[state] += -d1ham[[active, state]].re * displacement;
            }
        }
        let reset: Array1<f64> = gamma_reset.mapv(|val| val * config.dt);
        let collapse: Array1<f64> = (&gamma_reset - &(coupling_term.mapv(f64::abs) * 2.0)) * config.dt;
        AfsshProbabilities { reset, collapse }
    }

    /// One AFSSH correction after the hopping step. `old_states` are the active states
    /// before the hop: an accepted hop resets the moments of its trajectory. Returns
    /// the number of collapses.
    pub fn apply_afssh(
        &mut self,
        config: &DynamicConfiguration,
        ham: &dyn HamiltonianProvider,
        old_states: &[usize],
        rnd: &mut dyn UniformSource,
    ) -> usize {
        self.allocate_afssh();
        for traj in 0..self.ntraj {
            if self.act_states[traj] != old_states[traj] {
                self.reset_afssh_moments(traj);
            }
        }
        self.propagate_afssh_moments(config, ham);

        let mut collapses: usize = 0;
        for traj in 0..self.ntraj {
            let active: usize = self.act_states[traj];
            let probabilities: AfsshProbabilities = self.afssh_probabilities(traj, config, ham);
            for state in (0..self.nadi).filter(|state| *state != active) {
                if rnd.uniform(0.0, 1.0) < probabilities.reset[state] {
                    for dof in 0..self.ndof {
                        let idx: usize = self.moment_index(traj, dof);
                        for moments in [&mut self.afssh_dr[idx], &mut self.afssh_dp[idx]] {
                            moments.row_mut(state).fill(c64::new(0.0, 0.0));
                            moments.column_mut(state).fill(c64::new(0.0, 0.0));
                        }
                    }
                }
                if rnd.uniform(0.0, 1.0) < probabilities.collapse[state] {
                    collapse(self.ampl_adi.column_mut(traj), active, CollapseOption::KeepPhase);
                    self.reset_afssh_moments(traj);
                    trace!("trajectory {}: AFSSH collapse onto state {}", traj, active);
                    collapses += 1;
                    break;
                }
            }
        }
        collapses
    }
}
