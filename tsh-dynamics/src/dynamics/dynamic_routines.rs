use crate::c64;
use crate::errors::TshError;
use crate::initialization::methods::{EntanglementOption, ForceMethod, Representation};
use crate::initialization::{DynamicConfiguration, Ensemble};
use crate::interface::HamiltonianProvider;
use ndarray::prelude::*;
use rayon::prelude::*;

// variances below this value switch the ETHD3 terms off
const ETHD3_VARIANCE_THRESHOLD: f64 = 1.0e-12;

impl Ensemble {
    /// Effective nuclear forces (ndof x ntraj) at the current geometry
    pub fn get_forces(
        &self,
        config: &DynamicConfiguration,
        ham: &dyn HamiltonianProvider,
    ) -> Array2<f64> {
        let ndof: usize = self.ndof;
        let mut forces: Array2<f64> = Array2::zeros((ndof, self.ntraj));
        let act_states: &[usize] = &self.act_states;
        let rep: Representation = config.rep_tdse;
        let amplitudes: &Array2<c64> = self.amplitudes(rep);

        match config.force_method {
            ForceMethod::None => {}
            ForceMethod::ActiveState => {
                forces
                    .axis_iter_mut(Axis(1))
                    .into_par_iter()
                    .enumerate()
                    .for_each(|(traj, mut force)| {
                        let child: usize = config.child(traj);
                        let state: usize = act_states[traj];
                        for dof in 0..ndof {
                            force[dof] = -ham.d1ham_adi(child, dof)[[state, state]].re;
                        }
                    });
            }
            ForceMethod::Ehrenfest => {
                forces
                    .axis_iter_mut(Axis(1))
                    .into_par_iter()
                    .enumerate()
                    .for_each(|(traj, mut force)| {
                        let child: usize = config.child(traj);
                        let c: ArrayView1<c64> = amplitudes.column(traj);
                        for dof in 0..ndof {
                            let d1ham: ArrayView2<c64> = match rep {
                                Representation::Adiabatic => ham.d1ham_adi(child, dof),
                                Representation::Diabatic => ham.d1ham_dia(child, dof),
                            };
                            force[dof] = -expectation_value(c, d1ham);
                        }
                    });
            }
        }

        if config.entanglement_config.entanglement_opt == EntanglementOption::Ethd3 {
            forces += &ethd3_forces(self.q.view(), config.entanglement_config.ethd3_alpha);
        }
        forces
    }

    /// p += F * dt, followed by the kinetic constraints
    pub fn kick(&mut self, forces: ArrayView2<f64>, dt: f64, constrained_dofs: &[usize]) {
        self.p.scaled_add(dt, &forces);
        self.apply_constraints(constrained_dofs);
    }

    /// Remove all momentum from the constrained DOFs
    pub fn apply_constraints(&mut self, constrained_dofs: &[usize]) {
        for dof in constrained_dofs.iter() {
            self.p.row_mut(*dof).fill(0.0);
        }
    }

    /// q += invM * (p + friction) * dt
    pub fn drift(&mut self, dt: f64, friction: Option<ArrayView2<f64>>) {
        let inv_mass: ArrayView2<f64> = self.inv_mass.view().insert_axis(Axis(1));
        let mut velocity: Array2<f64> = &self.p * &inv_mass;
        if let Some(friction) = friction {
            velocity += &(&friction * &inv_mass);
        }
        self.q.scaled_add(dt, &velocity);
    }

    /// Scale the momenta of the thermostatted DOFs of every trajectory
    pub fn apply_thermostat_scaling(&mut self, thermostat_dofs: &[usize], dt: f64) {
        for (traj, thermostat) in self.thermostats.iter().enumerate() {
            let scale: f64 = thermostat.vel_scale(dt);
            for dof in thermostat_dofs.iter() {
                self.p[[*dof, traj]] *= scale;
            }
        }
    }

    /// Advance the internal state of all thermostats with the current kinetic energies
    pub fn propagate_thermostats(&mut self, thermostat_dofs: &[usize], dt: f64) {
        let ekin: Vec<f64> = (0..self.ntraj)
            .map(|traj| self.kinetic_energy_of(traj, thermostat_dofs))
            .collect();
        for (thermostat, ekin) in self.thermostats.iter_mut().zip(ekin.into_iter()) {
            thermostat.propagate_nhc(dt, ekin);
        }
    }

    /// Fatal error if the nuclear phase space point left the finite numbers
    pub fn check_nuclear_finite(&self, stage: &'static str) -> Result<(), TshError> {
        if self.q.iter().chain(self.p.iter()).all(|val| val.is_finite()) {
            Ok(())
        } else {
            Err(TshError::NonFinite { stage })
        }
    }

    /// Fatal error if any amplitude is not finite
    pub fn check_amplitudes_finite(&self, stage: &'static str) -> Result<(), TshError> {
        let finite = |c: &c64| c.re.is_finite() && c.im.is_finite();
        if self.ampl_adi.iter().all(finite) && self.ampl_dia.iter().all(finite) {
            Ok(())
        } else {
            Err(TshError::NonFinite { stage })
        }
    }
}

/// Re(c^H A c)
pub fn expectation_value(c: ArrayView1<c64>, operator: ArrayView2<c64>) -> f64 {
    let tmp: Array1<c64> = operator.dot(&c);
    c.iter().zip(tmp.iter()).map(|(a, b)| (a.conj() * b).re).sum()
}

fn mean_and_variance(row: ArrayView1<f64>) -> (f64, f64) {
    let n: f64 = row.len() as f64;
    let mean: f64 = row.sum() / n;
    let variance: f64 = row.iter().map(|val| (val - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

/// ETHD3 coupling of the trajectories through the coordinate distribution:
/// F = 2 alpha (q - <q>) / (N sigma_q^4) for every DOF
pub fn ethd3_forces(q: ArrayView2<f64>, alpha: f64) -> Array2<f64> {
    let ntraj: f64 = q.ncols() as f64;
    let mut forces: Array2<f64> = Array2::zeros(q.raw_dim());
    for (dof, row) in q.axis_iter(Axis(0)).enumerate() {
        let (mean, variance): (f64, f64) = mean_and_variance(row);
        if variance > ETHD3_VARIANCE_THRESHOLD {
            let factor: f64 = 2.0 * alpha / (ntraj * variance * variance);
            forces
                .row_mut(dof)
                .assign(&row.mapv(|val| factor * (val - mean)));
        }
    }
    forces
}

/// ETHD3 friction term that enters the coordinate update:
/// gamma = -2 beta (p - <p>) / (N invM sigma_p^4) for every DOF
pub fn ethd3_friction(p: ArrayView2<f64>, inv_mass: ArrayView1<f64>, beta: f64) -> Array2<f64> {
    let ntraj: f64 = p.ncols() as f64;
    let mut friction: Array2<f64> = Array2::zeros(p.raw_dim());
    for (dof, row) in p.axis_iter(Axis(0)).enumerate() {
        let (mean, variance): (f64, f64) = mean_and_variance(row);
        if variance > ETHD3_VARIANCE_THRESHOLD && inv_mass[dof] > 0.0 {
            let factor: f64 = -2.0 * beta / (ntraj * inv_mass[dof] * variance * variance);
            friction
                .row_mut(dof)
                .assign(&row.mapv(|val| factor * (val - mean)));
        }
    }
    friction
}
