use crate::dynamics::StepReport;
use crate::initialization::methods::Representation;
use crate::initialization::Simulation;
use crate::interface::HamiltonianProvider;
use crate::output::*;
use log::{debug, info};
use ndarray::prelude::*;

impl Simulation {
    /// Mean total energy (kinetic + active state) of the ensemble
    pub fn total_energy(&self, ham: &dyn HamiltonianProvider) -> f64 {
        let ekin: Array1<f64> = self.ensemble.kinetic_energies();
        let epot: Array1<f64> = self.ensemble.potential_energies(&self.config, ham);
        (ekin + epot).mean().unwrap_or(0.0)
    }

    /// Fraction of the trajectories in every adiabatic state
    pub fn state_occupations(&self) -> Array1<f64> {
        let mut occupations: Array1<f64> = Array1::zeros(self.ensemble.nadi);
        for state in self.ensemble.act_states.iter() {
            occupations[*state] += 1.0;
        }
        occupations / self.ensemble.ntraj as f64
    }

    pub fn print_data(&self, report: &StepReport, ham: &dyn HamiltonianProvider) {
        let total_energy: f64 = self.total_energy(ham);
        let energy_diff: f64 = match self.initial_energy {
            Some(initial) => total_energy - initial,
            None => 0.0,
        };
        let ekin: f64 = self.ensemble.kinetic_energies().mean().unwrap_or(0.0);
        let populations: Array1<f64> = self
            .ensemble
            .populations(Representation::Adiabatic)
            .mean_axis(Axis(1))
            .unwrap_or_else(|| Array1::zeros(self.ensemble.nadi));

        print_step_summary(
            self.step,
            self.ensemble.time,
            ekin,
            total_energy,
            energy_diff,
            report,
        );
        info!("{: <25} {:>12.6}", "Populations (amplitudes):", populations);
        info!(
            "{: <25} {:>12.6}",
            "Populations (states):",
            self.state_occupations()
        );
        debug!("active states: {:?}", self.ensemble.act_states);
    }
}
