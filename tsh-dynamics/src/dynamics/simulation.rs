use crate::dynamics::{compute_dynamics, StepReport};
use crate::errors::TshError;
use crate::initialization::Simulation;
use crate::interface::HamiltonianProvider;
use crate::output::*;
use std::time::Instant;

impl Simulation {
    /// Run `nstep` surface hopping steps and return the accumulated event counters
    pub fn run(&mut self, ham: &mut dyn HamiltonianProvider) -> Result<StepReport, TshError> {
        print_header_dynamics(self.ensemble.ntraj, self.config.nstep);
        let timer: Instant = Instant::now();
        let mut totals: StepReport = StepReport::default();

        for _step in 0..self.config.nstep {
            totals += self.step(ham)?;
        }

        print_footer_dynamics(timer.elapsed().as_secs_f64(), &totals);
        Ok(totals)
    }

    /// A single step of the ensemble, drawing all random numbers from the seeded
    /// generator of the simulation
    pub fn step(&mut self, ham: &mut dyn HamiltonianProvider) -> Result<StepReport, TshError> {
        if self.initial_energy.is_none() {
            self.initial_energy = Some(self.total_energy(ham));
        }
        let report: StepReport = compute_dynamics(&mut self.ensemble, &self.config, ham, &mut self.rng)?;
        self.step += 1;
        self.print_data(&report, ham);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::c64;
    use crate::initialization::methods::*;
    use crate::initialization::{DynamicConfiguration, Ensemble, SystemData};
    use crate::models::*;
    use crate::utils::tests::ScriptedSource;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn coupled_model() -> ConstantCoupling {
        ConstantCoupling {
            energies: vec![0.0, 0.01],
            coupling: 0.005,
            ndof: 1,
        }
    }

    #[test]
    fn norm_is_conserved_without_decoherence() {
        for method in [TshMethod::Fssh, TshMethod::Gfsh, TshMethod::Mssh] {
            let mut config = DynamicConfiguration::default();
            config.rep_tdse = Representation::Diabatic;
            config.tsh_method = method;
            config.nstep = 1000;
            let ntraj: usize = 4;
            let mut ham = ModelHamiltonian::new(coupled_model(), ntraj);
            let system = SystemData::new(
                Array2::zeros((1, ntraj)),
                Array2::ones((1, ntraj)),
                array![1.0],
                2,
                0,
            )
            .unwrap();
            let mut simulation = Simulation::new(config, system, &mut ham).unwrap();
            simulation.run(&mut ham).unwrap();
            for rep in [Representation::Diabatic, Representation::Adiabatic] {
                for norm in simulation.ensemble.norms(rep).iter() {
                    assert_abs_diff_eq!(*norm, 1.0, epsilon = 1e-10);
                }
            }
            assert_eq!(simulation.step, 1000);
            assert_relative_eq!(simulation.ensemble.time, 1000.0 * simulation.config.dt, max_relative = 1e-12);
        }
    }

    #[test]
    fn energy_is_conserved_on_a_single_surface() {
        let mut config = DynamicConfiguration::default();
        config.tsh_method = TshMethod::Adiabatic;
        config.dt = 0.01;
        config.nstep = 10000;
        let mut ham = ModelHamiltonian::new(
            Harmonic {
                force_constants: vec![0.01],
            },
            1,
        );
        let system = SystemData::new(array![[1.0]], array![[0.0]], array![1.0], 1, 0).unwrap();
        let mut simulation = Simulation::new(config, system, &mut ham).unwrap();
        let initial: f64 = simulation.total_energy(&ham);
        simulation.run(&mut ham).unwrap();
        assert_relative_eq!(simulation.total_energy(&ham), initial, max_relative = 1e-6);
        // the oscillator did move
        assert!((simulation.ensemble.q[[0, 0]] - 1.0).abs() > 1e-3);
    }

    #[test]
    fn forbidden_hop_is_frustrated() {
        let mut config = DynamicConfiguration::default();
        config.tsh_method = TshMethod::Mssh;
        let model = CrossingParabolas {
            d: 1.0,
            ..CrossingParabolas::default()
        };
        let mut ham = ModelHamiltonian::new(model, 1);
        let system = SystemData::new(array![[0.1]], array![[0.5]], array![0.0005], 2, 0).unwrap();
        let mut ensemble = Ensemble::new(system, &config, &mut ham).unwrap();
        let report: StepReport =
            compute_dynamics(&mut ensemble, &config, &mut ham, &mut ScriptedSource::constant(0.0)).unwrap();
        assert_eq!(report.accepted_hops, 0);
        assert_eq!(report.frustrated_hops, 1);
        assert_eq!(ensemble.act_states, vec![0]);
    }

    #[test]
    fn nbra_evaluates_one_hamiltonian() {
        let mut config = DynamicConfiguration::default();
        config.is_nbra = true;
        let ntraj: usize = 8;
        let mut ham = ModelHamiltonian::new(CrossingParabolas::default(), 1);
        let p: Array2<f64> = Array2::from_shape_fn((1, ntraj), |(_, traj)| 5.0 + traj as f64);
        let system = SystemData::new(Array2::zeros((1, ntraj)), p, array![0.0005], 2, 0).unwrap();
        let mut simulation = Simulation::new(config, system, &mut ham).unwrap();
        for _ in 0..5 {
            simulation.step(&mut ham).unwrap();
        }
        assert_eq!(ham.compute_calls(), 6);
        let q: &Array2<f64> = &simulation.ensemble.q;
        assert!(q[[0, 0]] != q[[0, ntraj - 1]]);
    }

    #[test]
    fn sdm_keeps_trajectories_normalised() {
        let mut config = DynamicConfiguration::default();
        config.decoherence_config.decoherence_algo = DecoherenceMethod::Sdm;
        config.decoherence_config.decoherence_times_type = DecoherenceTimes::Edc;
        config.nstep = 50;
        let ntraj: usize = 3;
        let mut ham = ModelHamiltonian::new(CrossingParabolas::default(), ntraj);
        let mut system = SystemData::new(
            array![[-0.5, 0.0, 0.5]],
            array![[10.0, 15.0, 20.0]],
            array![0.0005],
            2,
            1,
        )
        .unwrap();
        let c: Array1<c64> = array![c64::new(0.6, 0.0), c64::new(0.0, 0.8)];
        for mut column in system.amplitudes.axis_iter_mut(Axis(1)) {
            column.assign(&c);
        }
        let mut simulation = Simulation::new(config, system, &mut ham).unwrap();
        simulation.run(&mut ham).unwrap();
        for norm in simulation.ensemble.norms(Representation::Adiabatic).iter() {
            assert_abs_diff_eq!(*norm, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn gfsh_hops_see_populations_before_decoherence() {
        // at the crossing the coherence moves population out of the active state; the
        // strong SDM damping afterwards pushes it back into the active state
        let mut config = DynamicConfiguration::default();
        config.tsh_method = TshMethod::Gfsh;
        config.decoherence_config.decoherence_algo = DecoherenceMethod::Sdm;
        config.decoherence_config.decoherence_times_type = DecoherenceTimes::Fixed;
        config.decoherence_config.decoherence_rates = Some(vec![vec![0.0, 10.0], vec![10.0, 0.0]]);
        config.hopping_config.hop_acceptance_algo = HopAcceptance::Always;
        config.hopping_config.momenta_rescaling_algo = MomentumRescaling::None;
        let s: f64 = 0.5_f64.sqrt();
        let mut hops: usize = 0;
        // one of the two relative signs of the coherence drains the active state
        for sign in [1.0, -1.0] {
            let mut ham = ModelHamiltonian::new(CrossingParabolas::default(), 1);
            let mut system = SystemData::new(array![[0.0]], array![[20.0]], array![0.0005], 2, 0).unwrap();
            system.amplitudes = array![[c64::new(s, 0.0)], [c64::new(sign * s, 0.0)]];
            let mut ensemble = Ensemble::new(system, &config, &mut ham).unwrap();
            let report: StepReport =
                compute_dynamics(&mut ensemble, &config, &mut ham, &mut ScriptedSource::constant(0.0)).unwrap();
            hops += report.accepted_hops;
            assert_abs_diff_eq!(ensemble.norms(Representation::Adiabatic)[0], 1.0, epsilon = 1e-12);
        }
        assert_eq!(hops, 1);
    }

    #[test]
    fn runs_are_reproducible_for_a_seed() {
        let run = |seed: u64| -> (Vec<usize>, Array2<f64>) {
            let mut config = DynamicConfiguration::default();
            config.seed = seed;
            config.nstep = 200;
            config.hopping_config.hop_acceptance_algo = HopAcceptance::Always;
            let ntraj: usize = 6;
            let mut ham = ModelHamiltonian::new(CosineModel::default(), ntraj);
            let mut rng = StdRng::seed_from_u64(7);
            let system = SystemData::sample_gaussian(
                array![0.0].view(),
                array![0.5].view(),
                array![20.0].view(),
                array![2.0].view(),
                array![0.0005],
                ntraj,
                2,
                0,
                &mut rng,
            )
            .unwrap();
            let mut simulation = Simulation::new(config, system, &mut ham).unwrap();
            simulation.run(&mut ham).unwrap();
            (simulation.ensemble.act_states.clone(), simulation.ensemble.p.clone())
        };
        let (states_a, p_a) = run(11);
        let (states_b, p_b) = run(11);
        assert_eq!(states_a, states_b);
        assert_eq!(p_a, p_b);
    }

    #[test]
    fn missing_rate_model_is_fatal() {
        let mut config = DynamicConfiguration::default();
        config.decoherence_config.decoherence_algo = DecoherenceMethod::Sdm;
        config.decoherence_config.decoherence_times_type = DecoherenceTimes::Schwartz1;
        let mut ham = ModelHamiltonian::new(CrossingParabolas::default(), 1);
        let system = SystemData::new(array![[0.0]], array![[1.0]], array![0.0005], 2, 0).unwrap();
        let mut ensemble = Ensemble::new(system, &config, &mut ham).unwrap();
        let q_before: Array2<f64> = ensemble.q.clone();
        let result = compute_dynamics(&mut ensemble, &config, &mut ham, &mut ScriptedSource::constant(0.5));
        assert!(matches!(result, Err(TshError::InvalidConfiguration(_))));
        assert_eq!(ensemble.q, q_before);
        assert_eq!(ensemble.time, 0.0);
    }

    #[test]
    fn thermostat_mismatch_is_fatal() {
        let mut config = DynamicConfiguration::default();
        config.ensemble = EnsembleType::Nvt;
        config.thermostat_dofs = vec![0];
        let mut ham = ModelHamiltonian::new(CrossingParabolas::default(), 1);
        let system = SystemData::new(array![[0.0]], array![[1.0]], array![0.0005], 2, 0).unwrap();
        let mut simulation = Simulation::new(config, system, &mut ham).unwrap();
        assert!(simulation.step(&mut ham).is_ok());
        simulation.config.thermostat_dofs.clear();
        assert!(matches!(
            simulation.step(&mut ham),
            Err(TshError::ThermostatDofMismatch { .. })
        ));
    }
}
