use crate::c64;
use crate::dynamics::decoherence::DecoherenceRateModel;
use crate::dynamics::thermostat::{build_thermostat, NullThermostat, Thermostat};
use crate::errors::TshError;
use crate::initialization::methods::{EnsembleType, Representation};
use crate::initialization::system::SystemData;
use crate::initialization::DynamicConfiguration;
use crate::interface::HamiltonianProvider;
use crate::utils::*;
use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// State of all trajectories of the ensemble.
///
/// Per-trajectory matrices live in flat vectors that are indexed by the trajectory
/// (and DOF) index; the Hamiltonian itself is owned by the [HamiltonianProvider].
pub struct Ensemble {
    pub ndof: usize,
    pub ntraj: usize,
    pub nadi: usize,
    pub ndia: usize,
    /// nuclear coordinates (ndof x ntraj)
    pub q: Array2<f64>,
    /// nuclear momenta (ndof x ntraj)
    pub p: Array2<f64>,
    pub inv_mass: Array1<f64>,
    /// adiabatic amplitudes (nadi x ntraj)
    pub ampl_adi: Array2<c64>,
    /// diabatic amplitudes (ndia x ntraj)
    pub ampl_dia: Array2<c64>,
    pub act_states: Vec<usize>,
    /// state tracking correction of the last step, one per trajectory
    pub projectors: Vec<Array2<c64>>,
    /// AFSSH position moments, indexed by `traj * ndof + dof`
    pub afssh_dr: Vec<Array2<c64>>,
    /// AFSSH momentum moments, indexed by `traj * ndof + dof`
    pub afssh_dp: Vec<Array2<c64>>,
    /// BCSH momentum reversal flags (nadi x ntraj)
    pub reversal_events: Array2<bool>,
    /// DISH coherence clocks (nadi x ntraj)
    pub coherence_time: Array2<f64>,
    /// DISH decoherence intervals (nadi x ntraj), NaN until drawn
    pub coherence_interval: Array2<f64>,
    pub thermostats: Vec<Box<dyn Thermostat>>,
    pub rate_model: Option<Box<dyn DecoherenceRateModel>>,
    pub time: f64,
}

impl Ensemble {
    /// Build the ensemble from the initial conditions and evaluate the Hamiltonian at
    /// the starting geometry. The amplitudes of [SystemData] are adiabatic.
    pub fn new(
        system: SystemData,
        config: &DynamicConfiguration,
        ham: &mut dyn HamiltonianProvider,
    ) -> Result<Ensemble, TshError> {
        let ndof: usize = system.ndof();
        let ntraj: usize = system.ntraj();
        let nadi: usize = ham.nadi();
        let ndia: usize = ham.ndia();
        if ham.ndof() != ndof {
            return Err(TshError::DimensionMismatch {
                what: "nuclear DOFs of the Hamiltonian",
                expected: ndof,
                found: ham.ndof(),
            });
        }
        if system.nstates() != nadi {
            return Err(TshError::DimensionMismatch {
                what: "adiabatic states",
                expected: nadi,
                found: system.nstates(),
            });
        }
        if let Some(state) = system.act_states.iter().find(|state| **state >= nadi) {
            return Err(TshError::InvalidConfiguration(format!(
                "active state {} does not exist",
                state
            )));
        }
        if ham.nchildren() < config.n_children(ntraj) {
            return Err(TshError::DimensionMismatch {
                what: "Hamiltonian children",
                expected: config.n_children(ntraj),
                found: ham.nchildren(),
            });
        }

        for child in 0..config.n_children(ntraj) {
            ham.compute(child, system.q.column(child))?;
        }

        let thermostats: Vec<Box<dyn Thermostat>> = (0..ntraj)
            .map(|_| match config.ensemble {
                EnsembleType::Nvt => build_thermostat(&config.thermostat_config),
                EnsembleType::Nve => {
                    Box::new(NullThermostat::new(config.thermostat_dofs.len())) as Box<dyn Thermostat>
                }
            })
            .collect();

        let mut ensemble = Ensemble {
            ndof,
            ntraj,
            nadi,
            ndia,
            q: system.q,
            p: system.p,
            inv_mass: system.inv_mass,
            ampl_adi: system.amplitudes,
            ampl_dia: Array2::zeros((ndia, ntraj)),
            act_states: system.act_states,
            projectors: vec![Array2::eye(nadi); ntraj],
            afssh_dr: Vec::new(),
            afssh_dp: Vec::new(),
            reversal_events: Array2::from_elem((nadi, ntraj), false),
            coherence_time: Array2::zeros((nadi, ntraj)),
            coherence_interval: Array2::from_elem((nadi, ntraj), f64::NAN),
            thermostats,
            rate_model: None,
            time: 0.0,
        };
        ensemble.update_amplitudes(Representation::Adiabatic, config, ham);
        Ok(ensemble)
    }

    /// Install the rate model used by the Schwartz-type decoherence times
    pub fn set_rate_model(&mut self, model: Box<dyn DecoherenceRateModel>) {
        self.rate_model = Some(model);
    }

    pub fn amplitudes(&self, rep: Representation) -> &Array2<c64> {
        match rep {
            Representation::Diabatic => &self.ampl_dia,
            Representation::Adiabatic => &self.ampl_adi,
        }
    }

    pub fn amplitudes_mut(&mut self, rep: Representation) -> &mut Array2<c64> {
        match rep {
            Representation::Diabatic => &mut self.ampl_dia,
            Representation::Adiabatic => &mut self.ampl_adi,
        }
    }

    /// Recompute the amplitudes of the other representation from those in `from`
    pub fn update_amplitudes(
        &mut self,
        from: Representation,
        config: &DynamicConfiguration,
        ham: &dyn HamiltonianProvider,
    ) {
        for traj in 0..self.ntraj {
            let u: ArrayView2<c64> = ham.basis_transform(config.child(traj));
            match from {
                Representation::Adiabatic => {
                    let c_dia: Array1<c64> = u.dot(&self.ampl_adi.column(traj));
                    self.ampl_dia.column_mut(traj).assign(&c_dia);
                }
                Representation::Diabatic => {
                    let c_adi: Array1<c64> = adjoint(u).dot(&self.ampl_dia.column(traj));
                    self.ampl_adi.column_mut(traj).assign(&c_adi);
                }
            }
        }
    }

    /// Position of the AFSSH moments of (traj, dof) in the flat moment storage
    pub fn moment_index(&self, traj: usize, dof: usize) -> usize {
        traj * self.ndof + dof
    }

    /// Allocate zeroed AFSSH moments, unless they exist already
    pub fn allocate_afssh(&mut self) {
        if self.afssh_dr.is_empty() {
            let zeros: Array2<c64> = Array2::zeros((self.nadi, self.nadi));
            self.afssh_dr = vec![zeros.clone(); self.ntraj * self.ndof];
            self.afssh_dp = vec![zeros; self.ntraj * self.ndof];
        }
    }

    /// Kinetic energy of every trajectory
    pub fn kinetic_energies(&self) -> Array1<f64> {
        let inv_mass: ArrayView2<f64> = self.inv_mass.view().insert_axis(Axis(1));
        (&self.p * &self.p * &inv_mass).sum_axis(Axis(0)) * 0.5
    }

    /// Kinetic energy of one trajectory, restricted to the given DOFs
    pub fn kinetic_energy_of(&self, traj: usize, dofs: &[usize]) -> f64 {
        dofs.iter()
            .map(|dof| 0.5 * self.inv_mass[*dof] * self.p[[*dof, traj]].powi(2))
            .sum()
    }

    /// Energy of the active adiabatic state of every trajectory
    pub fn potential_energies(
        &self,
        config: &DynamicConfiguration,
        ham: &dyn HamiltonianProvider,
    ) -> Array1<f64> {
        (0..self.ntraj)
            .map(|traj| ham.ham_adi(config.child(traj))[[self.act_states[traj], self.act_states[traj]]].re)
            .collect()
    }

    pub fn density_matrix(&self, traj: usize, rep: Representation) -> Array2<c64> {
        let c: ArrayView1<c64> = self.amplitudes(rep).column(traj);
        let n: usize = c.len();
        Array2::from_shape_fn((n, n), |(i, j)| c[i] * c[j].conj())
    }

    /// Populations (nstates x ntraj)
    pub fn populations(&self, rep: Representation) -> Array2<f64> {
        self.amplitudes(rep).mapv(|val| val.norm_sqr())
    }

    /// Squared norm of the amplitudes of every trajectory
    pub fn norms(&self, rep: Representation) -> Array1<f64> {
        self.populations(rep).sum_axis(Axis(0))
    }
}

/// Struct that holds the [DynamicConfiguration], the [Ensemble] and the random
/// number generator of a surface hopping run
pub struct Simulation {
    pub config: DynamicConfiguration,
    pub ensemble: Ensemble,
    pub rng: StdRng,
    pub step: usize,
    pub initial_energy: Option<f64>,
}

impl Simulation {
    /// Check the configuration and build the ensemble at the initial geometry
    pub fn new(
        config: DynamicConfiguration,
        system: SystemData,
        ham: &mut dyn HamiltonianProvider,
    ) -> Result<Simulation, TshError> {
        config.check(ham.nadi(), system.ndof())?;
        let ensemble: Ensemble = Ensemble::new(system, &config, ham)?;
        let rng: StdRng = StdRng::seed_from_u64(config.seed);
        Ok(Simulation {
            config,
            ensemble,
            rng,
            step: 0,
            initial_energy: None,
        })
    }
}
