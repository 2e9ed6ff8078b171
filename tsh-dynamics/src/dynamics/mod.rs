pub mod afssh;
pub mod decoherence;
pub mod dynamic_routines;
pub mod hopping_routines;
pub mod schroedinger_integration;
pub mod simulation;
pub mod state_tracking;
pub mod thermostat;
pub mod utils;

use crate::c64;
use crate::dynamics::decoherence::*;
use crate::dynamics::dynamic_routines::ethd3_friction;
use crate::dynamics::state_tracking::*;
use crate::errors::TshError;
use crate::initialization::methods::*;
use crate::initialization::{DynamicConfiguration, Ensemble};
use crate::interface::{HamiltonianProvider, UniformSource};
use ndarray::prelude::*;

/// Counters of the stochastic events of one step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub accepted_hops: usize,
    pub frustrated_hops: usize,
    pub decoherence_events: usize,
}

impl std::ops::AddAssign for StepReport {
    fn add_assign(&mut self, other: Self) {
        self.accepted_hops += other.accepted_hops;
        self.frustrated_hops += other.frustrated_hops;
        self.decoherence_events += other.decoherence_events;
    }
}

/// Advance the ensemble by one nuclear time step `config.dt`.
///
/// The electronic amplitudes are propagated in two halves around a velocity Verlet
/// update of the nuclei. In between, the Hamiltonian of every child is evaluated at the
/// new geometry and the adiabatic states are tracked through the time-overlaps. The
/// step closes with the decoherence correction and the surface hopping. Any error
/// leaves the ensemble in an unspecified state.
pub fn compute_dynamics(
    ensemble: &mut Ensemble,
    config: &DynamicConfiguration,
    ham: &mut dyn HamiltonianProvider,
    rnd: &mut dyn UniformSource,
) -> Result<StepReport, TshError> {
    check_step(ensemble, config, ham)?;
    let dt: f64 = config.dt;
    let n_children: usize = config.n_children(ensemble.ntraj);
    let nvt: bool = config.ensemble == EnsembleType::Nvt;
    let tracking: bool = config.tracking_config.is_active();

    let previous_basis: Vec<Array2<c64>> = if tracking {
        (0..n_children)
            .map(|child| ham.basis_transform(child).to_owned())
            .collect()
    } else {
        Vec::new()
    };
    let mut populations_before: Array2<f64> = ensemble.populations(Representation::Adiabatic);

    // first half of the electronic propagation
    ensemble.propagate_electronic(config, ham)?;

    // nuclei: half kick and drift
    if nvt {
        ensemble.apply_thermostat_scaling(&config.thermostat_dofs, 0.5 * dt);
    }
    let forces: Array2<f64> = ensemble.get_forces(config, ham);
    ensemble.kick(forces.view(), 0.5 * dt, &config.constrained_dofs);
    let friction: Option<Array2<f64>> =
        if config.entanglement_config.entanglement_opt == EntanglementOption::Ethd3 {
            Some(ethd3_friction(
                ensemble.p.view(),
                ensemble.inv_mass.view(),
                config.entanglement_config.ethd3_beta,
            ))
        } else {
            None
        };
    ensemble.drift(dt, friction.as_ref().map(|friction| friction.view()));
    ensemble.check_nuclear_finite("drift")?;

    // electronic structure at the new geometry
    for child in 0..n_children {
        ham.compute(child, ensemble.q.column(child))?;
    }

    if tracking {
        let overlaps: Vec<Array2<c64>> = compute_time_overlaps(config, ham, &previous_basis)?;
        let energies: Vec<Array1<f64>> = (0..n_children)
            .map(|child| adiabatic_energies(ham, child))
            .collect();
        let perms: Vec<Vec<usize>> = compute_permutations(config, &energies, &overlaps, rnd)?;
        let projectors: Vec<Array2<c64>> = compute_projectors(config, &overlaps, &perms);
        ensemble.apply_state_tracking(config, &perms, &projectors);

        let unordered: Array2<f64> = populations_before.clone();
        for traj in 0..ensemble.ntraj {
            for (i, j) in perms[config.child(traj)].iter().enumerate() {
                populations_before[[*j, traj]] = unordered[[i, traj]];
            }
        }
    }

    // nuclei: thermostat and second half kick
    if nvt {
        ensemble.propagate_thermostats(&config.thermostat_dofs, dt);
    }
    let forces: Array2<f64> = ensemble.get_forces(config, ham);
    ensemble.kick(forces.view(), 0.5 * dt, &config.constrained_dofs);
    if nvt {
        ensemble.apply_thermostat_scaling(&config.thermostat_dofs, 0.5 * dt);
    }
    ensemble.check_nuclear_finite("momentum update")?;

    // second half of the electronic propagation
    ensemble.propagate_electronic(config, ham)?;
    let populations_after: Array2<f64> = ensemble.populations(Representation::Adiabatic);

    let mut report: StepReport = StepReport::default();
    let decoherence: DecoherenceMethod = config.decoherence_config.decoherence_algo;

    // decoherence before the hops
    let needs_rates: bool = matches!(
        decoherence,
        DecoherenceMethod::Sdm | DecoherenceMethod::Bcsh | DecoherenceMethod::Mfsd
    ) || config.tsh_method == TshMethod::Dish;
    let rates: Vec<Array2<f64>> = if needs_rates {
        decoherence_rates(config, ensemble, ham)?
    } else {
        Vec::new()
    };
    match decoherence {
        DecoherenceMethod::Sdm => {
            for traj in 0..ensemble.ntraj {
                let active: usize = ensemble.act_states[traj];
                sdm(
                    ensemble.ampl_adi.column_mut(traj),
                    dt,
                    active,
                    rates[config.child(traj)].view(),
                    config.decoherence_config.sdm_norm_tolerance,
                );
            }
        }
        DecoherenceMethod::Bcsh => {
            ensemble.reversal_events = wp_reversal_events(config, ensemble, ham);
            report.decoherence_events += bcsh(
                &mut ensemble.ampl_adi,
                &ensemble.act_states,
                ensemble.reversal_events.view(),
            );
        }
        DecoherenceMethod::Mfsd => {
            let energies: Vec<Array1<f64>> = (0..n_children)
                .map(|child| adiabatic_energies(ham, child))
                .collect();
            report.decoherence_events += mfsd(
                &mut ensemble.ampl_adi,
                &mut ensemble.p,
                ensemble.inv_mass.view(),
                &energies,
                dt,
                &rates,
                config,
                rnd,
            );
        }
        _ => {}
    }
    ensemble.sync_from_adiabatic(config, ham);

    // surface hopping
    let old_states: Vec<usize> = ensemble.act_states.clone();
    let proposed: Vec<usize> = match config.tsh_method {
        TshMethod::Adiabatic => old_states.clone(),
        TshMethod::Dish => ensemble.dish(config, &rates, rnd),
        TshMethod::Fssh | TshMethod::Gfsh | TshMethod::Mssh => {
            let hvibs: Vec<Array2<c64>> =
                ensemble.vibronic_hamiltonians(config, Representation::Adiabatic, ham);
            let probabilities: Vec<Array1<f64>> =
                ensemble.hop_proposal_probabilities(
                    config,
                    &hvibs,
                    populations_before.view(),
                    populations_after.view(),
                );
            ensemble.propose_hops(&probabilities, rnd)
        }
    };
    let accepted: Vec<bool> = ensemble.accept_hops(config, ham, &proposed, rnd);
    let hopped: Vec<bool> = ensemble.handle_hops_nuclear(config, ham, &proposed, &accepted);
    report.accepted_hops = hopped.iter().filter(|hop| **hop).count();
    report.frustrated_hops = ensemble.handle_frustrated_hops(config, ham, &proposed);

    // decoherence triggered by the hops
    match decoherence {
        DecoherenceMethod::Instantaneous => {
            report.decoherence_events += instantaneous_decoherence(
                &mut ensemble.ampl_adi,
                &ensemble.act_states,
                &proposed,
                &old_states,
                config.decoherence_config.instantaneous_decoherence_variant,
                config.decoherence_config.collapse_option,
            );
        }
        DecoherenceMethod::Afssh => {
            report.decoherence_events += ensemble.apply_afssh(config, ham, &old_states, rnd);
        }
        _ => {}
    }
    ensemble.sync_from_adiabatic(config, ham);
    ensemble.check_amplitudes_finite("decoherence")?;
    ensemble.check_nuclear_finite("hopping")?;

    ensemble.time += dt;
    Ok(report)
}

/// Consistency of the configuration, the ensemble and the Hamiltonian provider.
/// Nothing of the ensemble is touched before these checks pass.
fn check_step(
    ensemble: &Ensemble,
    config: &DynamicConfiguration,
    ham: &dyn HamiltonianProvider,
) -> Result<(), TshError> {
    config.check(ensemble.nadi, ensemble.ndof)?;
    let dimensions: [(&'static str, usize, usize); 5] = [
        ("adiabatic states", ensemble.nadi, ham.nadi()),
        ("diabatic states", ensemble.ndia, ham.ndia()),
        ("nuclear DOFs", ensemble.ndof, ham.ndof()),
        ("adiabatic amplitudes", ensemble.nadi, ensemble.ampl_adi.nrows()),
        ("trajectories", ensemble.ntraj, ensemble.act_states.len()),
    ];
    for (what, expected, found) in dimensions.into_iter() {
        if expected != found {
            return Err(TshError::DimensionMismatch {
                what,
                expected,
                found,
            });
        }
    }
    if ham.nchildren() < config.n_children(ensemble.ntraj) {
        return Err(TshError::DimensionMismatch {
            what: "Hamiltonian children",
            expected: config.n_children(ensemble.ntraj),
            found: ham.nchildren(),
        });
    }
    if let Some(state) = ensemble.act_states.iter().find(|state| **state >= ensemble.nadi) {
        return Err(TshError::InvalidConfiguration(format!(
            "active state {} does not exist",
            state
        )));
    }
    if config.ensemble == EnsembleType::Nvt {
        for thermostat in ensemble.thermostats.iter() {
            if thermostat.n_dofs() != config.thermostat_dofs.len() {
                return Err(TshError::ThermostatDofMismatch {
                    thermostat: thermostat.n_dofs(),
                    configured: config.thermostat_dofs.len(),
                });
            }
        }
    }
    let schwartz: bool = matches!(
        config.decoherence_config.decoherence_times_type,
        DecoherenceTimes::Schwartz1 | DecoherenceTimes::Schwartz2
    );
    let uses_rates: bool = matches!(
        config.decoherence_config.decoherence_algo,
        DecoherenceMethod::Sdm | DecoherenceMethod::Bcsh | DecoherenceMethod::Mfsd
    ) || config.tsh_method == TshMethod::Dish;
    if schwartz && uses_rates && ensemble.rate_model.is_none() {
        return Err(TshError::InvalidConfiguration(String::from(
            "the Schwartz decoherence times need a decoherence rate model",
        )));
    }
    Ok(())
}
