use crate::c64;
use crate::defaults::DEGENERACY_THRESHOLD;
use crate::errors::TshError;
use crate::initialization::methods::{CollapseOption, DecoherenceTimes, InstantaneousVariant};
use crate::initialization::{DecoherenceConfiguration, DynamicConfiguration, Ensemble};
use crate::interface::{HamiltonianProvider, UniformSource};
use crate::utils::*;
use log::{debug, trace};
use ndarray::prelude::*;

/// Source of decoherence rates for the rate models that need more than the energies
/// and the kinetic energy of a trajectory (`decoherence_times_type` 2 and 3).
pub trait DecoherenceRateModel: Send {
    /// Decoherence rates (nadi x nadi) of trajectory `traj`, evaluated with the
    /// Hamiltonian of `child`
    fn rates(
        &self,
        traj: usize,
        child: usize,
        ensemble: &Ensemble,
        ham: &dyn HamiltonianProvider,
    ) -> Result<Array2<f64>, TshError>;
}

/// Adiabatic energies of one child
pub fn adiabatic_energies(ham: &dyn HamiltonianProvider, child: usize) -> Array1<f64> {
    ham.ham_adi(child).diag().mapv(|val| val.re)
}

/// Decoherence rates of all children. Under the NBRA the reference trajectory
/// provides the kinetic energy.
pub fn decoherence_rates(
    config: &DynamicConfiguration,
    ensemble: &Ensemble,
    ham: &dyn HamiltonianProvider,
) -> Result<Vec<Array2<f64>>, TshError> {
    let decoherence: &DecoherenceConfiguration = &config.decoherence_config;
    let nadi: usize = ensemble.nadi;
    let n_children: usize = config.n_children(ensemble.ntraj);
    let ekin: Array1<f64> = ensemble.kinetic_energies();

    let mut rates: Vec<Array2<f64>> = match decoherence.decoherence_times_type {
        DecoherenceTimes::None => vec![Array2::zeros((nadi, nadi)); n_children],
        DecoherenceTimes::Fixed => {
            let fixed: Array2<f64> = decoherence.fixed_rates().ok_or_else(|| {
                TshError::InvalidConfiguration(String::from(
                    "fixed decoherence times need `decoherence_rates`",
                ))
            })?;
            vec![fixed; n_children]
        }
        DecoherenceTimes::Edc => (0..n_children)
            .map(|child| {
                edc_rates(
                    adiabatic_energies(ham, child).view(),
                    ekin[child],
                    decoherence.decoherence_c_param,
                    decoherence.decoherence_eps_param,
                )
            })
            .collect(),
        DecoherenceTimes::Schwartz1 | DecoherenceTimes::Schwartz2 => {
            let model: &dyn DecoherenceRateModel =
                ensemble.rate_model.as_deref().ok_or_else(|| {
                    TshError::InvalidConfiguration(String::from(
                        "the Schwartz decoherence times need a decoherence rate model",
                    ))
                })?;
            let mut rates: Vec<Array2<f64>> = Vec::with_capacity(n_children);
            for child in 0..n_children {
                rates.push(model.rates(child, child, ensemble, ham)?);
            }
            rates
        }
    };

    if decoherence.dephasing_informed {
        let ave_gaps: Array2<f64> = decoherence.average_gaps().ok_or_else(|| {
            TshError::InvalidConfiguration(String::from(
                "the dephasing-informed correction needs `ave_gaps`",
            ))
        })?;
        for (child, rate) in rates.iter_mut().enumerate() {
            dephasing_informed_correction(rate, adiabatic_energies(ham, child).view(), ave_gaps.view());
        }
    }
    for rate in rates.iter() {
        if rate.dim() != (nadi, nadi) {
            return Err(TshError::DimensionMismatch {
                what: "decoherence rates",
                expected: nadi,
                found: rate.nrows(),
            });
        }
    }
    Ok(rates)
}

/// Energy-based decoherence rates |E_i - E_j| / (C + eps / Ekin)
pub fn edc_rates(energies: ArrayView1<f64>, ekin: f64, c_param: f64, eps_param: f64) -> Array2<f64> {
    let n: usize = energies.len();
    if !(ekin > 0.0) {
        return Array2::zeros((n, n));
    }
    let denominator: f64 = c_param + eps_param / ekin;
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            0.0
        } else {
            (energies[i] - energies[j]).abs() / denominator
        }
    })
}

/// Scale every rate by the ratio of the instantaneous to the average energy gap
pub fn dephasing_informed_correction(
    rates: &mut Array2<f64>,
    energies: ArrayView1<f64>,
    ave_gaps: ArrayView2<f64>,
) {
    let n: usize = energies.len();
    for i in 0..n {
        for j in 0..n {
            if i != j && ave_gaps[[i, j]] > DEGENERACY_THRESHOLD {
                rates[[i, j]] *= (energies[i] - energies[j]).abs() / ave_gaps[[i, j]];
            }
        }
    }
}

/// Simplified decay of mixing: every inactive amplitude decays with the rate of its
/// coherence to the active state, the active amplitude takes up the lost population.
/// Nothing happens if the active population is not above `norm_tolerance`.
pub fn sdm(
    mut c: ArrayViewMut1<c64>,
    dt: f64,
    active: usize,
    rates: ArrayView2<f64>,
    norm_tolerance: f64,
) {
    let active_population: f64 = c[active].norm_sqr();
    if !(active_population > norm_tolerance) {
        return;
    }
    let mut inactive_population: f64 = 0.0;
    for (state, amplitude) in c.iter_mut().enumerate() {
        if state != active {
            *amplitude *= (-dt * rates[[active, state]]).exp();
            inactive_population += amplitude.norm_sqr();
        }
    }
    let scale: f64 = ((1.0 - inactive_population).max(0.0) / active_population).sqrt();
    c[active] *= scale;
}

/// Put all population into `state`
pub fn collapse(mut c: ArrayViewMut1<c64>, state: usize, option: CollapseOption) {
    let survivor: c64 = c[state];
    let value: c64 = match option {
        CollapseOption::KeepPhase if survivor.norm() > 0.0 => survivor / survivor.norm(),
        _ => c64::new(1.0, 0.0),
    };
    c.fill(c64::new(0.0, 0.0));
    c[state] = value;
}

/// Remove `state` from the amplitudes and renormalise. Returns false and leaves the
/// amplitudes untouched if nothing would remain.
pub fn project_out(mut c: ArrayViewMut1<c64>, state: usize) -> bool {
    let remaining: f64 = squared_norm(c.view()) - c[state].norm_sqr();
    if !(remaining > 0.0) {
        return false;
    }
    c[state] = c64::new(0.0, 0.0);
    normalize_coefficients(c);
    true
}

/// Instantaneous decoherence after the hopping step
pub fn instantaneous_decoherence(
    amplitudes: &mut Array2<c64>,
    act_states: &[usize],
    proposed: &[usize],
    old_states: &[usize],
    variant: InstantaneousVariant,
    option: CollapseOption,
) -> usize {
    let mut events: usize = 0;
    for (traj, mut c) in amplitudes.axis_iter_mut(Axis(1)).enumerate() {
        let accepted: bool = act_states[traj] != old_states[traj];
        let attempted: bool = proposed[traj] != old_states[traj];
        match variant {
            InstantaneousVariant::Accepted if accepted => {
                collapse(c.view_mut(), act_states[traj], option);
                events += 1;
            }
            InstantaneousVariant::Attempted if attempted => {
                collapse(c.view_mut(), act_states[traj], option);
                events += 1;
            }
            InstantaneousVariant::Restricted if accepted => {
                collapse(c.view_mut(), act_states[traj], option);
                events += 1;
            }
            InstantaneousVariant::Restricted if attempted => {
                if project_out(c.view_mut(), proposed[traj]) {
                    events += 1;
                }
            }
            _ => {}
        }
    }
    if events > 0 {
        debug!("instantaneous decoherence in {} trajectories", events);
    }
    events
}

/// Momentum reversal events of the BCSH scheme (nadi x ntraj). The wavepacket on
/// state j moves with the momentum that conserves the total energy on that surface;
/// it is reflected if no such momentum exists or if the force on j reverses the
/// momentum within one time step.
pub fn wp_reversal_events(
    config: &DynamicConfiguration,
    ensemble: &Ensemble,
    ham: &dyn HamiltonianProvider,
) -> Array2<bool> {
    let mut events: Array2<bool> = Array2::from_elem((ensemble.nadi, ensemble.ntraj), false);
    let ekin: Array1<f64> = ensemble.kinetic_energies();
    for traj in 0..ensemble.ntraj {
        let child: usize = config.child(traj);
        let active: usize = ensemble.act_states[traj];
        let energies: Array1<f64> = adiabatic_energies(ham, child);
        let p: ArrayView1<f64> = ensemble.p.column(traj);
        for state in (0..ensemble.nadi).filter(|state| *state != active) {
            let ekin_state: f64 = ekin[traj] + energies[active] - energies[state];
            if ekin_state < 0.0 {
                events[[state, traj]] = true;
                continue;
            }
            if !(ekin[traj] > 0.0) {
                continue;
            }
            let scale: f64 = (ekin_state / ekin[traj]).sqrt();
            let mut projection: f64 = 0.0;
            for dof in 0..ensemble.ndof {
                let p_state: f64 = scale * p[dof];
                let force: f64 = -ham.d1ham_adi(child, dof)[[state, state]].re;
                projection += p_state * (p_state + config.dt * force);
            }
            events[[state, traj]] = projection < 0.0;
        }
    }
    events
}

/// Branching-corrected decoherence: every state whose wavepacket got reflected is
/// removed from the amplitudes
pub fn bcsh(amplitudes: &mut Array2<c64>, act_states: &[usize], reversal_events: ArrayView2<bool>) -> usize {
    let mut events: usize = 0;
    for (traj, mut c) in amplitudes.axis_iter_mut(Axis(1)).enumerate() {
        for state in 0..c.len() {
            if state != act_states[traj] && reversal_events[[state, traj]] && c[state].norm() > 0.0 {
                if !project_out(c.view_mut(), state) {
                    collapse(c.view_mut(), act_states[traj], CollapseOption::KeepPhase);
                }
                trace!("trajectory {}: reversal on state {}", traj, state);
                events += 1;
            }
        }
    }
    events
}

/// Mean-field stochastic decoherence: state i decoheres with probability
/// dt sum_j rate_ij |c_j|^2. A decoherence event collapses the amplitudes onto i
/// with probability |c_i|^2 and removes i otherwise. The mean-field energy
/// sum_i |c_i|^2 E_i changes with the event, the momenta are scaled to keep the
/// total energy. An event the kinetic energy can not pay for is discarded.
#[allow(clippy::too_many_arguments)]
pub fn mfsd(
    amplitudes: &mut Array2<c64>,
    p: &mut Array2<f64>,
    inv_mass: ArrayView1<f64>,
    energies: &[Array1<f64>],
    dt: f64,
    rates: &[Array2<f64>],
    config: &DynamicConfiguration,
    rnd: &mut dyn UniformSource,
) -> usize {
    let mut events: usize = 0;
    for (traj, (mut c, mut p)) in amplitudes
        .axis_iter_mut(Axis(1))
        .zip(p.axis_iter_mut(Axis(1)))
        .enumerate()
    {
        let child: usize = config.child(traj);
        let rate: &Array2<f64> = &rates[child];
        let energy: &Array1<f64> = &energies[child];
        for state in 0..c.len() {
            let before: Array1<f64> = populations(c.view());
            let probability: f64 = dt * rate.row(state).dot(&before);
            if !(rnd.uniform(0.0, 1.0) < probability) {
                continue;
            }
            let previous: Array1<c64> = c.to_owned();
            if rnd.uniform(0.0, 1.0) < before[state] {
                collapse(c.view_mut(), state, CollapseOption::KeepPhase);
            } else {
                project_out(c.view_mut(), state);
            }
            let delta_e: f64 = energy.dot(&populations(c.view())) - energy.dot(&before);
            let ekin: f64 = p
                .iter()
                .zip(inv_mass.iter())
                .map(|(p, inv_mass)| 0.5 * inv_mass * p * p)
                .sum();
            if delta_e.abs() < DEGENERACY_THRESHOLD {
                events += 1;
            } else if ekin > 0.0 && ekin - delta_e >= 0.0 {
                p.mapv_inplace(|val| val * ((ekin - delta_e) / ekin).sqrt());
                events += 1;
            } else {
                trace!("trajectory {}: MFSD event on state {} discarded", traj, state);
                c.assign(&previous);
            }
        }
    }
    events
}
