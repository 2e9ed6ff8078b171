use crate::c64;
use crate::constants::K_BOLTZMANN;
use crate::defaults::DEGENERACY_THRESHOLD;
use crate::dynamics::decoherence::{collapse, project_out};
use crate::initialization::methods::{
    CollapseOption, FrustratedHop, HopAcceptance, MomentumRescaling, TshMethod,
};
use crate::initialization::{DynamicConfiguration, Ensemble};
use crate::interface::{HamiltonianProvider, UniformSource};
use crate::utils::*;
use log::{debug, trace};
use ndarray::prelude::*;

/// Fewest switches probabilities from the active state `active` into every other state,
/// g_aj = -2 dt Im(c_a^* Hvib_aj c_j) / |c_a|^2. Negative values are kept and removed
/// by [clamp_probabilities].
pub fn fssh_probabilities(
    c: ArrayView1<c64>,
    hvib: ArrayView2<c64>,
    active: usize,
    dt: f64,
) -> Array1<f64> {
    let n: usize = c.len();
    let population: f64 = c[active].norm_sqr();
    let mut probabilities: Array1<f64> = Array1::zeros(n);
    if !(population > DEGENERACY_THRESHOLD) {
        return probabilities;
    }
    for state in (0..n).filter(|state| *state != active) {
        let flux: c64 = c[active].conj() * hvib[[active, state]] * c[state];
        probabilities[state] = -2.0 * dt * flux.im / population;
    }
    probabilities
}

/// Global flux probabilities from the populations before and after the electronic
/// propagation. Only a decreasing active population gives rise to hops, which are
/// distributed over the states that gained population.
pub fn gfsh_probabilities(
    before: ArrayView1<f64>,
    after: ArrayView1<f64>,
    active: usize,
) -> Array1<f64> {
    let n: usize = before.len();
    let change: Array1<f64> = &after - &before;
    let mut probabilities: Array1<f64> = Array1::zeros(n);
    if change[active] >= 0.0 || !(before[active] > DEGENERACY_THRESHOLD) {
        return probabilities;
    }
    let gain: f64 = change.iter().filter(|val| **val > 0.0).sum();
    if !(gain > 0.0) {
        return probabilities;
    }
    for state in 0..n {
        if change[state] > 0.0 {
            probabilities[state] = -(change[active] / before[active]) * change[state] / gain;
        }
    }
    probabilities
}

/// Markov-state probabilities: the target population itself
pub fn mssh_probabilities(c: ArrayView1<c64>, active: usize) -> Array1<f64> {
    let mut probabilities: Array1<f64> = populations(c);
    probabilities[active] = 0.0;
    probabilities
}

/// Clip every probability to [0, 1], drop values below the floor and scale the
/// vector down if its sum exceeds one
pub fn clamp_probabilities(probabilities: &mut Array1<f64>, floor: f64) {
    probabilities.mapv_inplace(|val| {
        let val: f64 = if val.is_finite() { val.clamp(0.0, 1.0) } else { 0.0 };
        if val < floor {
            0.0
        } else {
            val
        }
    });
    let total: f64 = probabilities.sum();
    if total > 1.0 {
        *probabilities /= total;
    }
}

/// Walk the cumulative probabilities in state order; the first state whose cumulative
/// probability exceeds `ksi` is proposed. Without such a state the active state is kept.
pub fn propose_hop(probabilities: ArrayView1<f64>, active: usize, ksi: f64) -> usize {
    let mut cumulative: f64 = 0.0;
    for (state, probability) in probabilities.iter().enumerate() {
        if *probability <= 0.0 {
            continue;
        }
        cumulative += probability;
        if ksi < cumulative {
            return state;
        }
    }
    active
}

/// Direction along which the momenta of a hop are adjusted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HopDirection {
    Coupling,
    ForceDifference,
}

/// Quantities of a hop along a direction n: a = 1/2 sum invM n^2, b = sum invM p n
struct DirectedHop {
    direction: Array1<f64>,
    a: f64,
    b: f64,
}

impl DirectedHop {
    /// b^2 - 4 a dE, negative if the kinetic energy along n does not suffice
    fn discriminant(&self, delta_e: f64) -> f64 {
        self.b.powi(2) - 4.0 * self.a * delta_e
    }

    fn is_degenerate(&self) -> bool {
        !(self.a > DEGENERACY_THRESHOLD)
    }
}

impl Ensemble {
    fn adiabatic_gap(&self, config: &DynamicConfiguration, ham: &dyn HamiltonianProvider, traj: usize, old: usize, new: usize) -> f64 {
        let h: ArrayView2<c64> = ham.ham_adi(config.child(traj));
        h[[new, new]].re - h[[old, old]].re
    }

    fn directed_hop(
        &self,
        config: &DynamicConfiguration,
        ham: &dyn HamiltonianProvider,
        traj: usize,
        old: usize,
        new: usize,
        kind: HopDirection,
    ) -> DirectedHop {
        let child: usize = config.child(traj);
        let direction: Array1<f64> = (0..self.ndof)
            .map(|dof| match kind {
                HopDirection::Coupling => ham.dc1_adi(child, dof)[[old, new]].re,
                HopDirection::ForceDifference => {
                    let d1ham: ArrayView2<c64> = ham.d1ham_adi(child, dof);
                    -(d1ham[[new, new]].re - d1ham[[old, old]].re)
                }
            })
            .collect();
        let p: ArrayView1<f64> = self.p.column(traj);
        let mut a: f64 = 0.0;
        let mut b: f64 = 0.0;
        for dof in 0..self.ndof {
            a += 0.5 * self.inv_mass[dof] * direction[dof].powi(2);
            b += self.inv_mass[dof] * p[dof] * direction[dof];
        }
        DirectedHop { direction, a, b }
    }

    /// Hop probabilities (nadi) of every trajectory in the adiabatic basis.
    /// `hvibs` are the adiabatic vibronic Hamiltonians of the children and
    /// `populations_before` and `populations_after` are the adiabatic populations around the
    /// electronic propagation, taken before any decoherence correction.
    pub fn hop_proposal_probabilities(
        &self,
        config: &DynamicConfiguration,
        hvibs: &[Array2<c64>],
        populations_before: ArrayView2<f64>,
        populations_after: ArrayView2<f64>,
    ) -> Vec<Array1<f64>> {
        (0..self.ntraj)
            .map(|traj| {
                let c: ArrayView1<c64> = self.ampl_adi.column(traj);
                let active: usize = self.act_states[traj];
                let mut probabilities: Array1<f64> = match config.tsh_method {
                    TshMethod::Fssh => {
                        fssh_probabilities(c, hvibs[config.child(traj)].view(), active, config.dt)
                    }
                    TshMethod::Gfsh => gfsh_probabilities(
                        populations_before.column(traj),
                        populations_after.column(traj),
                        active,
                    ),
                    TshMethod::Mssh => mssh_probabilities(c, active),
                    TshMethod::Adiabatic | TshMethod::Dish => Array1::zeros(self.nadi),
                };
                clamp_probabilities(&mut probabilities, config.hopping_config.probability_floor);
                probabilities
            })
            .collect()
    }

    /// One uniform draw per trajectory, in trajectory order
    pub fn propose_hops(
        &self,
        probabilities: &[Array1<f64>],
        rnd: &mut dyn UniformSource,
    ) -> Vec<usize> {
        probabilities
            .iter()
            .zip(self.act_states.iter())
            .map(|(g, active)| propose_hop(g.view(), *active, rnd.uniform(0.0, 1.0)))
            .collect()
    }

    /// Acceptance test of the proposed hops. Trajectories without a proposal are
    /// reported as not accepted.
    pub fn accept_hops(
        &self,
        config: &DynamicConfiguration,
        ham: &dyn HamiltonianProvider,
        proposed: &[usize],
        rnd: &mut dyn UniformSource,
    ) -> Vec<bool> {
        let ekin: Array1<f64> = self.kinetic_energies();
        (0..self.ntraj)
            .map(|traj| {
                let old: usize = self.act_states[traj];
                let new: usize = proposed[traj];
                if new == old {
                    return false;
                }
                let delta_e: f64 = self.adiabatic_gap(config, ham, traj, old, new);
                match config.hopping_config.hop_acceptance_algo {
                    HopAcceptance::Always => true,
                    HopAcceptance::Energy => delta_e <= ekin[traj],
                    HopAcceptance::Coupling | HopAcceptance::ForceDifference => {
                        let kind: HopDirection = if config.hopping_config.hop_acceptance_algo
                            == HopAcceptance::Coupling
                        {
                            HopDirection::Coupling
                        } else {
                            HopDirection::ForceDifference
                        };
                        let hop: DirectedHop = self.directed_hop(config, ham, traj, old, new, kind);
                        !hop.is_degenerate() && hop.discriminant(delta_e) >= 0.0
                    }
                    HopAcceptance::Boltzmann => {
                        if delta_e > 0.0 {
                            let boltzmann: f64 =
                                (-delta_e / (K_BOLTZMANN * config.hopping_config.temperature)).exp();
                            rnd.uniform(0.0, 1.0) < boltzmann
                        } else {
                            true
                        }
                    }
                }
            })
            .collect()
    }

    /// Switch the active states of the accepted hops and adjust the momenta so that the
    /// total energy is conserved. A hop whose rescaling has no solution is reverted.
    /// Returns the flags of the hops that went through.
    pub fn handle_hops_nuclear(
        &mut self,
        config: &DynamicConfiguration,
        ham: &dyn HamiltonianProvider,
        proposed: &[usize],
        accepted: &[bool],
    ) -> Vec<bool> {
        let ekin: Array1<f64> = self.kinetic_energies();
        let mut hopped: Vec<bool> = vec![false; self.ntraj];
        for traj in 0..self.ntraj {
            if !accepted[traj] {
                continue;
            }
            let old: usize = self.act_states[traj];
            let new: usize = proposed[traj];
            let delta_e: f64 = self.adiabatic_gap(config, ham, traj, old, new);
            let feasible: bool = match config.hopping_config.momenta_rescaling_algo {
                MomentumRescaling::None => true,
                MomentumRescaling::Isotropic => {
                    let argument: f64 = (ekin[traj] - delta_e) / ekin[traj];
                    if ekin[traj] > 0.0 && argument >= 0.0 {
                        self.p.column_mut(traj).mapv_inplace(|val| val * argument.sqrt());
                        true
                    } else {
                        false
                    }
                }
                MomentumRescaling::Coupling | MomentumRescaling::ForceDifference => {
                    let kind: HopDirection = if config.hopping_config.momenta_rescaling_algo
                        == MomentumRescaling::Coupling
                    {
                        HopDirection::Coupling
                    } else {
                        HopDirection::ForceDifference
                    };
                    let hop: DirectedHop = self.directed_hop(config, ham, traj, old, new, kind);
                    let discriminant: f64 = hop.discriminant(delta_e);
                    if hop.is_degenerate() || discriminant < 0.0 {
                        false
                    } else {
                        let gamma: f64 = if hop.b < 0.0 {
                            (hop.b + discriminant.sqrt()) / (2.0 * hop.a)
                        } else {
                            (hop.b - discriminant.sqrt()) / (2.0 * hop.a)
                        };
                        self.p.column_mut(traj).scaled_add(-gamma, &hop.direction);
                        true
                    }
                }
            };
            if feasible {
                debug!("trajectory {}: hop {} -> {}, dE = {:.6e}", traj, old, new, delta_e);
                self.act_states[traj] = new;
                hopped[traj] = true;
            } else {
                debug!("trajectory {}: hop {} -> {} reverted", traj, old, new);
            }
        }
        self.apply_constraints(&config.constrained_dofs);
        hopped
    }

    /// Momentum treatment of the hops that were proposed but did not happen
    pub fn handle_frustrated_hops(
        &mut self,
        config: &DynamicConfiguration,
        ham: &dyn HamiltonianProvider,
        proposed: &[usize],
    ) -> usize {
        let kind: HopDirection =
            if config.hopping_config.momenta_rescaling_algo == MomentumRescaling::ForceDifference {
                HopDirection::ForceDifference
            } else {
                HopDirection::Coupling
            };
        let mut frustrated: usize = 0;
        for traj in 0..self.ntraj {
            let old: usize = self.act_states[traj];
            let new: usize = proposed[traj];
            if new == old {
                continue;
            }
            frustrated += 1;
            let hop: DirectedHop = self.directed_hop(config, ham, traj, old, new, kind);
            let reverse: bool = match config.hopping_config.frustrated_hop {
                FrustratedHop::Keep => false,
                FrustratedHop::Reverse => true,
                FrustratedHop::ReverseOnForceSign => {
                    let child: usize = config.child(traj);
                    let force_projection: f64 = (0..self.ndof)
                        .map(|dof| -ham.d1ham_adi(child, dof)[[new, new]].re * hop.direction[dof])
                        .sum();
                    force_projection * hop.b < 0.0
                }
            };
            if reverse && !hop.is_degenerate() {
                self.p.column_mut(traj).scaled_add(-hop.b / hop.a, &hop.direction);
                trace!("trajectory {}: momentum reversed after frustrated hop", traj);
            }
        }
        if frustrated > 0 {
            debug!("{} frustrated hops", frustrated);
        }
        self.apply_constraints(&config.constrained_dofs);
        frustrated
    }

    /// Decoherence-induced surface hopping. The coherence clock of every state runs
    /// until it passes a decoherence interval drawn with the mean 1 / rate_i, where
    /// rate_i = sum_j rate_ij |c_j|^2. The first such state decoheres: with probability
    /// |c_i|^2 the amplitudes collapse onto it and a hop into it is proposed, otherwise it
    /// is removed from the amplitudes. Returns the proposed states.
    pub fn dish(
        &mut self,
        config: &DynamicConfiguration,
        rates: &[Array2<f64>],
        rnd: &mut dyn UniformSource,
    ) -> Vec<usize> {
        let mut proposed: Vec<usize> = self.act_states.clone();
        self.coherence_time += config.dt;
        for traj in 0..self.ntraj {
            let rate: &Array2<f64> = &rates[config.child(traj)];
            let active: usize = self.act_states[traj];
            let pops: Array1<f64> = populations(self.ampl_adi.column(traj));
            for state in 0..self.nadi {
                if self.coherence_interval[[state, traj]].is_nan() {
                    let total_rate: f64 = rate.row(state).dot(&pops);
                    let ksi: f64 = rnd.uniform(0.0, 1.0);
                    self.coherence_interval[[state, traj]] = if total_rate > 0.0 {
                        -(1.0 - ksi).ln() / total_rate
                    } else {
                        f64::INFINITY
                    };
                }
            }
            let event: Option<usize> = (0..self.nadi)
                .find(|state| self.coherence_time[[*state, traj]] >= self.coherence_interval[[*state, traj]]);
            if let Some(state) = event {
                let ksi: f64 = rnd.uniform(0.0, 1.0);
                let mut c: ArrayViewMut1<c64> = self.ampl_adi.column_mut(traj);
                if ksi < pops[state] {
                    collapse(c.view_mut(), state, CollapseOption::KeepPhase);
                    proposed[traj] = state;
                } else {
                    project_out(c.view_mut(), state);
                    if state == active {
                        let ksi: f64 = rnd.uniform(0.0, 1.0);
                        let remaining: Array1<f64> = populations(c.view());
                        proposed[traj] = propose_hop(remaining.view(), active, ksi);
                    }
                }
                self.coherence_time[[state, traj]] = 0.0;
                self.coherence_interval[[state, traj]] = f64::NAN;
                trace!("trajectory {}: decoherence event on state {}", traj, state);
            }
        }
        proposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initialization::SystemData;
    use crate::models::{CrossingParabolas, ModelHamiltonian};
    use crate::utils::tests::ScriptedSource;
    use approx::assert_abs_diff_eq;

    fn two_state_ensemble(
        config: &DynamicConfiguration,
        p: f64,
        active: usize,
    ) -> (Ensemble, ModelHamiltonian<CrossingParabolas>) {
        let mut ham = ModelHamiltonian::new(CrossingParabolas::default(), 1);
        let system = SystemData::new(array![[0.5]], array![[p]], array![0.0005], 2, active).unwrap();
        let ensemble = Ensemble::new(system, config, &mut ham).unwrap();
        (ensemble, ham)
    }

    fn total_energy(ensemble: &Ensemble, config: &DynamicConfiguration, ham: &dyn HamiltonianProvider) -> f64 {
        ensemble.kinetic_energies()[0] + ensemble.potential_energies(config, ham)[0]
    }

    #[test]
    fn clamp_keeps_probabilities_in_range() {
        let mut g: Array1<f64> = array![-0.2, 0.7, 0.9, 1.0e-6];
        clamp_probabilities(&mut g, 1.0e-4);
        assert_eq!(g[0], 0.0);
        assert_eq!(g[3], 0.0);
        assert_abs_diff_eq!(g.sum(), 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(g[1] / g[2], 0.7 / 0.9, epsilon = 1e-14);

        let mut g: Array1<f64> = array![0.0, f64::NAN, 0.3];
        clamp_probabilities(&mut g, 0.0);
        assert_eq!(g, array![0.0, 0.0, 0.3]);
    }

    #[test]
    fn proposal_walks_cumulative_probabilities() {
        let g: Array1<f64> = array![0.0, 0.2, 0.3];
        assert_eq!(propose_hop(g.view(), 0, 0.1), 1);
        assert_eq!(propose_hop(g.view(), 0, 0.3), 2);
        assert_eq!(propose_hop(g.view(), 0, 0.6), 0);
    }

    #[test]
    fn fssh_probability_follows_population_flux() {
        // i dc/dt = H c with a real coupling V moves population from 0 to 1 at the rate
        // 2 V Im(c_0^* c_1)
        let c: Array1<c64> = array![c64::new(0.8, 0.0), c64::new(0.0, -0.6)];
        let v: f64 = 0.01;
        let hvib: Array2<c64> = array![
            [c64::new(0.0, 0.0), c64::new(v, 0.0)],
            [c64::new(v, 0.0), c64::new(0.1, 0.0)]
        ];
        let g: Array1<f64> = fssh_probabilities(c.view(), hvib.view(), 0, 2.0);
        assert_eq!(g[0], 0.0);
        assert_abs_diff_eq!(g[1], 2.0 * 2.0 * v * 0.8 * 0.6 / 0.64, epsilon = 1e-14);
        let reverse: Array1<f64> = fssh_probabilities(c.view(), hvib.view(), 1, 2.0);
        assert!(reverse[0] < 0.0);
    }

    #[test]
    fn gfsh_distributes_lost_population() {
        let before: Array1<f64> = array![0.6, 0.3, 0.1];
        let after: Array1<f64> = array![0.5, 0.34, 0.16];
        let g: Array1<f64> = gfsh_probabilities(before.view(), after.view(), 0);
        assert_abs_diff_eq!(g[1], 0.1 / 0.6 * 0.04 / 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(g[2], 0.1 / 0.6 * 0.06 / 0.1, epsilon = 1e-12);
        assert_eq!(g[0], 0.0);
        // a growing active population never hops
        assert_eq!(gfsh_probabilities(after.view(), before.view(), 1).sum(), 0.0);
        assert_eq!(mssh_probabilities(array![c64::new(0.6, 0.0), c64::new(0.8, 0.0)].view(), 1)[1], 0.0);
    }

    #[test]
    fn accepted_hops_conserve_energy() {
        for rescaling in [
            MomentumRescaling::Isotropic,
            MomentumRescaling::Coupling,
            MomentumRescaling::ForceDifference,
        ] {
            let mut config = DynamicConfiguration::default();
            config.hopping_config.hop_acceptance_algo = HopAcceptance::Always;
            config.hopping_config.momenta_rescaling_algo = rescaling;
            let (mut ensemble, ham) = two_state_ensemble(&config, 40.0, 0);
            let before: f64 = total_energy(&ensemble, &config, &ham);
            let accepted: Vec<bool> = ensemble.accept_hops(&config, &ham, &[1], &mut ScriptedSource::constant(0.5));
            assert_eq!(accepted, vec![true]);
            let hopped: Vec<bool> = ensemble.handle_hops_nuclear(&config, &ham, &[1], &accepted);
            assert_eq!(hopped, vec![true]);
            assert_eq!(ensemble.act_states[0], 1);
            assert_abs_diff_eq!(total_energy(&ensemble, &config, &ham), before, epsilon = 1e-12);
        }
    }

    #[test]
    fn upward_hop_without_energy_is_rejected() {
        let mut config = DynamicConfiguration::default();
        let (ensemble, ham) = two_state_ensemble(&config, 0.1, 0);
        for acceptance in [HopAcceptance::Energy, HopAcceptance::Coupling, HopAcceptance::ForceDifference] {
            config.hopping_config.hop_acceptance_algo = acceptance;
            assert_eq!(ensemble.accept_hops(&config, &ham, &[1], &mut ScriptedSource::constant(0.5)), vec![false]);
        }
        // downward hops are always possible
        let (ensemble, ham) = two_state_ensemble(&config, 0.1, 1);
        assert_eq!(ensemble.accept_hops(&config, &ham, &[0], &mut ScriptedSource::constant(0.5)), vec![true]);

        config.hopping_config.hop_acceptance_algo = HopAcceptance::Boltzmann;
        let (ensemble, ham) = two_state_ensemble(&config, 0.1, 0);
        assert_eq!(ensemble.accept_hops(&config, &ham, &[1], &mut ScriptedSource::constant(0.999)), vec![false]);
    }

    #[test]
    fn infeasible_rescaling_reverts_hop() {
        let mut config = DynamicConfiguration::default();
        config.hopping_config.hop_acceptance_algo = HopAcceptance::Always;
        let (mut ensemble, ham) = two_state_ensemble(&config, 0.1, 0);
        let p_before: Array2<f64> = ensemble.p.clone();
        let hopped: Vec<bool> = ensemble.handle_hops_nuclear(&config, &ham, &[1], &[true]);
        assert_eq!(hopped, vec![false]);
        assert_eq!(ensemble.act_states[0], 0);
        assert_eq!(ensemble.p, p_before);
    }

    #[test]
    fn frustrated_hop_reversal() {
        let mut config = DynamicConfiguration::default();
        config.hopping_config.frustrated_hop = FrustratedHop::Reverse;
        config.hopping_config.momenta_rescaling_algo = MomentumRescaling::Coupling;
        let (mut ensemble, ham) = two_state_ensemble(&config, 0.1, 0);
        let ekin: f64 = ensemble.kinetic_energies()[0];
        assert_eq!(ensemble.handle_frustrated_hops(&config, &ham, &[1]), 1);
        // one DOF: the reversal flips the momentum
        assert_abs_diff_eq!(ensemble.p[[0, 0]], -0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(ensemble.kinetic_energies()[0], ekin, epsilon = 1e-14);

        config.hopping_config.frustrated_hop = FrustratedHop::Keep;
        ensemble.handle_frustrated_hops(&config, &ham, &[1]);
        assert_abs_diff_eq!(ensemble.p[[0, 0]], -0.1, epsilon = 1e-12);
    }

    #[test]
    fn dish_collapses_on_decohered_state() {
        let config = DynamicConfiguration::default();
        let (mut ensemble, _ham) = two_state_ensemble(&config, 1.0, 0);
        ensemble.ampl_adi = array![[c64::new(0.6, 0.0)], [c64::new(0.8, 0.0)]];
        let rates: Vec<Array2<f64>> = vec![array![[0.0, 1.0e3], [1.0e3, 0.0]]];
        // intervals drawn with ksi = 0.5, then the event draw 0.1 < |c_0|^2
        let proposed: Vec<usize> = ensemble.dish(&config, &rates, &mut ScriptedSource::new(vec![0.5, 0.5, 0.1], 0.5));
        assert_eq!(proposed, vec![0]);
        assert_eq!(ensemble.ampl_adi[[1, 0]], c64::new(0.0, 0.0));
        assert!(ensemble.coherence_interval[[0, 0]].is_nan());
        assert!(!ensemble.coherence_interval[[1, 0]].is_nan());
    }
}
